pub mod clustering;
pub mod consolidation;
pub mod embedding;
pub mod error;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod utils;
