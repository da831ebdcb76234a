pub mod variants;

pub use variants::{group_variants, product_key};
