pub mod product;
pub mod stats_models;

pub use product::{ConsolidatedProduct, NormalizedRow, ProductRecord, SellerOffer, Variant};
