// src/consolidation/variants.rs
// Turns clustered records into consolidated products with package-size
// variants and per-store offers.

use log::debug;
use ndarray::ArrayView2;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::clustering::dbscan::NOISE_LABEL;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{ConsolidatedProduct, ProductRecord, Variant};

/// Which cluster a record landed in. Noise records are not grouped with each
/// other; each one is keyed by its own row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ClusterSlot {
    Cluster(i64),
    Noise(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VariantKey {
    weight_bits: u64,
    measure: String,
}

impl VariantKey {
    fn of(record: &ProductRecord) -> Self {
        // -0.0 and 0.0 are the same package size
        let weight = if record.weight == 0.0 { 0.0 } else { record.weight };
        Self {
            weight_bits: weight.to_bits(),
            measure: record.measure.clone(),
        }
    }
}

struct VariantGroup {
    rows: Vec<usize>,
}

struct ProductGroup {
    cluster_id: i64,
    rows: Vec<usize>,
    variants: Vec<VariantGroup>,
    variant_index: HashMap<VariantKey, usize>,
}

/// Stable identifier for a set of listings: SHA-256 over the brand and the
/// sorted member tuples `(store_id, ref_id, link, name, weight, measure)`.
/// `ref_id` and `link` are optional, so the listing's name and package size
/// keep two id-less listings from the same store apart.
pub fn product_key<'a>(brand: &str, members: impl IntoIterator<Item = &'a ProductRecord>) -> String {
    let mut tuples: Vec<(i64, &str, &str, &str, u64, &str)> = members
        .into_iter()
        .map(|r| {
            (
                r.store_id,
                r.ref_id.as_deref().unwrap_or(""),
                r.link.as_deref().unwrap_or(""),
                r.name.as_str(),
                VariantKey::of(r).weight_bits,
                r.measure.as_str(),
            )
        })
        .collect();
    tuples.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(brand.as_bytes());
    for (store_id, ref_id, link, name, weight_bits, measure) in tuples {
        hasher.update([0x1f]);
        hasher.update(store_id.to_string().as_bytes());
        for field in [ref_id, link, name] {
            hasher.update([0x1e]);
            hasher.update(field.as_bytes());
        }
        hasher.update([0x1e]);
        hasher.update(weight_bits.to_be_bytes());
        hasher.update([0x1e]);
        hasher.update(measure.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Groups records by `(brand, cluster)` and then by `(weight, measure)`.
///
/// `records`, `cluster_ids` and the rows of `embeddings` must line up by
/// position. The first record of a product (in input order) supplies the
/// product's name and embedding, the first record of a variant supplies the
/// variant's name and image. Every record becomes exactly one offer, in input
/// order, duplicates from the same store included.
pub fn group_variants(
    records: &[ProductRecord],
    cluster_ids: &[i64],
    embeddings: ArrayView2<f32>,
) -> PipelineResult<Vec<ConsolidatedProduct>> {
    if records.len() != cluster_ids.len() || records.len() != embeddings.nrows() {
        return Err(PipelineError::InvariantViolation(format!(
            "{} records, {} cluster ids and {} embeddings do not line up",
            records.len(),
            cluster_ids.len(),
            embeddings.nrows()
        )));
    }

    let mut products: Vec<(String, ProductGroup)> = Vec::new();
    let mut product_index: HashMap<(&str, ClusterSlot), usize> = HashMap::new();

    for (row, (record, &cluster_id)) in records.iter().zip(cluster_ids).enumerate() {
        let slot = if cluster_id == NOISE_LABEL {
            ClusterSlot::Noise(row)
        } else {
            ClusterSlot::Cluster(cluster_id)
        };

        let idx = *product_index
            .entry((record.brand.as_str(), slot))
            .or_insert_with(|| {
                products.push((
                    record.brand.clone(),
                    ProductGroup {
                        cluster_id,
                        rows: Vec::new(),
                        variants: Vec::new(),
                        variant_index: HashMap::new(),
                    },
                ));
                products.len() - 1
            });

        let group = &mut products[idx].1;
        group.rows.push(row);

        let variant_key = VariantKey::of(record);
        let variant_idx = match group.variant_index.get(&variant_key) {
            Some(&v) => v,
            None => {
                group.variants.push(VariantGroup { rows: Vec::new() });
                let v = group.variants.len() - 1;
                group.variant_index.insert(variant_key, v);
                v
            }
        };
        group.variants[variant_idx].rows.push(row);
    }

    let consolidated: Vec<ConsolidatedProduct> = products
        .into_iter()
        .map(|(brand, group)| {
            let first = group.rows[0];
            let variations = group
                .variants
                .iter()
                .map(|variant| {
                    let head = &records[variant.rows[0]];
                    Variant {
                        weight: head.weight,
                        measure: head.measure.clone(),
                        name: head.name.clone(),
                        image_url: head.image_url.clone(),
                        sellers: variant.rows.iter().map(|&r| records[r].to_offer()).collect(),
                    }
                })
                .collect();

            ConsolidatedProduct {
                product_key: product_key(&brand, group.rows.iter().map(|&r| &records[r])),
                brand,
                cluster_id: group.cluster_id,
                name: records[first].name.clone(),
                embedded_name: embeddings.row(first).to_vec(),
                variations,
            }
        })
        .collect();

    debug!(
        "Grouped {} records into {} products",
        records.len(),
        consolidated.len()
    );

    Ok(consolidated)
}
