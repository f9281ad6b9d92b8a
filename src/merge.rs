//! Domain merge engine.
//!
//! Overlays newly normalized records onto a domain's current dataset by the
//! domain's natural key. A matching key is replaced in place, a new key is
//! appended. Sales and Product results are then sorted by key using plain
//! string ordering, so `"10월"` sorts before `"2월"`; Competitor and Review
//! keep insertion order.
//!
//! Everything here is pure: no I/O, no shared state, no failure path.

use std::collections::HashMap;

use crate::models::{Dataset, Keyed, UploadDomain};

/// Ordering applied to a merged collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOrder {
    /// Ascending by key, lexicographic.
    SortedByKey,
    /// Existing order first, new keys appended.
    Insertion,
}

impl MergeOrder {
    pub fn for_domain(domain: UploadDomain) -> Self {
        match domain {
            UploadDomain::Sales | UploadDomain::Product => MergeOrder::SortedByKey,
            UploadDomain::Competitor | UploadDomain::Review => MergeOrder::Insertion,
        }
    }
}

/// Merge `incoming` into `existing` by key.
///
/// With no existing collection the incoming records are returned in their
/// own order, unsorted. Duplicate keys within `incoming` collapse to the
/// last occurrence, kept at the first occurrence's position.
pub fn merge_records<T: Keyed + Clone>(
    existing: Option<&[T]>,
    incoming: Vec<T>,
    order: MergeOrder,
) -> Vec<T> {
    let Some(existing) = existing else {
        return overlay(Vec::new(), incoming);
    };

    let mut merged = overlay(existing.to_vec(), incoming);
    if order == MergeOrder::SortedByKey {
        merged.sort_by(|a, b| a.key().cmp(b.key()));
    }
    merged
}

fn overlay<T: Keyed>(base: Vec<T>, incoming: Vec<T>) -> Vec<T> {
    let mut slots: Vec<T> = Vec::with_capacity(base.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(slots.capacity());

    for record in base.into_iter().chain(incoming) {
        match index.get(record.key()) {
            Some(&at) => slots[at] = record,
            None => {
                index.insert(record.key().to_string(), slots.len());
                slots.push(record);
            }
        }
    }
    slots
}

/// Merge a normalized dataset into the domain's current dataset.
///
/// `existing` of a different domain than `incoming` is treated as absent.
pub fn merge(existing: Option<&Dataset>, incoming: Dataset) -> Dataset {
    let order = MergeOrder::for_domain(incoming.domain());
    match incoming {
        Dataset::Sales(new) => Dataset::Sales(merge_records(
            existing.and_then(Dataset::as_sales),
            new,
            order,
        )),
        Dataset::Competitor(new) => Dataset::Competitor(merge_records(
            existing.and_then(Dataset::as_competitor),
            new,
            order,
        )),
        Dataset::Product(new) => Dataset::Product(merge_records(
            existing.and_then(Dataset::as_product),
            new,
            order,
        )),
        Dataset::Review(new) => Dataset::Review(merge_records(
            existing.and_then(Dataset::as_review),
            new,
            order,
        )),
    }
}
