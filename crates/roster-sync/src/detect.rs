//! Which pending records are new since the last published snapshot.

use std::collections::BTreeSet;

use roster_core::RecordCollection;

/// Display names of every record whose `processed` marker differs from its
/// `timestamp`, across all partitions.
pub fn unprocessed_names(collection: &RecordCollection) -> BTreeSet<String> {
    collection
        .records()
        .filter(|record| !record.is_processed())
        .map(|record| record.display_name())
        .collect()
}

/// Names pending now that were not pending in `old`, sorted. With no previous
/// snapshot every pending record is new.
pub fn new_attention(old: Option<&RecordCollection>, new: &RecordCollection) -> Vec<String> {
    let before = old.map(unprocessed_names).unwrap_or_default();
    unprocessed_names(new)
        .difference(&before)
        .cloned()
        .collect()
}
