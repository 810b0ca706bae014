//! Pure list algebra for cached ranked lists
//!
//! Lists are ordered descending by key, bounded by a limit and unique by id.

use std::cmp::Reverse;
use std::collections::HashSet;

use uuid::Uuid;

use crate::sort::RankedEntry;

/// Stable descending sort by key.
pub fn sort_descending(entries: &mut [RankedEntry]) {
    entries.sort_by_key(|e| Reverse(e.key));
}

/// Drop every entry whose id is in `ids`. Returns how many were removed.
pub fn remove_ids(entries: &mut Vec<RankedEntry>, ids: &HashSet<Uuid>) -> usize {
    let before = entries.len();
    entries.retain(|e| !ids.contains(&e.id));
    before - entries.len()
}

/// Merge `incoming` into `current`.
///
/// Returns `None` when nothing survives admission and the list is unchanged.
/// Incoming entries sharing an id collapse to the last one.
///
/// Once the merged id set would reach `limit`, an incoming entry is only
/// admitted if its id is already tracked or its key is at least the
/// current minimum. Anything else would be truncated straight away.
pub fn apply_insert(
    current: &[RankedEntry],
    incoming: &[RankedEntry],
    limit: usize,
) -> Option<Vec<RankedEntry>> {
    let incoming = dedup_keep_last(incoming);
    if incoming.is_empty() {
        return None;
    }

    let existing: HashSet<Uuid> = current.iter().map(|e| e.id).collect();
    let new_ids: HashSet<Uuid> = incoming.iter().map(|e| e.id).collect();
    let mutated_size = existing.union(&new_ids).count();

    let admitted: Vec<RankedEntry> = match current.last() {
        Some(smallest) if mutated_size >= limit => incoming
            .into_iter()
            .filter(|e| existing.contains(&e.id) || e.key >= smallest.key)
            .collect(),
        _ => incoming,
    };

    if admitted.is_empty() {
        return None;
    }

    let replaced: HashSet<Uuid> = admitted.iter().map(|e| e.id).collect();
    let mut merged: Vec<RankedEntry> = current
        .iter()
        .filter(|e| !replaced.contains(&e.id))
        .copied()
        .collect();
    merged.extend(admitted);
    sort_descending(&mut merged);
    merged.truncate(limit);
    Some(merged)
}

fn dedup_keep_last(entries: &[RankedEntry]) -> Vec<RankedEntry> {
    let mut seen = HashSet::with_capacity(entries.len());
    let mut out: Vec<RankedEntry> = entries
        .iter()
        .rev()
        .filter(|e| seen.insert(e.id))
        .copied()
        .collect();
    out.reverse();
    out
}
