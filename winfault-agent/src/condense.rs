//! Exclude-list condensation.
//!
//! Auto-appended excludes can grow unbounded when the orchestrator declares
//! many restricted endpoints, and the WinDivert expression parser has a
//! practical size ceiling. When the exclude list exceeds the limit this
//! module repeatedly merges entries with identical port ranges into their
//! common supernet, preferring merges that keep the longest prefix, until
//! the list fits or nothing merges. The result only ever broadens exclusion,
//! so the controller surfaces a warning when condensation fires.

use std::cmp::Ordering;

use winfault_shared::NetWithPortRange;

/// Size limit for the exclude list. Not a hard WinDivert limit; calibrated
/// against the engine's parser, tighten if the engine rejects filters.
pub const EXCLUDE_LIMIT: usize = 500;

/// Condenses `nwps` until it holds at most `limit` entries or no merge is
/// possible. Returns the (possibly shortened) list and whether any merge
/// happened. Every input entry is contained in some output entry.
pub fn condense_excludes(
    nwps: Vec<NetWithPortRange>,
    limit: usize,
) -> (Vec<NetWithPortRange>, bool) {
    if nwps.len() <= limit {
        return (nwps, false);
    }

    let input_len = nwps.len();
    let mut result = nwps;
    result.sort_by(NetWithPortRange::compare);

    let mut candidates: Vec<NetWithPortRange> = Vec::new();
    for i in 0..result.len().saturating_sub(1) {
        if let Some(candidate) = next_matching_candidate(&result, i) {
            insert_sorted(&mut candidates, candidate, by_prefix_desc);
        }
    }

    loop {
        if result.len() <= limit || candidates.is_empty() {
            let condensed = result.len() != input_len;
            return (result, condensed);
        }

        let longest = candidates.remove(0);

        let len_before = result.len();
        result.retain(|nwp| !longest.contains(nwp));

        // A stale candidate that no longer removes anything is skipped.
        if result.len() == len_before {
            continue;
        }

        let at = insert_sorted(&mut result, longest, NetWithPortRange::compare);

        // The inserted entry forms new merge candidates with its neighbors.
        let from = at.saturating_sub(1);
        let to = at.min(result.len().saturating_sub(1));
        for j in from..=to {
            if let Some(candidate) = next_matching_candidate(&result, j) {
                insert_sorted(&mut candidates, candidate, by_prefix_desc);
            }
        }
    }
}

/// Merge candidate between `list[i]` and its next entry with an identical
/// port range.
fn next_matching_candidate(
    list: &[NetWithPortRange],
    i: usize,
) -> Option<NetWithPortRange> {
    let a = &list[i];
    for b in &list[i + 1..] {
        if a.ports == b.ports {
            return a.merge(b);
        }
    }
    None
}

fn by_prefix_desc(a: &NetWithPortRange, b: &NetWithPortRange) -> Ordering {
    b.prefix_len().cmp(&a.prefix_len())
}

fn insert_sorted<F>(list: &mut Vec<NetWithPortRange>, item: NetWithPortRange, cmp: F) -> usize
where
    F: Fn(&NetWithPortRange, &NetWithPortRange) -> Ordering,
{
    let at = match list.binary_search_by(|probe| cmp(probe, &item)) {
        Ok(i) | Err(i) => i,
    };
    list.insert(at, item);
    at
}
