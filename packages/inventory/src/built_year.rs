//! Picks a single built year for a group of parcels.
//!
//! Assessor data stores `0` (or occasionally a negative number) when the
//! year is unknown, so a group whose most common year is a placeholder
//! falls back to the latest year recorded in the group.

use std::collections::BTreeMap;

/// Most common year in `years`, preferring the largest value on ties. If
/// that year is not positive, returns the largest year instead.
///
/// Returns `None` for an empty slice.
#[must_use]
pub fn resolve_built_year(years: &[i64]) -> Option<i64> {
    let mut counts = BTreeMap::<i64, usize>::new();
    for &year in years {
        *counts.entry(year).or_default() += 1;
    }

    // BTreeMap iterates in ascending order, so max_by_key keeps the last
    // (largest) year among equal counts.
    let (&mode, _) = counts.iter().max_by_key(|&(_, count)| *count)?;
    if mode > 0 {
        return Some(mode);
    }
    counts.keys().next_back().copied()
}

/// Resolves one built year per group key. Missing years are ignored and
/// groups without any year are absent from the result.
#[must_use]
pub fn resolve_built_years<K: Ord>(
    rows: impl IntoIterator<Item = (K, Option<i64>)>,
) -> BTreeMap<K, i64> {
    let mut groups = BTreeMap::<K, Vec<i64>>::new();
    for (key, year) in rows {
        let years = groups.entry(key).or_default();
        if let Some(year) = year {
            years.push(year);
        }
    }

    groups
        .into_iter()
        .filter_map(|(key, years)| resolve_built_year(&years).map(|year| (key, year)))
        .collect()
}
