// Simultaneity grouping - clusters notes that are struck together
// Used by fingering, humanization and pedaling to treat chords as one gesture

use std::ops::Range;

use super::types::{NoteId, NoteStore};

/// Default onset window for two notes to count as simultaneous (15ms)
pub const DEFAULT_GROUP_THRESHOLD: f64 = 0.015;

/// Cluster sorted onsets into contiguous index ranges.
///
/// An onset joins the current cluster if it lies within `threshold` of the
/// cluster's *first* onset, so a long run of small steps is split once it
/// drifts past the window.
pub fn onset_clusters(onsets: &[f64], threshold: f64) -> Vec<Range<usize>> {
    let mut clusters = Vec::new();
    if onsets.is_empty() {
        return clusters;
    }

    let mut cluster_start = 0;
    for i in 1..onsets.len() {
        if onsets[i] - onsets[cluster_start] > threshold {
            clusters.push(cluster_start..i);
            cluster_start = i;
        }
    }
    clusters.push(cluster_start..onsets.len());

    clusters
}

/// Group notes (given in start-time order) into simultaneity groups
pub fn time_groups(store: &NoteStore, ids: &[NoteId], threshold: f64) -> Vec<Vec<NoteId>> {
    let onsets: Vec<f64> = ids
        .iter()
        .map(|id| store.get(*id).map(|n| n.start_time).unwrap_or(f64::NAN))
        .collect();

    onset_clusters(&onsets, threshold)
        .into_iter()
        .map(|range| ids[range].to_vec())
        .collect()
}
