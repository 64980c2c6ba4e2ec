//! In-memory identity registry: one embedding per enrolled identity,
//! nearest-match lookup under a distance threshold.

use crate::types::{DistanceMetric, Embedding, MatchResult};
use std::collections::HashMap;

/// One enrolled identity and its embedding.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub identity: String,
    pub embedding: Embedding,
}

/// Registry mapping identities to embeddings.
///
/// Constructed empty and passed by reference to whichever component needs
/// it; there is no global instance and no cross-run persistence. Lookup is
/// a linear scan in enrollment order — fine for a small roster, and the
/// interface leaves room to swap in an approximate nearest-neighbor index
/// for a larger corpus.
///
/// Not internally synchronized: concurrent readers are safe only while no
/// `enroll` is in flight. Wrap in `RwLock` for shared use.
pub struct Registry {
    metric: DistanceMetric,
    /// Entries in enrollment order; order is the tie-break for lookups.
    entries: Vec<RegistryEntry>,
    /// Identity → position in `entries`, making `enroll` O(1).
    index: HashMap<String, usize>,
}

impl Registry {
    /// Create an empty registry using `metric` for every comparison.
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Insert or overwrite the embedding for `identity`.
    ///
    /// Re-enrolling keeps the identity's original enrollment slot, so the
    /// earliest-enrolled-wins tie-break in [`lookup_nearest`] stays stable.
    ///
    /// [`lookup_nearest`]: Self::lookup_nearest
    pub fn enroll(&mut self, identity: impl Into<String>, embedding: Embedding) {
        let identity = identity.into();
        match self.index.get(&identity) {
            Some(&pos) => {
                tracing::debug!(identity = %identity, "re-enrolling, overwriting embedding");
                self.entries[pos].embedding = embedding;
            }
            None => {
                self.index.insert(identity.clone(), self.entries.len());
                self.entries.push(RegistryEntry { identity, embedding });
            }
        }
    }

    /// Number of distinct enrolled identities.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enrolled identities in enrollment order.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.identity.as_str())
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Find the stored embedding nearest to `probe`.
    ///
    /// Scans every entry in enrollment order; an exact distance tie keeps
    /// the earlier-enrolled identity. The threshold is inclusive: a probe
    /// at exactly `threshold` matches. An empty registry (or one holding
    /// only incomparable embeddings) yields `Unknown`, never an error.
    pub fn lookup_nearest(&self, probe: &Embedding, threshold: f32) -> MatchResult {
        let mut best: Option<(&RegistryEntry, f32)> = None;

        for entry in &self.entries {
            if entry.embedding.dim() != probe.dim() {
                // Different extractor configuration; distances are meaningless.
                tracing::warn!(
                    identity = %entry.identity,
                    stored_dim = entry.embedding.dim(),
                    probe_dim = probe.dim(),
                    "skipping entry with incomparable embedding dimension"
                );
                continue;
            }

            let distance = self.metric.distance(probe, &entry.embedding);
            // Strict `<` keeps the earlier-enrolled entry on an exact tie.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((entry, distance));
            }
        }

        match best {
            Some((entry, distance)) if distance <= threshold => MatchResult::Match {
                identity: entry.identity.clone(),
                distance,
            },
            _ => MatchResult::Unknown,
        }
    }
}
