//! Score-based selection shared by the selection modules.

use log::warn;

use super::artifact::{FileType, ProducedArtifact};

/// Result of a top-K selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Selected artifacts, ascending by score
    pub selected: Vec<ProducedArtifact>,
    /// Set when fewer candidates than requested were available
    pub shortfall: Option<Shortfall>,
}

/// Requested versus available candidate counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub requested: usize,
    pub available: usize,
}

/// Selects the `count` lowest-scoring artifacts of the given type.
///
/// Candidates of other types are ignored. Ties keep their input order.
/// Asking for more than are available selects all of them and records a
/// shortfall instead of failing.
pub fn select_top(
    candidates: &[ProducedArtifact],
    file_type: FileType,
    count: usize,
) -> Selection {
    let mut pool: Vec<ProducedArtifact> = candidates
        .iter()
        .filter(|a| a.file_type == file_type)
        .cloned()
        .collect();

    // stable
    pool.sort_by(|a, b| a.score.total_cmp(&b.score));

    let shortfall = if pool.len() < count {
        warn!(
            "Number of models to select ({}) is larger than the number available ({}), selecting ALL",
            count,
            pool.len()
        );
        Some(Shortfall {
            requested: count,
            available: pool.len(),
        })
    } else {
        None
    };

    pool.truncate(count);

    Selection {
        selected: pool,
        shortfall,
    }
}
