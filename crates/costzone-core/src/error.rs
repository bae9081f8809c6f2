use glam::DVec3;
use thiserror::Error;

/// Everything that can go wrong inside the tree.
///
/// Input errors (`PartOutsideRoot` on insert, `InvalidTheta`,
/// `InvalidCostBand`, `StaleHandle`) leave the tree untouched. Topological
/// errors (`PartsTooClose`, `TooDeep`) abort the current round; the tree
/// stays structurally valid but the caller must perturb or reset before
/// retrying. `TooManyNeighbours` is recoverable by enlarging the cap.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("particle {id} at ({pos:?}) lies outside the root cell")]
    PartOutsideRoot { id: u64, pos: DVec3 },

    #[error("particles {id_a} and {id_b} are closer than the tree can resolve (depth {depth})")]
    PartsTooClose { id_a: u64, id_b: u64, depth: u32 },

    #[error("tree depth limit of {max} exceeded")]
    TooDeep { max: u32 },

    #[error("neighbour list for particle {id} overflowed the cap of {cap}")]
    TooManyNeighbours { id: u64, cap: usize },

    #[error("particle handle is stale (particle removed or tree cleared)")]
    StaleHandle,

    #[error("opening angle must be non-negative, got {theta}")]
    InvalidTheta { theta: f64 },

    #[error("cost band [{low}, {high}] is not a valid range")]
    InvalidCostBand { low: f64, high: f64 },
}
