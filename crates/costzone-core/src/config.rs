/// Construction-time knobs of the tree.
pub struct TreeConfig {
    /// Number of worker threads the costzone decomposition targets.
    pub threads: usize,
    /// Costzone cells per thread; `threads * cells_per_thread` is the
    /// target number of bottom cells the rebalancer steers towards.
    /// Typical values are 16-64: fine enough that load can be reshuffled
    /// between rounds, coarse enough that per-cell overhead stays small.
    pub cells_per_thread: usize,
    /// Hard recursion limit. Two particles closer than
    /// 2^-max_depth of the root size cannot be separated.
    pub max_depth: u32,
    /// Neighbour lists are sized to this cap at search start; exceeding it
    /// reports `TreeError::TooManyNeighbours`.
    pub max_neighbours: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            cells_per_thread: 32,
            max_depth: 128,
            max_neighbours: 1024,
        }
    }
}
