//! The tree value and the round-by-round update pipeline.
//!
//! One `Tree` per simulation; the driver threads it as a mutable borrow
//! through `update()` and as a shared borrow through the read-only walks.
//! Inside `update()` the per-costzone phases fan out over the bottom
//! cells; everything else is single-threaded by contract.

use glam::DVec3;

use crate::config::TreeConfig;
use crate::error::TreeError;
use crate::geometry::Extent;
use crate::housekeeper;
use crate::multipole::{self, Multipoles};
use crate::node::{CzNode, Node, NodeArena, NodeId, NodeKind, ParticleHandle};
use crate::par;

/// Snapshot of one costzone bottom cell, for drivers and tests.
#[derive(Clone, Copy, Debug)]
pub struct BottomCell {
    /// Stable cell identifier (survives rounds while the cell lives).
    pub ident: i64,
    pub abs_cost: f64,
    pub rel_cost: f64,
    pub comp_time: f64,
    pub no_parts: u64,
    pub depth: u32,
}

pub struct Tree {
    pub(crate) arena: NodeArena,
    pub(crate) root: NodeId,
    pub(crate) cz_bottom: Vec<NodeId>,
    /// Bottom cells that actually hold a subtree this round.
    pub(crate) cz_bottom_loc: Vec<NodeId>,
    pub(crate) round: u64,
    pub(crate) part_count: u64,
    pub(crate) cell_count: u64,
    pub(crate) cell_serial: i64,
    pub(crate) config: TreeConfig,
}

impl Tree {
    /// Tree over a cubic root cell. `threads * cells_per_thread` is the
    /// bottom-cell count the rebalancer steers towards.
    pub fn new(center: DVec3, size: f64, threads: usize, cells_per_thread: usize) -> Self {
        let config = TreeConfig {
            threads: threads.max(1),
            cells_per_thread: cells_per_thread.max(1),
            ..TreeConfig::default()
        };
        Self::with_config(Extent::new(center, size), config)
    }

    pub fn with_config(extent: Extent, config: TreeConfig) -> Self {
        let mut arena = NodeArena::new();
        let root = arena.alloc(
            None,
            0,
            0,
            NodeKind::Cz(Box::new(CzNode::new(extent.center, extent.size, true))),
        );
        Self {
            arena,
            root,
            cz_bottom: vec![root],
            cz_bottom_loc: Vec::new(),
            round: 0,
            part_count: 0,
            cell_count: 1,
            cell_serial: 0,
            config,
        }
    }

    /// Override the root box. Meant to be called before the first
    /// insert; existing content is not re-seated.
    pub fn set_extent(&mut self, extent: Extent) {
        if self.part_count > 0 {
            tracing::warn!("set_extent on a populated tree; particles are not re-seated");
        }
        let cell = self.arena.cell_mut(self.root);
        cell.center = extent.center;
        cell.size = extent.size;
    }

    /// Rebalance the costzone decomposition and prepare the round's
    /// walks. Must run once per simulation step, after all insertions
    /// and moves.
    ///
    /// `cmark_low`/`cmark_high` (typically 0.8/1.2) scale the per-cell
    /// cost band around the even share `1/(threads * cells_per_thread)`.
    pub fn update(&mut self, cmark_low: f64, cmark_high: f64) -> Result<(), TreeError> {
        if !cmark_low.is_finite()
            || !cmark_high.is_finite()
            || cmark_low <= 0.0
            || cmark_high <= cmark_low
        {
            return Err(TreeError::InvalidCostBand {
                low: cmark_low,
                high: cmark_high,
            });
        }
        let norm = 1.0 / (self.config.threads * self.config.cells_per_thread) as f64;
        self.rebalance(cmark_low * norm, cmark_high * norm);

        let bottoms = self.cz_bottom.clone();
        for &czll in &bottoms {
            self.push_down_orphans(czll)?;
        }

        // Housekeep each bottom subtree: the passes are planned with
        // read-only walks over disjoint subtrees in parallel, then the
        // plans commit serially at the barrier.
        let prunes = {
            let tree: &Tree = self;
            par::map_vec(&bottoms, |&id| housekeeper::plan_prune(tree, id))
        };
        for plan in prunes {
            self.apply_prune(plan);
        }

        let nexts = {
            let tree: &Tree = self;
            par::map_vec(&bottoms, |&id| housekeeper::plan_next(tree, id))
        };
        for plan in nexts {
            self.apply_next(plan);
        }

        let moments = {
            let tree: &Tree = self;
            par::map_vec(&bottoms, |&id| multipole::plan_moments(tree, id))
        };
        for plan in moments {
            self.apply_moments(plan);
        }

        // Housekeep the costzone top.
        self.set_next_cz();
        self.set_skip();
        self.calc_multipoles_cz();
        self.recompute_bottom_loc();
        self.round += 1;

        tracing::debug!(
            round = self.round,
            bottoms = self.cz_bottom.len(),
            parts = self.part_count,
            cells = self.cell_count,
            "tree update complete"
        );

        #[cfg(debug_assertions)]
        if let Err(err) = crate::check::verify(self) {
            panic!("tree invariant violated after update: {err}");
        }

        Ok(())
    }

    /// Recompute moments on the existing topology — for when masses
    /// changed but no particle moved.
    pub fn redo_multipoles(&mut self) {
        let bottoms = self.cz_bottom.clone();
        let moments = {
            let tree: &Tree = self;
            par::map_vec(&bottoms, |&id| multipole::plan_moments(tree, id))
        };
        for plan in moments {
            self.apply_moments(plan);
        }
        self.calc_multipoles_cz();
    }

    /// Reset to an empty root over the same extent. All particle handles
    /// become stale.
    pub fn clear(&mut self) {
        let (center, size) = {
            let cell = self.arena.cell(self.root);
            (cell.center, cell.size)
        };
        let live: Vec<NodeId> = self.arena.iter_live().map(|(id, _)| id).collect();
        for id in live {
            self.arena.release(id);
        }
        self.part_count = 0;
        let root = self.arena.alloc(
            None,
            0,
            0,
            NodeKind::Cz(Box::new(CzNode::new(center, size, true))),
        );
        self.root = root;
        self.cell_count = 1;
        self.cz_bottom = vec![root];
        self.cz_bottom_loc.clear();
    }

    /// Normalise the measured per-cell walk times to fractions of their
    /// total, so drivers can compare them against `rel_cost`.
    pub fn normalize_cost(&mut self) {
        let total: f64 = self
            .cz_bottom
            .iter()
            .map(|&id| self.arena.cz(id).comp_time)
            .sum();
        if total > 0.0 {
            for i in 0..self.cz_bottom.len() {
                let id = self.cz_bottom[i];
                self.arena.cz_mut(id).comp_time /= total;
            }
        }
    }

    /// Record the measured walk time of the bottom cell at `index` (in
    /// `bottom_cells()` order).
    pub fn set_comp_time(&mut self, index: usize, seconds: f64) {
        if let Some(&id) = self.cz_bottom.get(index) {
            self.arena.cz_mut(id).comp_time = seconds;
        }
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn particle_count(&self) -> u64 {
        self.part_count
    }

    pub fn cell_node_count(&self) -> u64 {
        self.cell_count
    }

    /// Moments of the whole domain.
    pub fn root_moments(&self) -> Multipoles {
        self.arena.cell(self.root).mp
    }

    /// External ids of every particle in global preorder — a
    /// cache-friendly iteration order for per-particle walks. Valid
    /// after `update()`.
    pub fn particle_order(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.part_count as usize);
        let mut cur = Some(self.root);
        while let Some(id) = cur {
            let node = &self.arena[id];
            if node.is_particle() {
                out.push(node.ident as u64);
            }
            cur = node.next;
        }
        out
    }

    /// The root box.
    pub fn extent(&self) -> Extent {
        let cell = self.arena.cell(self.root);
        Extent::new(cell.center, cell.size)
    }

    /// The current costzone bottom decomposition.
    pub fn bottom_cells(&self) -> Vec<BottomCell> {
        self.cz_bottom
            .iter()
            .map(|&id| self.bottom_cell_info(id))
            .collect()
    }

    /// The bottom cells that actually hold a subtree this round — the
    /// work items a local scheduler hands to its threads; empty bottom
    /// cells are skipped.
    pub fn local_bottom_cells(&self) -> Vec<BottomCell> {
        self.cz_bottom_loc
            .iter()
            .map(|&id| self.bottom_cell_info(id))
            .collect()
    }

    fn bottom_cell_info(&self, id: NodeId) -> BottomCell {
        let cz = self.arena.cz(id);
        BottomCell {
            ident: self.arena[id].ident,
            abs_cost: cz.abs_cost,
            rel_cost: cz.rel_cost,
            comp_time: cz.comp_time,
            no_parts: cz.no_parts,
            depth: self.arena[id].depth,
        }
    }

    // Internal plumbing shared by the worker modules.

    pub(crate) fn next_cell_ident(&mut self) -> i64 {
        self.cell_serial += 1;
        -self.cell_serial
    }

    /// Resolve a handle to its proxy node, rejecting stale ones.
    pub(crate) fn proxy(&self, handle: ParticleHandle) -> Result<NodeId, TreeError> {
        let node = &self.arena[handle.node];
        if node.gen != handle.gen || !node.is_particle() {
            return Err(TreeError::StaleHandle);
        }
        Ok(handle.node)
    }

    fn recompute_bottom_loc(&mut self) {
        self.cz_bottom_loc = self
            .cz_bottom
            .iter()
            .copied()
            .filter(|&id| self.arena.cell(id).child_count() > 0)
            .collect();
    }

    pub(crate) fn root_id(&self) -> NodeId {
        self.root
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.arena[id]
    }

    pub(crate) fn node_cell(&self, id: NodeId) -> &crate::node::CellNode {
        self.arena.cell(id)
    }

    pub(crate) fn node_cz(&self, id: NodeId) -> &CzNode {
        self.arena.cz(id)
    }

    pub(crate) fn arena_ref(&self) -> &NodeArena {
        &self.arena
    }

    pub(crate) fn cz_bottom_ids(&self) -> Vec<NodeId> {
        self.cz_bottom.clone()
    }

    pub(crate) fn cell_moments(&self, id: NodeId) -> Multipoles {
        self.arena.cell(id).mp
    }

    pub(crate) fn set_cell_moments(&mut self, id: NodeId, mp: Multipoles) {
        self.arena.cell_mut(id).mp = mp;
    }
}
