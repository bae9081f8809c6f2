//! Cursor walking over the tree topology.
//!
//! Workers never own nodes; a `Walker` borrows the arena for the duration
//! of a walk and moves a cursor along parent, child and preorder-next
//! links. Mutating topology helpers (cell allocation, particle-to-cell
//! promotion) live on `Tree` itself.

use glam::DVec3;

use crate::error::TreeError;
use crate::geometry;
use crate::node::{CellNode, NodeArena, NodeId, NodeKind};
use crate::tree::Tree;

/// Read-only cursor over the node arena.
pub(crate) struct Walker<'a> {
    arena: &'a NodeArena,
    root: NodeId,
    pub cur: NodeId,
}

#[allow(dead_code)]
impl<'a> Walker<'a> {
    pub fn new(arena: &'a NodeArena, root: NodeId, start: NodeId) -> Self {
        Self { arena, root, cur: start }
    }

    #[inline]
    pub fn node(&self) -> &'a crate::node::Node {
        &self.arena[self.cur]
    }

    #[inline]
    pub fn go_root(&mut self) {
        self.cur = self.root;
    }

    /// Move to the parent; false at the root.
    #[inline]
    pub fn go_up(&mut self) -> bool {
        match self.node().parent {
            Some(p) => {
                self.cur = p;
                true
            }
            None => false,
        }
    }

    /// Move to child `oct`; false when the slot is empty. The cursor must
    /// be on a cell.
    #[inline]
    pub fn go_child(&mut self, oct: usize) -> bool {
        match self.arena.cell(self.cur).child[oct] {
            Some(c) => {
                self.cur = c;
                true
            }
            None => false,
        }
    }

    /// Follow the preorder `next` link; false at the chain's end.
    #[inline]
    pub fn go_next(&mut self) -> bool {
        match self.node().next {
            Some(n) => {
                self.cur = n;
                true
            }
            None => false,
        }
    }

    /// Octant of `p` relative to the cursor cell.
    #[inline]
    pub fn octant_of(&self, p: DVec3) -> usize {
        let cell = self.arena.cell(self.cur);
        geometry::octant(cell.center, p)
    }

    /// Is `p` inside the cursor cell's box?
    #[inline]
    pub fn inside(&self, p: DVec3) -> bool {
        let cell = self.arena.cell(self.cur);
        geometry::point_inside(p, cell.center, cell.size)
    }
}

impl Tree {
    /// Which child slot of `parent` holds `node`? None for orphans.
    pub(crate) fn child_slot_of(&self, parent: NodeId, node: NodeId) -> Option<usize> {
        self.arena
            .cell(parent)
            .child
            .iter()
            .position(|c| *c == Some(node))
    }

    /// Allocate an empty generic cell as child `oct` of `parent`, with
    /// the derived octant box.
    pub(crate) fn new_cell_child(&mut self, parent: NodeId, oct: usize) -> NodeId {
        let (center, size, depth) = {
            let cell = self.arena.cell(parent);
            (cell.center, cell.size, self.arena[parent].depth)
        };
        let ident = self.next_cell_ident();
        let child = self.arena.alloc(
            Some(parent),
            depth + 1,
            ident,
            NodeKind::Cell(Box::new(CellNode::new(
                geometry::child_center(center, size, oct),
                0.5 * size,
            ))),
        );
        self.arena.cell_mut(parent).child[oct] = Some(child);
        self.cell_count += 1;
        child
    }

    /// Promote the particle in slot `oct` of `cell` to an interior cell
    /// and re-seat the particle in the proper sub-octant.
    ///
    /// Fails with `TooDeep` when the promotion would step past the depth
    /// limit — at that point the slot is left untouched.
    pub(crate) fn part_to_cell(&mut self, cell: NodeId, oct: usize) -> Result<NodeId, TreeError> {
        let depth = self.arena[cell].depth;
        if depth + 2 > self.config.max_depth {
            return Err(TreeError::TooDeep {
                max: self.config.max_depth,
            });
        }
        let part = match self.arena.cell(cell).child[oct] {
            Some(p) => p,
            None => unreachable!("promoting an empty slot"),
        };
        debug_assert!(self.arena[part].is_particle());

        let new_cell = self.new_cell_child(cell, oct);
        let pos = self.arena.part(part).pos;
        let sub = {
            let c = self.arena.cell(new_cell);
            geometry::octant(c.center, pos)
        };
        self.arena.cell_mut(new_cell).child[sub] = Some(part);
        let part_node = &mut self.arena[part];
        part_node.parent = Some(new_cell);
        part_node.depth = depth + 2;
        Ok(new_cell)
    }
}
