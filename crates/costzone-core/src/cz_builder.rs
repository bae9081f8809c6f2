//! Costzone rebalancing: split bottom cells whose cost share is above the
//! band, merge sibling groups that fell below it.
//!
//! Costs are compared as fractions of the root's total, so the bands stay
//! meaningful whatever unit the caller's per-particle cost uses. Splits
//! run top-down (a split exposes children that may need splitting),
//! merges bottom-up; a merge is refused when the merged cell would exceed
//! the upper band, which keeps the pass from oscillating. One rebalance
//! terminates when neither rule applies anywhere.

use crate::geometry;
use crate::node::{CellNode, CzNode, NodeId, NodeKind};
use crate::tree::Tree;

impl Tree {
    pub(crate) fn rebalance(&mut self, cost_min: f64, cost_max: f64) {
        let total = self.arena.cz(self.root).abs_cost;
        if total > 0.0 {
            loop {
                let mut changed = self.split_pass(total, cost_max);
                changed |= self.merge_pass(self.root, total, cost_min, cost_max);
                if !changed {
                    break;
                }
            }
        }
        self.rebuild_cz_bottom(total);
    }

    fn split_pass(&mut self, total: f64, cost_max: f64) -> bool {
        let mut changed = false;
        let mut work = self.collect_bottoms();
        while let Some(id) = work.pop() {
            let cz = self.arena.cz(id);
            let splittable = cz.at_bottom
                && cz.no_parts > 1
                && cz.abs_cost / total > cost_max
                && self.arena[id].depth + 1 < self.config.max_depth;
            if splittable {
                work.extend(self.split_cz(id));
                changed = true;
            }
        }
        changed
    }

    /// Subdivide a bottom cell into eight costzone children, handing each
    /// its octant's subtree and orphans. The parent keeps its totals.
    fn split_cz(&mut self, id: NodeId) -> [NodeId; 8] {
        let (center, size, depth) = {
            let cell = self.arena.cell(id);
            (cell.center, cell.size, self.arena[id].depth)
        };
        let old_children = self.arena.cell(id).child;
        let old_orphans = std::mem::take(&mut self.arena.cz_mut(id).orphans);
        {
            let cz = self.arena.cz_mut(id);
            cz.at_bottom = false;
            cz.chld_frst = None;
            cz.chld_last = None;
        }

        let mut kids = [NodeId(0); 8];
        for (oct, kid) in kids.iter_mut().enumerate() {
            let ident = self.next_cell_ident();
            *kid = self.arena.alloc(
                Some(id),
                depth + 1,
                ident,
                NodeKind::Cz(Box::new(CzNode::new(
                    geometry::child_center(center, size, oct),
                    0.5 * size,
                    true,
                ))),
            );
            self.cell_count += 1;
            self.arena.cell_mut(id).child[oct] = Some(*kid);
        }

        for (oct, old) in old_children.iter().enumerate() {
            let Some(old) = *old else { continue };
            let kid = kids[oct];
            if self.arena[old].is_particle() {
                // Settled leaf: becomes an orphan of the covering child.
                let cost = self.arena.part(old).cost;
                let cz = self.arena.cz_mut(kid);
                cz.abs_cost += cost;
                cz.no_parts += 1;
                cz.orphans.push(old);
                let node = &mut self.arena[old];
                node.parent = Some(kid);
                node.depth = depth + 2;
                match &mut node.kind {
                    NodeKind::Part(p) => p.settled = false,
                    _ => unreachable!(),
                }
            } else {
                // Generic cell with the same box as the new child: the
                // costzone cell takes over its slots.
                let slots = self.arena.cell(old).child;
                for (j, s) in slots.iter().enumerate() {
                    if let Some(sub) = *s {
                        self.arena.cell_mut(kid).child[j] = Some(sub);
                        self.arena[sub].parent = Some(kid);
                    }
                }
                self.arena.release(old);
                self.cell_count -= 1;
                let (cost, parts) = self.subtree_cost(kid);
                let cz = self.arena.cz_mut(kid);
                cz.abs_cost += cost;
                cz.no_parts += parts;
            }
        }

        for orphan in old_orphans {
            let pos = self.arena.part(orphan).pos;
            let cost = self.arena.part(orphan).cost;
            let kid = kids[geometry::octant(center, pos)];
            let cz = self.arena.cz_mut(kid);
            cz.abs_cost += cost;
            cz.no_parts += 1;
            cz.orphans.push(orphan);
            let node = &mut self.arena[orphan];
            node.parent = Some(kid);
            node.depth = depth + 2;
        }

        kids
    }

    /// Postorder merge sweep. Deepest sibling groups collapse first, so a
    /// cascade of merges completes in one pass.
    fn merge_pass(&mut self, id: NodeId, total: f64, cost_min: f64, cost_max: f64) -> bool {
        if self.arena.cz(id).at_bottom {
            return false;
        }
        let children: Vec<NodeId> = self.arena.cell(id).child.iter().flatten().copied().collect();
        let mut changed = false;
        for &c in &children {
            changed |= self.merge_pass(c, total, cost_min, cost_max);
        }
        let mergeable = children.iter().all(|&c| {
            let cz = self.arena.cz(c);
            cz.at_bottom && cz.abs_cost / total < cost_min
        }) && self.arena.cz(id).abs_cost / total <= cost_max;
        if mergeable {
            self.merge_cz(id);
            changed = true;
        }
        changed
    }

    /// Collapse the eight costzone children back into `id`: orphans move
    /// up, each child's subtree is re-rooted under a plain cell (or the
    /// slot is emptied), and `id` becomes a bottom cell again.
    fn merge_cz(&mut self, id: NodeId) {
        let depth = self.arena[id].depth;
        for oct in 0..8 {
            let Some(czc) = self.arena.cell(id).child[oct] else {
                continue;
            };
            let orphans = std::mem::take(&mut self.arena.cz_mut(czc).orphans);
            for &o in &orphans {
                self.arena[o].parent = Some(id);
            }
            self.arena.cz_mut(id).orphans.extend(orphans);

            let slots = self.arena.cell(czc).child;
            if slots.iter().all(|s| s.is_none()) {
                self.arena.cell_mut(id).child[oct] = None;
            } else {
                let (ccenter, csize) = {
                    let c = self.arena.cell(czc);
                    (c.center, c.size)
                };
                let ident = self.next_cell_ident();
                let g = self.arena.alloc(
                    Some(id),
                    depth + 1,
                    ident,
                    NodeKind::Cell(Box::new(CellNode::new(ccenter, csize))),
                );
                self.cell_count += 1;
                for (j, s) in slots.iter().enumerate() {
                    if let Some(sub) = *s {
                        self.arena.cell_mut(g).child[j] = Some(sub);
                        self.arena[sub].parent = Some(g);
                    }
                }
                self.arena.cell_mut(id).child[oct] = Some(g);
            }
            self.arena.release(czc);
            self.cell_count -= 1;
        }
        self.arena.cz_mut(id).at_bottom = true;
    }

    /// Sum of particle costs and particle count settled below `cell`
    /// (orphans are tracked separately and not visited here).
    fn subtree_cost(&self, cell: NodeId) -> (f64, u64) {
        let mut cost = 0.0;
        let mut parts = 0;
        let mut stack = vec![cell];
        while let Some(id) = stack.pop() {
            match &self.arena[id].kind {
                NodeKind::Part(p) => {
                    cost += p.cost;
                    parts += 1;
                }
                _ => stack.extend(self.arena.cell(id).child.iter().flatten()),
            }
        }
        (cost, parts)
    }

    pub(crate) fn collect_bottoms(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if self.arena.cz(id).at_bottom {
                out.push(id);
            } else {
                stack.extend(self.arena.cell(id).child.iter().flatten());
            }
        }
        out
    }

    fn rebuild_cz_bottom(&mut self, total: f64) {
        self.cz_bottom = self.collect_bottoms();
        for i in 0..self.cz_bottom.len() {
            let id = self.cz_bottom[i];
            let cz = self.arena.cz_mut(id);
            cz.rel_cost = if total > 0.0 { cz.abs_cost / total } else { 0.0 };
        }
    }
}
