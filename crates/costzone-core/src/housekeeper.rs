//! Per-round tree maintenance: pruning, preorder linkage, skip pointers.
//!
//! The per-costzone passes (`plan_prune`, `plan_next` and the moment fold
//! in `multipole`) are pure reads over disjoint bottom subtrees, so the
//! driver runs them in parallel and commits the resulting plans serially
//! at the phase barrier. The cross-costzone passes (`set_next_cz`,
//! `set_skip`) touch the shared top and run single-threaded.

use crate::node::{NodeId, NodeKind};
use crate::tree::Tree;

/// Topology edits that minimise one costzone bottom subtree: unlink and
/// free childless cells, splice single-child chains down to their deepest
/// descendant.
pub(crate) struct PrunePlan {
    relink: Vec<(NodeId, usize, Option<NodeId>)>,
    reparent: Vec<(NodeId, NodeId)>,
    free: Vec<NodeId>,
}

pub(crate) fn plan_prune(tree: &Tree, czll: NodeId) -> PrunePlan {
    let mut plan = PrunePlan {
        relink: Vec::new(),
        reparent: Vec::new(),
        free: Vec::new(),
    };
    let slots = tree.arena.cell(czll).child;
    for (oct, slot) in slots.iter().enumerate() {
        let Some(child) = *slot else { continue };
        let eff = effective(tree, child, &mut plan);
        if eff != Some(child) {
            plan.relink.push((czll, oct, eff));
            if let Some(n) = eff {
                plan.reparent.push((n, czll));
            }
        }
    }
    plan
}

/// What survives of the subtree rooted at `id`: the node itself, a deeper
/// descendant (chain collapse), or nothing. Freed cells are recorded on
/// the way out; depths of spliced survivors go stale here and are
/// re-canonicalised by the following next-wiring pass.
fn effective(tree: &Tree, id: NodeId, plan: &mut PrunePlan) -> Option<NodeId> {
    let node = &tree.arena[id];
    if node.is_particle() || node.is_cz() {
        return Some(id);
    }
    let slots = tree.arena.cell(id).child;
    let mut survivors = 0;
    let mut only = None;
    let mut edits: Vec<(usize, NodeId, Option<NodeId>)> = Vec::new();
    for (oct, slot) in slots.iter().enumerate() {
        let Some(child) = *slot else { continue };
        let eff = effective(tree, child, plan);
        if let Some(n) = eff {
            survivors += 1;
            only = Some(n);
        }
        if eff != Some(child) {
            edits.push((oct, child, eff));
        }
    }
    match survivors {
        0 => {
            plan.free.push(id);
            None
        }
        1 => {
            plan.free.push(id);
            only
        }
        _ => {
            for (oct, _, eff) in edits {
                plan.relink.push((id, oct, eff));
                if let Some(n) = eff {
                    plan.reparent.push((n, id));
                }
            }
            Some(id)
        }
    }
}

/// Fresh preorder chain of one costzone bottom subtree, with the
/// canonical depth of every visited node. Pruning splices chains and
/// leaves survivor depths stale, and the skip pass compares depths
/// across sibling subtrees, so they are rewritten here.
pub(crate) struct NextPlan {
    czll: NodeId,
    links: Vec<(NodeId, Option<NodeId>)>,
    depths: Vec<(NodeId, u32)>,
    frst: Option<NodeId>,
    last: Option<NodeId>,
}

pub(crate) fn plan_next(tree: &Tree, czll: NodeId) -> NextPlan {
    let mut order = Vec::new();
    let mut depths = Vec::new();
    let mut stack: Vec<(NodeId, u32)> = Vec::new();
    let base = tree.arena[czll].depth;
    push_children(tree, czll, base + 1, &mut stack);
    while let Some((id, depth)) = stack.pop() {
        order.push(id);
        depths.push((id, depth));
        if !tree.arena[id].is_particle() {
            push_children(tree, id, depth + 1, &mut stack);
        }
    }

    let mut links = Vec::with_capacity(order.len() + 1);
    links.push((czll, order.first().copied()));
    for i in 0..order.len() {
        links.push((order[i], order.get(i + 1).copied()));
    }
    NextPlan {
        czll,
        links,
        depths,
        frst: order.first().copied(),
        last: order.last().copied(),
    }
}

/// Push children in reverse octant order so the stack pops them 0..8.
fn push_children(tree: &Tree, cell: NodeId, child_depth: u32, stack: &mut Vec<(NodeId, u32)>) {
    let slots = tree.arena.cell(cell).child;
    for slot in slots.iter().rev() {
        if let Some(c) = *slot {
            stack.push((c, child_depth));
        }
    }
}

impl Tree {
    pub(crate) fn apply_prune(&mut self, plan: PrunePlan) {
        for (parent, oct, child) in plan.relink {
            self.arena.cell_mut(parent).child[oct] = child;
        }
        for (child, parent) in plan.reparent {
            self.arena[child].parent = Some(parent);
        }
        for id in plan.free {
            self.arena.release(id);
            self.cell_count -= 1;
        }
    }

    pub(crate) fn apply_next(&mut self, plan: NextPlan) {
        for (id, next) in plan.links {
            self.arena[id].next = next;
        }
        for (id, depth) in plan.depths {
            self.arena[id].depth = depth;
        }
        let cz = self.arena.cz_mut(plan.czll);
        cz.chld_frst = plan.frst;
        cz.chld_last = plan.last;
    }

    /// Thread the per-costzone chains into one global preorder: entering
    /// a bottom cell continues through its contents (via `chld_last`),
    /// leaving it links straight to the next costzone cell.
    pub(crate) fn set_next_cz(&mut self) {
        let root = self.root;
        let mut last = root;
        self.next_cz_rec(root, &mut last);
        self.arena[last].next = None;
    }

    fn next_cz_rec(&mut self, cur: NodeId, last: &mut NodeId) {
        if *last != cur {
            self.arena[*last].next = Some(cur);
        }
        let cz = self.arena.cz(cur);
        if cz.at_bottom {
            *last = cz.chld_last.unwrap_or(cur);
        } else {
            *last = cur;
            let children: Vec<NodeId> = cz.cell.child.iter().flatten().copied().collect();
            for c in children {
                self.next_cz_rec(c, last);
            }
        }
    }

    /// Wire every cell's skip pointer: the next preorder node at depth
    /// less than or equal to the cell's own, i.e. the first node past its
    /// whole subtree. A walker that accepts a cell's multipole continues
    /// there in one step.
    ///
    /// One pass over the global next chain, keeping the last unresolved
    /// cell per depth: any node at depth d closes every pending entry of
    /// depth >= d.
    pub(crate) fn set_skip(&mut self) {
        let slots = self.config.max_depth as usize + 2;
        let mut pending: Vec<Option<NodeId>> = vec![None; slots];
        let mut cur = Some(self.root);
        while let Some(id) = cur {
            let depth = self.arena[id].depth as usize;
            for d in depth..slots {
                if let Some(skipee) = pending[d].take() {
                    self.arena.cell_mut(skipee).skip = Some(id);
                }
            }
            if !matches!(self.arena[id].kind, NodeKind::Part(_)) {
                self.arena.cell_mut(id).skip = None;
                pending[depth] = Some(id);
            }
            cur = self.arena[id].next;
        }
    }
}
