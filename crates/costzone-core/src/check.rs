//! Structural invariant verification.
//!
//! Debug builds run this at the end of every `update()`; tests call it
//! directly. Release builds skip it — a violation there is a programmer
//! error with undefined consequences.

use crate::geometry;
use crate::node::{NodeId, NodeKind};
use crate::tree::Tree;

/// Check every structural invariant of the tree; the report names the
/// first violation found.
pub fn verify(tree: &Tree) -> Result<(), String> {
    let preorder = preorder(tree);
    check_topology(tree, &preorder)?;
    check_moments(tree, &preorder)?;
    check_chain(tree, &preorder)?;
    check_skips(tree, &preorder)?;
    check_costs(tree)?;
    Ok(())
}

fn preorder(tree: &Tree) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut stack = vec![tree.root_id()];
    while let Some(id) = stack.pop() {
        order.push(id);
        if !tree.node(id).is_particle() {
            let cell = tree.node_cell(id);
            for slot in cell.child.iter().rev() {
                if let Some(c) = *slot {
                    stack.push(c);
                }
            }
        }
    }
    order
}

/// Octant containment and parent links.
fn check_topology(tree: &Tree, preorder: &[NodeId]) -> Result<(), String> {
    for &id in preorder {
        if tree.node(id).is_particle() {
            continue;
        }
        let cell = tree.node_cell(id);
        for (oct, slot) in cell.child.iter().enumerate() {
            let Some(child) = *slot else { continue };
            let node = tree.node(child);
            if node.parent != Some(id) {
                return Err(format!("child {child:?} has a broken parent link"));
            }
            if node.depth != tree.node(id).depth + 1 {
                return Err(format!("child {child:?} carries a stale depth"));
            }
            let probe = match &node.kind {
                NodeKind::Part(p) => p.pos,
                _ => tree.node_cell(child).center,
            };
            if !geometry::point_inside(probe, cell.center, cell.size) {
                return Err(format!("child {child:?} lies outside its parent's box"));
            }
            if geometry::octant(cell.center, probe) != oct {
                return Err(format!("child {child:?} sits in the wrong octant slot"));
            }
        }
    }
    Ok(())
}

/// Mass and center-of-mass consistency for every cell.
fn check_moments(tree: &Tree, preorder: &[NodeId]) -> Result<(), String> {
    for &id in preorder {
        if tree.node(id).is_particle() {
            continue;
        }
        let cell = tree.node_cell(id);
        let mut mass = 0.0;
        let mut abs_mass = 0.0;
        let mut weighted = glam::DVec3::ZERO;
        for slot in cell.child.iter().flatten() {
            let (m, com) = match &tree.node(*slot).kind {
                NodeKind::Part(p) => (p.mass, p.pos),
                _ => {
                    let c = tree.node_cell(*slot);
                    (c.mp.mass, c.mp.com)
                }
            };
            mass += m;
            abs_mass += m.abs();
            weighted += com * m;
        }
        let tol = 1e-12 * abs_mass.max(1e-300);
        if (cell.mp.mass - mass).abs() > tol {
            return Err(format!(
                "cell {id:?}: mass {} does not match child sum {mass}",
                cell.mp.mass
            ));
        }
        if mass > 0.0 && (cell.mp.com * mass - weighted).length() > 1e-9 * abs_mass {
            return Err(format!("cell {id:?}: center of mass inconsistent"));
        }
    }
    Ok(())
}

/// The next chain must equal the preorder traversal.
fn check_chain(tree: &Tree, preorder: &[NodeId]) -> Result<(), String> {
    let mut cur = Some(tree.root_id());
    for (i, &expect) in preorder.iter().enumerate() {
        match cur {
            Some(id) if id == expect => cur = tree.node(id).next,
            Some(id) => {
                return Err(format!(
                    "next chain diverges from preorder at position {i}: {id:?} vs {expect:?}"
                ))
            }
            None => return Err(format!("next chain ends early at position {i}")),
        }
    }
    if let Some(id) = cur {
        return Err(format!("next chain continues past the last node: {id:?}"));
    }
    Ok(())
}

/// Every cell's skip must be the first preorder node past its subtree.
fn check_skips(tree: &Tree, preorder: &[NodeId]) -> Result<(), String> {
    for (i, &id) in preorder.iter().enumerate() {
        if tree.node(id).is_particle() {
            continue;
        }
        let span = subtree_size(tree, id);
        let expect = preorder.get(i + span).copied();
        if tree.node_cell(id).skip != expect {
            return Err(format!(
                "cell {id:?}: skip {:?}, expected {expect:?}",
                tree.node_cell(id).skip
            ));
        }
    }
    Ok(())
}

fn subtree_size(tree: &Tree, id: NodeId) -> usize {
    let mut count = 0;
    let mut stack = vec![id];
    while let Some(n) = stack.pop() {
        count += 1;
        if !tree.node(n).is_particle() {
            stack.extend(tree.node_cell(n).child.iter().flatten());
        }
    }
    count
}

/// Costzone bookkeeping: particle counts and cost sums per costzone
/// cell, the bottom set matching the tree's list, no orphans left over.
fn check_costs(tree: &Tree) -> Result<(), String> {
    let bottoms = tree.cz_bottom_ids();
    let mut stack = vec![tree.root_id()];
    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        if !node.is_cz() {
            continue;
        }
        let cz = tree.node_cz(id);
        if !cz.orphans.is_empty() {
            return Err(format!("costzone cell {id:?} still holds orphans"));
        }
        if cz.at_bottom != bottoms.contains(&id) {
            return Err(format!("costzone cell {id:?} disagrees with the bottom list"));
        }
        let (cost, parts) = count_subtree(tree, id);
        if (cz.abs_cost - cost).abs() > 1e-9 * cost.abs().max(1.0) {
            return Err(format!(
                "costzone cell {id:?}: absCost {} vs recount {cost}",
                cz.abs_cost
            ));
        }
        if cz.no_parts != parts {
            return Err(format!(
                "costzone cell {id:?}: noParts {} vs recount {parts}",
                cz.no_parts
            ));
        }
        if !cz.at_bottom {
            let cell = tree.node_cell(id);
            let czll_children = cell
                .child
                .iter()
                .flatten()
                .filter(|c| tree.node(**c).is_cz())
                .count();
            if czll_children != 8 {
                return Err(format!(
                    "costzone interior {id:?} has {czll_children} costzone children"
                ));
            }
            stack.extend(cell.child.iter().flatten());
        }
    }
    Ok(())
}

/// Check the rebalancer's contract for the band that was last applied:
/// every bottom cell sits inside the relative cost band, or is a
/// terminal case the builder is allowed to leave alone — a (near-)empty
/// cell, a depth-limited cell, or an under-band cell whose sibling
/// group may not merge (a sibling is in band, or the merged parent
/// would overshoot).
pub fn verify_cost_band(tree: &Tree, cmark_low: f64, cmark_high: f64) -> Result<(), String> {
    let norm = 1.0 / (tree.config.threads * tree.config.cells_per_thread) as f64;
    let cost_min = cmark_low * norm;
    let cost_max = cmark_high * norm;
    let total = tree.node_cz(tree.root_id()).abs_cost;
    if total <= 0.0 {
        return Ok(());
    }
    // Interior costzone cells carry no fresh rel_cost, so shares are
    // recomputed from abs_cost throughout.
    let share = |id: NodeId| tree.node_cz(id).abs_cost / total;

    for id in tree.cz_bottom_ids() {
        let rel = share(id);
        if (cost_min..=cost_max).contains(&rel) || tree.node_cz(id).no_parts <= 1 {
            continue;
        }
        if rel > cost_max {
            if tree.node(id).depth + 1 >= tree.config.max_depth {
                continue;
            }
            return Err(format!(
                "bottom cell {id:?} above the band (rel {rel}) with room to split"
            ));
        }
        // Under the band: merging must be legitimately refused.
        let Some(parent) = tree.node(id).parent else { continue };
        let merged_overshoots = share(parent) > cost_max;
        let sibling_blocks = tree
            .node_cell(parent)
            .child
            .iter()
            .flatten()
            .any(|&sib| !tree.node_cz(sib).at_bottom || share(sib) >= cost_min);
        if !merged_overshoots && !sibling_blocks {
            return Err(format!(
                "bottom cell {id:?} below the band (rel {rel}) but its group could merge"
            ));
        }
    }
    Ok(())
}

fn count_subtree(tree: &Tree, id: NodeId) -> (f64, u64) {
    let mut cost = 0.0;
    let mut parts = 0;
    let mut stack = vec![id];
    while let Some(n) = stack.pop() {
        match &tree.node(n).kind {
            NodeKind::Part(p) => {
                cost += p.cost;
                parts += 1;
            }
            _ => stack.extend(tree.node_cell(n).child.iter().flatten()),
        }
    }
    (cost, parts)
}
