//! Diagnostic dumps of the tree topology.

use std::fmt::Write;

use crate::node::NodeKind;
use crate::tree::Tree;
use crate::walker::Walker;

/// Graphviz dot rendering: particles as circles, cells as boxes,
/// costzone cells colored (interior blue, bottom red).
pub fn dot(tree: &Tree) -> String {
    let mut out = String::from("digraph tree {\n");
    let mut stack = vec![tree.root_id()];
    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        match &node.kind {
            NodeKind::Part(_) => {
                let _ = writeln!(out, "  P{} [shape=circle,color=green];", node.ident);
            }
            _ => {
                let color = if node.is_cz() {
                    if node.at_bottom() {
                        "red"
                    } else {
                        "blue"
                    }
                } else {
                    "black"
                };
                let _ = writeln!(out, "  C{} [shape=box,color={color}];", -node.ident);
                let cell = tree.node_cell(id);
                for child in cell.child.iter().flatten() {
                    let c = tree.node(*child);
                    let tag = if c.is_particle() {
                        format!("P{}", c.ident)
                    } else {
                        format!("C{}", -c.ident)
                    };
                    let _ = writeln!(out, "  C{} -> {tag};", -node.ident);
                    stack.push(*child);
                }
            }
        }
    }
    out.push_str("}\n");
    out
}

/// Pointer wiring along the preorder chain: one line per node with its
/// ident, depth, `next` target and (for cells) `skip` target. The view
/// that makes a broken chain or a mis-aimed skip jump out.
pub fn chain(tree: &Tree) -> String {
    let mut out = String::new();
    let name = |id| {
        let n = tree.node(id);
        if n.is_particle() {
            format!("P{}", n.ident)
        } else {
            format!("C{}", -n.ident)
        }
    };
    let mut walker = Walker::new(tree.arena_ref(), tree.root_id(), tree.root_id());
    loop {
        let node = walker.node();
        let next = node.next.map_or_else(|| "-".into(), name);
        let skip = if node.is_particle() {
            String::new()
        } else {
            let target = tree.node_cell(walker.cur).skip;
            format!("  skip -> {}", target.map_or_else(|| "-".into(), name))
        };
        let _ = writeln!(
            out,
            "{:<8} d{:<3} next -> {next}{skip}",
            name(walker.cur),
            node.depth,
        );
        if !walker.go_next() {
            break;
        }
    }
    out
}

/// Fixed-width node table, one line per node in preorder, following the
/// `next` chain: flags, ident, depth, geometry and the monopole.
pub fn table(tree: &Tree) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "#flags  ident depth  x              y              z              size           mass"
    );
    let mut walker = Walker::new(tree.arena_ref(), tree.root_id(), tree.root_id());
    loop {
        let node = walker.node();
        match &node.kind {
            NodeKind::Part(p) => {
                let _ = writeln!(
                    out,
                    "P{}     {:6} {:5}  {:14.6e} {:14.6e} {:14.6e} {:14.6e} {:14.6e}",
                    if p.settled { "S" } else { "O" },
                    node.ident,
                    node.depth,
                    p.pos.x,
                    p.pos.y,
                    p.pos.z,
                    0.0,
                    p.mass,
                );
            }
            _ => {
                let cell = tree.node_cell(walker.cur);
                let flag = if node.is_cz() {
                    if node.at_bottom() {
                        "ZB"
                    } else {
                        "ZI"
                    }
                } else {
                    "C "
                };
                let _ = writeln!(
                    out,
                    "{flag}    {:6} {:5}  {:14.6e} {:14.6e} {:14.6e} {:14.6e} {:14.6e}",
                    node.ident,
                    node.depth,
                    cell.center.x,
                    cell.center.y,
                    cell.center.z,
                    cell.size,
                    cell.mp.mass,
                );
            }
        }
        if !walker.go_next() {
            break;
        }
    }
    out
}
