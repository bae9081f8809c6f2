mod common;

use costzone_core::{check, dump};
use glam::DVec3;

#[test]
fn emptied_subtrees_are_reclaimed() {
    let mut parts = common::uniform_cube(100, 0.05, 17);
    let mut tree = common::unit_tree(1, 1);
    parts.insert_all(&mut tree).unwrap();
    tree.update(0.8, 1.2).unwrap();
    assert!(tree.cell_node_count() > 1);

    for i in 1..100 {
        tree.remove(parts.handles[i].unwrap()).unwrap();
    }
    tree.update(0.8, 1.2).unwrap();
    check::verify(&tree).unwrap();

    assert_eq!(tree.particle_count(), 1);
    // One particle under the root: every interior cell was pruned.
    assert_eq!(tree.cell_node_count(), 1);
}

#[test]
fn single_child_chains_collapse() {
    // Two particles a micron apart share a long octant chain; after
    // pruning only the deepest cell separating them remains.
    let mut parts = costzone_core::SphParticles::new(2);
    parts.pos[0] = DVec3::new(0.1, 0.1, 0.1);
    parts.pos[1] = DVec3::new(0.1 + 1e-6, 0.1, 0.1);
    parts.mass = vec![1.0, 1.0];

    let mut tree = common::unit_tree(1, 1);
    parts.insert_all(&mut tree).unwrap();
    tree.update(0.8, 1.2).unwrap();
    check::verify(&tree).unwrap();

    assert_eq!(
        tree.cell_node_count(),
        2,
        "root plus exactly one separating cell should survive"
    );

    // Both particles are still reachable.
    let hood = tree.neighbours(parts.handles[0].unwrap(), 1e-3).unwrap();
    assert_eq!(hood.len(), 2);
}

#[test]
fn dumps_render_the_topology() {
    let mut parts = common::uniform_cube(20, 0.1, 23);
    let mut tree = common::unit_tree(1, 2);
    parts.insert_all(&mut tree).unwrap();
    tree.update(0.8, 1.2).unwrap();

    let dot = dump::dot(&tree);
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("shape=circle"), "particles missing from dot dump");
    assert!(dot.contains("shape=box"), "cells missing from dot dump");

    let table = dump::table(&tree);
    // Header plus one line per node, threaded in preorder.
    assert_eq!(
        table.lines().count() as u64,
        1 + tree.particle_count() + tree.cell_node_count()
    );
    assert!(table.lines().nth(1).is_some_and(|l| l.starts_with("Z")));

    let chain = dump::chain(&tree);
    assert_eq!(
        chain.lines().count() as u64,
        tree.particle_count() + tree.cell_node_count()
    );
    // The root heads the chain; cells expose their skip wiring.
    assert!(chain.starts_with("C0"));
    assert!(chain.lines().all(|l| l.contains("next ->")));
    assert!(chain
        .lines()
        .filter(|l| l.starts_with('C'))
        .all(|l| l.contains("skip ->")));
    // Exactly one chain end.
    assert_eq!(chain.matches("next -> -").count(), 1);
}
