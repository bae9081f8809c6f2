mod common;

use costzone_core::{
    combine_top_moments, global_cost_extrema, global_particle_count, NullComm, SphParticles,
    TreeComm,
};
use glam::DVec3;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

/// Channel-backed transport between exactly two ranks, for exercising
/// the butterfly exchange in-process.
struct PairComm {
    rank: usize,
    moments_tx: Sender<Vec<f64>>,
    moments_rx: Receiver<Vec<f64>>,
    filled_tx: Sender<Vec<bool>>,
    filled_rx: Receiver<Vec<bool>>,
}

impl PairComm {
    fn pair() -> (PairComm, PairComm) {
        let (m01_tx, m01_rx) = channel();
        let (m10_tx, m10_rx) = channel();
        let (f01_tx, f01_rx) = channel();
        let (f10_tx, f10_rx) = channel();
        (
            PairComm {
                rank: 0,
                moments_tx: m01_tx,
                moments_rx: m10_rx,
                filled_tx: f01_tx,
                filled_rx: f10_rx,
            },
            PairComm {
                rank: 1,
                moments_tx: m10_tx,
                moments_rx: m01_rx,
                filled_tx: f10_tx,
                filled_rx: f01_rx,
            },
        )
    }
}

impl TreeComm for PairComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        2
    }

    fn send_moments(&mut self, to: usize, rows: &[f64]) {
        assert_ne!(to, self.rank);
        self.moments_tx.send(rows.to_vec()).unwrap();
    }

    fn recv_moments(&mut self, from: usize, rows: &mut [f64]) {
        assert_ne!(from, self.rank);
        rows.copy_from_slice(&self.moments_rx.recv().unwrap());
    }

    fn send_filled(&mut self, to: usize, filled: &[bool]) {
        assert_ne!(to, self.rank);
        self.filled_tx.send(filled.to_vec()).unwrap();
    }

    fn recv_filled(&mut self, from: usize, filled: &mut [bool]) {
        assert_ne!(from, self.rank);
        filled.copy_from_slice(&self.filled_rx.recv().unwrap());
    }

    fn sum_counts(&mut self, local: u64) -> u64 {
        local
    }

    fn min(&mut self, local: f64) -> f64 {
        local
    }

    fn max(&mut self, local: f64) -> f64 {
        local
    }

    fn barrier(&mut self) {}
}

#[test]
fn single_rank_reductions_are_local() {
    let mut parts = SphParticles::new(64);
    for i in 0..64 {
        parts.pos[i] = DVec3::new(
            (i % 4) as f64 * 0.2 + 0.15,
            ((i / 4) % 4) as f64 * 0.2 + 0.15,
            (i / 16) as f64 * 0.2 + 0.15,
        );
        parts.mass[i] = 1.0;
    }
    let mut tree = common::unit_tree(2, 4);
    parts.insert_all(&mut tree).unwrap();
    tree.update(0.8, 1.2).unwrap();

    let mut comm = NullComm;
    assert_eq!(global_particle_count(&tree, &mut comm), 64);

    let (lo, hi) = global_cost_extrema(&tree, &mut comm);
    assert!(lo > 0.0);
    assert!(hi >= lo);
    assert!(hi <= 1.0);

    // With one rank the combine is a no-op on the moments.
    let before = tree.root_moments();
    combine_top_moments(&mut tree, &mut comm);
    assert_eq!(tree.root_moments(), before);
}

#[test]
fn two_rank_butterfly_shares_the_moments() {
    let (comm0, comm1) = PairComm::pair();

    // Rank 0 owns two particles; rank 1 holds the same (single-cell)
    // costzone topology but no local mass.
    let owner = thread::spawn(move || {
        let mut comm = comm0;
        let mut parts = SphParticles::new(2);
        parts.pos[0] = DVec3::new(0.25, 0.5, 0.5);
        parts.pos[1] = DVec3::new(0.75, 0.5, 0.5);
        parts.mass = vec![1.0, 3.0];
        let mut tree = common::unit_tree(1, 1);
        parts.insert_all(&mut tree).unwrap();
        tree.update(0.8, 1.2).unwrap();

        combine_top_moments(&mut tree, &mut comm);
        tree.root_moments()
    });

    let ghost = thread::spawn(move || {
        let mut comm = comm1;
        let mut tree = common::unit_tree(1, 1);
        tree.update(0.8, 1.2).unwrap();

        combine_top_moments(&mut tree, &mut comm);
        tree.root_moments()
    });

    let mp_owner = owner.join().unwrap();
    let mp_ghost = ghost.join().unwrap();

    assert!((mp_owner.mass - 4.0).abs() < 1e-15);
    assert_eq!(mp_ghost.mass, mp_owner.mass);
    assert!((mp_ghost.com - mp_owner.com).length() < 1e-15);
    assert_eq!(mp_ghost.q11, mp_owner.q11);
}
