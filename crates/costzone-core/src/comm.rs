//! Abstract cross-process barrier for multi-rank runs.
//!
//! The tree itself is process-local; when the domain is spread over
//! several ranks, every rank owns the particles of its costzone cells
//! and the bottom-cell moments have to be merged before the top fold.
//! The exchange is a log2(N) butterfly: pairs sum up towards rank N-1,
//! then the combined rows travel back down the same edges in reverse.

use std::collections::VecDeque;

use crate::multipole::{Multipoles, MOMENT_LEN};
use crate::tree::Tree;

/// Transport the tree needs from a distributed runtime. All calls are
/// collective or paired; implementations decide blocking behaviour.
pub trait TreeComm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn send_moments(&mut self, to: usize, rows: &[f64]);
    fn recv_moments(&mut self, from: usize, rows: &mut [f64]);
    fn send_filled(&mut self, to: usize, filled: &[bool]);
    fn recv_filled(&mut self, from: usize, filled: &mut [bool]);
    fn sum_counts(&mut self, local: u64) -> u64;
    fn min(&mut self, local: f64) -> f64;
    fn max(&mut self, local: f64) -> f64;
    fn barrier(&mut self);
}

/// Single-process stand-in: rank 0 of 1, every collective is local.
pub struct NullComm;

impl TreeComm for NullComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send_moments(&mut self, _to: usize, _rows: &[f64]) {
        unreachable!("single rank never sends")
    }

    fn recv_moments(&mut self, _from: usize, _rows: &mut [f64]) {
        unreachable!("single rank never receives")
    }

    fn send_filled(&mut self, _to: usize, _filled: &[bool]) {
        unreachable!("single rank never sends")
    }

    fn recv_filled(&mut self, _from: usize, _filled: &mut [bool]) {
        unreachable!("single rank never receives")
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

/// Who this rank talks to, in order, during the two butterfly phases.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExchangeSchedule {
    /// Sum-up phase: ranks to receive from, then ranks to send to
    /// (a rank sends at most once per phase).
    pub sum_up_recv: VecDeque<usize>,
    pub sum_up_send: VecDeque<usize>,
    /// Distribute phase: stacks, drained in reverse pairing order.
    pub distr_recv: Vec<usize>,
    pub distr_send: Vec<usize>,
}

/// Pairing rounds: in round k, ranks 2^k apart pair off from the top;
/// the lower rank of each pair sends and drops out.
pub fn exchange_schedule(rank: usize, size: usize) -> ExchangeSchedule {
    let mut schedule = ExchangeSchedule::default();
    let mut remaining = size;
    let mut round = 0;
    while remaining > 1 {
        let pairs = remaining / 2;
        remaining -= pairs;
        let step = 1usize << round;
        for i in (0..2 * pairs).step_by(2) {
            let send_rank = (size - 1) - step * (i + 1);
            let recv_rank = (size - 1) - step * i;
            if rank == send_rank {
                schedule.sum_up_send.push_back(recv_rank);
                schedule.distr_recv.push(recv_rank);
            } else if rank == recv_rank {
                schedule.sum_up_recv.push_back(send_rank);
                schedule.distr_send.push(send_rank);
            }
        }
        round += 1;
    }
    schedule
}

/// Merge the bottom-cell moments across ranks, then redo the costzone
/// top fold. Every rank must hold the identical costzone topology; a
/// bottom cell's row is "filled" on the rank owning its particles.
pub fn combine_top_moments(tree: &mut Tree, comm: &mut impl TreeComm) {
    if comm.size() <= 1 {
        return;
    }
    let schedule = exchange_schedule(comm.rank(), comm.size());
    let bottoms = tree.cz_bottom_ids();
    let rows = bottoms.len();

    let mut local = vec![0.0; rows * MOMENT_LEN];
    let mut local_filled = vec![false; rows];
    for (i, &id) in bottoms.iter().enumerate() {
        let mp = tree.cell_moments(id);
        local[i * MOMENT_LEN..(i + 1) * MOMENT_LEN].copy_from_slice(&mp.to_row());
        local_filled[i] = mp.mass > 0.0;
    }

    let mut remote = vec![0.0; rows * MOMENT_LEN];
    let mut remote_filled = vec![false; rows];

    // Sum up: absorb every partner's filled rows, then pass ours on.
    let mut sched = schedule;
    while let Some(from) = sched.sum_up_recv.pop_front() {
        comm.recv_filled(from, &mut remote_filled);
        comm.recv_moments(from, &mut remote);
        for i in 0..rows {
            if remote_filled[i] {
                local[i * MOMENT_LEN..(i + 1) * MOMENT_LEN]
                    .copy_from_slice(&remote[i * MOMENT_LEN..(i + 1) * MOMENT_LEN]);
                local_filled[i] = true;
            }
        }
    }
    while let Some(to) = sched.sum_up_send.pop_front() {
        comm.send_filled(to, &local_filled);
        comm.send_moments(to, &local);
    }

    // Distribute the combined result back down the pairing tree.
    while let Some(from) = sched.distr_recv.pop() {
        comm.recv_filled(from, &mut local_filled);
        comm.recv_moments(from, &mut local);
    }
    while let Some(to) = sched.distr_send.pop() {
        comm.send_filled(to, &local_filled);
        comm.send_moments(to, &local);
    }

    for (i, &id) in bottoms.iter().enumerate() {
        let mp = Multipoles::from_row(&local[i * MOMENT_LEN..(i + 1) * MOMENT_LEN]);
        tree.set_cell_moments(id, mp);
    }
    tree.calc_multipoles_cz();
    comm.barrier();
}

/// Particle count across every rank.
pub fn global_particle_count(tree: &Tree, comm: &mut impl TreeComm) -> u64 {
    comm.sum_counts(tree.particle_count())
}

/// Lightest and heaviest bottom-cell cost share anywhere in the run —
/// what a driver watches to decide whether the decomposition is still
/// balanced enough or a tighter band is worth the rebuild.
pub fn global_cost_extrema(tree: &Tree, comm: &mut impl TreeComm) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = 0.0_f64;
    for cell in tree.bottom_cells() {
        lo = lo.min(cell.rel_cost);
        hi = hi.max(cell.rel_cost);
    }
    (comm.min(lo), comm.max(hi))
}
