//! Multipole moments and the two-stage moment fold.
//!
//! Per round the moments are computed bottom-up twice: once per costzone
//! bottom cell (independent folds, planned in parallel) and once across
//! the costzone top after the barrier. Quadrupole and octupole tensors
//! are carried alongside the monopole; which of them the gravity walker
//! actually evaluates is chosen per call.

use glam::DVec3;

use crate::node::{NodeId, NodeKind};
use crate::tree::Tree;

/// Flattened length of one moment set: center of mass (3) + mass (1)
/// + quadrupole (6) + octupole (10).
pub const MOMENT_LEN: usize = 20;

/// Moments of a mass distribution about its center of mass.
///
/// The quadrupole is the traceless symmetric tensor (six independent
/// components), the octupole keeps the ten components the force
/// expansion consumes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Multipoles {
    pub com: DVec3,
    pub mass: f64,
    pub q11: f64,
    pub q22: f64,
    pub q33: f64,
    pub q12: f64,
    pub q13: f64,
    pub q23: f64,
    pub s11: f64,
    pub s22: f64,
    pub s33: f64,
    pub s12: f64,
    pub s21: f64,
    pub s13: f64,
    pub s31: f64,
    pub s23: f64,
    pub s32: f64,
    pub s123: f64,
}

impl Multipoles {
    /// A point mass: bare monopole, no higher moments.
    pub fn particle(pos: DVec3, mass: f64) -> Self {
        Self {
            com: pos,
            mass,
            ..Self::default()
        }
    }

    /// Fold `source`'s mass into the running center of mass.
    pub fn add_com(&mut self, source: &Multipoles) {
        let old_mass = self.mass;
        self.mass += source.mass;
        if self.mass > 0.0 {
            self.com = (self.com * old_mass + source.com * source.mass) / self.mass;
        }
    }

    /// Fold `source`'s higher moments into this set, shifted to this
    /// set's center of mass (parallel-axis theorem). `self.com` must
    /// already be final, i.e. every child was passed through `add_com`
    /// first.
    pub fn add_mp(&mut self, source: &Multipoles) {
        let r = source.com - self.com;
        let (rx, ry, rz) = (r.x, r.y, r.z);
        let rxrx = rx * rx;
        let ryry = ry * ry;
        let rzrz = rz * rz;
        let rr = rxrx + ryry + rzrz;
        let m = source.mass;

        self.q11 += (3.0 * rxrx - rr) * m + source.q11;
        self.q22 += (3.0 * ryry - rr) * m + source.q22;
        self.q33 += (3.0 * rzrz - rr) * m + source.q33;

        self.q12 += 3.0 * rx * ry * m + source.q12;
        self.q13 += 3.0 * rx * rz * m + source.q13;
        self.q23 += 3.0 * ry * rz * m + source.q23;

        self.s11 += (5.0 * rxrx - 3.0 * rr) * rx * m + 1.5 * source.q11 * rx
            - source.q12 * ry
            - source.q13 * rz
            + source.s11;
        self.s22 += (5.0 * ryry - 3.0 * rr) * ry * m + 1.5 * source.q22 * ry
            - source.q12 * rx
            - source.q23 * rz
            + source.s22;
        self.s33 += (5.0 * rzrz - 3.0 * rr) * rz * m + 1.5 * source.q33 * rz
            - source.q13 * rx
            - source.q23 * ry
            + source.s33;

        self.s12 += (15.0 * rxrx - 3.0 * rr) * ry * m + 2.5 * source.q11 * ry
            + 4.0 * source.q12 * rx
            - source.q22 * ry
            - source.q23 * rz
            + source.s12;
        self.s21 += (15.0 * ryry - 3.0 * rr) * rx * m + 2.5 * source.q22 * rx - source.q11 * rx
            + 4.0 * source.q12 * ry
            - source.q13 * rz
            + source.s21;

        self.s13 += (15.0 * rxrx - 3.0 * rr) * rz * m + 2.5 * source.q11 * rz
            + 4.0 * source.q13 * rx
            - source.q23 * ry
            - source.q33 * rz
            + source.s13;
        self.s31 += (15.0 * rzrz - 3.0 * rr) * rx * m + 2.5 * source.q33 * rx - source.q11 * rx
            - source.q12 * ry
            + 4.0 * source.q13 * rz
            + source.s31;

        self.s23 += (15.0 * ryry - 3.0 * rr) * rz * m + 2.5 * source.q22 * rz - source.q13 * rx
            + 4.0 * source.q23 * ry
            - source.q33 * rz
            + source.s23;
        self.s32 += (15.0 * rzrz - 3.0 * rr) * ry * m + 2.5 * source.q33 * ry - source.q12 * rx
            - source.q22 * ry
            + 4.0 * source.q23 * rz
            + source.s32;

        self.s123 += 15.0 * rx * ry * rz * m
            + 25.0 * (source.q12 * rz + source.q13 * ry + source.q23 * rx)
            + source.s123;
    }

    /// Flatten to a wire row for the cross-process moment exchange.
    pub fn to_row(&self) -> [f64; MOMENT_LEN] {
        [
            self.com.x, self.com.y, self.com.z, self.mass, self.q11, self.q22, self.q33,
            self.q12, self.q13, self.q23, self.s11, self.s22, self.s33, self.s12, self.s21,
            self.s13, self.s31, self.s23, self.s32, self.s123,
        ]
    }

    pub fn from_row(row: &[f64]) -> Self {
        Self {
            com: DVec3::new(row[0], row[1], row[2]),
            mass: row[3],
            q11: row[4],
            q22: row[5],
            q33: row[6],
            q12: row[7],
            q13: row[8],
            q23: row[9],
            s11: row[10],
            s22: row[11],
            s33: row[12],
            s12: row[13],
            s21: row[14],
            s13: row[15],
            s31: row[16],
            s23: row[17],
            s32: row[18],
            s123: row[19],
        }
    }
}

/// Fresh moments for every cell of one costzone bottom subtree, computed
/// read-only and committed at the phase barrier.
pub(crate) struct MomentPlan {
    pub values: Vec<(NodeId, Multipoles)>,
}

pub(crate) fn plan_moments(tree: &Tree, czll: NodeId) -> MomentPlan {
    let mut plan = MomentPlan { values: Vec::new() };
    fold(tree, czll, &mut plan);
    plan
}

/// Postorder fold. Returns the subtree's moments and records them for
/// every cell on the way up, so parents combine fresh child values.
fn fold(tree: &Tree, id: NodeId, plan: &mut MomentPlan) -> Multipoles {
    let node = &tree.arena[id];
    match &node.kind {
        NodeKind::Part(p) => Multipoles::particle(p.pos, p.mass),
        _ => {
            let cell = tree.arena.cell(id);
            let mut children = Vec::with_capacity(8);
            for slot in cell.child.iter().flatten() {
                children.push(fold(tree, *slot, plan));
            }
            let mut mp = Multipoles::default();
            for child in &children {
                mp.add_com(child);
            }
            if mp.mass > 0.0 {
                for child in &children {
                    mp.add_mp(child);
                }
            }
            plan.values.push((id, mp));
            mp
        }
    }
}

impl Tree {
    pub(crate) fn apply_moments(&mut self, plan: MomentPlan) {
        for (id, mp) in plan.values {
            self.arena.cell_mut(id).mp = mp;
        }
    }

    /// Fold the already-computed bottom-cell moments up through the
    /// costzone interior. Runs once, single-threaded, after the per-cell
    /// folds have committed.
    pub(crate) fn calc_multipoles_cz(&mut self) {
        let mut values = Vec::new();
        fold_cz(self, self.root, &mut values);
        for (id, mp) in values {
            self.arena.cell_mut(id).mp = mp;
        }
    }
}

fn fold_cz(tree: &Tree, id: NodeId, out: &mut Vec<(NodeId, Multipoles)>) -> Multipoles {
    let cz = tree.arena.cz(id);
    if cz.at_bottom {
        // Bottom moments are fresh from the parallel phase.
        return cz.cell.mp;
    }
    let mut children = Vec::with_capacity(8);
    for slot in cz.cell.child.iter().flatten() {
        children.push(fold_cz(tree, *slot, out));
    }
    let mut mp = Multipoles::default();
    for child in &children {
        mp.add_com(child);
    }
    if mp.mass > 0.0 {
        for child in &children {
            mp.add_mp(child);
        }
    }
    out.push((id, mp));
    mp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn com_of_two_point_masses() {
        let mut mp = Multipoles::default();
        mp.add_com(&Multipoles::particle(DVec3::new(0.0, 0.0, 0.0), 1.0));
        mp.add_com(&Multipoles::particle(DVec3::new(1.0, 0.0, 0.0), 3.0));
        assert_eq!(mp.mass, 4.0);
        assert!((mp.com.x - 0.75).abs() < 1e-15);
    }

    #[test]
    fn quadrupole_of_symmetric_pair_is_traceless() {
        let a = Multipoles::particle(DVec3::new(-1.0, 0.0, 0.0), 1.0);
        let b = Multipoles::particle(DVec3::new(1.0, 0.0, 0.0), 1.0);
        let mut mp = Multipoles::default();
        mp.add_com(&a);
        mp.add_com(&b);
        mp.add_mp(&a);
        mp.add_mp(&b);
        // q = m (3 r r^T - r^2 I) summed: diag (4, -2, -2), trace 0.
        assert!((mp.q11 - 4.0).abs() < 1e-14);
        assert!((mp.q22 + 2.0).abs() < 1e-14);
        assert!((mp.q33 + 2.0).abs() < 1e-14);
        assert!((mp.q11 + mp.q22 + mp.q33).abs() < 1e-14);
        // Mirror symmetry kills the octupole.
        assert!(mp.s11.abs() < 1e-14 && mp.s123.abs() < 1e-14);
    }

    #[test]
    fn row_round_trip() {
        let mut mp = Multipoles::particle(DVec3::new(0.5, -0.25, 2.0), 3.5);
        mp.q12 = 0.125;
        mp.s123 = -9.0;
        assert_eq!(Multipoles::from_row(&mp.to_row()), mp);
    }
}
