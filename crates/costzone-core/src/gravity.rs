//! Gravitational acceleration by a single chain walk.
//!
//! The walker follows the global preorder `next` chain. Particles
//! contribute direct (softened) pair forces; a cell whose multipole
//! acceptance criterion holds contributes its expansion and the walk
//! jumps its whole subtree through the `skip` pointer.

use std::sync::atomic::{AtomicBool, Ordering};

use glam::DVec3;

use crate::error::TreeError;
use crate::node::{NodeKind, ParticleHandle};
use crate::par;
use crate::tree::Tree;

/// Pair-force softening.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Softening {
    /// Bare 1/r^2: only safe when the caller guarantees separation.
    None,
    /// Plummer softening with the given epsilon.
    Plummer(f64),
    /// Cubic-spline softened Green's function (Hernquist & Katz 1989),
    /// using the partner particle's smoothing length.
    Spline,
}

/// Highest multipole term the cell force evaluates. Moments up to
/// octupole are always carried; this only selects what a walk consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MultipoleOrder {
    Monopole,
    Quadrupole,
    Octupole,
}

#[derive(Clone, Copy, Debug)]
pub struct GravityParams {
    /// Opening angle. Smaller is more accurate; 0 degenerates to a
    /// direct sum. Values above 1 are pathological and only warned about.
    pub theta: f64,
    pub grav_const: f64,
    pub softening: Softening,
    pub order: MultipoleOrder,
}

impl Default for GravityParams {
    fn default() -> Self {
        Self {
            theta: 0.6,
            grav_const: 1.0,
            softening: Softening::Plummer(0.0),
            order: MultipoleOrder::Octupole,
        }
    }
}

/// Interaction counts of one gravity walk, for load metering and MAC
/// tuning. The per-particle total is a natural choice for the costzone
/// cost feedback.
#[derive(Clone, Copy, Debug, Default)]
pub struct GravityStats {
    pub particle_terms: u64,
    pub cell_terms: u64,
}

static THETA_WARNED: AtomicBool = AtomicBool::new(false);

impl Tree {
    /// Acceleration on the particle behind `handle`.
    ///
    /// Read-only: after an `update()` this may run concurrently for
    /// distinct targets. The target's own proxy is recognised by node id
    /// and skipped.
    pub fn gravity(
        &self,
        handle: ParticleHandle,
        params: &GravityParams,
    ) -> Result<DVec3, TreeError> {
        self.gravity_with_stats(handle, params).map(|(acc, _)| acc)
    }

    /// Accelerations for a whole batch of targets, walked in parallel
    /// (the walks are read-only and independent). Errors are collected
    /// at the barrier and the first one is surfaced; accelerations of
    /// the other targets are unaffected by a failing one.
    pub fn gravity_all(
        &self,
        handles: &[ParticleHandle],
        params: &GravityParams,
    ) -> Result<Vec<DVec3>, TreeError> {
        let results = par::map_vec(handles, |&h| self.gravity_with_stats(h, params));
        let mut accels = Vec::with_capacity(handles.len());
        for result in results {
            accels.push(result?.0);
        }
        Ok(accels)
    }

    /// Like [`Tree::gravity`], also reporting how many direct and
    /// multipole terms the walk evaluated.
    pub fn gravity_with_stats(
        &self,
        handle: ParticleHandle,
        params: &GravityParams,
    ) -> Result<(DVec3, GravityStats), TreeError> {
        if params.theta < 0.0 {
            return Err(TreeError::InvalidTheta { theta: params.theta });
        }
        if params.theta > 1.0 && !THETA_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!(theta = params.theta, "theta > 1 leads to self-acceleration");
        }
        let target = self.proxy(handle)?;
        let pos = self.arena.part(target).pos;

        let mut acc = DVec3::ZERO;
        let mut stats = GravityStats::default();
        let mut cur = Some(self.root);
        while let Some(id) = cur {
            let node = &self.arena[id];
            match &node.kind {
                NodeKind::Part(p) => {
                    if id != target {
                        acc += pair_accel(pos, p.pos, p.mass, p.h, params.softening);
                        stats.particle_terms += 1;
                    }
                    cur = node.next;
                }
                _ => {
                    let cell = self.arena.cell(id);
                    if cell.mp.mass <= 0.0 {
                        // Nothing below; hop the subtree if we can.
                        cur = cell.skip.or(node.next);
                    } else {
                        let r = pos - cell.mp.com;
                        let dist = r.length();
                        if cell.size < params.theta * dist {
                            cell_accel(&mut acc, r, dist, &cell.mp, params.order);
                            stats.cell_terms += 1;
                            cur = cell.skip;
                        } else {
                            cur = node.next;
                        }
                    }
                }
            }
        }
        Ok((acc * params.grav_const, stats))
    }
}

/// Direct particle-particle term: a -= m * r / |r|^3, softened.
#[inline]
fn pair_accel(pos: DVec3, partner: DVec3, mass: f64, partner_h: f64, soft: Softening) -> DVec3 {
    let r = pos - partner;
    let r2 = r.length_squared();
    if r2 == 0.0 {
        return DVec3::ZERO;
    }
    let m_over_r3 = match soft {
        Softening::None => mass / (r2 * r2.sqrt()),
        Softening::Plummer(eps) => {
            let s = r2 + eps * eps;
            mass / (s * s.sqrt())
        }
        Softening::Spline => mass * spline_inv_r3(r2.sqrt(), partner_h),
    };
    -m_over_r3 * r
}

/// Spline-softened 1/r^3 for the B-spline kernel, after Hernquist & Katz
/// 1989, piecewise in u = r/h.
fn spline_inv_r3(r: f64, h: f64) -> f64 {
    if h <= 0.0 {
        return 1.0 / (r * r * r);
    }
    let u = r / h;
    if u >= 2.0 {
        1.0 / (r * r * r)
    } else if u > 1.0 {
        let u2 = u * u;
        let u3 = u2 * u;
        (1.0 / (r * r * r))
            * (-1.0 / 15.0 + (8.0 / 3.0) * u3 - 3.0 * u2 * u2 + (6.0 / 5.0) * u2 * u3
                - (1.0 / 6.0) * u3 * u3)
    } else {
        let h3 = h * h * h;
        (1.0 / h3) * (4.0 / 3.0 - (6.0 / 5.0) * u * u + 0.5 * u * u * u)
    }
}

/// Cell contribution: monopole, then quadrupole and octupole corrections
/// as requested. `r` points from the cell's center of mass to the target;
/// inverse powers of the distance are built up once and reused.
fn cell_accel(
    acc: &mut DVec3,
    r: DVec3,
    dist: f64,
    mp: &crate::multipole::Multipoles,
    order: MultipoleOrder,
) {
    let (rx, ry, rz) = (r.x, r.y, r.z);
    let r_inv_pow3 = 1.0 / (dist * dist * dist);

    *acc -= r_inv_pow3 * mp.mass * r;

    if order < MultipoleOrder::Quadrupole {
        return;
    }
    let r_inv_pow5 = r_inv_pow3 / (dist * dist);
    let r_inv_pow7 = r_inv_pow5 / (dist * dist);

    let q1jrj = mp.q11 * rx + mp.q12 * ry + mp.q13 * rz;
    let q2jrj = mp.q12 * rx + mp.q22 * ry + mp.q23 * rz;
    let q3jrj = mp.q13 * rx + mp.q23 * ry + mp.q33 * rz;
    let qijrirj = mp.q11 * rx * rx
        + mp.q22 * ry * ry
        + mp.q33 * rz * rz
        + 2.0 * mp.q12 * rx * ry
        + 2.0 * mp.q13 * rx * rz
        + 2.0 * mp.q23 * ry * rz;

    acc.x += r_inv_pow5 * q1jrj - r_inv_pow7 * 2.5 * qijrirj * rx;
    acc.y += r_inv_pow5 * q2jrj - r_inv_pow7 * 2.5 * qijrirj * ry;
    acc.z += r_inv_pow5 * q3jrj - r_inv_pow7 * 2.5 * qijrirj * rz;

    if order < MultipoleOrder::Octupole {
        return;
    }
    let r_inv_pow9 = r_inv_pow7 / (dist * dist);

    let s1jrj = mp.s11 * rx + mp.s12 * ry + mp.s13 * rz;
    let s2jrj = mp.s21 * rx + mp.s22 * ry + mp.s23 * rz;
    let s3jrj = mp.s31 * rx + mp.s32 * ry + mp.s33 * rz;

    let si1riri = mp.s11 * rx * rx + mp.s21 * ry * ry + mp.s31 * rz * rz;
    let si2riri = mp.s12 * rx * rx + mp.s22 * ry * ry + mp.s32 * rz * rz;
    let si3riri = mp.s13 * rx * rx + mp.s23 * ry * ry + mp.s33 * rz * rz;

    let sijririrj = si1riri * rx + si2riri * ry + si3riri * rz;
    let rxryrz = rx * ry * rz;

    acc.x += r_inv_pow7 * (s1jrj * rx + 0.5 * si1riri + 0.5 * mp.s123 * ry * rz)
        - 3.5 * r_inv_pow9 * (sijririrj * rx + mp.s123 * rxryrz * rx);
    acc.y += r_inv_pow7 * (s2jrj * ry + 0.5 * si2riri + 0.5 * mp.s123 * rz * rx)
        - 3.5 * r_inv_pow9 * (sijririrj * ry + mp.s123 * rxryrz * ry);
    acc.z += r_inv_pow7 * (s3jrj * rz + 0.5 * si3riri + 0.5 * mp.s123 * rx * ry)
        - 3.5 * r_inv_pow9 * (sijririrj * rz + mp.s123 * rxryrz * rz);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spline_softening_matches_newtonian_outside_2h() {
        let exact = 1.0 / (8.0_f64);
        assert!((spline_inv_r3(2.0, 1.0) - exact).abs() < 1e-15);
        assert!((spline_inv_r3(3.0, 1.0) - 1.0 / 27.0).abs() < 1e-15);
    }

    #[test]
    fn spline_softening_is_finite_at_zero_separation() {
        let v = spline_inv_r3(1e-12, 1.0);
        assert!(v.is_finite());
        assert!((v - 4.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn pair_accel_is_antisymmetric() {
        let a = DVec3::new(0.1, 0.2, 0.3);
        let b = DVec3::new(0.9, -0.4, 0.5);
        let f_ab = pair_accel(a, b, 1.0, 0.0, Softening::None);
        let f_ba = pair_accel(b, a, 1.0, 0.0, Softening::None);
        assert_eq!(f_ab, -f_ba);
    }
}
