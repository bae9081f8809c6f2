//! Kernel-weighted neighbour sums on top of the tree's 2h enumeration.
//!
//! The kernel is a plug-in; the cubic spline (M4) ships as the reference.
//! Pressures come from the caller's equation of state — the sums only
//! need the resulting per-particle pressure values.

use glam::DVec3;

use crate::error::TreeError;
use crate::particle::SphParticles;
use crate::tree::Tree;

/// SPH smoothing kernel with compact support.
pub trait Kernel {
    /// W(r, h).
    fn value(&self, r: f64, h: f64) -> f64;
    /// Gradient of W with respect to the target position, for the
    /// separation vector `rvec` with length `r`.
    fn gradient(&self, rvec: DVec3, r: f64, h: f64) -> DVec3;
    /// Support radius; neighbours beyond it do not contribute.
    fn support(&self, h: f64) -> f64 {
        2.0 * h
    }
}

/// Cubic spline (M4) kernel, 3D normalisation 1/(pi h^3).
pub struct CubicSpline;

impl Kernel for CubicSpline {
    fn value(&self, r: f64, h: f64) -> f64 {
        let sigma = 1.0 / (std::f64::consts::PI * h * h * h);
        let q = r / h;
        if q < 1.0 {
            sigma * (1.0 - 1.5 * q * q + 0.75 * q * q * q)
        } else if q < 2.0 {
            let t = 2.0 - q;
            sigma * 0.25 * t * t * t
        } else {
            0.0
        }
    }

    fn gradient(&self, rvec: DVec3, r: f64, h: f64) -> DVec3 {
        if r <= 1e-12 * h {
            return DVec3::ZERO;
        }
        let sigma = 1.0 / (std::f64::consts::PI * h * h * h);
        let q = r / h;
        let dw_dr = if q < 1.0 {
            sigma / h * (-3.0 * q + 2.25 * q * q)
        } else if q < 2.0 {
            let t = 2.0 - q;
            sigma / h * (-0.75 * t * t)
        } else {
            return DVec3::ZERO;
        };
        (rvec / r) * dw_dr
    }
}

/// Poly6 kernel, 3D normalisation 315/(64 pi h^9), with support h
/// rather than 2h. Cheap to evaluate (no square root in the value for
/// squared-distance callers) and a common choice for density-only
/// estimates.
pub struct Poly6;

impl Kernel for Poly6 {
    fn value(&self, r: f64, h: f64) -> f64 {
        if r >= h {
            return 0.0;
        }
        let h2 = h * h;
        let diff = h2 - r * r;
        let h9 = h2 * h2 * h2 * h2 * h;
        315.0 / (64.0 * std::f64::consts::PI * h9) * diff * diff * diff
    }

    fn gradient(&self, rvec: DVec3, r: f64, h: f64) -> DVec3 {
        if r >= h {
            return DVec3::ZERO;
        }
        let h2 = h * h;
        let diff = h2 - r * r;
        let h9 = h2 * h2 * h2 * h2 * h;
        let coeff = -945.0 / (32.0 * std::f64::consts::PI * h9);
        rvec * (coeff * diff * diff)
    }

    fn support(&self, h: f64) -> f64 {
        h
    }
}

/// Gather densities: rho_i = sum_j m_j W(|r_ij|, h_i).
///
/// The target's own handle set must be complete and the tree updated.
pub fn compute_density(
    tree: &Tree,
    parts: &mut SphParticles,
    kernel: &impl Kernel,
) -> Result<(), TreeError> {
    for i in 0..parts.count {
        let Some(handle) = parts.handles[i] else { continue };
        let h = parts.h[i];
        let mut rho = 0.0;
        for (j, dist) in tree.neighbours(handle, kernel.support(h))? {
            rho += parts.mass[j as usize] * kernel.value(dist, h);
        }
        parts.rho[i] = rho;
    }
    Ok(())
}

/// Momentum and energy rates of the SPH equations.
pub struct HydroRates {
    pub acc: Vec<DVec3>,
    pub du_dt: Vec<f64>,
}

/// Symmetric pressure-gradient sums:
///
///   a_i    = -sum_j m_j (P_i/rho_i^2 + P_j/rho_j^2) grad W(r_ij, h_ij)
///   du_i/dt =  P_i/rho_i^2 sum_j m_j v_ij . grad W(r_ij, h_ij)
///
/// with the pairwise-averaged smoothing length h_ij = (h_i + h_j)/2.
/// Densities must be current (`compute_density`).
pub fn hydro_rates(
    tree: &Tree,
    parts: &SphParticles,
    pressure: &[f64],
    kernel: &impl Kernel,
) -> Result<HydroRates, TreeError> {
    let mut acc = vec![DVec3::ZERO; parts.count];
    let mut du_dt = vec![0.0; parts.count];

    for i in 0..parts.count {
        let Some(handle) = parts.handles[i] else { continue };
        let rho_i = parts.rho[i];
        if rho_i <= 0.0 {
            continue;
        }
        let p_over_rho2_i = pressure[i] / (rho_i * rho_i);

        for (j, dist) in tree.neighbours(handle, kernel.support(parts.h[i]))? {
            let j = j as usize;
            if j == i || dist <= 0.0 {
                continue;
            }
            let rho_j = parts.rho[j];
            if rho_j <= 0.0 {
                continue;
            }
            let h_ij = 0.5 * (parts.h[i] + parts.h[j]);
            let rvec = parts.pos[i] - parts.pos[j];
            let grad = kernel.gradient(rvec, dist, h_ij);
            let p_over_rho2_j = pressure[j] / (rho_j * rho_j);

            acc[i] -= parts.mass[j] * (p_over_rho2_i + p_over_rho2_j) * grad;
            du_dt[i] += p_over_rho2_i * parts.mass[j] * (parts.vel[i] - parts.vel[j]).dot(grad);
        }
    }
    Ok(HydroRates { acc, du_dt })
}

/// XSPH velocity smoothing: each particle's velocity nudged towards the
/// kernel-weighted mean of its neighbourhood,
///
///   v_i' = v_i + eps * sum_j (2 m_j / (rho_i + rho_j)) (v_j - v_i) W(r_ij, h_i)
///
/// Damps particle interpenetration without introducing real viscosity;
/// `eps` around 0.5 is the usual strength. Densities must be current.
pub fn xsph_velocities(
    tree: &Tree,
    parts: &SphParticles,
    kernel: &impl Kernel,
    eps: f64,
) -> Result<Vec<DVec3>, TreeError> {
    let mut smoothed = parts.vel.clone();
    for i in 0..parts.count {
        let Some(handle) = parts.handles[i] else { continue };
        let rho_i = parts.rho[i];
        if rho_i <= 0.0 {
            continue;
        }
        let mut correction = DVec3::ZERO;
        for (j, dist) in tree.neighbours(handle, kernel.support(parts.h[i]))? {
            let j = j as usize;
            if j == i {
                continue;
            }
            let rho_j = parts.rho[j];
            if rho_j <= 0.0 {
                continue;
            }
            let w = kernel.value(dist, parts.h[i]);
            correction +=
                (2.0 * parts.mass[j] / (rho_i + rho_j)) * (parts.vel[j] - parts.vel[i]) * w;
        }
        smoothed[i] += eps * correction;
    }
    Ok(smoothed)
}
