#![allow(dead_code)]

use costzone_core::{SphParticles, Tree};
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, UnitSphere};

/// Tree over the unit cube [0,1)^3.
pub fn unit_tree(threads: usize, cells_per_thread: usize) -> Tree {
    Tree::new(DVec3::splat(0.5), 1.0, threads, cells_per_thread)
}

/// `n` unit-cost particles uniformly in (margin, 1-margin)^3.
pub fn uniform_cube(n: usize, margin: f64, seed: u64) -> SphParticles {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut parts = SphParticles::new(n);
    let span = 1.0 - 2.0 * margin;
    for i in 0..n {
        parts.pos[i] = DVec3::new(
            margin + span * rng.gen::<f64>(),
            margin + span * rng.gen::<f64>(),
            margin + span * rng.gen::<f64>(),
        );
        parts.mass[i] = 1.0;
    }
    parts
}

/// Plummer sphere around the origin: scale radius `a`, total mass 1,
/// truncated at 5a.
pub fn plummer_sphere(n: usize, a: f64, seed: u64) -> SphParticles {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut parts = SphParticles::new(n);
    for i in 0..n {
        let r = loop {
            let u: f64 = rng.gen_range(1e-10..1.0);
            let r = a / (u.powf(-2.0 / 3.0) - 1.0).sqrt();
            if r < 5.0 * a {
                break r;
            }
        };
        let dir: [f64; 3] = UnitSphere.sample(&mut rng);
        parts.pos[i] = DVec3::new(dir[0], dir[1], dir[2]) * r;
        parts.mass[i] = 1.0 / n as f64;
    }
    parts
}

/// Regular `n^3` lattice with cell spacing `1/n`, offset half a cell so
/// no particle falls on an octree split plane.
pub fn aligned_grid(n: usize) -> SphParticles {
    let mut parts = SphParticles::new(n * n * n);
    let mut k = 0;
    for ix in 0..n {
        for iy in 0..n {
            for iz in 0..n {
                parts.pos[k] = DVec3::new(
                    (ix as f64 + 0.5) / n as f64,
                    (iy as f64 + 0.5) / n as f64,
                    (iz as f64 + 0.5) / n as f64,
                );
                parts.mass[k] = 1.0;
                k += 1;
            }
        }
    }
    parts
}
