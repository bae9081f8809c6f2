//! Parallel Barnes-Hut/costzone tree for self-gravitating SPH.
//!
//! One adaptive octree serves three duties per simulation step: costzone
//! load balancing across worker threads, gravity by multipole-accepted
//! cell interactions, and 2h-sphere neighbour enumeration for the SPH
//! sums. The driver inserts particles, signals moves through handles,
//! calls [`Tree::update`] once per step, then runs the read-only
//! [`Tree::gravity`] and [`Tree::neighbours`] walks — concurrently, if
//! it likes.
//!
//! ```no_run
//! use costzone_core::{GravityParams, SphParticles, Tree};
//! use glam::DVec3;
//!
//! let mut parts = SphParticles::new(2);
//! parts.pos[0] = DVec3::new(0.25, 0.5, 0.5);
//! parts.pos[1] = DVec3::new(0.75, 0.5, 0.5);
//! parts.mass = vec![1.0; 2];
//!
//! let mut tree = Tree::new(DVec3::splat(0.5), 1.0, 4, 16);
//! parts.insert_all(&mut tree).unwrap();
//! tree.update(0.8, 1.2).unwrap();
//! let acc = tree
//!     .gravity(parts.handles[0].unwrap(), &GravityParams::default())
//!     .unwrap();
//! # let _ = acc;
//! ```

pub mod check;
pub mod comm;
pub mod config;
mod cz_builder;
pub mod dump;
pub mod error;
pub mod geometry;
pub mod gravity;
mod housekeeper;
mod mover;
pub mod multipole;
mod neighbours;
mod node;
mod par;
pub mod particle;
pub mod sph;
pub mod tree;
mod walker;

pub use comm::{
    combine_top_moments, global_cost_extrema, global_particle_count, NullComm, TreeComm,
};
pub use config::TreeConfig;
pub use error::TreeError;
pub use geometry::Extent;
pub use gravity::{GravityParams, GravityStats, MultipoleOrder, Softening};
pub use multipole::Multipoles;
pub use node::ParticleHandle;
pub use particle::{Body, SphParticles};
pub use sph::{
    compute_density, hydro_rates, xsph_velocities, CubicSpline, HydroRates, Kernel, Poly6,
};
pub use tree::{BottomCell, Tree};
