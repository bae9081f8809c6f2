use glam::DVec3;

use crate::error::TreeError;
use crate::node::ParticleHandle;
use crate::tree::Tree;

/// The contract an external particle record offers the tree.
///
/// The tree snapshots these values at insert/move time and never touches
/// caller storage afterwards. `cost` should be proportional to the
/// expected per-particle compute work; drivers typically feed back the
/// last round's neighbour count between rounds.
pub trait Body {
    fn id(&self) -> u64;
    fn pos(&self) -> DVec3;
    fn mass(&self) -> f64;
    fn cost(&self) -> f64 {
        1.0
    }
    fn smoothing_length(&self) -> f64 {
        0.0
    }
}

/// SoA particle storage for the SPH state the engine advances.
pub struct SphParticles {
    pub count: usize,
    pub pos: Vec<DVec3>,
    pub vel: Vec<DVec3>,
    pub mass: Vec<f64>,
    /// Specific internal energy.
    pub u: Vec<f64>,
    /// SPH density estimate.
    pub rho: Vec<f64>,
    /// Smoothing length; the kernel support is 2h.
    pub h: Vec<f64>,
    /// Per-particle tree cost, fed to the costzone rebalancer.
    pub cost: Vec<f64>,
    /// Material tag.
    pub mat_id: Vec<u32>,
    /// Tree proxies, filled by `insert_all`.
    pub handles: Vec<Option<ParticleHandle>>,
}

impl SphParticles {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            pos: vec![DVec3::ZERO; count],
            vel: vec![DVec3::ZERO; count],
            mass: vec![0.0; count],
            u: vec![0.0; count],
            rho: vec![0.0; count],
            h: vec![0.0; count],
            cost: vec![1.0; count],
            mat_id: vec![0; count],
            handles: vec![None; count],
        }
    }

    /// View one slot through the `Body` contract. The slot index is the
    /// external particle id.
    pub fn body(&self, i: usize) -> BodyRef<'_> {
        BodyRef { parts: self, i }
    }

    /// Insert every particle, remembering the handles.
    pub fn insert_all(&mut self, tree: &mut Tree) -> Result<(), TreeError> {
        for i in 0..self.count {
            let handle = tree.insert(&BodyRef { parts: self, i })?;
            self.handles[i] = Some(handle);
        }
        Ok(())
    }
}

/// Borrowed view of one `SphParticles` slot.
pub struct BodyRef<'a> {
    parts: &'a SphParticles,
    i: usize,
}

impl Body for BodyRef<'_> {
    fn id(&self) -> u64 {
        self.i as u64
    }

    fn pos(&self) -> DVec3 {
        self.parts.pos[self.i]
    }

    fn mass(&self) -> f64 {
        self.parts.mass[self.i]
    }

    fn cost(&self) -> f64 {
        self.parts.cost[self.i]
    }

    fn smoothing_length(&self) -> f64 {
        self.parts.h[self.i]
    }
}
