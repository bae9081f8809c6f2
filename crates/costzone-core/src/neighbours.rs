//! Neighbour enumeration for the SPH sums.
//!
//! Starting from the target's own proxy, the walker climbs until the
//! search sphere is fully contained in the cursor cell (or the root is
//! reached), then descends, discarding every cell wholly outside the
//! sphere. The result is complete: the exclusion test is conservative.

use glam::DVec3;

use crate::error::TreeError;
use crate::geometry;
use crate::node::{NodeKind, ParticleHandle};
use crate::tree::Tree;
use crate::walker::Walker;

struct Search {
    pos: DVec3,
    radius: f64,
    radius2: f64,
    cap: usize,
    target_id: u64,
}

impl Tree {
    /// All particles within `radius` of the target, as
    /// `(external id, distance)` pairs. The target itself is included
    /// with distance zero, as SPH kernel sums expect.
    ///
    /// The list is sized to `max_neighbours` at search start; exceeding
    /// it reports `TooManyNeighbours` with the target's id, and the
    /// caller may raise the cap and retry.
    pub fn neighbours(
        &self,
        handle: ParticleHandle,
        radius: f64,
    ) -> Result<Vec<(u64, f64)>, TreeError> {
        let target = self.proxy(handle)?;
        let search = Search {
            pos: self.arena.part(target).pos,
            radius,
            radius2: radius * radius,
            cap: self.config.max_neighbours,
            target_id: self.arena[target].ident as u64,
        };
        let mut found = Vec::with_capacity(search.cap.min(256));

        // Climb until the sphere cannot reach outside the cursor cell.
        let mut walker = Walker::new(&self.arena, self.root, target);
        walker.go_up();
        loop {
            let cell = self.arena.cell(walker.cur);
            if geometry::sphere_inside_cell(search.pos, radius, cell.center, cell.size) {
                break;
            }
            if !walker.go_up() {
                break;
            }
        }

        gather(&mut walker, &search, &mut found)?;
        Ok(found)
    }

    /// Smallest cell-corner distance around the target whose cell holds
    /// at least `min_mass`: an upper bound for a mass-based smoothing
    /// length. With unit-mass particles the cell masses count particles
    /// directly.
    pub fn max_mass_enclosing_radius(
        &self,
        handle: ParticleHandle,
        min_mass: f64,
    ) -> Result<f64, TreeError> {
        let target = self.proxy(handle)?;
        let pos = self.arena.part(target).pos;

        let mut walker = Walker::new(&self.arena, self.root, target);
        while walker.go_up() {
            if self.arena.cell(walker.cur).mp.mass > min_mass {
                break;
            }
        }

        let cell = self.arena.cell(walker.cur);
        let corner = geometry::farthest_corner(cell.center, cell.size, pos);
        Ok((corner - pos).length())
    }
}

/// Recursive descent from the cursor, pruning cells wholly outside the
/// search sphere. Leaves the cursor where it started.
fn gather(
    walker: &mut Walker<'_>,
    search: &Search,
    found: &mut Vec<(u64, f64)>,
) -> Result<(), TreeError> {
    let node = walker.node();
    match &node.kind {
        NodeKind::Part(p) => {
            let d2 = (p.pos - search.pos).length_squared();
            if d2 < search.radius2 {
                if found.len() >= search.cap {
                    return Err(TreeError::TooManyNeighbours {
                        id: search.target_id,
                        cap: search.cap,
                    });
                }
                found.push((node.ident as u64, d2.sqrt()));
            }
        }
        NodeKind::Free => unreachable!("freed node reachable from tree"),
        _ => {
            let cell = match node.as_cell() {
                Some(c) => c,
                None => unreachable!(),
            };
            if geometry::cell_outside_sphere(cell.center, cell.size, search.pos, search.radius) {
                return Ok(());
            }
            for oct in 0..8 {
                if walker.go_child(oct) {
                    gather(walker, search, found)?;
                    walker.go_up();
                }
            }
        }
    }
    Ok(())
}
