//! Particle insertion and re-seating.
//!
//! A new particle is adopted as an *orphan* by the costzone bottom cell
//! covering it; orphans are settled into leaf octants in bulk by
//! `update()` once the costzone topology for the round is known. A moved
//! particle walks up out of the cells it left (paying its cost out of
//! every costzone cell it exits), then back down into the costzone bottom
//! now covering it.

use glam::DVec3;

use crate::error::TreeError;
use crate::geometry;
use crate::node::{NodeId, NodeKind, ParticleHandle, PartNode};
use crate::particle::Body;
use crate::tree::Tree;

impl Tree {
    /// Add a particle to the tree. The snapshot of position, mass, cost
    /// and smoothing length is taken now; the returned handle is how the
    /// caller signals later changes.
    ///
    /// Single-threaded by contract: bulk insertion happens between
    /// rounds, never concurrently with walks.
    pub fn insert(&mut self, body: &impl Body) -> Result<ParticleHandle, TreeError> {
        let pos = body.pos();
        {
            let root = self.arena.cell(self.root);
            if !geometry::point_inside(pos, root.center, root.size) {
                return Err(TreeError::PartOutsideRoot { id: body.id(), pos });
            }
        }

        let cost = body.cost();
        let pnod = self.arena.alloc(
            Some(self.root),
            1,
            body.id() as i64,
            NodeKind::Part(PartNode {
                pos,
                mass: body.mass(),
                cost,
                h: body.smoothing_length(),
                settled: false,
            }),
        );
        let gen = self.arena[pnod].gen;

        let root_cz = self.arena.cz_mut(self.root);
        root_cz.no_parts += 1;
        root_cz.abs_cost += cost;
        self.part_count += 1;

        self.seat_in_cz(self.root, pnod);
        Ok(ParticleHandle { node: pnod, gen })
    }

    /// Signal that the particle has moved. Re-seats the proxy; a new
    /// position outside the root cell is rejected with the tree (and the
    /// handle) untouched.
    pub fn move_particle(&mut self, handle: ParticleHandle, pos: DVec3) -> Result<(), TreeError> {
        let pnod = self.proxy(handle)?;
        self.push_up_and_to_cz(pnod, pos)
    }

    /// Bulk variant of [`Tree::move_particle`]: refresh every proxy's
    /// position and mass from the caller's records (indexed by particle
    /// id) and re-seat the ones that moved. Costs are not refreshed here;
    /// drivers adjust those through `set_cost` between rounds. Stops at
    /// the first rejected move; particles already re-seated stay
    /// re-seated, the offender and the rest stay where they were.
    pub fn move_all<B: Body>(&mut self, bodies: &[B]) -> Result<(), TreeError> {
        let proxies: Vec<NodeId> = self
            .arena
            .iter_live()
            .filter(|(_, n)| n.is_particle())
            .map(|(id, _)| id)
            .collect();
        for pnod in proxies {
            let ident = self.arena[pnod].ident as usize;
            let Some(body) = bodies.get(ident) else { continue };
            self.arena.part_mut(pnod).mass = body.mass();
            let pos = body.pos();
            if pos != self.arena.part(pnod).pos {
                self.push_up_and_to_cz(pnod, pos)?;
            }
        }
        Ok(())
    }

    /// Update the particle's mass snapshot. Moments are stale until the
    /// next `update()` or `redo_multipoles()`.
    pub fn set_mass(&mut self, handle: ParticleHandle, mass: f64) -> Result<(), TreeError> {
        let pnod = self.proxy(handle)?;
        self.arena.part_mut(pnod).mass = mass;
        Ok(())
    }

    /// Update the particle's cost, propagating the difference through
    /// every costzone cell whose subtree holds it.
    pub fn set_cost(&mut self, handle: ParticleHandle, cost: f64) -> Result<(), TreeError> {
        let pnod = self.proxy(handle)?;
        let delta = cost - self.arena.part(pnod).cost;
        self.arena.part_mut(pnod).cost = cost;
        let mut cur = self.arena[pnod].parent;
        while let Some(id) = cur {
            if self.arena[id].is_cz() {
                self.arena.cz_mut(id).abs_cost += delta;
            }
            cur = self.arena[id].parent;
        }
        Ok(())
    }

    /// Detach the particle and free its proxy. The handle is dead
    /// afterwards.
    pub fn remove(&mut self, handle: ParticleHandle) -> Result<(), TreeError> {
        let pnod = self.proxy(handle)?;
        let cost = self.arena.part(pnod).cost;
        let parent = match self.arena[pnod].parent {
            Some(p) => p,
            None => unreachable!("proxy without parent"),
        };
        self.detach(pnod, parent);
        let mut cur = Some(parent);
        while let Some(id) = cur {
            if self.arena[id].is_cz() {
                let cz = self.arena.cz_mut(id);
                cz.abs_cost -= cost;
                cz.no_parts -= 1;
            }
            cur = self.arena[id].parent;
        }
        self.part_count -= 1;
        self.arena.release(pnod);
        Ok(())
    }

    /// Unhook a proxy from its parent: clear the child slot for settled
    /// particles, drop it from the orphan list otherwise.
    fn detach(&mut self, pnod: NodeId, parent: NodeId) {
        if self.arena.part(pnod).settled {
            if let Some(slot) = self.child_slot_of(parent, pnod) {
                self.arena.cell_mut(parent).child[slot] = None;
            }
        } else {
            self.arena.cz_mut(parent).orphans.retain(|&o| o != pnod);
        }
    }

    /// Descend from the costzone cell `start` (which must contain the
    /// particle) to the bottom cell covering it, charging the particle's
    /// cost to every costzone cell entered, and adopt it as an orphan
    /// there. `start` itself is not charged — the particle never left its
    /// subtree (or, on insert, was charged by the caller).
    pub(crate) fn seat_in_cz(&mut self, start: NodeId, pnod: NodeId) {
        let pos = self.arena.part(pnod).pos;
        let cost = self.arena.part(pnod).cost;
        let mut cur = start;
        while !self.arena.cz(cur).at_bottom {
            let oct = {
                let cell = self.arena.cell(cur);
                geometry::octant(cell.center, pos)
            };
            cur = match self.arena.cell(cur).child[oct] {
                Some(c) => c,
                None => unreachable!("costzone interior with a missing child"),
            };
            let cz = self.arena.cz_mut(cur);
            cz.abs_cost += cost;
            cz.no_parts += 1;
        }
        let depth = self.arena[cur].depth + 1;
        self.arena.cz_mut(cur).orphans.push(pnod);
        let node = &mut self.arena[pnod];
        node.parent = Some(cur);
        node.depth = depth;
        match &mut node.kind {
            NodeKind::Part(p) => p.settled = false,
            _ => unreachable!("adopting a non-particle"),
        }
    }

    /// Re-seat a proxy after its position changed. Checks the new
    /// position against the root box before touching anything, so a
    /// rejected move leaves the tree exactly as it was.
    fn push_up_and_to_cz(&mut self, pnod: NodeId, pos: DVec3) -> Result<(), TreeError> {
        {
            let root = self.arena.cell(self.root);
            if !geometry::point_inside(pos, root.center, root.size) {
                return Err(TreeError::PartOutsideRoot {
                    id: self.arena[pnod].ident as u64,
                    pos,
                });
            }
        }
        let cost = self.arena.part(pnod).cost;
        let settled = self.arena.part(pnod).settled;
        let mut cur = match self.arena[pnod].parent {
            Some(p) => p,
            None => unreachable!("proxy without parent"),
        };

        if settled {
            let old_oct = self.child_slot_of(cur, pnod);
            let cell = self.arena.cell(cur);
            // Short cut for particles staying in the same octant.
            if geometry::point_inside(pos, cell.center, cell.size)
                && old_oct == Some(geometry::octant(cell.center, pos))
            {
                self.arena.part_mut(pnod).pos = pos;
                return Ok(());
            }
        } else {
            let cell = self.arena.cell(cur);
            // Unsettled orphans only need to stay inside their cell.
            if geometry::point_inside(pos, cell.center, cell.size) {
                self.arena.part_mut(pnod).pos = pos;
                return Ok(());
            }
        }

        self.arena.part_mut(pnod).pos = pos;
        self.detach(pnod, cur);

        // Up: leave every cell that no longer contains the particle,
        // refunding its cost to each costzone cell exited.
        loop {
            let cell = self.arena.cell(cur);
            if geometry::point_inside(pos, cell.center, cell.size) {
                break;
            }
            if self.arena[cur].is_cz() {
                let cz = self.arena.cz_mut(cur);
                cz.abs_cost -= cost;
                cz.no_parts -= 1;
            }
            match self.arena[cur].parent {
                Some(p) => cur = p,
                None => unreachable!("walk escaped a root that contains the particle"),
            }
        }

        if self.arena[cur].is_cz() {
            self.seat_in_cz(cur, pnod);
            Ok(())
        } else {
            // Still inside a private subtree; settle right away.
            self.arena[pnod].parent = Some(cur);
            self.push_down_single(pnod)
        }
    }

    /// Settle an unsettled or freshly re-parented proxy into a leaf
    /// octant, subdividing as needed. The proxy's parent cell must
    /// contain its position.
    pub(crate) fn push_down_single(&mut self, pnod: NodeId) -> Result<(), TreeError> {
        let pos = self.arena.part(pnod).pos;
        let mut cur = match self.arena[pnod].parent {
            Some(p) => p,
            None => unreachable!("proxy without parent"),
        };
        debug_assert!({
            let cell = self.arena.cell(cur);
            geometry::point_inside(pos, cell.center, cell.size)
        });

        loop {
            let oct = {
                let cell = self.arena.cell(cur);
                geometry::octant(cell.center, pos)
            };
            match self.arena.cell(cur).child[oct] {
                None => {
                    let depth = self.arena[cur].depth + 1;
                    self.arena.cell_mut(cur).child[oct] = Some(pnod);
                    let node = &mut self.arena[pnod];
                    node.parent = Some(cur);
                    node.depth = depth;
                    match &mut node.kind {
                        NodeKind::Part(p) => p.settled = true,
                        _ => unreachable!("settling a non-particle"),
                    }
                    return Ok(());
                }
                Some(c) if self.arena[c].is_particle() => {
                    match self.part_to_cell(cur, oct) {
                        Ok(new_cell) => cur = new_cell,
                        Err(TreeError::TooDeep { .. }) => {
                            return Err(TreeError::PartsTooClose {
                                id_a: self.arena[c].ident as u64,
                                id_b: self.arena[pnod].ident as u64,
                                depth: self.arena[cur].depth,
                            });
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some(c) => cur = c,
            }
        }
    }

    /// Settle every orphan of one costzone bottom cell. On failure the
    /// unprocessed orphans (including the offender) are put back so the
    /// tree stays consistent for a retry.
    pub(crate) fn push_down_orphans(&mut self, czll: NodeId) -> Result<(), TreeError> {
        let mut orphans = std::mem::take(&mut self.arena.cz_mut(czll).orphans);
        while let Some(pnod) = orphans.pop() {
            self.arena[pnod].parent = Some(czll);
            if let Err(err) = self.push_down_single(pnod) {
                orphans.push(pnod);
                self.arena.cz_mut(czll).orphans = orphans;
                return Err(err);
            }
        }
        Ok(())
    }
}
