use glam::DVec3;

use crate::particle::Body;

/// Half of a unit cube's space diagonal, sqrt(3)/2.
pub const HALF_DIAGONAL: f64 = 0.866_025_403_784_438_7;

/// Cubic axis-aligned extent: the root cell's bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    pub center: DVec3,
    pub size: f64,
}

impl Extent {
    pub fn new(center: DVec3, size: f64) -> Self {
        Self { center, size }
    }

    /// Smallest cube covering every body, grown by `pad` on each side.
    ///
    /// The pad lets a driver keep the same root box over several
    /// timesteps of drift instead of recomputing it every round. Returns
    /// None for an empty slice; a degenerate cloud (all bodies
    /// coincident) still gets a box of side `2 * pad`.
    pub fn from_bodies<B: Body>(bodies: &[B], pad: f64) -> Option<Self> {
        let first = bodies.first()?.pos();
        let mut lo = first;
        let mut hi = first;
        for body in &bodies[1..] {
            let p = body.pos();
            lo = lo.min(p);
            hi = hi.max(p);
        }
        lo -= DVec3::splat(pad);
        hi += DVec3::splat(pad);

        let span = hi - lo;
        Some(Self {
            center: 0.5 * (lo + hi),
            size: span.max_element(),
        })
    }

    pub fn contains(&self, p: DVec3) -> bool {
        point_inside(p, self.center, self.size)
    }
}

/// Octant index of `p` relative to a cell centered at `center`.
///
/// Bit 0 is set when p.x >= center.x, bit 1 for y, bit 2 for z, so the
/// index doubles as the slot in a cell's child array.
#[inline]
pub fn octant(center: DVec3, p: DVec3) -> usize {
    let mut idx = 0;
    if p.x >= center.x {
        idx |= 1;
    }
    if p.y >= center.y {
        idx |= 2;
    }
    if p.z >= center.z {
        idx |= 4;
    }
    idx
}

/// Center of the child cell in octant `oct` of a cell with the given
/// center and edge length. The child's edge length is `size / 2`, so its
/// center sits `size / 4` off the parent center along each axis.
#[inline]
pub fn child_center(center: DVec3, size: f64, oct: usize) -> DVec3 {
    let off = 0.25 * size;
    DVec3::new(
        if oct & 1 != 0 { center.x + off } else { center.x - off },
        if oct & 2 != 0 { center.y + off } else { center.y - off },
        if oct & 4 != 0 { center.z + off } else { center.z - off },
    )
}

/// Is `p` inside the cube with the given center and edge length?
/// The test is inclusive on all faces.
#[inline]
pub fn point_inside(p: DVec3, center: DVec3, size: f64) -> bool {
    let half = 0.5 * size;
    (p - center).abs().max_element() <= half
}

/// Is the sphere around `x` with radius `r` entirely inside the cube?
#[inline]
pub fn sphere_inside_cell(x: DVec3, r: f64, center: DVec3, size: f64) -> bool {
    let half = 0.5 * size;
    (x - center).abs().max_element() + r <= half
}

/// Is the cube entirely outside the sphere around `x` with radius `r`?
///
/// Conservative: compares the center distance against the search radius
/// plus the cube's half diagonal, so it never discards an intersecting
/// cell.
#[inline]
pub fn cell_outside_sphere(center: DVec3, size: f64, x: DVec3, r: f64) -> bool {
    let reach = r + HALF_DIAGONAL * size;
    (center - x).length_squared() > reach * reach
}

/// The cube corner farthest from `p`. For `p` inside the cube, the
/// distance to this corner bounds the distance to every point of the
/// cube.
#[inline]
pub fn farthest_corner(center: DVec3, size: f64, p: DVec3) -> DVec3 {
    let half = 0.5 * size;
    DVec3::new(
        if p.x < center.x { center.x + half } else { center.x - half },
        if p.y < center.y { center.y + half } else { center.y - half },
        if p.z < center.z { center.z + half } else { center.z - half },
    )
}
