mod common;

use costzone_core::{GravityParams, MultipoleOrder, Softening, TreeError, Tree};
use glam::DVec3;

fn direct_params() -> GravityParams {
    GravityParams {
        theta: 0.0,
        grav_const: 1.0,
        softening: Softening::None,
        order: MultipoleOrder::Octupole,
    }
}

#[test]
fn two_particle_reference_value() {
    // Unit masses at x = 0.1 and x = 0.9: the softening-free pull on the
    // left particle is 1 / 0.8^2 = 1.5625 along +x.
    let mut parts = costzone_core::SphParticles::new(2);
    parts.pos[0] = DVec3::new(0.1, 0.5, 0.5);
    parts.pos[1] = DVec3::new(0.9, 0.5, 0.5);
    parts.mass = vec![1.0, 1.0];

    let mut tree = common::unit_tree(1, 1);
    parts.insert_all(&mut tree).unwrap();
    tree.update(0.8, 1.2).unwrap();

    let mp = tree.root_moments();
    assert!((mp.mass - 2.0).abs() < 1e-15);
    assert!((mp.com - DVec3::new(0.5, 0.5, 0.5)).length() < 1e-15);

    let acc = tree
        .gravity(parts.handles[0].unwrap(), &direct_params())
        .unwrap();
    assert!((acc.x - 1.5625).abs() < 1e-14, "a_x = {}", acc.x);
    assert_eq!(acc.y, 0.0);
    assert_eq!(acc.z, 0.0);
}

#[test]
fn direct_pairs_are_reciprocal() {
    let mut parts = costzone_core::SphParticles::new(2);
    parts.pos[0] = DVec3::new(0.21, 0.47, 0.62);
    parts.pos[1] = DVec3::new(0.74, 0.33, 0.48);
    parts.mass = vec![1.0, 1.0];

    let mut tree = common::unit_tree(1, 1);
    parts.insert_all(&mut tree).unwrap();
    tree.update(0.8, 1.2).unwrap();

    let a0 = tree
        .gravity(parts.handles[0].unwrap(), &direct_params())
        .unwrap();
    let a1 = tree
        .gravity(parts.handles[1].unwrap(), &direct_params())
        .unwrap();
    assert_eq!(a0, -a1, "equal-mass pair forces must cancel bit-exactly");
}

#[test]
fn invalid_theta_is_rejected() {
    let mut parts = costzone_core::SphParticles::new(2);
    parts.pos[0] = DVec3::new(0.2, 0.5, 0.5);
    parts.pos[1] = DVec3::new(0.8, 0.5, 0.5);
    parts.mass = vec![1.0, 1.0];
    let mut tree = common::unit_tree(1, 1);
    parts.insert_all(&mut tree).unwrap();
    tree.update(0.8, 1.2).unwrap();

    let params = GravityParams {
        theta: -0.5,
        ..GravityParams::default()
    };
    assert!(matches!(
        tree.gravity(parts.handles[0].unwrap(), &params),
        Err(TreeError::InvalidTheta { .. })
    ));
}

#[test]
fn plummer_sphere_monopole_and_field() {
    let a = 1.0;
    let mut parts = common::plummer_sphere(1000, a, 1234);
    let mut tree = Tree::new(DVec3::ZERO, 12.0 * a, 4, 16);
    parts.insert_all(&mut tree).unwrap();
    tree.update(0.8, 1.2).unwrap();

    // Monopole conservation.
    let mp = tree.root_moments();
    assert!(
        (mp.mass - 1.0).abs() < 1e-12,
        "total mass drifted: {}",
        mp.mass
    );

    // Tree field at theta = 0.5 against the direct sum, for a sample of
    // targets. The approximation must stay well under one percent RMS.
    let approx = GravityParams {
        theta: 0.5,
        ..direct_params()
    };
    let mut err_sq = 0.0;
    let mut norm_sq = 0.0;
    for i in (0..parts.count).step_by(10) {
        let handle = parts.handles[i].unwrap();
        let exact = tree.gravity(handle, &direct_params()).unwrap();
        let tree_acc = tree.gravity(handle, &approx).unwrap();
        err_sq += (tree_acc - exact).length_squared();
        norm_sq += exact.length_squared();
    }
    let rms = (err_sq / norm_sq).sqrt();
    assert!(rms < 0.01, "relative RMS field error {rms}");
}

#[test]
fn batch_walks_match_single_walks() {
    let mut parts = common::plummer_sphere(300, 1.0, 777);
    let mut tree = Tree::new(DVec3::ZERO, 12.0, 2, 8);
    parts.insert_all(&mut tree).unwrap();
    tree.update(0.8, 1.2).unwrap();

    let handles: Vec<_> = parts.handles.iter().map(|h| h.unwrap()).collect();
    let params = GravityParams::default();
    let batch = tree.gravity_all(&handles, &params).unwrap();
    assert_eq!(batch.len(), 300);
    for (i, &handle) in handles.iter().enumerate().step_by(37) {
        let single = tree.gravity(handle, &params).unwrap();
        assert_eq!(batch[i], single);
    }
}

#[test]
fn opening_the_angle_trades_terms_for_error() {
    let mut parts = common::plummer_sphere(800, 1.0, 55);
    let mut tree = Tree::new(DVec3::ZERO, 12.0, 4, 16);
    parts.insert_all(&mut tree).unwrap();
    tree.update(0.8, 1.2).unwrap();

    let handle = parts.handles[0].unwrap();
    let (_, exact_stats) = tree
        .gravity_with_stats(handle, &direct_params())
        .unwrap();
    let opened = GravityParams {
        theta: 0.8,
        ..direct_params()
    };
    let (_, opened_stats) = tree.gravity_with_stats(handle, &opened).unwrap();

    // Theta 0 is a pure direct sum over the other particles.
    assert_eq!(exact_stats.particle_terms, 799);
    assert_eq!(exact_stats.cell_terms, 0);

    assert!(opened_stats.cell_terms > 0);
    assert!(
        opened_stats.particle_terms + opened_stats.cell_terms
            < exact_stats.particle_terms / 2,
        "MAC should cut the interaction count substantially"
    );
}

#[test]
fn softened_pair_force_is_bounded() {
    let mut parts = costzone_core::SphParticles::new(2);
    parts.pos[0] = DVec3::new(0.5, 0.5, 0.5);
    parts.pos[1] = DVec3::new(0.5 + 1e-4, 0.5, 0.5);
    parts.mass = vec![1.0, 1.0];
    parts.h = vec![0.1, 0.1];

    let mut tree = common::unit_tree(1, 1);
    parts.insert_all(&mut tree).unwrap();
    tree.update(0.8, 1.2).unwrap();

    let unsoftened = tree
        .gravity(parts.handles[0].unwrap(), &direct_params())
        .unwrap();

    let plummer = GravityParams {
        softening: Softening::Plummer(0.05),
        ..direct_params()
    };
    let eps_acc = tree.gravity(parts.handles[0].unwrap(), &plummer).unwrap();
    assert!(eps_acc.length() < unsoftened.length());
    assert!(eps_acc.length() < 1.0 / (0.05_f64.powi(2)));

    let spline = GravityParams {
        softening: Softening::Spline,
        ..direct_params()
    };
    let spline_acc = tree.gravity(parts.handles[0].unwrap(), &spline).unwrap();
    assert!(spline_acc.length() < unsoftened.length());
    assert!(spline_acc.length().is_finite());
}
