//! End-to-end scenario tests using the CPU reference backend.

use glam::Vec2;

use fluid2d::{
    ComputeBackend, CpuBackend, FluidConfig, KernelCoefficients, ParticleArrays, ParticleSystem,
    SpatialHashMap, StepParams,
};

fn step_params(radius: f32) -> StepParams {
    StepParams {
        dt: 1.0 / 60.0,
        smoothing_radius: radius,
        target_density: 0.05,
        pressure_multiplier: 0.05,
        near_pressure_multiplier: 0.01,
        coeffs: KernelCoefficients::from_radius(radius),
    }
}

/// Four particles on the corners of a small square see each other
/// symmetrically: equal densities, outward pressure forces.
#[test]
fn square_corners_have_symmetric_densities() {
    let radius = 2.0;
    let half = 0.5;
    let corners = [
        Vec2::new(-half, -half),
        Vec2::new(half, -half),
        Vec2::new(-half, half),
        Vec2::new(half, half),
    ];

    let mut particles = ParticleArrays::new(4);
    particles.predicted.copy_from_slice(&corners);
    particles.positions.copy_from_slice(&corners);

    let mut spatial = SpatialHashMap::new(4);
    spatial.rebuild(&particles.predicted, radius);

    let params = step_params(radius);
    let mut backend = CpuBackend;
    backend
        .compute_densities(&spatial, &mut particles, &params)
        .unwrap();

    let d0 = particles.densities[0];
    assert!(d0 > 0.0);
    for (i, &d) in particles.densities.iter().enumerate() {
        assert!(
            (d - d0).abs() < 1.0e-5 * d0,
            "corner {i} density {d} differs from {d0}"
        );
    }

    // Dense cluster well above rest density: pressure pushes every corner
    // away from the center.
    backend
        .apply_pressure(&spatial, &mut particles, &params)
        .unwrap();
    for (i, corner) in corners.iter().enumerate() {
        let outward = corner.normalize();
        let v = particles.velocities[i];
        assert!(
            v.dot(outward) > 0.0,
            "corner {i} velocity {v} not outward from center"
        );
    }
}

/// Corners of a square wider than the interaction range see nobody, so
/// every density is exactly zero; shrinking the square inside the radius
/// makes all four strictly positive.
#[test]
fn square_density_transitions_with_spacing() {
    let radius = 1.0;
    let params = step_params(radius);
    let mut backend = CpuBackend;

    let square = |half: f32| {
        [
            Vec2::new(-half, -half),
            Vec2::new(half, -half),
            Vec2::new(-half, half),
            Vec2::new(half, half),
        ]
    };

    // Side 6 with radius 1: no pair in range, zero from the empty loop.
    let mut particles = ParticleArrays::new(4);
    particles.predicted.copy_from_slice(&square(3.0));
    particles.positions.copy_from_slice(&square(3.0));
    let mut spatial = SpatialHashMap::new(4);
    spatial.rebuild(&particles.predicted, radius);
    backend
        .compute_densities(&spatial, &mut particles, &params)
        .unwrap();
    for (i, &d) in particles.densities.iter().enumerate() {
        assert_eq!(d, 0.0, "distant corner {i} reported density {d}");
    }
    for (i, &d) in particles.near_densities.iter().enumerate() {
        assert_eq!(d, 0.0, "distant corner {i} reported near-density {d}");
    }

    // Side 0.5: every pair is within the radius, all densities positive.
    particles.predicted.copy_from_slice(&square(0.25));
    particles.positions.copy_from_slice(&square(0.25));
    spatial.rebuild(&particles.predicted, radius);
    backend
        .compute_densities(&spatial, &mut particles, &params)
        .unwrap();
    for (i, &d) in particles.densities.iter().enumerate() {
        assert!(d > 0.0, "close corner {i} reported density {d}");
    }
}

/// A particle flanked by two equidistant neighbors sits at a symmetric
/// equilibrium: one step leaves its velocity and position unchanged within
/// tolerance.
#[test]
fn symmetric_neighbors_hold_equilibrium() {
    let config = FluidConfig {
        particle_count: 3,
        gravity: [0.0, 0.0],
        smoothing_radius: 1.0,
        bounds_origin: [-50.0, -50.0],
        bounds_size: [100.0, 100.0],
        ..FluidConfig::default()
    };
    let mut system = ParticleSystem::new(config).unwrap();
    let line = [
        Vec2::new(-0.4, 0.0),
        Vec2::new(0.0, 0.0),
        Vec2::new(0.4, 0.0),
    ];
    system.particles_mut().positions.copy_from_slice(&line);
    system.particles_mut().predicted.copy_from_slice(&line);
    system.particles_mut().velocities.fill(Vec2::ZERO);

    system.simulate(1.0 / 60.0).unwrap();

    // The middle particle's pair forces cancel; the flanks get pushed out.
    let v_mid = system.velocities()[1];
    assert!(
        v_mid.length() < 1.0e-5,
        "centered particle moved: velocity {v_mid}"
    );
    let delta = system.positions()[1] - line[1];
    assert!(
        delta.length() < 1.0e-5,
        "centered particle drifted by {delta}"
    );
    assert!(system.velocities()[0].x < 0.0);
    assert!(system.velocities()[2].x > 0.0);
}

/// Particles too far apart to interact feel no pressure force at all.
#[test]
fn isolated_particles_feel_no_force() {
    let radius = 1.0;
    let mut particles = ParticleArrays::new(3);
    let spread = [
        Vec2::new(0.0, 0.0),
        Vec2::new(10.0, 0.0),
        Vec2::new(0.0, 10.0),
    ];
    particles.predicted.copy_from_slice(&spread);
    particles.positions.copy_from_slice(&spread);

    let mut spatial = SpatialHashMap::new(3);
    spatial.rebuild(&particles.predicted, radius);

    let params = step_params(radius);
    let mut backend = CpuBackend;
    backend
        .compute_densities(&spatial, &mut particles, &params)
        .unwrap();
    backend
        .apply_pressure(&spatial, &mut particles, &params)
        .unwrap();

    // No pair in range: zero density and zero force.
    for (i, d) in particles.densities.iter().enumerate() {
        assert_eq!(*d, 0.0, "isolated particle {i} reported density {d}");
    }
    for (i, v) in particles.velocities.iter().enumerate() {
        assert_eq!(*v, Vec2::ZERO, "isolated particle {i} gained velocity {v}");
    }
}

/// A particle thrown at the right wall comes back slower.
#[test]
fn right_wall_bounce_loses_energy() {
    let config = FluidConfig {
        particle_count: 1,
        gravity: [0.0, 0.0],
        smoothing_radius: 1.0,
        collision_damping: 0.8,
        bounds_origin: [0.0, 0.0],
        bounds_size: [100.0, 100.0],
        ..FluidConfig::default()
    };
    let mut system = ParticleSystem::new(config).unwrap();
    system.particles_mut().positions[0] = Vec2::new(99.0, 50.0);
    system.particles_mut().predicted[0] = Vec2::new(99.0, 50.0);
    system.particles_mut().velocities[0] = Vec2::new(120.0, 0.0);

    system.simulate(1.0 / 60.0).unwrap();

    let pos = system.positions()[0];
    let vel = system.velocities()[0];
    assert!(pos.x <= 100.0, "particle passed through the wall: {pos}");
    assert!(vel.x < 0.0, "velocity did not reflect: {vel}");
    assert!(
        vel.x.abs() <= 120.0 * 0.8 + 1.0e-3,
        "bounce did not damp: {vel}"
    );
}

/// Repeated steps keep every value finite, with gravity, walls, and a dense
/// initial cluster all in play.
#[test]
fn extended_run_stays_finite() {
    let config = FluidConfig {
        particle_count: 64,
        smoothing_radius: 40.0,
        gravity: [0.0, -400.0],
        bounds_origin: [0.0, 0.0],
        bounds_size: [800.0, 600.0],
        ..FluidConfig::default()
    };
    let mut system = ParticleSystem::new(config).unwrap();

    for step in 0..240 {
        system.simulate(1.0 / 60.0).unwrap();
        for (i, p) in system.positions().iter().enumerate() {
            assert!(p.is_finite(), "particle {i} position {p} at step {step}");
        }
        for (i, v) in system.velocities().iter().enumerate() {
            assert!(v.is_finite(), "particle {i} velocity {v} at step {step}");
        }
    }
}

/// Cell keys cover every particle and stay within the bucket range.
#[test]
fn cell_keys_are_exposed_per_particle() {
    let config = FluidConfig {
        particle_count: 32,
        gravity: [0.0, 0.0],
        ..FluidConfig::default()
    };
    let mut system = ParticleSystem::new(config).unwrap();
    system.simulate(1.0 / 60.0).unwrap();

    let keys = system.cell_keys();
    assert_eq!(keys.len(), 32);
    for &key in keys {
        assert!((0.0..32.0).contains(&key));
    }
}
