//! Localization benchmarks.
//!
//! Covers the CPU-heavy paths: likelihood-field construction, motion
//! sampling, scan scoring and adaptive resampling.
//!
//! Run with: `cargo bench`
//! View HTML reports in: `target/criterion/`

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use dhruva_amcl::{
    Covariance3, LaserModelParams, LikelihoodFieldModel, MotionModel, OccState, OccupancyMap,
    OdomData, OdomModelKind, ParticleFilter, PlanarScan, Pose2D, ScanBeam,
};

/// 200×200 cell office-like map with perimeter walls and a few pillars.
fn bench_map() -> OccupancyMap {
    let mut map = OccupancyMap::new(200, 200, 0.05, 0.0, 0.0);
    for j in 0..200 {
        for i in 0..200 {
            map.set_occ_state(i, j, OccState::Free);
        }
    }
    for i in 0..200 {
        map.set_occ_state(i, 0, OccState::Occupied);
        map.set_occ_state(i, 199, OccState::Occupied);
        map.set_occ_state(0, i, OccState::Occupied);
        map.set_occ_state(199, i, OccState::Occupied);
    }
    for &(ci, cj) in &[(50, 50), (150, 60), (80, 140)] {
        for dj in 0..8 {
            for di in 0..8 {
                map.set_occ_state(ci + di, cj + dj, OccState::Occupied);
            }
        }
    }
    map
}

fn bench_scan(map: &OccupancyMap) -> PlanarScan {
    let beams = (0..360)
        .map(|k| {
            let bearing = (k as f64).to_radians() - std::f64::consts::PI;
            let range = map.calc_range(0.0, 0.0, bearing, 10.0);
            ScanBeam { range, bearing }
        })
        .collect();
    PlanarScan {
        timestamp_us: 0,
        sensor_pose: Pose2D::identity(),
        range_max: 10.0,
        beams,
    }
}

fn bench_update_cspace(c: &mut Criterion) {
    c.bench_function("update_cspace_200x200", |b| {
        b.iter(|| {
            let mut map = bench_map();
            map.update_cspace(black_box(2.0));
            black_box(map.occ_dist(100, 100))
        })
    });
}

fn bench_motion_model(c: &mut Criterion) {
    let model = MotionModel::new(OdomModelKind::Diff, [0.2, 0.2, 0.2, 0.2, 0.2]);
    let mut rng = StdRng::seed_from_u64(1);
    let mut pf = ParticleFilter::new(2000, 2000, 0.001, 0.1);
    pf.init(
        Pose2D::identity(),
        Covariance3::diagonal(0.25, 0.25, 0.07),
        &mut rng,
    );
    let data = OdomData {
        pose: Pose2D::new(0.3, 0.1, 0.05),
        delta: Pose2D::new(0.3, 0.1, 0.05),
        absolute_motion: Pose2D::identity(),
    };

    c.bench_function("motion_diff_2000_particles", |b| {
        b.iter(|| {
            model.sample_all(pf.current_samples_mut(), black_box(&data), &mut rng);
        })
    });
}

fn bench_sensor_model(c: &mut Criterion) {
    let mut map = bench_map();
    map.update_cspace(2.0);
    let scan = bench_scan(&map);
    let model = LikelihoodFieldModel::new(LaserModelParams {
        max_beams: 60,
        ..LaserModelParams::default()
    });

    let mut rng = StdRng::seed_from_u64(2);
    let mut pf = ParticleFilter::new(2000, 2000, 0.001, 0.1);
    pf.init(
        Pose2D::identity(),
        Covariance3::diagonal(0.25, 0.25, 0.07),
        &mut rng,
    );

    c.bench_function("likelihood_field_2000_particles_60_beams", |b| {
        b.iter(|| {
            let total = model.apply_to_samples(&map, &scan, pf.current_samples_mut());
            black_box(total)
        })
    });
}

fn bench_resample(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(3);

    c.bench_function("kld_resample_500_particles", |b| {
        b.iter(|| {
            let mut pf = ParticleFilter::new(500, 2000, 0.001, 0.1);
            pf.init(
                Pose2D::identity(),
                Covariance3::diagonal(0.25, 0.25, 0.07),
                &mut rng,
            );
            pf.update_resample(&mut rng, None);
            black_box(pf.current_set().samples().len())
        })
    });
}

criterion_group!(
    benches,
    bench_update_cspace,
    bench_motion_model,
    bench_sensor_model,
    bench_resample
);
criterion_main!(benches);
