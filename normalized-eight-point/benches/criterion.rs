use criterion::{black_box, criterion_group, criterion_main, Criterion};
use normalized_eight_point::NormalizedEightPoint;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use stereo_core::synthetic::SyntheticRig;

fn estimate(c: &mut Criterion) {
    let rig = SyntheticRig::default();
    let mut rng = Pcg64::seed_from_u64(0);
    let minimal = rig.matches(&mut rng, 8);
    let many = rig.matches(&mut rng, 4096);
    let estimator = NormalizedEightPoint::new();

    c.bench_function("eight-point minimal sample", |b| {
        b.iter(|| estimator.from_matches(black_box(minimal.iter().copied())))
    });
    c.bench_function("eight-point 4096 matches", |b| {
        b.iter(|| estimator.from_matches(black_box(many.iter().copied())))
    });
}

criterion_group!(benches, estimate);
criterion_main!(benches);
