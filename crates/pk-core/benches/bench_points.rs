use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pk_core::{ops, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_cloud(b: usize, n: usize, seed: u64) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..b * n * 3).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Tensor::from_array(
        ndarray::Array::from_shape_vec((b, n, 3), data)
            .unwrap()
            .into_dyn(),
    )
}

fn bench_farthest_point_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("farthest_point_sample");
    for &n in &[256usize, 1024] {
        let points = random_cloud(2, n, 7);
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |bch, points| {
            bch.iter(|| ops::farthest_point_sample(black_box(points), n / 8).unwrap());
        });
    }
    group.finish();
}

fn bench_ball_point(c: &mut Criterion) {
    let points = random_cloud(2, 1024, 11);
    let queries = random_cloud(2, 128, 13);
    c.bench_function("ball_point_1024x128", |bch| {
        bch.iter(|| ops::ball_point(black_box(&points), black_box(&queries), 0.2, 32).unwrap());
    });
}

fn bench_three_nn(c: &mut Criterion) {
    let points = random_cloud(2, 1024, 17);
    let queries = random_cloud(2, 256, 19);
    c.bench_function("three_nn_1024x256", |bch| {
        bch.iter(|| ops::three_nn(black_box(&points), black_box(&queries)).unwrap());
    });
}

fn bench_gather_points(c: &mut Criterion) {
    let points = random_cloud(2, 1024, 23);
    let mut rng = StdRng::seed_from_u64(29);
    let idx: Vec<i32> = (0..2 * 256).map(|_| rng.gen_range(0..1024)).collect();
    let indices = Tensor::from_i32(
        ndarray::Array::from_shape_vec((2, 256), idx)
            .unwrap()
            .into_dyn(),
    );
    c.bench_function("gather_points_1024x256", |bch| {
        bch.iter(|| ops::gather_points(black_box(&points), black_box(&indices)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_farthest_point_sample,
    bench_ball_point,
    bench_three_nn,
    bench_gather_points
);
criterion_main!(benches);
