use criterion::{criterion_group, criterion_main, Criterion};
use gpfit::kernels::SquaredExponentialKernel;
use gpfit::{GpParams, Observations};
use ndarray::{Array, Array1, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn noisy_observations(nt: usize) -> Observations<f64> {
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let x = Array::linspace(0., 10., nt);
    let sigma = Array1::from_elem(nt, 0.2);
    let noise = Array::random_using(nt, Normal::new(0., 0.2).unwrap(), &mut rng);
    let y = x.mapv(|v| v * (v / 2.).sin()) + noise;
    Observations::from_1d(&x, &y, &sigma).expect("valid observations")
}

fn criterion_gp(c: &mut Criterion) {
    let nts = [20, 50, 100, 200];

    let mut group = c.benchmark_group("gp");
    group.sample_size(20);
    for nt in nts {
        let obs = noisy_observations(nt);
        group.bench_function(format!("fit {nt}"), |b| {
            b.iter(|| {
                std::hint::black_box(
                    GpParams::new(SquaredExponentialKernel())
                        .length_scale_bounds((0.01, 100.))
                        .n_restarts_optimizer(4)
                        .fit_observations(&obs)
                        .expect("GP fit error"),
                )
            });
        });

        let reg = GpParams::new(SquaredExponentialKernel())
            .fit_observations(&obs)
            .expect("GP fit error");
        let xgrid = Array::linspace(-1., 11., 200).insert_axis(Axis(1));
        group.bench_function(format!("predict {nt}"), |b| {
            b.iter(|| std::hint::black_box(reg.predict(&xgrid).expect("GP prediction")));
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_gp);
criterion_main!(benches);
