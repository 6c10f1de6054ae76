use gpfit::kernels::SquaredExponentialKernel;
use gpfit::{GpParams, Observations};
use ndarray::{array, concatenate, Array, Axis};

fn main() {
    env_logger::init();

    let x = array![1., 3., 5., 6., 7., 8.];
    let y = x.mapv(|v: f64| v * v.sin());
    let sigma = array![0.5, 0.5, 0.3, 0.5, 0.5, 0.5];
    let obs = Observations::from_1d(&x, &y, &sigma).expect("valid observations");

    println!("Fit GP on noisy observations of 'x.sin(x)' at {x}");
    let reg = GpParams::new(SquaredExponentialKernel())
        .length_scale_bounds((1e-2, 1e3))
        .n_restarts_optimizer(9)
        .random_seed(0)
        .fit_observations(&obs)
        .expect("GP fitting");
    println!("{}", reg.gp());
    println!("Fitted length scale = {}", reg.length_scale());

    let xgrid = Array::linspace(0., 10., 21).insert_axis(Axis(1));
    let pred = reg.predict(&xgrid).expect("GP prediction");
    println!("Posterior (x, mean(x), std(x))");
    println!(
        "{}",
        concatenate![
            Axis(1),
            xgrid,
            pred.mean.insert_axis(Axis(1)),
            pred.std.insert_axis(Axis(1))
        ]
    );

    let samples = reg.sample(&xgrid, 3).expect("GP sampling");
    println!("Posterior samples (one per row)");
    println!("{samples:.3}");
}
