use faer::Mat;
use zero_inflated_models::{
    CountModelInput, MleMethod, MleOptions, PenaltyWeights, PredictionData, PredictionMode,
    RegularizedOptions, ZeroInflatedPoisson, fit, fit_regularized,
};

fn main() {
    let n = 200;
    let design_matrix = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i % 10) / 10.0 });
    let inflation_design = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i % 2) });
    let outcome = Mat::from_fn(n, 1, |i, _| {
        if i % 2 == 1 && i % 3 == 0 {
            0.0
        } else {
            idx_to_f64((i * 7) % 5)
        }
    });

    let input = CountModelInput::new(design_matrix, outcome).with_inflation_design(inflation_design);
    let model = ZeroInflatedPoisson::from_input(&input).expect("model");

    let results = fit(
        &model,
        &MleOptions {
            method: MleMethod::Newton,
            ..MleOptions::default()
        },
    )
    .expect("fit");
    println!(
        "method: {}, iterations: {}, converged: {}, loglike: {:.3}",
        results.method, results.iterations, results.converged, results.loglike
    );
    if let Some(intervals) = results.conf_int(0.05) {
        for (i, ci) in intervals.iter().enumerate() {
            println!(
                "param {i}: {:.3} [{:.3}, {:.3}]",
                results.params[(i, 0)],
                ci.lower,
                ci.upper
            );
        }
    }
    let criteria = results.information_criteria();
    println!("aic: {:.2}, bic: {:.2}", criteria.aic, criteria.bic);

    let data = PredictionData::default();
    for mode in PredictionMode::ALL {
        if mode == PredictionMode::Prob {
            continue;
        }
        let values = model
            .predict(&results.params, &data, mode)
            .expect("predict")
            .into_matrix();
        println!("first {mode}: {:.3}", values[(0, 0)]);
    }

    let penalized = fit_regularized(
        &model,
        "l1",
        &RegularizedOptions {
            alpha: PenaltyWeights::Uniform(2.0),
            ..RegularizedOptions::default()
        },
    )
    .expect("l1 fit");
    println!(
        "l1 params: {:?}",
        (0..penalized.params.nrows())
            .map(|i| penalized.params[(i, 0)])
            .collect::<Vec<_>>()
    );
}

fn idx_to_f64(idx: usize) -> f64 {
    f64::from(u32::try_from(idx).unwrap_or(u32::MAX))
}
