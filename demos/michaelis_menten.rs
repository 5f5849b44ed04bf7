//! Fit the Michaelis-Menten model with every adapter and print the results.
//!
//! Run with `cargo run --example michaelis_menten [config.json]`. Without an
//! argument the default configuration is used: `km = 0.1`, `vmax = 0.5`,
//! seven substrate concentrations and 10% relative noise.

use mmfit_rs::{FitConfig, FitSession, MichaelisMenten};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => FitConfig::from_json_file(path)?,
        None => FitConfig::default(),
    };

    println!("Michaelis-Menten fitting example");
    println!("================================\n");
    println!("true parameters (km, vmax): {:?}", config.true_params);
    println!("noise: {:?}, loss: {}\n", config.noise, config.loss);

    let model = MichaelisMenten;
    let session = FitSession::new(&model, config)?;

    println!("observations:");
    for (s, v) in session.dataset().x().iter().zip(session.dataset().y().iter()) {
        println!("  s = {:>6.3}  v = {:>8.5}", s, v);
    }
    println!();

    let report = session.run()?;
    println!("{}", report);

    print!("{}", report.curve_fit);
    let errors = report.curve_fit.std_errors();
    println!("  km   = {:.4} +/- {:.4}", report.curve_fit.params[0], errors[0]);
    println!("  vmax = {:.4} +/- {:.4}\n", report.curve_fit.params[1], errors[1]);

    for (label, result) in [
        ("minimize", &report.local),
        ("basin_hopping", &report.basin_hopping),
        ("differential_evolution", &report.differential_evolution),
    ] {
        println!("{}: {} ({} evaluations)", label, result.status, result.nfev);
    }
    println!();

    // Curves as CSV for an external plotter
    print!("s");
    if report.truth.is_some() {
        print!(",truth");
    }
    for (label, _) in &report.curves {
        print!(",{}", label);
    }
    println!();

    let grid = session.curve_grid();
    for (i, s) in grid.iter().enumerate() {
        print!("{:.5}", s);
        if let Some(truth) = &report.truth {
            print!(",{:.6}", truth.y[i]);
        }
        for (_, curve) in &report.curves {
            print!(",{:.6}", curve.y[i]);
        }
        println!();
    }

    Ok(())
}
