//! Downhill simplex search with box clamping.

use ndarray::Array1;

use super::MinimizeOptions;
use crate::bounds::PairBounds;
use crate::error::Result;
use crate::objective::{checked_value, trial_value, Objective};
use crate::result::{OptimizationResult, Status};

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Relative size of the initial simplex edges.
const NONZERO_DELTA: f64 = 0.05;
/// Edge length used for coordinates that start at zero.
const ZERO_DELTA: f64 = 0.00025;

fn clamp(mut point: Array1<f64>, bounds: Option<&PairBounds>) -> Array1<f64> {
    if let Some(b) = bounds {
        b.clip(point.iter_mut());
    }
    point
}

/// `centroid + coefficient * (centroid - worst)`, clamped into the box.
fn move_from(
    centroid: &Array1<f64>,
    worst: &Array1<f64>,
    coefficient: f64,
    bounds: Option<&PairBounds>,
) -> Array1<f64> {
    clamp(centroid + &((centroid - worst) * coefficient), bounds)
}

fn initial_simplex(x0: &Array1<f64>, bounds: Option<&PairBounds>) -> Vec<Array1<f64>> {
    let n = x0.len();
    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(x0.clone());
    for k in 0..n {
        let delta = if x0[k] != 0.0 {
            NONZERO_DELTA * x0[k]
        } else {
            ZERO_DELTA
        };
        let mut vertex = x0.clone();
        vertex[k] += delta;
        let mut vertex = clamp(vertex, bounds);
        if vertex[k] == x0[k] {
            // Start sits on the bound the edge points at
            vertex[k] -= delta;
            vertex = clamp(vertex, bounds);
        }
        simplex.push(vertex);
    }
    simplex
}

/// Reorder vertices by value; ties keep their previous order.
fn sort_simplex(simplex: &mut Vec<Array1<f64>>, values: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    *simplex = order.iter().map(|&i| simplex[i].clone()).collect();
    *values = order.iter().map(|&i| values[i]).collect();
}

pub(super) fn minimize<O: Objective + ?Sized>(
    objective: &O,
    x0: &Array1<f64>,
    bounds: Option<&PairBounds>,
    options: &MinimizeOptions,
) -> Result<OptimizationResult> {
    let n = x0.len();
    // Only the start must be evaluable; other vertices may score +inf
    let f_eval = |p: &Array1<f64>| trial_value(objective, p);

    let mut simplex = initial_simplex(x0, bounds);
    let mut values = Vec::with_capacity(n + 1);
    values.push(checked_value(objective, &simplex[0])?);
    for vertex in &simplex[1..] {
        values.push(f_eval(vertex)?);
    }
    let mut nfev = n + 1;

    for iter in 0..options.max_iter {
        sort_simplex(&mut simplex, &mut values);

        let f_spread = values[n] - values[0];
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(simplex[0].iter()).map(|(a, b)| (a - b).abs()))
            .fold(0.0f64, f64::max);
        if x_spread <= options.gtol && f_spread <= options.ftol * values[0].abs().max(1.0) {
            return Ok(OptimizationResult {
                params: simplex[0].clone(),
                fun: values[0],
                status: Status::Converged,
                message: format!("Simplex size {:.2e} below tolerance", x_spread),
                nit: iter,
                nfev,
                history: Vec::new(),
            });
        }

        let centroid = simplex[..n]
            .iter()
            .fold(Array1::zeros(n), |acc, v| acc + v)
            / n as f64;
        let worst = simplex[n].clone();

        let reflected = move_from(&centroid, &worst, REFLECTION, bounds);
        let f_reflected = f_eval(&reflected)?;
        nfev += 1;

        if f_reflected < values[0] {
            let expanded = move_from(&centroid, &worst, REFLECTION * EXPANSION, bounds);
            let f_expanded = f_eval(&expanded)?;
            nfev += 1;
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
        } else if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
        } else {
            let outside = f_reflected < values[n];
            let contracted = if outside {
                move_from(&centroid, &worst, REFLECTION * CONTRACTION, bounds)
            } else {
                move_from(&centroid, &worst, -CONTRACTION, bounds)
            };
            let f_contracted = f_eval(&contracted)?;
            nfev += 1;

            let threshold = if outside { f_reflected } else { values[n] };
            if f_contracted <= threshold {
                simplex[n] = contracted;
                values[n] = f_contracted;
            } else {
                let best = simplex[0].clone();
                for i in 1..=n {
                    let shrunk = &best + &((&simplex[i] - &best) * SHRINK);
                    simplex[i] = clamp(shrunk, bounds);
                    values[i] = f_eval(&simplex[i])?;
                }
                nfev += n;
            }
        }

        log::trace!("Nelder-Mead iteration {}: best = {:.6e}", iter, values[0]);
    }

    sort_simplex(&mut simplex, &mut values);
    log::warn!(
        "Nelder-Mead reached the iteration limit ({})",
        options.max_iter
    );
    Ok(OptimizationResult {
        params: simplex[0].clone(),
        fun: values[0],
        status: Status::MaxIterations,
        message: format!("Maximum number of iterations ({}) reached", options.max_iter),
        nit: options.max_iter,
        nfev,
        history: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_initial_simplex_stays_in_box() {
        let bounds = PairBounds::new(vec![(0.0, 1.0), (0.0, 1.0)]).unwrap();
        let simplex = initial_simplex(&array![1.0, 0.0], Some(&bounds));
        assert_eq!(simplex.len(), 3);
        // Edge along x0 had to step inward from the upper bound
        assert_eq!(simplex[1], array![1.0 - NONZERO_DELTA, 0.0]);
        assert_eq!(simplex[2], array![1.0, ZERO_DELTA]);
    }

    #[test]
    fn test_sort_simplex_is_stable() {
        let mut simplex = vec![array![0.0], array![1.0], array![2.0]];
        let mut values = vec![3.0, 1.0, 1.0];
        sort_simplex(&mut simplex, &mut values);
        assert_eq!(values, vec![1.0, 1.0, 3.0]);
        assert_eq!(simplex[0], array![1.0]);
        assert_eq!(simplex[1], array![2.0]);
    }
}
