//! Nearest-neighbour density scores for one-dimensional samples
//!
//! Local outlier factor (LOF): a score near 1.0 means the point sits in a
//! region as dense as its neighbours; scores well above 1.0 mark isolated
//! points.

use crate::{MathError, Result};

/// Added to mean reachability distances so duplicate values do not divide by zero
const DENSITY_EPSILON: f64 = 1e-10;

/// LOF score of every value, in input order, using `k` neighbours.
pub fn local_outlier_factor(values: &[f64], k: usize) -> Result<Vec<f64>> {
    if k == 0 {
        return Err(MathError::InvalidInput(
            "Neighbour count must be greater than zero".to_string(),
        ));
    }
    if values.len() <= k {
        return Err(MathError::InsufficientData(format!(
            "LOF with {} neighbours needs more than {} values, have {}",
            k,
            k,
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(MathError::InvalidInput(
            "LOF input contains non-finite values".to_string(),
        ));
    }

    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));
    let sorted: Vec<f64> = order.iter().map(|&i| values[i]).collect();

    // Neighbourhoods in sorted coordinates
    let neighbourhoods: Vec<Vec<usize>> = (0..n).map(|pos| nearest(&sorted, pos, k)).collect();
    let k_distance: Vec<f64> = (0..n)
        .map(|pos| {
            neighbourhoods[pos]
                .iter()
                .map(|&o| (sorted[pos] - sorted[o]).abs())
                .fold(0.0, f64::max)
        })
        .collect();

    let density: Vec<f64> = (0..n)
        .map(|pos| {
            let reach: f64 = neighbourhoods[pos]
                .iter()
                .map(|&o| k_distance[o].max((sorted[pos] - sorted[o]).abs()))
                .sum();
            1.0 / (reach / k as f64 + DENSITY_EPSILON)
        })
        .collect();

    let mut scores = vec![0.0; n];
    for pos in 0..n {
        let neighbour_density: f64 =
            neighbourhoods[pos].iter().map(|&o| density[o]).sum::<f64>() / k as f64;
        scores[order[pos]] = neighbour_density / density[pos];
    }

    Ok(scores)
}

/// The `k` nearest positions to `pos` in an ascending slice, excluding `pos`.
fn nearest(sorted: &[f64], pos: usize, k: usize) -> Vec<usize> {
    let mut result = Vec::with_capacity(k);
    let mut left = pos;
    let mut right = pos + 1;

    while result.len() < k {
        let left_gap = if left > 0 {
            Some(sorted[pos] - sorted[left - 1])
        } else {
            None
        };
        let right_gap = if right < sorted.len() {
            Some(sorted[right] - sorted[pos])
        } else {
            None
        };

        match (left_gap, right_gap) {
            (Some(l), Some(r)) if l <= r => {
                left -= 1;
                result.push(left);
            }
            (Some(_), Some(_)) | (None, Some(_)) => {
                result.push(right);
                right += 1;
            }
            (Some(_), None) => {
                left -= 1;
                result.push(left);
            }
            (None, None) => break,
        }
    }

    result
}
