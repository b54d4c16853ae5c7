//! Linear least squares
//!
//! Solves `min ||X b - y||` through the normal equations with column scaling
//! and Gaussian elimination with partial pivoting. Model matrices in this
//! workspace have at most a few dozen columns, so the normal equations are
//! accurate enough once columns are brought to a common scale.

use crate::{MathError, Result};

/// Relative pivot size below which the system is treated as singular
const SINGULAR_PIVOT: f64 = 1e-12;

/// Ordinary least squares coefficients for the design `rows` (one row per
/// observation) and response `y`.
pub fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> Result<Vec<f64>> {
    if rows.len() != y.len() {
        return Err(MathError::InvalidInput(format!(
            "Design has {} rows but response has {} values",
            rows.len(),
            y.len()
        )));
    }
    let columns = rows.first().map(|r| r.len()).unwrap_or(0);
    if columns == 0 {
        return Err(MathError::InvalidInput(
            "Design matrix has no columns".to_string(),
        ));
    }
    if rows.iter().any(|r| r.len() != columns) {
        return Err(MathError::InvalidInput(
            "Design matrix rows differ in length".to_string(),
        ));
    }
    if rows.len() < columns {
        return Err(MathError::InsufficientData(format!(
            "Need at least {} observations for {} coefficients, have {}",
            columns,
            columns,
            rows.len()
        )));
    }

    // Column scaling keeps intercepts and large-valued regressors comparable
    let mut scales = vec![0.0_f64; columns];
    for row in rows {
        for (scale, value) in scales.iter_mut().zip(row.iter()) {
            *scale = scale.max(value.abs());
        }
    }
    for scale in scales.iter_mut() {
        if *scale == 0.0 {
            *scale = 1.0;
        }
    }

    let mut xtx = vec![vec![0.0; columns]; columns];
    let mut xty = vec![0.0; columns];

    for (row, &target) in rows.iter().zip(y.iter()) {
        for i in 0..columns {
            let xi = row[i] / scales[i];
            xty[i] += xi * target;
            for j in i..columns {
                xtx[i][j] += xi * row[j] / scales[j];
            }
        }
    }
    for i in 0..columns {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
    }

    let scaled = solve_linear_system(xtx, xty)?;

    let coefficients: Vec<f64> = scaled
        .iter()
        .zip(scales.iter())
        .map(|(b, s)| b / s)
        .collect();

    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(MathError::CalculationError(
            "Least squares produced non-finite coefficients".to_string(),
        ));
    }

    Ok(coefficients)
}

/// Solve the square system `a x = b` by Gaussian elimination with partial
/// pivoting.
pub fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(MathError::InvalidInput(
            "Linear system must be square and match the right-hand side".to_string(),
        ));
    }

    let magnitude = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
        .max(1.0);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);

        if a[pivot_row][col].abs() < SINGULAR_PIVOT * magnitude {
            return Err(MathError::CalculationError(format!(
                "Singular system: column {} has no usable pivot",
                col
            )));
        }

        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_exact_linear_model() {
        // y = 2 + 3 x1 - 0.5 x2
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let x1 = i as f64;
                let x2 = ((i * 7) % 5) as f64 * 1000.0;
                vec![1.0, x1, x2]
            })
            .collect();
        let y: Vec<f64> = rows.iter().map(|r| 2.0 + 3.0 * r[1] - 0.5 * r[2]).collect();

        let coefficients = least_squares(&rows, &y).unwrap();
        assert!((coefficients[0] - 2.0).abs() < 1e-6);
        assert!((coefficients[1] - 3.0).abs() < 1e-8);
        assert!((coefficients[2] + 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_collinear_design_is_singular() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| i as f64).collect();

        assert!(matches!(
            least_squares(&rows, &y),
            Err(MathError::CalculationError(_))
        ));
    }

    #[test]
    fn test_underdetermined_design_is_insufficient() {
        let rows = vec![vec![1.0, 2.0, 3.0]];
        assert!(matches!(
            least_squares(&rows, &[1.0]),
            Err(MathError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_solve_small_system() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve_linear_system(a, vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
    }
}
