//! Principal eigenvector by power iteration
//!
//! Used to turn cooperation matrices into centrality ratings. The solver
//! starts from the all-ones vector, so a non-negative matrix converges to
//! its Perron vector.

use crate::error::{Error, Result};

/// Default convergence threshold on successive iterates
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Estimated principal eigenvector and its Rayleigh-quotient eigenvalue
#[derive(Clone, Debug, PartialEq)]
pub struct Eigenpair {
    /// Unit-length eigenvector estimate
    pub vector: Vec<f64>,
    pub value: f64,
    /// Matrix-vector products performed
    pub iterations: usize,
}

impl Eigenpair {
    /// True when the input had no principal direction (e.g. the zero matrix)
    pub fn is_degenerate(&self) -> bool {
        self.value.is_nan() || self.vector.iter().any(|x| x.is_nan())
    }
}

/// Power-iteration solver configuration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerIteration {
    /// Stop once successive iterates are closer than this (Euclidean)
    pub tolerance: f64,
    /// Stop after this many products; unbounded when `None`
    pub max_iterations: Option<usize>,
}

impl Default for PowerIteration {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: None,
        }
    }
}

impl PowerIteration {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            max_iterations: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Estimate the principal eigenpair of a square matrix.
    ///
    /// The all-zero matrix yields NaN components. That is reported through
    /// `Eigenpair::is_degenerate` rather than masked.
    ///
    /// # Arguments
    /// * `matrix` - Row-major square matrix
    pub fn solve(&self, matrix: &[Vec<f64>]) -> Result<Eigenpair> {
        let n = matrix.len();
        if matrix.iter().any(|row| row.len() != n) {
            return Err(Error::NotSquare);
        }

        let mut last = vec![1.0; n];
        let mut iterations = 0;
        let vector = loop {
            let vector = normalise(&multiply(matrix, &last));
            iterations += 1;
            let error = distance(&vector, &last);
            // NaN is a fixed point; iterating further cannot recover
            if error < self.tolerance || error.is_nan() {
                break vector;
            }
            if self.max_iterations.is_some_and(|cap| iterations >= cap) {
                break vector;
            }
            last = vector;
        };

        let value = dot(&multiply(matrix, &vector), &vector) / dot(&vector, &vector);
        let pair = Eigenpair {
            vector,
            value,
            iterations,
        };
        if pair.is_degenerate() {
            log::warn!("power iteration on a degenerate {}x{} matrix", n, n);
        }
        Ok(pair)
    }
}

// ──────────────────────────── Internal helpers ────────────────────────────

fn multiply(matrix: &[Vec<f64>], vector: &[f64]) -> Vec<f64> {
    matrix.iter().map(|row| dot(row, vector)).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalise(vector: &[f64]) -> Vec<f64> {
    let norm = dot(vector, vector).sqrt();
    vector.iter().map(|x| x / norm).collect()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn test_symmetric_two_by_two() {
        let pair = PowerIteration::default()
            .solve(&[vec![2.0, 1.0], vec![1.0, 2.0]])
            .unwrap();
        assert!((pair.value - 3.0).abs() < EPS);
        let expected = 1.0 / 2f64.sqrt();
        assert!((pair.vector[0] - expected).abs() < EPS);
        assert!((pair.vector[1] - expected).abs() < EPS);
        assert!(!pair.is_degenerate());
    }

    #[test]
    fn test_identity() {
        let identity = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
        let pair = PowerIteration::default().solve(&identity).unwrap();
        assert!((pair.value - 1.0).abs() < EPS);
        for x in &pair.vector {
            assert!((x - 1.0 / 3f64.sqrt()).abs() < EPS);
        }
    }

    #[test]
    fn test_dominant_direction() {
        // Eigenvalues 5 and 2; principal vector proportional to (1, 1)
        let pair = PowerIteration::default()
            .solve(&[vec![4.0, 1.0], vec![2.0, 3.0]])
            .unwrap();
        assert!((pair.value - 5.0).abs() < EPS);
        assert!((pair.vector[0] - pair.vector[1]).abs() < EPS);
    }

    #[test]
    fn test_unit_length() {
        let matrix = vec![
            vec![1.0, 2.0, 0.5],
            vec![0.3, 4.0, 1.0],
            vec![2.0, 0.0, 3.0],
        ];
        let pair = PowerIteration::default().solve(&matrix).unwrap();
        let norm: f64 = pair.vector.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < EPS);
        assert!(pair.vector.iter().all(|x| *x > 0.0));
    }

    #[test]
    fn test_zero_matrix_is_degenerate() {
        let pair = PowerIteration::default()
            .solve(&[vec![0.0, 0.0], vec![0.0, 0.0]])
            .unwrap();
        assert!(pair.is_degenerate());
        assert!(pair.value.is_nan());
        assert_eq!(pair.iterations, 1);
    }

    #[test]
    fn test_iteration_cap() {
        // Slow mixing matrix; the cap stops it before the tolerance would
        let solver = PowerIteration::new(1e-12).with_max_iterations(10);
        let pair = solver
            .solve(&[vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0], vec![1.0, 0.0, 1.0]])
            .unwrap();
        assert!(pair.iterations <= 10);
    }

    #[test]
    fn test_not_square() {
        let err = PowerIteration::default()
            .solve(&[vec![1.0, 2.0], vec![3.0]])
            .unwrap_err();
        assert!(matches!(err, Error::NotSquare));
    }
}
