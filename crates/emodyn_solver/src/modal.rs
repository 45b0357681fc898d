//! Modal decomposition for the matrix exponential of linear coupling.
//!
//! exp(W·t) = V · diag(e^{λ·t}) · V⁻¹
//!
//! Computed in complex arithmetic so oscillatory couplings (complex
//! eigenvalue pairs) are handled; the propagated state is the real part.
//! Only diagonalizable matrices are accepted. Jordan blocks are rejected
//! and the caller falls back to numerical integration.

use nalgebra::{Complex, DMatrix, DVector};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModalError {
    #[error("matrix is not square ({rows}x{cols})")]
    NotSquare { rows: usize, cols: usize },

    /// Geometric multiplicity below algebraic multiplicity.
    #[error(
        "eigenvalue {eigenvalue} has multiplicity {multiplicity} but only {independent} \
         independent eigenvectors (matrix is defective)"
    )]
    Defective {
        eigenvalue: Complex<f64>,
        multiplicity: usize,
        independent: usize,
    },

    /// Eigenvectors nearly parallel: the matrix is defective or close to it.
    #[error(
        "eigenvector matrix is ill-conditioned (singular value ratio {ratio:.3e}, \
         matrix is defective or nearly so)"
    )]
    IllConditioned { ratio: f64 },

    /// A recovered mode does not reproduce the eigenvalue it was computed for.
    #[error(
        "mode for eigenvalue {expected} has Rayleigh quotient {found} \
         (matrix is defective or nearly so)"
    )]
    EigenvalueMismatch {
        expected: Complex<f64>,
        found: Complex<f64>,
    },

    #[error("eigen-decomposition does not reproduce the matrix (residual {residual:.3e})")]
    Residual { residual: f64 },
}

/// `W = V·Λ·V⁻¹` for a diagonalizable real matrix.
#[derive(Debug, Clone)]
pub struct ModalDecomposition {
    eigenvalues: DVector<Complex<f64>>,
    modes: DMatrix<Complex<f64>>,
    inverse: DMatrix<Complex<f64>>,
}

impl ModalDecomposition {
    /// Decompose `a`, accepting it only if diagonalizable within `tolerance`.
    ///
    /// Eigenvalues are merged only when they agree to `tolerance` relative to
    /// their own magnitude. Every other check is relative to `‖a‖_F`.
    pub fn new(a: &DMatrix<f64>, tolerance: f64) -> Result<Self, ModalError> {
        if !a.is_square() {
            return Err(ModalError::NotSquare {
                rows: a.nrows(),
                cols: a.ncols(),
            });
        }
        let n = a.nrows();
        let gate = tolerance * a.norm();

        let eigenvalues = a.complex_eigenvalues();
        let clusters = cluster(&eigenvalues, tolerance);

        let ac: DMatrix<Complex<f64>> = a.map(|x| Complex::new(x, 0.0));
        let mut modes = DMatrix::<Complex<f64>>::zeros(n, n);
        let mut lambdas = DVector::<Complex<f64>>::zeros(n);
        let mut col = 0;

        for members in &clusters {
            let multiplicity = members.len();
            let center = members.iter().map(|&i| eigenvalues[i]).sum::<Complex<f64>>()
                / multiplicity as f64;

            // Null space of (W - λI): right singular vectors with the smallest singular values.
            let shifted = &ac - DMatrix::from_diagonal_element(n, n, center);
            let svd = shifted.svd(false, true);
            let Some(v_t) = svd.v_t else {
                return Err(ModalError::Defective {
                    eigenvalue: center,
                    multiplicity,
                    independent: 0,
                });
            };
            let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
            order.sort_by(|&p, &q| {
                svd.singular_values[p]
                    .partial_cmp(&svd.singular_values[q])
                    .unwrap_or(Ordering::Equal)
            });

            let independent = order
                .iter()
                .take(multiplicity)
                .take_while(|&&i| svd.singular_values[i] <= gate)
                .count();
            if independent < multiplicity {
                return Err(ModalError::Defective {
                    eigenvalue: center,
                    multiplicity,
                    independent,
                });
            }

            for &i in order.iter().take(multiplicity) {
                let v: DVector<Complex<f64>> = v_t.row(i).adjoint();
                let lambda = v.dotc(&(&ac * &v)) / v.dotc(&v);
                if !((lambda - center).norm() <= gate) {
                    return Err(ModalError::EigenvalueMismatch {
                        expected: center,
                        found: lambda,
                    });
                }
                modes.set_column(col, &v);
                lambdas[col] = lambda;
                col += 1;
            }
        }

        let singular = modes.clone().svd(false, false).singular_values;
        let ratio = singular.min() / singular.max().max(f64::MIN_POSITIVE);
        if !(ratio >= tolerance.sqrt()) {
            return Err(ModalError::IllConditioned { ratio });
        }

        let residual = (&ac * &modes - &modes * DMatrix::from_diagonal(&lambdas)).camax();
        if !(residual <= gate) {
            return Err(ModalError::Residual { residual });
        }

        let Some(inverse) = modes.clone().try_inverse() else {
            return Err(ModalError::IllConditioned { ratio });
        };

        tracing::debug!(dimension = n, clusters = clusters.len(), "modal decomposition ready");
        Ok(Self {
            eigenvalues: lambdas,
            modes,
            inverse,
        })
    }

    pub fn eigenvalues(&self) -> &DVector<Complex<f64>> {
        &self.eigenvalues
    }

    /// exp(W·t)
    pub fn exp(&self, t: f64) -> DMatrix<f64> {
        let growth = DMatrix::from_diagonal(&self.eigenvalues.map(|l| (l * t).exp()));
        (&self.modes * growth * &self.inverse).map(|z| z.re)
    }

    /// `exp(W·t)·x0` at every time, sharing the modal coefficients `V⁻¹·x0`.
    pub fn propagate(&self, x0: &[f64], times: &[f64]) -> Vec<Vec<f64>> {
        let n = self.eigenvalues.len();
        let x0 = DVector::from_iterator(n, x0.iter().map(|&v| Complex::new(v, 0.0)));
        let coefficients = &self.inverse * x0;
        times
            .iter()
            .map(|&t| {
                let weighted = DVector::from_iterator(
                    n,
                    (0..n).map(|j| coefficients[j] * (self.eigenvalues[j] * t).exp()),
                );
                (&self.modes * weighted).iter().map(|z| z.re).collect()
            })
            .collect()
    }
}

/// Group eigenvalues that agree with a cluster's first member to `tolerance`
/// relative to the larger magnitude. Exact repeats (including 0) always merge.
fn cluster(eigenvalues: &DVector<Complex<f64>>, tolerance: f64) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for (i, lambda) in eigenvalues.iter().enumerate() {
        let repeats = |first: &Complex<f64>| {
            (first - lambda).norm() <= tolerance * first.norm().max(lambda.norm())
        };
        match clusters
            .iter_mut()
            .find(|members| repeats(&eigenvalues[members[0]]))
        {
            Some(members) => members.push(i),
            None => clusters.push(vec![i]),
        }
    }
    clusters
}
