//! Dense linear-algebra helpers shared by the builder and the Kalman engine.

use crate::error::{DlmError, Result};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::warn;

/// Tolerance used when checking covariance symmetry.
pub const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Singular values below this are treated as zero by [`pinv`].
const PINV_EPS: f64 = 1e-12;

/// Stack square blocks along the diagonal of a zero matrix.
pub fn block_diag(blocks: &[&DMatrix<f64>]) -> DMatrix<f64> {
    let n: usize = blocks.iter().map(|b| b.nrows()).sum();
    let mut out = DMatrix::zeros(n, n);
    let mut offset = 0;
    for block in blocks {
        let d = block.nrows();
        out.view_mut((offset, offset), (d, d)).copy_from(*block);
        offset += d;
    }
    out
}

/// Concatenate vectors end to end.
pub fn concat(parts: &[&DVector<f64>]) -> DVector<f64> {
    let n: usize = parts.iter().map(|p| p.len()).sum();
    DVector::from_iterator(n, parts.iter().flat_map(|p| p.iter().copied()))
}

/// Whether a square matrix equals its transpose within tolerance.
pub fn is_symmetric(m: &DMatrix<f64>) -> bool {
    if m.nrows() != m.ncols() {
        return false;
    }
    let scale = m.amax().max(1.0);
    (0..m.nrows()).all(|i| {
        (0..i).all(|j| (m[(i, j)] - m[(j, i)]).abs() <= SYMMETRY_TOLERANCE * scale)
    })
}

/// Average a matrix with its transpose to remove round-off asymmetry.
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (m + m.transpose())
}

/// Moore-Penrose pseudo-inverse via SVD.
pub fn pinv(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    m.clone()
        .pseudo_inverse(PINV_EPS)
        .map_err(|e| DlmError::ComputationError(format!("pseudo-inverse failed: {}", e)))
}

/// Draw one sample from `N(mean, cov)`.
///
/// Uses the Cholesky factor when `cov` is positive definite. Singular but
/// positive semi-definite covariances (for example the zero matrix) fall back
/// to a symmetric eigendecomposition with negative eigenvalues clamped to zero.
pub fn sample_mvn<R: Rng + ?Sized>(
    mean: &DVector<f64>,
    cov: &DMatrix<f64>,
    rng: &mut R,
) -> Result<DVector<f64>> {
    let n = mean.len();
    if cov.nrows() != n || cov.ncols() != n {
        return Err(DlmError::DimensionMismatch(format!(
            "covariance is {}x{} but mean has length {}",
            cov.nrows(),
            cov.ncols(),
            n
        )));
    }

    let z = DVector::from_iterator(
        n,
        (0..n).map(|_| {
            let draw: f64 = StandardNormal.sample(rng);
            draw
        }),
    );

    let factor = match cov.clone().cholesky() {
        Some(chol) => chol.l(),
        None => {
            let eigen = symmetrize(cov).symmetric_eigen();
            let min_eig = eigen.eigenvalues.min();
            if min_eig < -SYMMETRY_TOLERANCE * cov.amax().max(1.0) {
                warn!(min_eig, "covariance is indefinite; clamping negative eigenvalues");
            }
            let roots = eigen.eigenvalues.map(|v| v.max(0.0).sqrt());
            eigen.eigenvectors * DMatrix::from_diagonal(&roots)
        }
    };

    Ok(mean + factor * z)
}
