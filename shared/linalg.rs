use dyn_stack::{MemBuffer, MemStack};
use faer::diag::{Diag, DiagRef};
use faer::linalg::solvers;
use faer::linalg::svd::{self, ComputeSvdVectors};
use faer::{Mat, MatRef, Side, get_global_parallelism};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("SVD failed to converge")]
    SvdNoConvergence,
    #[error("Self-adjoint eigendecomposition failed: {0:?}")]
    SelfAdjointEigen(solvers::EvdError),
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

fn diag_to_array(diag: DiagRef<'_, f64>) -> Array1<f64> {
    let mat = diag.column_vector().as_mat();
    Array1::from_shape_fn(mat.nrows(), |i| mat[(i, 0)])
}

enum FaerStorage<'a> {
    Borrowed(MatRef<'a, f64>),
    Owned(Mat<f64>),
}

impl<'a> FaerStorage<'a> {
    #[inline]
    fn as_ref(&self) -> MatRef<'_, f64> {
        match self {
            FaerStorage::Borrowed(view) => *view,
            FaerStorage::Owned(mat) => mat.as_ref(),
        }
    }
}

/// Zero-copy faer view over an ndarray matrix when the layout allows it.
pub struct FaerArrayView<'a> {
    storage: FaerStorage<'a>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let storage = match array.as_slice_memory_order() {
            Some(slice) if array.is_standard_layout() => FaerStorage::Borrowed(
                MatRef::from_row_major_slice(slice, array.nrows(), array.ncols()),
            ),
            Some(slice) if array.t().is_standard_layout() => FaerStorage::Borrowed(
                MatRef::from_column_major_slice(slice, array.nrows(), array.ncols()),
            ),
            _ => {
                let (rows, cols) = array.dim();
                FaerStorage::Owned(Mat::from_fn(rows, cols, |i, j| array[(i, j)]))
            }
        };
        Self { storage }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        self.storage.as_ref()
    }
}

/// Singular values plus right singular vectors, returned as `(s, vt)` where
/// row `k` of `vt` pairs with `s[k]`. Singular values are non-increasing.
pub trait RightSvd {
    fn right_svd(&self) -> Result<(Array1<f64>, Array2<f64>), LinalgError>;
}

impl<S: Data<Elem = f64>> RightSvd for ArrayBase<S, Ix2> {
    fn right_svd(&self) -> Result<(Array1<f64>, Array2<f64>), LinalgError> {
        let faer_view = FaerArrayView::new(self);
        let faer_mat = faer_view.as_ref();
        let (rows, cols) = faer_mat.shape();

        let mut singular = Diag::<f64>::zeros(rows.min(cols));
        let mut v_storage = Mat::<f64>::zeros(cols, cols);

        let par = get_global_parallelism();
        let mut mem = MemBuffer::new(svd::svd_scratch::<f64>(
            rows,
            cols,
            ComputeSvdVectors::No,
            ComputeSvdVectors::Full,
            par,
            Default::default(),
        ));
        let mut stack = MemStack::new(&mut mem);

        svd::svd(
            faer_mat,
            singular.as_mut(),
            None,
            Some(v_storage.as_mut()),
            par,
            &mut stack,
            Default::default(),
        )
        .map_err(|_| LinalgError::SvdNoConvergence)?;

        let singular_values = diag_to_array(singular.as_ref());
        let v_ref = v_storage.as_ref();
        let vt = Array2::from_shape_fn((v_ref.ncols(), v_ref.nrows()), |(i, j)| v_ref[(j, i)]);
        Ok((singular_values, vt))
    }
}

pub trait SymmetricEigen {
    /// Eigenvalues in ascending order with matching eigenvector columns.
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), LinalgError>;
}

impl<S: Data<Elem = f64>> SymmetricEigen for ArrayBase<S, Ix2> {
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), LinalgError> {
        let faer_view = FaerArrayView::new(self);
        let eigen = faer_view
            .as_ref()
            .self_adjoint_eigen(side)
            .map_err(LinalgError::SelfAdjointEigen)?;
        let values = diag_to_array(eigen.S());
        let vectors = mat_to_array(eigen.U());
        Ok((values, vectors))
    }
}

/// The `count` largest eigenpairs of a symmetric matrix, largest first.
///
/// Negative eigenvalues produced by round-off on a positive semi-definite input
/// are clipped to zero. Fewer than `count` pairs are returned when the matrix is
/// smaller than requested.
pub fn leading_eigenpairs(
    matrix: &Array2<f64>,
    count: usize,
) -> Result<(Array1<f64>, Array2<f64>), LinalgError> {
    let n = matrix.nrows();
    let keep = count.min(n);
    if keep == 0 {
        return Ok((Array1::zeros(0), Array2::zeros((n, 0))));
    }
    let (values, vectors) = matrix.eigh(Side::Lower)?;
    let mut idxs: Vec<usize> = (0..values.len()).collect();
    idxs.sort_by(|&i, &j| values[j].total_cmp(&values[i]));

    let mut top_values = Array1::zeros(keep);
    let mut top_vectors = Array2::zeros((n, keep));
    for (slot, &idx) in idxs.iter().take(keep).enumerate() {
        top_values[slot] = values[idx].max(0.0);
        top_vectors.column_mut(slot).assign(&vectors.column(idx));
    }
    Ok((top_values, top_vectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn right_svd_recovers_rank_one_axis() {
        // rows are multiples of [3, 4] so the leading right vector is ±[0.6, 0.8]
        let m = array![[3.0, 4.0], [6.0, 8.0], [-3.0, -4.0]];
        let (s, vt) = m.right_svd().unwrap();
        assert_abs_diff_eq!(s[0], (1.0_f64 + 4.0 + 1.0).sqrt() * 5.0, epsilon = 1e-10);
        assert_abs_diff_eq!(s[1], 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(vt[(0, 0)].abs(), 0.6, epsilon = 1e-10);
        assert_abs_diff_eq!(vt[(0, 1)].abs(), 0.8, epsilon = 1e-10);
        assert!(vt[(0, 0)] * vt[(0, 1)] > 0.0);
    }

    #[test]
    fn leading_eigenpairs_are_sorted_descending() {
        let m = array![[2.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 1.0]];
        let (values, vectors) = leading_eigenpairs(&m, 2).unwrap();
        assert_eq!(values.len(), 2);
        assert_abs_diff_eq!(values[0], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vectors[(1, 0)].abs(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vectors[(0, 1)].abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn leading_eigenpairs_caps_request_at_dimension() {
        let m = array![[1.0]];
        let (values, vectors) = leading_eigenpairs(&m, 2).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(vectors.dim(), (1, 1));
    }
}
