use faer::Mat;

#[must_use]
pub fn map_mat(values: &Mat<f64>, f: impl Fn(f64) -> f64) -> Mat<f64> {
    Mat::from_fn(values.nrows(), values.ncols(), |i, j| f(values[(i, j)]))
}

/// `X[rows]^T v`: columns of `matrix` restricted to `rows`, weighted by `weight(row)`.
#[must_use]
pub fn rows_transpose_mul(
    matrix: &Mat<f64>,
    rows: &[usize],
    weight: impl Fn(usize) -> f64,
) -> Mat<f64> {
    let mut out = Mat::<f64>::zeros(matrix.ncols(), 1);
    for &row in rows {
        let w = weight(row);
        for col in 0..matrix.ncols() {
            out[(col, 0)] += matrix[(row, col)] * w;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_transpose_mul_uses_only_selected_rows() {
        let matrix = Mat::from_fn(3, 2, |i, j| if j == 0 { 1.0 } else { f64::from(u8::try_from(i).unwrap_or(0)) });
        let out = rows_transpose_mul(&matrix, &[0, 2], |row| if row == 0 { 2.0 } else { 3.0 });
        assert!((out[(0, 0)] - 5.0).abs() < 1e-12);
        assert!((out[(1, 0)] - 6.0).abs() < 1e-12);
    }
}
