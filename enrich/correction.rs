/// Benjamini-Hochberg adjusted p-values, in input order.
///
/// NaN p-values are left out of the family and come back as NaN. Adjusted
/// values are monotone in the raw p-value order and clamped to 1.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..p_values.len())
        .filter(|&i| !p_values[i].is_nan())
        .collect();
    let mut adjusted = vec![f64::NAN; p_values.len()];
    if order.is_empty() {
        return adjusted;
    }
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let m = order.len() as f64;
    let mut prev = f64::INFINITY;
    for (rank, &idx) in order.iter().enumerate().rev() {
        let adj = (p_values[idx] * m / (rank + 1) as f64).min(1.0).min(prev);
        adjusted[idx] = adj;
        prev = adj;
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn textbook_example() {
        let adj = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.005]);
        assert_abs_diff_eq!(adj[0], 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(adj[1], 0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(adj[2], 0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(adj[3], 0.02, epsilon = 1e-12);
    }

    #[test]
    fn monotone_and_bounded() {
        let p = [0.2, 0.001, 0.04, 0.9, 0.04, 0.5, 0.013];
        let adj = benjamini_hochberg(&p);
        let mut pairs: Vec<(f64, f64)> = p.iter().copied().zip(adj).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        for w in pairs.windows(2) {
            assert!(w[1].1 >= w[0].1 - 1e-15);
        }
        assert!(pairs.iter().all(|&(raw, a)| a <= 1.0 && a >= raw));
    }

    #[test]
    fn nan_is_skipped() {
        let adj = benjamini_hochberg(&[0.01, f64::NAN, 0.02]);
        assert!(adj[1].is_nan());
        assert_abs_diff_eq!(adj[0], 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(adj[2], 0.02, epsilon = 1e-12);
    }

    #[test]
    fn empty_input() {
        assert!(benjamini_hochberg(&[]).is_empty());
    }
}
