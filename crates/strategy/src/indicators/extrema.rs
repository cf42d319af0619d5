/// Local minima of order `order`: points strictly below every value within
/// `order` positions on both sides. Positions past either end compare
/// against the boundary value, so the first and last points never qualify.
///
/// Series shorter than `2 * order + 1` have no extrema.
pub fn local_minima(values: &[f64], order: usize) -> Vec<(usize, f64)> {
    extrema(values, order, |a, b| a < b)
}

/// Local maxima of order `order`; mirror image of [`local_minima`].
pub fn local_maxima(values: &[f64], order: usize) -> Vec<(usize, f64)> {
    extrema(values, order, |a, b| a > b)
}

fn extrema(values: &[f64], order: usize, beats: fn(f64, f64) -> bool) -> Vec<(usize, f64)> {
    assert!(order >= 1, "extrema order must be >= 1");
    let n = values.len();
    if n < 2 * order + 1 {
        return Vec::new();
    }
    let last = n - 1;

    (0..n)
        .filter(|&i| {
            (1..=order).all(|k| {
                let left = i.saturating_sub(k);
                let right = (i + k).min(last);
                beats(values[i], values[left]) && beats(values[i], values[right])
            })
        })
        .map(|i| (i, values[i]))
        .collect()
}
