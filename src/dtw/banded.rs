use ndarray::Array2;

/// Half-width of the Sakoe-Chiba band for sequences of length `n` and `m`.
///
/// Never narrower than `|n - m|` so that the end cell stays reachable.
pub fn band_width(n: usize, m: usize, window_fraction: f64) -> usize {
    let proportional = (window_fraction.max(0.0) * n.max(m) as f64).floor() as usize;
    n.abs_diff(m).max(proportional)
}

/// Cumulative DTW cost between two sequences of length `n` and `m`.
///
/// `cost(i, j)` is the local distance between element `i` of the first
/// sequence and element `j` of the second (both zero-based). Only cells within
/// the band are evaluated. Returns `f64::INFINITY` if either sequence is empty.
pub fn banded_dtw<F>(n: usize, m: usize, window_fraction: f64, mut cost: F) -> f64
where
    F: FnMut(usize, usize) -> f64,
{
    if n == 0 || m == 0 {
        return f64::INFINITY;
    }

    let window = band_width(n, m, window_fraction);
    let mut dtw = Array2::<f64>::from_elem((n + 1, m + 1), f64::INFINITY);
    dtw[[0, 0]] = 0.0;

    for i in 1..=n {
        let lo = i.saturating_sub(window).max(1);
        let hi = (i + window).min(m);
        for j in lo..=hi {
            let best = dtw[[i - 1, j]].min(dtw[[i, j - 1]]).min(dtw[[i - 1, j - 1]]);
            dtw[[i, j]] = cost(i - 1, j - 1) + best;
        }
    }

    dtw[[n, m]]
}
