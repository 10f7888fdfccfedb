//! Pearson correlation computation over numeric column pairs, used both by
//! Schema Inference (§4.7: "Basic Pearson correlations computed for every
//! pair of numeric columns") and by the Realism Engine's quality metrics
//! step (§4.5.6), which compares synthetic-vs-original coefficients.

/// Pearson product-moment correlation coefficient between two equal-length
/// numeric series. Returns `None` if either series has zero variance (a
/// constant column correlates with nothing) or the series are empty.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some((cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}
