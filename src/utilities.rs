/// Small numeric helpers shared by the cross-section and geometry code

/// Linear interpolation on a linear scale.
///
/// Given ascending `x` and matching `y`, interpolate the value at `x_new`.
/// If `x_new` is outside the range of `x`, returns the first or last `y`
/// value; callers that need zero outside the range check the bounds first.
pub fn interpolate_linear(x: &[f64], y: &[f64], x_new: f64) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    if x.len() == 1 {
        return y[0];
    }
    if x_new <= x[0] {
        return y[0];
    }
    if x_new >= x[x.len() - 1] {
        return y[y.len() - 1];
    }

    let idx = lower_index(x, x_new);
    let x1 = x[idx];
    let x2 = x[idx + 1];
    let y1 = y[idx];
    let y2 = y[idx + 1];
    y1 + (x_new - x1) * (y2 - y1) / (x2 - x1)
}

/// Largest `i` with `x[i] <= x_new`, for `x[0] <= x_new < x[last]`.
pub fn lower_index(x: &[f64], x_new: f64) -> usize {
    let mut low = 0usize;
    let mut high = x.len() - 1; // invariant: target interval within (low, high]
    while high - low > 1 {
        let mid = (low + high) >> 1;
        if x[mid] <= x_new {
            low = mid;
        } else {
            high = mid;
        }
    }
    low
}

#[inline]
pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Unit vector along `v`, or `None` for a zero vector.
pub fn normalize(v: [f64; 3]) -> Option<[f64; 3]> {
    let norm = dot(v, v).sqrt();
    if norm > 0.0 && norm.is_finite() {
        Some([v[0] / norm, v[1] / norm, v[2] / norm])
    } else {
        None
    }
}
