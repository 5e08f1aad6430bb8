// Resampling of tabulated cross sections from a native grid onto another grid

use crate::error::{Result, TransportError};

/// Interpolation law used when resampling tabulated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Linear in energy and value. Negative values are clamped to zero.
    Linear,
    /// Log-log, with the native grid *and* values already stored as natural logs.
    LogLog,
    /// Log-log, with the native grid stored as logs but values stored linearly.
    LogLogLinearValues,
    /// Elastic S(a,b) data stored as `xs * E`: the value at the left bracket
    /// point divided by the requested energy.
    XsOverE,
}

/// Side results of a resampling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterpolationReport {
    /// Number of negative bracket values clamped to zero (linear mode only).
    pub negative_count: usize,
    /// First requested point with a strictly positive result.
    pub first_positive: Option<usize>,
    /// Points from `first_positive` to the end, zero when nothing was positive.
    pub remaining: usize,
}

/// Resampled values with their report.
#[derive(Debug, Clone, PartialEq)]
pub struct Resampled {
    pub values: Vec<f64>,
    pub report: InterpolationReport,
}

/// Resample `(grid, values)` at every energy in `points`.
///
/// `points` must be ascending: the bracket search only walks forward. Points
/// outside `[grid[0], grid[last]]` (compared in log space for the log modes)
/// give exactly zero.
pub fn interpolate_data(
    points: &[f64],
    grid: &[f64],
    values: &[f64],
    mode: InterpolationMode,
) -> Result<Resampled> {
    let mut out = vec![0.0; points.len()];
    let report = interpolate_into(&mut out, points, grid, values, mode)?;
    Ok(Resampled {
        values: out,
        report,
    })
}

/// Same as [`interpolate_data`] but writes into a caller-owned buffer, so a
/// worker can reuse its scratch space across materials.
pub fn interpolate_into(
    out: &mut [f64],
    points: &[f64],
    grid: &[f64],
    values: &[f64],
    mode: InterpolationMode,
) -> Result<InterpolationReport> {
    if out.len() != points.len() {
        return Err(TransportError::MalformedGrid(format!(
            "output buffer holds {} values for {} points",
            out.len(),
            points.len()
        )));
    }
    if grid.len() != values.len() {
        return Err(TransportError::MalformedGrid(format!(
            "{} grid points but {} values",
            grid.len(),
            values.len()
        )));
    }
    if grid.len() < 2 {
        return Err(TransportError::MalformedGrid(
            "at least two grid points are needed to interpolate".into(),
        ));
    }

    let last = grid.len() - 1;
    let mut report = InterpolationReport::default();
    let mut i = 0usize;

    for (n, (slot, &energy)) in out.iter_mut().zip(points).enumerate() {
        let e = match mode {
            InterpolationMode::LogLog | InterpolationMode::LogLogLinearValues => energy.ln(),
            InterpolationMode::Linear | InterpolationMode::XsOverE => energy,
        };

        let xs = if e < grid[0] || e > grid[last] {
            0.0
        } else {
            i = find_bracket(grid, e, i)?;
            let (e0, e1) = (grid[i], grid[i + 1]);

            match mode {
                InterpolationMode::Linear => {
                    let mut xs0 = values[i];
                    let mut xs1 = values[i + 1];
                    if xs0 < 0.0 {
                        xs0 = 0.0;
                        report.negative_count += 1;
                    }
                    if xs1 < 0.0 {
                        xs1 = 0.0;
                        report.negative_count += 1;
                    }
                    if e == e0 {
                        xs0
                    } else if e == e1 {
                        xs1
                    } else {
                        ((e - e0) / (e1 - e0)) * (xs1 - xs0) + xs0
                    }
                }
                InterpolationMode::LogLog => {
                    let (xs0, xs1) = (values[i], values[i + 1]);
                    (((e - e0) / (e1 - e0)) * (xs1 - xs0) + xs0).exp()
                }
                InterpolationMode::LogLogLinearValues => {
                    let (xs0, xs1) = (values[i].ln(), values[i + 1].ln());
                    (((e - e0) / (e1 - e0)) * (xs1 - xs0) + xs0).exp()
                }
                InterpolationMode::XsOverE => values[i] / e,
            }
        };

        if xs > 0.0 && report.first_positive.is_none() {
            report.first_positive = Some(n);
            report.remaining = points.len() - n;
        }
        *slot = xs;
    }

    Ok(report)
}

/// Walk forward from `start` to the first non-degenerate interval holding `e`.
fn find_bracket(grid: &[f64], e: f64, start: usize) -> Result<usize> {
    let mut i = start;
    while i + 1 < grid.len() {
        let (e0, e1) = (grid[i], grid[i + 1]);
        if e0 != e1 && (e == e0 || e == e1 || (e > e0 && e < e1)) {
            if e0 >= e1 {
                return Err(TransportError::MalformedGrid(format!(
                    "descending interval [{:e}, {:e}] at index {}",
                    e0, e1, i
                )));
            }
            return Ok(i);
        }
        i += 1;
    }
    Err(TransportError::MalformedGrid(format!(
        "no interval from index {} brackets {:e} (requested points must ascend)",
        start, e
    )))
}
