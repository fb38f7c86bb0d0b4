// =============================================================================
// Bollinger Bands & dispersion helpers
// =============================================================================
//
// Middle band is the SMA of the trailing window; the outer bands sit
// `deviation` standard deviations away. The raw mean/stddev pair is exposed
// separately because the VWAP strategy reuses it for its own bands.
// =============================================================================

/// Bands over the trailing window.
#[derive(Debug, Clone, Copy)]
pub struct Bands {
    pub mean: f64,
    pub stddev: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Population mean and standard deviation of `values`.
///
/// Returns `None` for empty input or non-finite results.
pub fn mean_stddev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    (mean.is_finite() && stddev.is_finite()).then_some((mean, stddev))
}

/// Bollinger bands over the trailing `period` values.
///
/// Returns `None` when fewer than `period` values exist or the math
/// degenerates.
pub fn bands(values: &[f64], period: usize, deviation: f64) -> Option<Bands> {
    if period == 0 || values.len() < period {
        return None;
    }

    let (mean, stddev) = mean_stddev(&values[values.len() - period..])?;

    Some(Bands {
        mean,
        stddev,
        upper: mean + deviation * stddev,
        lower: mean - deviation * stddev,
    })
}
