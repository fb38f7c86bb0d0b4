// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================

/// Mean of the trailing `period` values.
///
/// Returns `None` when `period` is zero, the input is shorter than `period`,
/// or the mean is non-finite.
pub fn sma_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let mean = values[values.len() - period..].iter().sum::<f64>() / period as f64;
    mean.is_finite().then_some(mean)
}

/// Full SMA series: one value per input element starting at index
/// `period - 1`.
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .filter(|v| v.is_finite())
        .collect()
}
