// =============================================================================
// Relative Strength Index (RSI)
// =============================================================================
//
// Wilder's construction: seed average gain/loss with the SMA of the first
// `period` deltas, then smooth with
//   avg = (prev_avg * (period - 1) + current) / period
// and map RS = avg_gain / avg_loss into RSI = 100 - 100 / (1 + RS).
//
// `rsi_shortened` supports small tick windows: it treats every available
// delta as the seed window, which is the standard degenerate form when fewer
// than `period + 1` observations exist.
// =============================================================================

/// Full Wilder RSI series. One value per close starting at index `period`.
///
/// Returns an empty vec when `period` is zero or fewer than `period + 1`
/// closes are available.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let period_f = period as f64;

    let (mut avg_gain, mut avg_loss) = seed_averages(&deltas[..period]);

    let mut series = Vec::with_capacity(deltas.len() - period + 1);
    match rsi_value(avg_gain, avg_loss) {
        Some(first) => series.push(first),
        None => return Vec::new(),
    }

    for &delta in &deltas[period..] {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_value(avg_gain, avg_loss) {
            Some(rsi) => series.push(rsi),
            None => break,
        }
    }

    series
}

/// Most recent full-mode RSI value.
pub fn rsi_last(closes: &[f64], period: usize) -> Option<f64> {
    rsi_series(closes, period).last().copied()
}

/// Shortened RSI over however many deltas the window offers.
///
/// Needs at least two closes; the single averaging window replaces Wilder
/// smoothing entirely.
pub fn rsi_shortened(closes: &[f64]) -> Option<f64> {
    if closes.len() < 2 {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let (avg_gain, avg_loss) = seed_averages(&deltas);
    rsi_value(avg_gain, avg_loss)
}

fn seed_averages(deltas: &[f64]) -> (f64, f64) {
    let n = deltas.len().max(1) as f64;
    let (gains, losses) = deltas.iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });
    (gains / n, losses / n)
}

/// Map averages into [0, 100]; both-zero is neutral 50, loss-free is 100.
fn rsi_value(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}
