// =============================================================================
// Pip & point math
// =============================================================================
//
// pip_size = point_size × pip_multiplier(digits), where the multiplier is 10
// for 3/5-digit quotes and 1 otherwise. All pip-scaled comparisons in the
// controller go through these helpers; nothing hard-codes per-symbol sizes.
// =============================================================================

use super::{Quote, SymbolInfo};

/// 10 for 3/5-digit symbols (fractional-pip quoting), 1 otherwise.
pub fn pip_multiplier(digits: u32) -> f64 {
    if digits == 3 || digits == 5 {
        10.0
    } else {
        1.0
    }
}

/// One pip in price units for the given symbol metadata.
pub fn pip_size(info: &SymbolInfo) -> f64 {
    info.point_size * pip_multiplier(info.digits)
}

/// Current spread expressed in points.
pub fn spread_points(quote: &Quote, point_size: f64) -> f64 {
    if point_size <= 0.0 {
        return 0.0;
    }
    quote.spread() / point_size
}
