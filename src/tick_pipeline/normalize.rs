// =============================================================================
// Raw-record normalization
// =============================================================================
//
// Terminals return tick records in three shapes (string-keyed structured
// records, attribute records with optional fields, positional tuples). Each
// extraction attempt is guarded; any failure means "skip this record" — a bad
// record never aborts a history query. The shape decision stays inside this
// module.
// =============================================================================

use crate::market_access::{AttributedTick, RawTick};

use super::window::Tick;

/// Price-like field names accepted when an explicit bid/ask pair is absent,
/// in precedence order.
const PRICE_FALLBACK_FIELDS: [&str; 6] = ["price", "last", "close", "open", "high", "low"];

/// Attempt to normalize one raw record into a canonical tick.
///
/// Extraction order per record: named bid/ask pair, then a single price-like
/// field (yielding a zero-spread tick), then positional `[0]=bid, [1]=ask`.
/// Returns `None` for records that yield no usable quote or fail validity.
pub fn try_extract_quote(raw: &RawTick) -> Option<Tick> {
    let tick = match raw {
        RawTick::Structured { ts, fields } => {
            let pair = match (fields.get("bid"), fields.get("ask")) {
                (Some(&bid), Some(&ask)) => Some((bid, ask)),
                _ => structured_price_fallback(fields).map(|p| (p, p)),
            };
            pair.map(|(bid, ask)| Tick { ts: *ts, bid, ask })
        }
        RawTick::Attributed(record) => attributed_pair(record).map(|(bid, ask)| Tick {
            // Records without their own timestamp are stamped by the caller's
            // window sort; epoch keeps them at the front rather than invalid.
            ts: record.ts.unwrap_or_default(),
            bid,
            ask,
        }),
        RawTick::Tuple { ts, values } => {
            if values.len() >= 2 {
                Some(Tick {
                    ts: *ts,
                    bid: values[0],
                    ask: values[1],
                })
            } else {
                None
            }
        }
    }?;

    if tick.is_valid() {
        Some(tick)
    } else {
        None
    }
}

fn structured_price_fallback(fields: &std::collections::HashMap<String, f64>) -> Option<f64> {
    PRICE_FALLBACK_FIELDS
        .iter()
        .find_map(|name| fields.get(*name).copied())
}

fn attributed_pair(record: &AttributedTick) -> Option<(f64, f64)> {
    if let (Some(bid), Some(ask)) = (record.bid, record.ask) {
        return Some((bid, ask));
    }

    let price = record
        .price
        .or(record.last)
        .or(record.close)
        .or(record.open)
        .or(record.high)
        .or(record.low)?;
    Some((price, price))
}
