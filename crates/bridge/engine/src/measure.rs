//! Leaf Value Extractor - normalizes heterogeneous measure payloads to
//! scalar deltas.
//!
//! Upstream feeds are inconsistent about measure shapes: a value may be a
//! plain number, a currency-formatted string ("$1,234.56", "(200.00)" for
//! negatives), or an object keyed by time window. Everything here is total;
//! unparseable input degrades to 0.0 and only leaves a tracing breadcrumb.

use bridge_types::NodeSnapshot;
use serde_json::Value;
use tracing::debug;

/// Sub-fields probed, in order, when a measure arrives as an object.
const MEASURE_KEYS: [&str; 5] = ["daily", "mtd", "ytd", "value", "amount"];

/// Normalized original/adjusted pair for one node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasurePair {
    pub original: f64,
    pub adjusted: f64,
    pub delta: f64,
}

/// Normalize any measure representation to a float. Never fails.
pub fn parse_measure(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_currency(s),
        Value::Object(map) => MEASURE_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .map(parse_measure)
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Extract the normalized original/adjusted/delta triple for a snapshot
/// row, applying the documented fallback chains:
/// `natural_value.daily -> natural_value -> daily_pnl -> 0` and
/// `adjusted_value.daily -> adjusted_value -> adjusted_daily -> 0`.
/// The object-probing inside [`parse_measure`] covers the `.daily` hop.
pub fn extract_delta(node: &NodeSnapshot) -> MeasurePair {
    let original = measure_or_fallback(&node.natural_value, node.extra.get("daily_pnl"));
    let adjusted = measure_or_fallback(&node.adjusted_value, node.extra.get("adjusted_daily"));
    MeasurePair {
        original,
        adjusted,
        delta: adjusted - original,
    }
}

fn measure_or_fallback(primary: &Value, fallback: Option<&Value>) -> f64 {
    if !primary.is_null() {
        return parse_measure(primary);
    }
    fallback.map(parse_measure).unwrap_or(0.0)
}

/// Parse a currency-formatted string: optional `$`, comma thousands
/// separators, parenthesized negatives.
fn parse_currency(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let (body, negative) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (inner, true),
        None => (trimmed, false),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();

    match cleaned.parse::<f64>() {
        Ok(v) if negative => -v,
        Ok(v) => v,
        Err(_) => {
            debug!(raw = raw, "unparseable currency string, defaulting to 0");
            0.0
        }
    }
}
