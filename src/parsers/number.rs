use regex::Regex;
use std::sync::LazyLock;

static CANONICAL_DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?\d+(\.\d+)?$").expect("invalid regex: canonical decimal")
});

/// Parses a number printed by the portal, accepting both `1,7` and `1.7`.
///
/// When a value carries both separators, the last one is the decimal separator
/// and the other is a thousands separator (`1.234,5` and `1,234.5`).
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    let canonical = match (compact.rfind(','), compact.rfind('.')) {
        (Some(comma), Some(period)) if comma > period => {
            compact.replace('.', "").replace(',', ".")
        }
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) => compact.replace(',', "."),
        _ => compact,
    };

    if !CANONICAL_DECIMAL.is_match(&canonical) {
        return None;
    }
    canonical.parse().ok()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
