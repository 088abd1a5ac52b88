//! Free-text duration parsing for work entries

use regex::Regex;
use std::sync::OnceLock;

/// Minutes in one of the given unit, or `None` for a unit we do not know
fn minutes_per_unit(unit: &str) -> Option<f64> {
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1.0 / 60.0),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(1.0),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(60.0),
        "d" | "day" | "days" => Some(24.0 * 60.0),
        _ => None,
    }
}

/// Parse a free-text duration into whole minutes.
///
/// Accepts `"2h 30m"`, `"1.5 hours"`, `"90 min"`, `"45 seconds"`, `"1 day"`,
/// `"1h30"` and bare numbers, which are read as minutes. Returns `None` when
/// nothing numeric is found or a number carries a unit we do not know.
pub fn parse_duration_minutes(text: &str) -> Option<u32> {
    static RE_PART: OnceLock<Regex> = OnceLock::new();
    let re = RE_PART.get_or_init(|| {
        Regex::new(r"(\d+(?:[.,]\d+)?)\s*([A-Za-z]+)?").expect("duration pattern is valid")
    });

    let mut total = 0.0_f64;
    let mut matched = false;
    for caps in re.captures_iter(text) {
        let Some(value) = caps
            .get(1)
            .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
        else {
            continue;
        };
        let factor = match caps.get(2) {
            None => 1.0,
            Some(unit) => {
                let unit = unit.as_str().to_ascii_lowercase();
                match minutes_per_unit(&unit) {
                    Some(factor) => factor,
                    None => {
                        tracing::warn!(input = %text, unit = %unit, "Unknown duration unit");
                        return None;
                    }
                }
            }
        };
        matched = true;
        total += value * factor;
    }

    if !matched {
        tracing::debug!(input = %text, "No duration found in free text");
        return None;
    }
    Some(total.round().clamp(0.0, f64::from(u32::MAX)) as u32)
}
