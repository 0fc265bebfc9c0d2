use crate::models::{Reading, SensorType};
use tracing::warn;

/// Classify a raw serial line.
///
/// Sensor types are tried in [`SensorType::ALL`] order and the first whose name
/// occurs in `line` wins. The first `"<Type>: "` is cut out and the rest is
/// parsed with [`parse_float_prefix`]. Lines without a known marker yield `None`.
///
/// A matched line whose remainder is not numeric still yields a reading, with
/// `value` set to NaN. It is forwarded as-is; consumers decide what to do with it.
pub fn classify(line: &str, now: i64) -> Option<Reading> {
    let sensor_type = SensorType::ALL
        .into_iter()
        .find(|t| line.contains(t.name()))?;

    let marker = format!("{}: ", sensor_type.name());
    let value = parse_float_prefix(&line.replacen(&marker, "", 1));
    if value.is_nan() {
        warn!("No numeric value in {} line: {:?}", sensor_type, line);
    }

    Some(Reading {
        sensor_type,
        value,
        timestamp: now,
    })
}

/// [`classify`] stamped with the current wall-clock time in whole seconds.
pub fn classify_now(line: &str) -> Option<Reading> {
    classify(line, unix_now())
}

pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Parse the longest leading decimal number of `input`, ignoring leading
/// whitespace and any trailing text. Returns NaN when there is no number.
pub fn parse_float_prefix(input: &str) -> f64 {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }

    if s[end..].starts_with("Infinity") {
        return if bytes.first() == Some(&b'-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }

    if digits == 0 {
        return f64::NAN;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().unwrap_or(f64::NAN)
}
