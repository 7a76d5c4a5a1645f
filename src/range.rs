//! Reference-range resolution and out-of-range classification.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Parameter, ParameterValue, RangeBand, RangeSpec};

/// Closed numeric interval parsed from a printed range string.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NumericRange {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    Normal,
    Low,
    High,
}

impl Flag {
    /// Suffix appended to the printed value (`" L"`, `" H"` or nothing).
    pub fn suffix(self) -> &'static str {
        match self {
            Flag::Normal => "",
            Flag::Low => " L",
            Flag::High => " H",
        }
    }
}

/// Age interval of a range band, in days. Keys look like `"4-10y"`, `"0-30d"`, `"1-12m"`.
pub fn parse_range_key(key: &str) -> (f64, f64) {
    let key = key.trim();
    let (core, mul) = match key.chars().last() {
        Some('d') => (&key[..key.len() - 1], 1.0),
        Some('m') => (&key[..key.len() - 1], 30.0),
        Some('y') => (&key[..key.len() - 1], 365.0),
        _ => (key, 1.0),
    };
    let mut parts = core.splitn(2, '-');
    let bound = |s: Option<&str>| {
        s.and_then(|v| v.trim().parse::<f64>().ok())
            .map(|v| v * mul)
            .filter(|v| *v != 0.0 && v.is_finite())
    };
    let lower = bound(parts.next()).unwrap_or(0.0);
    let upper = bound(parts.next()).unwrap_or(f64::INFINITY);
    (lower, upper)
}

/// First band whose age interval contains `age_days`; the last band when none does.
pub fn select_band(bands: &[RangeBand], age_days: f64) -> Option<&RangeBand> {
    bands
        .iter()
        .find(|b| {
            let (lower, upper) = parse_range_key(&b.range_key);
            age_days >= lower && age_days <= upper
        })
        .or_else(|| bands.last())
}

/// Printed reference range for a patient of the given age and gender.
/// Literal `\n` sequences in the stored string become line breaks.
pub fn resolve_range(range: &RangeSpec, age_days: f64, gender: &str) -> String {
    let resolved = match range {
        RangeSpec::Text(s) => s.clone(),
        RangeSpec::ByGender(g) => {
            let bands = match gender {
                "male" => g.male.as_slice(),
                "female" => g.female.as_slice(),
                _ => &[],
            };
            select_band(bands, age_days)
                .map(|b| b.range_value.clone())
                .unwrap_or_default()
        }
    };
    resolved.replace("\\n", "\n")
}

fn up_to_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*up\s*(?:to\s*)?([\d.]+)\s*$").expect("valid regex"))
}

fn interval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*([\d.]+)\s*(?:-|to)\s*([\d.]+)\s*$").expect("valid regex")
    })
}

/// Parses `"up to N"` (lower bound 0), `"A-B"` or `"A to B"`.
pub fn parse_numeric_range(s: &str) -> Option<NumericRange> {
    if let Some(caps) = up_to_re().captures(s) {
        let upper = caps[1].parse::<f64>().ok()?;
        return Some(NumericRange { lower: 0.0, upper });
    }
    let caps = interval_re().captures(s)?;
    let lower = caps[1].parse::<f64>().ok()?;
    let upper = caps[2].parse::<f64>().ok()?;
    Some(NumericRange { lower, upper })
}

/// Numeric prefix of a string, read the way a lenient float parser would:
/// optional sign, digits with an optional fraction, optional exponent.
pub fn parse_leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start {
            mantissa_digits += frac_end - frac_start;
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return None;
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
    s[..end].parse::<f64>().ok()
}

/// Compares a value against a range. Values inside the closed interval are normal.
pub fn classify(value: f64, range: &NumericRange) -> Flag {
    if value < range.lower {
        Flag::Low
    } else if value > range.upper {
        Flag::High
    } else {
        Flag::Normal
    }
}

/// A parameter with neither unit nor range prints as one wide text field
/// and is never range-checked.
pub fn is_spanning(unit: &str, range: &str) -> bool {
    unit.trim().is_empty() && range.trim().is_empty()
}

/// Flag for a value against a resolved range string. Anything that does not
/// parse degrades to `Normal`.
pub fn classify_value(value: &ParameterValue, range: &str) -> Flag {
    match (value.as_number(), parse_numeric_range(range)) {
        (Some(v), Some(r)) => classify(v, &r),
        _ => Flag::Normal,
    }
}

/// Resolved range and flag for one parameter row.
pub fn evaluate_parameter(param: &Parameter, age_days: f64, gender: &str) -> (String, Flag) {
    let range = resolve_range(&param.range, age_days, gender);
    let flag = if is_spanning(&param.unit, &range) {
        Flag::Normal
    } else {
        classify_value(&param.value, &range)
    };
    (range, flag)
}
