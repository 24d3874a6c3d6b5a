use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write;

use crate::domain::{CellValue, Transform, ValueType};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%m/%d/%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

impl Transform {
    pub fn apply(&self, value: &str) -> String {
        match self {
            Transform::Trim => value.trim().to_string(),
            Transform::Title => title_case(value),
            Transform::Lower => value.to_lowercase(),
            Transform::Upper => value.to_uppercase(),
        }
    }
}

/// Upper-case the first letter of every word and lower-case the rest.
/// Any non-letter starts a new word, so "o'neil-smith" becomes "O'Neil-Smith".
fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_is_letter = false;
    for ch in value.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}

/// Coerce one cell to the rule's type; anything that cannot be represented becomes null
pub fn coerce(value: &CellValue, value_type: ValueType, date_format: &str) -> CellValue {
    match value_type {
        ValueType::String => value.clone(),
        ValueType::Int => coerce_int(value),
        ValueType::Float => coerce_float(value),
        ValueType::Date => coerce_date(value, date_format),
    }
}

fn coerce_int(value: &CellValue) -> CellValue {
    match value {
        CellValue::Int(i) => CellValue::Int(*i),
        CellValue::Float(f) => float_to_int(*f),
        CellValue::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                CellValue::Int(i)
            } else if let Ok(f) = s.parse::<f64>() {
                float_to_int(f)
            } else {
                CellValue::Null
            }
        }
        CellValue::Null | CellValue::Date(_) => CellValue::Null,
    }
}

// Only integral floats survive; 2.5 has no integer representation
fn float_to_int(f: f64) -> CellValue {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        CellValue::Int(f as i64)
    } else {
        CellValue::Null
    }
}

fn coerce_float(value: &CellValue) -> CellValue {
    match value {
        CellValue::Int(i) => CellValue::Float(*i as f64),
        CellValue::Float(f) if f.is_nan() => CellValue::Null,
        CellValue::Float(f) => CellValue::Float(*f),
        CellValue::String(s) => match s.trim().parse::<f64>() {
            Ok(f) if !f.is_nan() => CellValue::Float(f),
            _ => CellValue::Null,
        },
        CellValue::Null | CellValue::Date(_) => CellValue::Null,
    }
}

fn coerce_date(value: &CellValue, date_format: &str) -> CellValue {
    let parsed = match value {
        CellValue::Date(d) => Some(*d),
        CellValue::String(s) => parse_datetime(s),
        _ => None,
    };
    parsed
        .and_then(|d| render_date(&d, date_format))
        .map(CellValue::String)
        .unwrap_or(CellValue::Null)
}

/// Parse free-form date or date-time text
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Render with a user-supplied strftime format. Invalid formats yield `None` instead of panicking.
pub fn render_date(value: &NaiveDateTime, format: &str) -> Option<String> {
    let items: Vec<Item> = StrftimeItems::new(format).collect();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return None;
    }
    let mut out = String::new();
    // Specifiers that need a timezone fail here rather than at to_string()
    write!(out, "{}", value.format_with_items(items.iter())).ok()?;
    Some(out)
}

/// Slug-style column name: ASCII transliteration, lower case, `_` between words
pub fn normalize_column_name(name: &str) -> String {
    let ascii = deunicode::deunicode(name).to_lowercase().replace('\'', "");
    NON_ALNUM.replace_all(&ascii, "_").trim_matches('_').to_string()
}
