use std::fmt;

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Tokens that loaders commonly emit for "no value".
const PLACEHOLDER_TOKENS: &[&str] = &["na", "n/a", "nan", "null", "none", "-", "--", "?"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Date,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Date => "date",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Numeric(f64),
    Categorical(String),
    Date(NaiveDate),
    Missing,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            Value::Categorical(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Numeric(f) => {
                if f.fract() == 0.0 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Categorical(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Missing => String::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn is_placeholder(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || PLACEHOLDER_TOKENS.contains(&trimmed.to_ascii_lowercase().as_str())
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

/// Parses a numeric token, tolerating thousands separators and a trailing percent sign.
pub fn parse_numeric(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let cleaned = trimmed.trim_end_matches('%').replace(',', "");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_typed_value(raw: &str, kind: ColumnKind) -> Value {
    if is_placeholder(raw) {
        return Value::Missing;
    }
    let trimmed = raw.trim();
    match kind {
        ColumnKind::Numeric => parse_numeric(trimmed).map_or(Value::Missing, Value::Numeric),
        ColumnKind::Date => parse_naive_date(trimmed).map_or(Value::Missing, Value::Date),
        ColumnKind::Categorical => Value::Categorical(trimmed.to_string()),
    }
}

/// Lowercases and collapses every non-alphanumeric run into a single underscore.
pub fn normalize_key(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            normalized.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            normalized.push('_');
            last_was_sep = true;
        }
    }
    while normalized.ends_with('_') {
        normalized.pop();
    }
    normalized
}
