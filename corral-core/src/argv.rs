//! Minimal `--key=value` argument parsing for bootstrap parameters

use std::collections::BTreeMap;

/// Value of a parsed argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// `--key=value`
    Value(String),
    /// `--flag` or `-abc`
    Flag,
}

impl ArgValue {
    /// String value, `None` for flags
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Value(v) => Some(v),
            ArgValue::Flag => None,
        }
    }
}

/// Parse arguments into a key map.
///
/// `--key=value` maps to a value, `--key` and `-abc` map to a flag (the short
/// form keeps the letters together as one key). `--key=` with nothing after
/// the equals sign is dropped, as is anything else.
/// A later occurrence of a key replaces an earlier one.
pub fn parse<I, S>(args: I) -> BTreeMap<String, ArgValue>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = BTreeMap::new();
    for arg in args {
        let arg = arg.as_ref();
        if let Some(rest) = arg.strip_prefix("--") {
            let (key, value) = match rest.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (rest, None),
            };
            if key.is_empty() {
                continue;
            }
            let value = match value {
                Some("") => continue,
                Some(v) => ArgValue::Value(v.to_string()),
                None => ArgValue::Flag,
            };
            result.insert(key.to_string(), value);
        } else if let Some(letters) = arg.strip_prefix('-') {
            if !letters.is_empty() && letters.chars().all(|c| c.is_ascii_alphabetic()) {
                result.insert(letters.to_string(), ArgValue::Flag);
            }
        }
    }
    result
}
