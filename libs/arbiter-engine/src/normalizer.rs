/// Input Normalizer - Raw Test Input to Typed Arguments
///
/// **Core Responsibility:**
/// Turn the string stored with a test case (e.g. `"[2,7,11,15], 9"`) into the
/// ordered argument list handed to the solution function.
///
/// **Tokenizing Rules:**
/// - Split on commas at bracket depth zero only
/// - Trim every token
///
/// **Classification Order (first match wins):**
/// 1. `[...]` → strict JSON; on failure split the interior on commas and coerce
///    each element to a number when numeric, else keep it as a string
/// 2. Numeric token → number
/// 3. `true` / `false` / `null` / `undefined`
/// 4. Quoted token (`"..."` or `'...'`) → quotes stripped
/// 5. Anything else → bare string
///
/// Numeric-looking tokens always become numbers. Whether a textual argument
/// such as `"007"` should stay a string cannot be decided from the wire format.

use serde_json::{Map, Number};

/// Marker object carrying `undefined` across the JSON boundary
pub const UNDEFINED_MARKER: &str = "$undefined";

/// Largest integer a double represents exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// One normalized argument
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Number),
    String(String),
    Bool(bool),
    Null,
    Undefined,
    Array(Vec<Value>),
    /// Only produced by strict JSON parsing of a bracketed token
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Encode for the execution unit; `Undefined` becomes `{"$undefined": true}`
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Null => serde_json::Value::Null,
            Value::Undefined => {
                let mut marker = Map::new();
                marker.insert(UNDEFINED_MARKER.to_string(), serde_json::Value::Bool(true));
                serde_json::Value::Object(marker)
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(canonical_number(n)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from_json(value)))
                    .collect(),
            ),
        }
    }
}

/// Encode a whole argument list for the execution unit
pub fn to_json_args(args: &[Value]) -> Vec<serde_json::Value> {
    args.iter().map(Value::to_json).collect()
}

/// Parse a raw test-case input into its argument list
///
/// Empty or whitespace-only input yields no arguments.
pub fn normalize(raw: &str) -> Vec<Value> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    split_top_level(raw)
        .into_iter()
        .map(|token| classify(token.trim()))
        .collect()
}

/// Split on commas that are not nested inside `[...]`
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (idx, ch) in raw.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                tokens.push(&raw[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    tokens.push(&raw[start..]);
    tokens
}

fn classify(token: &str) -> Value {
    if token.len() >= 2 && token.starts_with('[') && token.ends_with(']') {
        return match serde_json::from_str::<serde_json::Value>(token) {
            Ok(parsed) => Value::from_json(parsed),
            Err(_) => loose_array(&token[1..token.len() - 1]),
        };
    }

    if let Some(number) = parse_number(token) {
        return Value::Number(number);
    }

    match token {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        "undefined" => return Value::Undefined,
        _ => {}
    }

    Value::String(strip_quotes(token).to_string())
}

/// Fallback for bracketed tokens that are not valid JSON, e.g. `[a, b, 3]`
fn loose_array(interior: &str) -> Value {
    let items = interior
        .split(',')
        .map(|item| {
            let item = item.trim();
            match parse_number(item) {
                Some(number) => Value::Number(number),
                None => Value::String(item.to_string()),
            }
        })
        .collect();
    Value::Array(items)
}

fn strip_quotes(token: &str) -> &str {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &token[1..token.len() - 1];
        }
    }
    token
}

/// Numeric parse with the runtime `Number()` conventions used by the judged languages
///
/// Accepts optional sign, decimal/exponent forms, bare leading or trailing dot,
/// and unsigned `0x` / `0o` / `0b` integer literals. `NaN` and `Infinity`
/// spellings are not numbers here.
pub fn parse_number(token: &str) -> Option<Number> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    if let Some(value) = parse_radix_literal(token) {
        return js_number(value);
    }

    let valid_chars = token
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if !valid_chars || !token.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let value: f64 = token.parse().ok()?;
    js_number(value)
}

/// Value of an unsigned radix literal, rounded to the nearest double
fn parse_radix_literal(token: &str) -> Option<f64> {
    if token.len() < 3 || !token.starts_with('0') {
        return None;
    }
    let radix = match token.as_bytes()[1] {
        b'x' | b'X' => 16,
        b'o' | b'O' => 8,
        b'b' | b'B' => 2,
        _ => return None,
    };
    let digits = &token[2..];
    // from_str_radix would also take a sign here
    if !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    match u128::from_str_radix(digits, radix) {
        Ok(value) => Some(value as f64),
        Err(_) => Some(digits.chars().fold(0.0, |acc, c| {
            acc * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or(0))
        })),
    }
}

/// Integral doubles within the safe range become integers, everything else stays a float
fn js_number(value: f64) -> Option<Number> {
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        // -0 collapses to 0, as it does when printed by the runtimes
        return Some(Number::from(value as i64));
    }
    Number::from_f64(value)
}

fn canonical_number(number: Number) -> Number {
    if number.is_f64() {
        if let Some(canonical) = number.as_f64().and_then(js_number) {
            return canonical;
        }
    }
    number
}
