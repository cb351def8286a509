//! Callback Payload Extraction
//!
//! The provider's callbacks arrive in several shapes: JSON bodies, form posts
//! with a single `data=<urlencoded json>` field, bare query strings, and
//! sometimes nothing but headers. This module turns any of them into one flat
//! key/value map and then pulls a correlation id and a status out of it.
//!
//! Two independent halves:
//!
//! 1. **Decoding.** [`DECODE_ORDER`] lists the stages. Each stage looks at the
//!    raw input (and, read-only, at what earlier stages produced) and returns a
//!    layer of fields. Layers are folded together with [`ordered_merge`]: a
//!    later stage overwrites same-named keys from an earlier one. Header
//!    fields therefore win over body fields of the same name.
//! 2. **Extraction.** [`CORRELATION_RULES`] and [`STATUS_RULES`] are ordered
//!    candidate lists evaluated against the merged map. The first candidate
//!    that yields a non-empty scalar wins.
//!
//! Nothing in here returns an error. A stage that cannot decode contributes
//! nothing; a rule that does not resolve falls through to the next one.

use serde_json::{Map, Value};

/// Flat key/value view of a decoded callback.
pub type FlatMap = Map<String, Value>;

/// Key under which undecodable body text is kept verbatim.
pub const RAW_BODY_KEY: &str = "raw_body";

/// Key under which a session token sent as a header is recorded.
pub const SESSION_ID_KEY: &str = "session_id";

const HEADER_PREFIX: &str = "header_";
const DATA_PREFIX: &str = "data_";
const DATA_INNER_PREFIX: &str = "data_inner_";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const SESSION_HEADERS: [&str; 2] = ["session-id", "x-session-id"];

// ============================================================================
// INPUT
// ============================================================================

/// Raw callback as received: body bytes plus request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackInput {
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl CallbackInput {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup (first occurrence).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn is_form_encoded(&self) -> bool {
        self.header("content-type")
            .map(|ct| ct.to_ascii_lowercase().contains(FORM_CONTENT_TYPE))
            .unwrap_or(false)
    }
}

// ============================================================================
// DECODING
// ============================================================================

/// One independent decoding strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    /// Body parsed as a JSON object; top-level keys.
    JsonBody,
    /// Body parsed as `application/x-www-form-urlencoded`. Skipped for JSON
    /// object bodies, and for bodies that are not `key=value` pairs unless
    /// the content type says form.
    FormBody,
    /// Fallback interpretation of the raw text, only if the map is still empty.
    RawText,
    /// Every header as `header_<lowercased_name>`.
    Headers,
    /// `session-id` / `x-session-id` header recorded as `session_id`.
    SessionHeader,
}

/// Stage order. Later stages overwrite earlier ones.
pub const DECODE_ORDER: [DecodeStage; 5] = [
    DecodeStage::JsonBody,
    DecodeStage::FormBody,
    DecodeStage::RawText,
    DecodeStage::Headers,
    DecodeStage::SessionHeader,
];

impl DecodeStage {
    /// Produce this stage's layer, or `None` if it does not apply.
    pub fn decode(&self, input: &CallbackInput, merged: &FlatMap) -> Option<FlatMap> {
        match self {
            DecodeStage::JsonBody => match serde_json::from_slice::<Value>(&input.body) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            },
            DecodeStage::FormBody => {
                if is_json_object(&input.body) {
                    return None;
                }
                if !input.is_form_encoded() && !looks_like_query_string(&body_text(&input.body)) {
                    return None;
                }
                let layer = parse_query_pairs(&input.body);
                (!layer.is_empty()).then_some(layer)
            }
            DecodeStage::RawText => {
                if !merged.is_empty() {
                    return None;
                }
                decode_raw_text(&input.body)
            }
            DecodeStage::Headers => {
                let layer: FlatMap = input
                    .headers
                    .iter()
                    .map(|(name, value)| (header_key(name), Value::String(value.clone())))
                    .collect();
                (!layer.is_empty()).then_some(layer)
            }
            DecodeStage::SessionHeader => input
                .headers
                .iter()
                .find(|(name, _)| {
                    let name = name.to_ascii_lowercase().replace('_', "-");
                    SESSION_HEADERS.contains(&name.as_str())
                })
                .map(|(_, value)| {
                    let mut layer = FlatMap::new();
                    layer.insert(SESSION_ID_KEY.to_string(), Value::String(value.clone()));
                    layer
                }),
        }
    }
}

/// Fold `layer` into `acc`. Keys already in `acc` are overwritten.
pub fn ordered_merge(acc: &mut FlatMap, layer: FlatMap) {
    for (key, value) in layer {
        acc.insert(key, value);
    }
}

/// Run every stage in [`DECODE_ORDER`] and merge the results.
pub fn decode(input: &CallbackInput) -> FlatMap {
    let mut merged = FlatMap::new();
    for stage in DECODE_ORDER {
        if let Some(layer) = stage.decode(input, &merged) {
            ordered_merge(&mut merged, layer);
        }
    }
    merged
}

/// Map key for a header: `header_` + lowercase name with dashes as underscores.
pub fn header_key(name: &str) -> String {
    format!("{}{}", HEADER_PREFIX, name.to_ascii_lowercase().replace('-', "_"))
}

fn parse_query_pairs(raw: &[u8]) -> FlatMap {
    url::form_urlencoded::parse(raw)
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect()
}

fn is_json_object(body: &[u8]) -> bool {
    matches!(serde_json::from_slice::<Value>(body), Ok(Value::Object(_)))
}

fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .trim_start_matches('\u{feff}')
        .trim()
        .to_string()
}

fn decode_raw_text(body: &[u8]) -> Option<FlatMap> {
    let text = body_text(body);
    let text = text.as_str();
    if text.is_empty() {
        return None;
    }

    if text.starts_with("data=") && !text.contains('&') {
        return Some(decode_data_field(text));
    }

    if looks_like_query_string(text) {
        let layer = parse_query_pairs(text.as_bytes());
        if !layer.is_empty() {
            return Some(layer);
        }
    }

    if text.starts_with('{') && text.ends_with('}') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
            return Some(map);
        }
    }

    let mut layer = FlatMap::new();
    layer.insert(RAW_BODY_KEY.to_string(), Value::String(text.to_string()));
    Some(layer)
}

/// `data=<urlencoded json>`, the provider's double-wrapped form.
fn decode_data_field(text: &str) -> FlatMap {
    let decoded = url::form_urlencoded::parse(text.as_bytes())
        .find(|(key, _)| key == "data")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();

    let mut layer = FlatMap::new();
    let outer = match serde_json::from_str::<Value>(&decoded) {
        Ok(Value::Object(map)) => map,
        _ => {
            layer.insert("data".to_string(), Value::String(decoded));
            return layer;
        }
    };

    let nested = outer.get("data").and_then(Value::as_object).cloned();
    ordered_merge(&mut layer, outer);

    if let Some(nested) = nested {
        let twice = nested.get("data").and_then(Value::as_object).cloned();
        ordered_merge(&mut layer, prefixed(DATA_PREFIX, &nested));
        if let Some(twice) = twice {
            ordered_merge(&mut layer, prefixed(DATA_INNER_PREFIX, &twice));
        }
    }
    layer
}

fn looks_like_query_string(text: &str) -> bool {
    !text.starts_with('{')
        && !text.starts_with('[')
        && !text.chars().any(char::is_whitespace)
        && text.split('&').all(|pair| {
            pair.split_once('=')
                .map(|(key, _)| !key.is_empty())
                .unwrap_or(false)
        })
}

fn prefixed(prefix: &str, map: &FlatMap) -> FlatMap {
    map.iter()
        .map(|(key, value)| (format!("{}{}", prefix, key), value.clone()))
        .collect()
}

// ============================================================================
// EXTRACTION RULES
// ============================================================================

/// Where to look for a field in the merged map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// A top-level (or already flattened) key.
    Key(&'static str),
    /// A dotted path through nested objects, e.g. `data.id`.
    Path(&'static [&'static str]),
    /// A request header, by its wire name.
    Header(&'static str),
    /// A top-level key holding a JSON *string*; the path is resolved inside
    /// it and the object holding the hit is flattened as `data_inner_<key>`.
    EmbeddedJson {
        key: &'static str,
        path: &'static [&'static str],
    },
}

/// Correlation id candidates, in priority order.
pub const CORRELATION_RULES: &[Candidate] = &[
    Candidate::Key("id"),
    Candidate::Key("external_id"),
    Candidate::Key("request_id"),
    Candidate::Path(&["data", "id"]),
    Candidate::Key("data_id"),
    Candidate::Key("data_inner_id"),
    Candidate::Header("x-callback-id"),
    Candidate::Header("x-request-id"),
    Candidate::Header("x-external-id"),
    Candidate::EmbeddedJson {
        key: "data",
        path: &["data", "id"],
    },
];

/// Status candidates, in priority order.
pub const STATUS_RULES: &[Candidate] = &[
    Candidate::Key("status"),
    Candidate::Key("state"),
    Candidate::Key("result"),
    Candidate::Path(&["data", "status"]),
    Candidate::Key("data_status"),
    Candidate::Key("data_inner_status"),
    Candidate::Header("x-callback-status"),
    Candidate::Header("x-status"),
    Candidate::Header("x-state"),
];

/// A resolved candidate: the scalar found, plus any fields it unpacked.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: String,
    pub flattened: Option<FlatMap>,
}

impl Candidate {
    pub fn resolve(&self, map: &FlatMap) -> Option<Resolved> {
        match self {
            Candidate::Key(key) => map.get(*key).and_then(scalar).map(Resolved::plain),
            Candidate::Path(path) => value_at(map, path).and_then(scalar).map(Resolved::plain),
            Candidate::Header(name) => map
                .get(&header_key(name))
                .and_then(scalar)
                .map(Resolved::plain),
            Candidate::EmbeddedJson { key, path } => {
                let text = map.get(*key)?.as_str()?;
                let embedded: Value = serde_json::from_str(text).ok()?;
                let (last, parents) = path.split_last()?;
                let mut holder = &embedded;
                for segment in parents {
                    holder = holder.get(segment)?;
                }
                let value = holder.get(last).and_then(scalar)?;
                let flattened = holder.as_object().map(|obj| prefixed(DATA_INNER_PREFIX, obj));
                Some(Resolved { value, flattened })
            }
        }
    }
}

impl Resolved {
    fn plain(value: String) -> Self {
        Self {
            value,
            flattened: None,
        }
    }
}

/// Evaluate `rules` in order against `map`; first hit wins.
pub fn first_match(rules: &[Candidate], map: &FlatMap) -> Option<(Candidate, Resolved)> {
    rules
        .iter()
        .find_map(|rule| rule.resolve(map).map(|resolved| (*rule, resolved)))
}

/// Walk nested objects from a top-level key.
pub fn value_at<'a>(map: &'a FlatMap, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut cursor = map.get(*first)?;
    for segment in rest {
        cursor = cursor.as_object()?.get(*segment)?;
    }
    Some(cursor)
}

/// Non-empty string (or number rendered as string) at `path`.
pub fn string_at(map: &FlatMap, path: &[&str]) -> Option<String> {
    value_at(map, path).and_then(scalar)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ============================================================================
// EXTRACTOR
// ============================================================================

/// Everything the reconciler needs from one callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCallback {
    pub fields: FlatMap,
    pub correlation_id: Option<String>,
    /// Which rule produced the correlation id.
    pub correlation_rule: Option<Candidate>,
    pub status: Option<String>,
    pub session_id: Option<String>,
}

/// Decode + extract. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadExtractor;

impl PayloadExtractor {
    pub fn extract(input: &CallbackInput) -> ExtractedCallback {
        let mut fields = decode(input);

        let (correlation_rule, correlation_id) = match first_match(CORRELATION_RULES, &fields) {
            Some((rule, resolved)) => {
                if let Some(extra) = resolved.flattened {
                    ordered_merge(&mut fields, extra);
                }
                (Some(rule), Some(resolved.value))
            }
            None => (None, None),
        };

        let status = first_match(STATUS_RULES, &fields).map(|(_, resolved)| resolved.value);
        let session_id = fields.get(SESSION_ID_KEY).and_then(scalar);

        ExtractedCallback {
            fields,
            correlation_id,
            correlation_rule,
            status,
            session_id,
        }
    }
}
