//! Extraction of materialization and execution time from serialized
//! operator timing breakdowns.

use serde_json::{Map, Value};
use std::fmt::Debug;
use tracing::warn;

/// Derives scalar timings from a capture's `plan_timings` blob.
///
/// Implementations never fail: a missing or malformed blob yields `0.0`.
pub trait TimingExtractor: Debug + Send + Sync {
    /// Cumulative seconds spent in materialization operators.
    fn extract_materialize_time(&self, blob: &str) -> f64;

    /// Cumulative seconds spent in all plan operators.
    fn extract_total_exec_time(&self, blob: &str) -> f64;
}

/// Operator names containing this marker count as materialization by default.
pub const DEFAULT_MATERIALIZE_MARKER: &str = "CREATE";

/// Reads profiler-style timing documents.
///
/// Three layouts are understood:
/// - an operator tree of `{"name", "timing", "children"}` objects, where a
///   root without a name (or named `Query`) is the profiler envelope and
///   contributes no time;
/// - a flat `{operator: seconds}` map, where the value may also be a list;
/// - either of the above as a Python literal: single quotes and
///   `None`/`True`/`False`.
#[derive(Debug, Clone)]
pub struct ProfilerTimingExtractor {
    markers: Vec<String>,
}

impl ProfilerTimingExtractor {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_uppercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    fn is_materialization(&self, operator: &str) -> bool {
        let upper = operator.to_uppercase();
        self.markers.iter().any(|m| upper.contains(m.as_str()))
    }

    /// Flatten the blob into `(operator, seconds)` pairs.
    pub fn operator_timings(&self, blob: &str) -> Vec<(String, f64)> {
        let Some(doc) = parse_document(blob) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        collect(&doc, true, &mut out);
        out
    }
}

impl Default for ProfilerTimingExtractor {
    fn default() -> Self {
        Self::new([DEFAULT_MATERIALIZE_MARKER])
    }
}

impl TimingExtractor for ProfilerTimingExtractor {
    fn extract_materialize_time(&self, blob: &str) -> f64 {
        self.operator_timings(blob)
            .into_iter()
            .filter(|(name, _)| self.is_materialization(name))
            .map(|(_, t)| t)
            .sum()
    }

    fn extract_total_exec_time(&self, blob: &str) -> f64 {
        self.operator_timings(blob).into_iter().map(|(_, t)| t).sum()
    }
}

fn parse_document(blob: &str) -> Option<Value> {
    let blob = blob.trim();
    if blob.is_empty() {
        return None;
    }
    match serde_json::from_str(blob) {
        Ok(doc) => Some(doc),
        Err(first) => match serde_json::from_str(&python_literal_to_json(blob)) {
            Ok(doc) => Some(doc),
            Err(_) => {
                warn!(
                    error = %first,
                    blob = %truncate(blob, 80),
                    "unparseable plan timings, using 0.0"
                );
                None
            }
        },
    }
}

/// Rewrite a Python dict/list literal as JSON. Quotes become double quotes;
/// bare `None`, `True` and `False` outside strings become JSON literals.
fn python_literal_to_json(blob: &str) -> String {
    let mut out = String::with_capacity(blob.len());
    let mut word = String::new();
    let mut in_string = false;

    for c in blob.chars() {
        if !in_string && (c.is_ascii_alphanumeric() || c == '_') {
            word.push(c);
            continue;
        }
        flush_word(&mut word, &mut out);
        match c {
            '\'' | '"' => {
                in_string = !in_string;
                out.push('"');
            }
            _ => out.push(c),
        }
    }
    flush_word(&mut word, &mut out);
    out
}

fn flush_word(word: &mut String, out: &mut String) {
    out.push_str(match word.as_str() {
        "None" => "null",
        "True" => "true",
        "False" => "false",
        other => other,
    });
    word.clear();
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

fn collect(value: &Value, is_root: bool, out: &mut Vec<(String, f64)>) {
    match value {
        Value::Object(obj) if obj.contains_key("name") || obj.contains_key("children") => {
            collect_tree(obj, is_root, out)
        }
        Value::Object(obj) => {
            for (name, v) in obj {
                let t = seconds(v);
                if t != 0.0 {
                    out.push((name.clone(), t));
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, false, out);
            }
        }
        _ => {}
    }
}

fn collect_tree(node: &Map<String, Value>, is_root: bool, out: &mut Vec<(String, f64)>) {
    let name = node
        .get("name")
        .or_else(|| node.get("operator_name"))
        .and_then(Value::as_str);
    let envelope = is_root && name.map_or(true, |n| n.trim().eq_ignore_ascii_case("query"));

    if !envelope {
        if let Some(name) = name {
            let t = node
                .get("timing")
                .or_else(|| node.get("operator_timing"))
                .map(seconds)
                .unwrap_or(0.0);
            out.push((name.trim().to_string(), t));
        }
    }

    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for child in children {
            if let Value::Object(obj) = child {
                collect_tree(obj, false, out);
            }
        }
    }
}

/// Seconds held by a timing value; non-numeric or non-finite entries are 0.
fn seconds(value: &Value) -> f64 {
    let t = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Array(items) => items.iter().map(seconds).sum(),
        _ => 0.0,
    };
    if t.is_finite() {
        t
    } else {
        0.0
    }
}
