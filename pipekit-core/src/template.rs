//! `<%= expr %>` placeholder resolution.
//!
//! An expression is one or more alternatives separated by `||`. Each
//! alternative is a dotted path into the configuration, a quoted string, a
//! number, or the `today('mask')` date helper. The first truthy alternative
//! wins. Substitution happens in a single pass: text produced by a
//! placeholder is never scanned again.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use serde_json::{Map, Value};

use crate::context::lookup;
use crate::error::{Error, Result};

const OPEN: &str = "<%=";
const CLOSE: &str = "%>";

enum Segment<'a> {
    Literal(&'a str),
    Expr(&'a str),
}

pub(crate) struct Resolver<'a> {
    root: &'a Value,
    local: Option<(&'a str, &'a Value)>,
    resolving: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(root: &'a Value) -> Self {
        Self {
            root,
            local: None,
            resolving: Vec::new(),
        }
    }

    /// Binds `name` to a value that is substituted as is.
    pub(crate) fn with_local(mut self, name: &'a str, value: &'a Value) -> Self {
        self.local = Some((name, value));
        self
    }

    pub(crate) fn resolve_value(&mut self, value: &Value) -> Result<Value> {
        match value {
            Value::String(s) => self.resolve_string(s),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (key, item) in map {
                    resolved.insert(key.clone(), self.resolve_value(item)?);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    pub(crate) fn resolve_string(&mut self, template: &str) -> Result<Value> {
        let segments = split_segments(template);

        // A lone path placeholder keeps the referenced value's type.
        if let [Segment::Expr(expr)] = segments.as_slice() {
            if is_plain_path(expr) {
                return self
                    .lookup_path(expr, template)?
                    .ok_or_else(|| unresolved(expr, template));
            }
        }

        let mut out = String::with_capacity(template.len());
        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(expr) => {
                    let value = self.evaluate(expr, template)?;
                    out.push_str(&stringify(&value));
                }
            }
        }
        Ok(Value::String(out))
    }

    fn evaluate(&mut self, expr: &str, template: &str) -> Result<Value> {
        let alternatives = split_alternatives(expr);
        let mut last = None;

        for alternative in &alternatives {
            let value = self.evaluate_term(alternative, template)?;
            if let Some(ref v) = value {
                if is_truthy(v) {
                    return Ok(v.clone());
                }
            }
            last = value;
        }

        last.ok_or_else(|| {
            let failing = alternatives.last().copied().unwrap_or(expr);
            unresolved(failing, template)
        })
    }

    fn evaluate_term(&mut self, term: &str, template: &str) -> Result<Option<Value>> {
        if let Some(literal) = unquote(term) {
            return Ok(Some(Value::String(literal.to_string())));
        }
        if let Ok(number) = term.parse::<i64>() {
            return Ok(Some(Value::from(number)));
        }
        if let Some(mask) = today_mask(term) {
            return Ok(Some(Value::String(format_date(mask, &Local::now()))));
        }
        if is_plain_path(term) {
            return self.lookup_path(term, template);
        }
        Err(unresolved(term, template))
    }

    fn lookup_path(&mut self, path: &str, template: &str) -> Result<Option<Value>> {
        if let Some((name, value)) = self.local {
            if path == name {
                return Ok(Some(value.clone()));
            }
            if let Some(rest) = path.strip_prefix(name).and_then(|r| r.strip_prefix('.')) {
                return Ok(lookup(value, rest).cloned());
            }
        }
        if self.resolving.iter().any(|p| p == path) {
            let chain = format!("{} -> {}", self.resolving.join(" -> "), path);
            return Err(unresolved(&chain, template));
        }

        let Some(raw) = lookup(self.root, path) else {
            return Ok(None);
        };

        self.resolving.push(path.to_string());
        let resolved = self.resolve_value(raw);
        self.resolving.pop();
        resolved.map(Some)
    }
}

fn unresolved(expr: &str, template: &str) -> Error {
    Error::UnresolvedReference {
        expr: expr.to_string(),
        template: template.to_string(),
    }
}

fn split_segments(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        segments.push(Segment::Expr(after_open[..end].trim()));
        rest = &after_open[end + CLOSE.len()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

fn split_alternatives(expr: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let bytes = expr.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '|' && bytes.get(i + 1) == Some(&b'|') => {
                parts.push(expr[start..i].trim());
                i += 2;
                start = i;
                continue;
            }
            None => {}
        }
        i += 1;
    }
    parts.push(expr[start..].trim());
    parts
}

fn is_plain_path(expr: &str) -> bool {
    !expr.is_empty()
        && expr.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-')
        })
}

fn unquote(term: &str) -> Option<&str> {
    let first = term.chars().next()?;
    if (first == '\'' || first == '"') && term.len() >= 2 && term.ends_with(first) {
        Some(&term[1..term.len() - 1])
    } else {
        None
    }
}

fn today_mask(term: &str) -> Option<&str> {
    let args = term
        .strip_prefix("grunt.template.today(")
        .or_else(|| term.strip_prefix("today("))?
        .strip_suffix(')')?
        .trim();
    if args.is_empty() {
        Some("yyyy-mm-dd")
    } else {
        unquote(args)
    }
}

/// Formats a date with a `dd-mm-yyyy` style mask.
///
/// `mm` is the month and `MM` the minutes.
pub fn format_date<Tz: TimeZone>(mask: &str, date: &DateTime<Tz>) -> String {
    const TOKENS: [&str; 12] = [
        "yyyy", "yy", "mm", "m", "dd", "d", "HH", "H", "MM", "M", "ss", "s",
    ];

    let mut out = String::with_capacity(mask.len() + 8);
    let mut rest = mask;

    'outer: while !rest.is_empty() {
        for token in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                let rendered = match token {
                    "yyyy" => format!("{:04}", date.year()),
                    "yy" => format!("{:02}", date.year().rem_euclid(100)),
                    "mm" => format!("{:02}", date.month()),
                    "m" => date.month().to_string(),
                    "dd" => format!("{:02}", date.day()),
                    "d" => date.day().to_string(),
                    "HH" => format!("{:02}", date.hour()),
                    "H" => date.hour().to_string(),
                    "MM" => format!("{:02}", date.minute()),
                    "M" => date.minute().to_string(),
                    "ss" => format!("{:02}", date.second()),
                    _ => date.second().to_string(),
                };
                out.push_str(&rendered);
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
