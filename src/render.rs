//! Typed rendering of record templates.
//!
//! A record template is classified once, when it is parsed, into a
//! [`TemplateShape`]. The shape decides how resolved placeholder values are
//! combined:
//!
//! * a bare placeholder keeps its type (`${latitude['host']}` is a number),
//! * text with placeholders concatenates their text forms,
//! * an array or object literal (optionally wrapped in quotes) keeps its
//!   structure, and each placeholder in a value position keeps its type.
//!
//! ```
//! use georecord::render::RecordTemplate;
//! use georecord::ResolvedValue;
//!
//! let template = RecordTemplate::parse("[${longitude['host']}, ${latitude['host']}]").unwrap();
//! let value = template.render(|_| ResolvedValue::Number(1.5));
//! assert_eq!(
//!     value,
//!     ResolvedValue::Array(vec![ResolvedValue::Number(1.5), ResolvedValue::Number(1.5)])
//! );
//! ```

use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::template::{scan, Placeholder, Segment, Template};
use crate::value::ResolvedValue;

// Markers standing in for placeholders while a structural template is parsed as JSON.
const SLOT_OPEN: char = '\u{E000}';
const SLOT_CLOSE: char = '\u{E001}';

/// How a record template's placeholders are combined into a value.
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateShape {
    /// Exactly one placeholder; renders to that placeholder's value.
    Bare(Placeholder),
    /// Literal text with any number of placeholders; renders to text.
    Text(Template),
    /// A JSON array or object; renders to the same structure.
    Structured(Node),
}

/// A node of a structural template.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Literal(ResolvedValue),
    /// A placeholder in a value position, quoted or not.
    Slot(Placeholder),
    /// A JSON string mixing literal text and placeholders.
    Text(Template),
    Array(Vec<Node>),
    Object(Vec<(String, Node)>),
}

impl Node {
    fn render(&self, resolve: &mut dyn FnMut(&Placeholder) -> ResolvedValue) -> ResolvedValue {
        match self {
            Node::Literal(value) => value.clone(),
            Node::Slot(placeholder) => resolve(placeholder),
            Node::Text(template) => ResolvedValue::Text(template.render_text(&mut *resolve)),
            Node::Array(items) => {
                ResolvedValue::Array(items.iter().map(|n| n.render(resolve)).collect())
            }
            Node::Object(members) => ResolvedValue::Object(
                members
                    .iter()
                    .map(|(key, n)| (key.clone(), n.render(resolve)))
                    .collect(),
            ),
        }
    }

    fn visit<'a>(&'a self, out: &mut Vec<&'a Placeholder>) {
        match self {
            Node::Literal(_) => {}
            Node::Slot(p) => out.push(p),
            Node::Text(t) => out.extend(t.placeholders()),
            Node::Array(items) => items.iter().for_each(|n| n.visit(out)),
            Node::Object(members) => members.iter().for_each(|(_, n)| n.visit(out)),
        }
    }
}

/// A parsed record template together with its source text.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordTemplate {
    source: String,
    shape: TemplateShape,
}

impl RecordTemplate {
    /// Parse and classify a template.
    ///
    /// A pair of single or double quotes wrapping the whole template is
    /// stripped first. What remains is structural if it starts with `[` and
    /// ends with `]`, or starts with `{` and ends with `}`.
    ///
    /// # Errors
    ///
    /// Fails on malformed placeholders, and on structural templates that are
    /// not valid JSON.
    pub fn parse(raw: &str) -> Result<RecordTemplate> {
        let body = strip_wrapping_quotes(raw)?;
        let trimmed = body.trim();

        let shape = if is_structural(trimmed) {
            TemplateShape::Structured(parse_structure(raw, trimmed)?)
        } else {
            let template = Template::parse(body)?;
            match template.as_bare() {
                Some(p) => TemplateShape::Bare(p.clone()),
                None => TemplateShape::Text(template),
            }
        };
        Ok(RecordTemplate {
            source: raw.to_string(),
            shape,
        })
    }

    /// A template consisting of a single placeholder.
    pub fn bare(placeholder: Placeholder) -> RecordTemplate {
        RecordTemplate {
            source: placeholder.to_string(),
            shape: TemplateShape::Bare(placeholder),
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn shape(&self) -> &TemplateShape {
        &self.shape
    }

    /// Every placeholder in the template, in source order.
    pub fn placeholders(&self) -> Vec<&Placeholder> {
        match &self.shape {
            TemplateShape::Bare(p) => vec![p],
            TemplateShape::Text(t) => t.placeholders().collect(),
            TemplateShape::Structured(node) => {
                let mut out = Vec::new();
                node.visit(&mut out);
                out
            }
        }
    }

    /// Render using `resolve` to obtain each placeholder's value.
    pub fn render(&self, mut resolve: impl FnMut(&Placeholder) -> ResolvedValue) -> ResolvedValue {
        match &self.shape {
            TemplateShape::Bare(p) => resolve(p),
            TemplateShape::Text(t) => ResolvedValue::Text(t.render_text(resolve)),
            TemplateShape::Structured(node) => node.render(&mut resolve),
        }
    }
}

impl fmt::Display for RecordTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_structural(body: &str) -> bool {
    (body.starts_with('[') && body.ends_with(']')) || (body.starts_with('{') && body.ends_with('}'))
}

/// Remove a quote pair around the whole template.
///
/// The first and last characters only form a pair when the text between
/// them is an array or object, or holds no other unescaped occurrence of
/// that quote outside placeholders. `'${a}' and '${b}'` is left as it is.
fn strip_wrapping_quotes(raw: &str) -> Result<&str> {
    let bytes = raw.as_bytes();
    if bytes.len() < 2 || !matches!(bytes[0], b'\'' | b'"') || bytes[bytes.len() - 1] != bytes[0] {
        return Ok(raw);
    }
    let quote = bytes[0];
    let inner = &raw[1..raw.len() - 1];
    if is_structural(inner.trim()) {
        return Ok(inner);
    }

    let mut cursor = 0;
    for (span, _) in scan(inner)? {
        if has_unescaped(&inner.as_bytes()[cursor..span.start], quote) {
            return Ok(raw);
        }
        cursor = span.end;
    }
    if has_unescaped(&inner.as_bytes()[cursor..], quote) {
        return Ok(raw);
    }
    Ok(inner)
}

fn has_unescaped(text: &[u8], quote: u8) -> bool {
    let mut escaped = false;
    for &b in text {
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == quote {
            return true;
        }
    }
    false
}

/// Parse an array/object template into a node tree.
///
/// Placeholders are swapped for marker strings, the result is parsed as
/// JSON, and markers are turned back into slots. A placeholder outside a
/// JSON string (bare, or wrapped in `'...'`) becomes a whole string of its
/// own; one inside a JSON string stays inline, so `"${x}"` is a slot and
/// `"at ${x}"` is text.
fn parse_structure(raw: &str, body: &str) -> Result<Node> {
    if body.contains([SLOT_OPEN, SLOT_CLOSE]) {
        return Err(Error::InvalidTemplate {
            template: raw.to_string(),
            reason: "contains reserved characters U+E000/U+E001".into(),
        });
    }

    let mut slots = Vec::new();
    let mut json = String::with_capacity(body.len() + 16);
    let mut cursor = 0;
    let mut in_string = false;

    for (span, placeholder) in scan(body)? {
        let mut piece = &body[cursor..span.start];
        let mut end = span.end;
        in_string = track_strings(piece, in_string);

        let idx = slots.len();
        slots.push(placeholder);
        if in_string {
            json.push_str(piece);
            push_marker(&mut json, idx);
        } else {
            if piece.ends_with('\'') && body[end..].starts_with('\'') {
                piece = &piece[..piece.len() - 1];
                end += 1;
            }
            json.push_str(piece);
            json.push('"');
            push_marker(&mut json, idx);
            json.push('"');
        }
        cursor = end;
    }
    json.push_str(&body[cursor..]);

    let value: Value = serde_json::from_str(&json).map_err(|source| Error::InvalidJson {
        template: raw.to_string(),
        source,
    })?;
    to_node(raw, &value, &slots)
}

fn push_marker(json: &mut String, idx: usize) {
    json.push(SLOT_OPEN);
    json.push_str(&idx.to_string());
    json.push(SLOT_CLOSE);
}

/// Whether a JSON string is open after `piece`, given the state before it.
fn track_strings(piece: &str, mut in_string: bool) -> bool {
    let mut escaped = false;
    for c in piece.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        }
    }
    in_string
}

fn to_node(raw: &str, value: &Value, slots: &[Placeholder]) -> Result<Node> {
    Ok(match value {
        Value::String(s) if s.contains(SLOT_OPEN) => {
            let segments = split_markers(raw, s, slots)?;
            match segments.as_slice() {
                [Segment::Placeholder(p)] => Node::Slot(p.clone()),
                _ => Node::Text(Template::from_segments(segments)),
            }
        }
        Value::Array(items) => Node::Array(
            items
                .iter()
                .map(|v| to_node(raw, v, slots))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => {
            let mut members = Vec::with_capacity(map.len());
            for (key, v) in map {
                if key.contains(SLOT_OPEN) {
                    return Err(Error::InvalidTemplate {
                        template: raw.to_string(),
                        reason: format!("placeholders are not allowed in object keys ({key:?})"),
                    });
                }
                members.push((key.clone(), to_node(raw, v, slots)?));
            }
            Node::Object(members)
        }
        other => Node::Literal(other.into()),
    })
}

fn split_markers(raw: &str, s: &str, slots: &[Placeholder]) -> Result<Vec<Segment>> {
    let corrupt = || Error::InvalidTemplate {
        template: raw.to_string(),
        reason: "unexpected placeholder marker".into(),
    };

    let mut segments = Vec::new();
    let mut rest = s;
    while let Some(open) = rest.find(SLOT_OPEN) {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + SLOT_OPEN.len_utf8()..];
        let close = after.find(SLOT_CLOSE).ok_or_else(corrupt)?;
        let idx: usize = after[..close].parse().map_err(|_| corrupt())?;
        let placeholder = slots.get(idx).ok_or_else(corrupt)?;
        segments.push(Segment::Placeholder(placeholder.clone()));
        rest = &after[close + SLOT_CLOSE.len_utf8()..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}
