use std::fmt;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::lookup::GeoKind;
use crate::value::ResolvedValue;

/// Which dot-separated components of the tag a placeholder selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagSelector {
    /// A single component. Negative indices count from the end.
    Index(isize),
    /// An inclusive range of components, joined with `.`.
    Range(isize, isize),
}

impl fmt::Display for TagSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagSelector::Index(i) => write!(f, "{i}"),
            TagSelector::Range(a, b) => write!(f, "{a}..{b}"),
        }
    }
}

/// A single `${...}` expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placeholder {
    /// `${city['host']}`: look up `kind` for the address stored at `field`.
    ///
    /// `field` is kept verbatim; dotted paths are resolved against the record.
    Geo { kind: GeoKind, field: String },
    /// `${tag}` or `${tag[n]}`.
    Tag(Option<TagSelector>),
    /// `${tag_parts[n]}` or `${tag_parts[a..b]}`.
    TagParts(TagSelector),
}

impl Placeholder {
    #[inline]
    pub fn is_geo(&self) -> bool {
        matches!(self, Placeholder::Geo { .. })
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Geo { kind, field } => {
                let quote = if field.contains('\'') { '"' } else { '\'' };
                write!(f, "${{{kind}[{quote}{field}{quote}]}}")
            }
            Placeholder::Tag(None) => f.write_str("${tag}"),
            Placeholder::Tag(Some(sel)) => write!(f, "${{tag[{sel}]}}"),
            Placeholder::TagParts(sel) => write!(f, "${{tag_parts[{sel}]}}"),
        }
    }
}

/// One piece of a parsed template.
#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A pre-parsed template: literal text interleaved with placeholders.
///
/// The template is parsed once into a sequence of literal and placeholder
/// segments. Rendering is a single left-to-right pass that concatenates
/// segments; resolved values are never re-scanned for placeholders.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
    /// Pre-computed estimate of output size for allocation.
    estimated_size: usize,
}

impl Template {
    /// Parse a template string.
    ///
    /// Text outside `${...}` is literal. A `$` that does not start `${` is
    /// literal too.
    ///
    /// # Errors
    ///
    /// Returns an error for an unterminated placeholder, unbalanced brackets,
    /// an unknown placeholder kind, or a lookup placeholder whose field is
    /// not quoted.
    pub fn parse(raw: &str) -> Result<Template> {
        let mut segments = Vec::new();
        let mut cursor = 0;
        for (span, placeholder) in scan(raw)? {
            if span.start > cursor {
                segments.push(Segment::Literal(raw[cursor..span.start].to_string()));
            }
            segments.push(Segment::Placeholder(placeholder));
            cursor = span.end;
        }
        if cursor < raw.len() {
            segments.push(Segment::Literal(raw[cursor..].to_string()));
        }
        Ok(Template::from_segments(segments))
    }

    pub(crate) fn from_segments(segments: Vec<Segment>) -> Template {
        // ~16 bytes per placeholder value
        let estimated_size = segments
            .iter()
            .map(|s| match s {
                Segment::Literal(text) => text.len(),
                Segment::Placeholder(_) => 16,
            })
            .sum();
        Template {
            segments,
            estimated_size,
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The placeholders referenced in this template, in order.
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    /// The placeholder if the template is exactly one placeholder and nothing else.
    #[must_use]
    pub fn as_bare(&self) -> Option<&Placeholder> {
        match self.segments.as_slice() {
            [Segment::Placeholder(p)] => Some(p),
            _ => None,
        }
    }

    /// Render to text, splicing in each placeholder's text form.
    ///
    /// Null placeholders contribute an empty string.
    #[inline]
    pub fn render_text(&self, mut resolve: impl FnMut(&Placeholder) -> ResolvedValue) -> String {
        let mut output = String::with_capacity(self.estimated_size);
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => output.push_str(s),
                Segment::Placeholder(p) => resolve(p).write_text(&mut output),
            }
        }
        output
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => f.write_str(s)?,
                Segment::Placeholder(p) => write!(f, "{p}")?,
            }
        }
        Ok(())
    }
}

/// Find every placeholder in `raw` along with its byte span (`${` through `}`).
pub(crate) fn scan(raw: &str) -> Result<Vec<(Range<usize>, Placeholder)>> {
    let invalid = |reason: String| Error::InvalidPlaceholder {
        template: raw.to_string(),
        reason,
    };

    let mut found = Vec::new();
    let mut i = 0;
    while let Some(offset) = raw[i..].find("${") {
        let start = i + offset;
        let body_start = start + 2;
        let close = find_close(raw.as_bytes(), body_start).map_err(invalid)?;
        let body = &raw[body_start..close];
        let placeholder = parse_body(body).map_err(|err| match err {
            BodyError::UnknownKind(kind) => Error::UnknownKind {
                template: raw.to_string(),
                kind,
            },
            BodyError::Invalid(reason) => invalid(format!("${{{body}}}: {reason}")),
        })?;
        found.push((start..close + 1, placeholder));
        i = close + 1;
    }
    Ok(found)
}

/// Locate the `}` closing a placeholder whose body starts at `from`.
///
/// Brackets must balance, and quotes inside brackets may contain any of `[]}`.
fn find_close(bytes: &[u8], from: usize) -> std::result::Result<usize, String> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (pos, &b) in bytes.iter().enumerate().skip(from) {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' if depth > 0 => quote = Some(b),
            b'[' => depth += 1,
            b']' => {
                if depth == 0 {
                    return Err(format!("unbalanced ']' at position {pos}"));
                }
                depth -= 1;
            }
            b'}' if depth == 0 => return Ok(pos),
            _ => {}
        }
    }
    if quote.is_some() {
        Err(format!("unterminated quote in placeholder at position {}", from - 2))
    } else if depth > 0 {
        Err(format!("unbalanced '[' in placeholder at position {}", from - 2))
    } else {
        Err(format!("unterminated placeholder at position {}", from - 2))
    }
}

enum BodyError {
    UnknownKind(String),
    Invalid(String),
}

fn parse_body(body: &str) -> std::result::Result<Placeholder, BodyError> {
    let (name, arg) = match body.find('[') {
        Some(open) => {
            if !body.ends_with(']') {
                return Err(BodyError::Invalid("unexpected text after ']'".into()));
            }
            (&body[..open], Some(&body[open + 1..body.len() - 1]))
        }
        None => (body, None),
    };

    if !is_identifier(name) {
        return Err(BodyError::Invalid(format!("invalid name {name:?}")));
    }

    match name {
        "tag" => match arg {
            None => Ok(Placeholder::Tag(None)),
            Some(arg) => Ok(Placeholder::Tag(Some(parse_selector(arg)?))),
        },
        "tag_parts" => {
            let arg = arg.ok_or_else(|| BodyError::Invalid("tag_parts requires an index".into()))?;
            Ok(Placeholder::TagParts(parse_selector(arg)?))
        }
        other => {
            let kind: GeoKind = other
                .parse()
                .map_err(|_| BodyError::UnknownKind(other.to_string()))?;
            let arg = arg.ok_or_else(|| {
                BodyError::Invalid(format!("{other} requires a quoted field name"))
            })?;
            Ok(Placeholder::Geo {
                kind,
                field: parse_quoted(arg)?,
            })
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_quoted(arg: &str) -> std::result::Result<String, BodyError> {
    let bytes = arg.as_bytes();
    let quoted = bytes.len() >= 2
        && matches!(bytes[0], b'\'' | b'"')
        && bytes[bytes.len() - 1] == bytes[0];
    if !quoted {
        return Err(BodyError::Invalid(format!(
            "field name {arg:?} must be quoted with ' or \""
        )));
    }
    let field = &arg[1..arg.len() - 1];
    if field.is_empty() {
        return Err(BodyError::Invalid("empty field name".into()));
    }
    if field.contains(arg.as_bytes()[0] as char) {
        return Err(BodyError::Invalid(format!("stray quote in field name {arg}")));
    }
    Ok(field.to_string())
}

fn parse_selector(arg: &str) -> std::result::Result<TagSelector, BodyError> {
    let index = |s: &str| {
        s.trim()
            .parse::<isize>()
            .map_err(|_| BodyError::Invalid(format!("invalid tag index {s:?}")))
    };
    match arg.split_once("..") {
        Some((a, b)) => Ok(TagSelector::Range(index(a)?, index(b)?)),
        None => Ok(TagSelector::Index(index(arg)?)),
    }
}
