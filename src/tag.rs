use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::template::{Placeholder, TagSelector, Template};
use crate::value::ResolvedValue;

/// The tag of the record being processed.
///
/// `${tag}` resolves to the processed tag (after prefix and suffix
/// handling). Indexed forms select from the dot-separated parts of the
/// original tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagContext<'a> {
    original: &'a str,
    tag: Cow<'a, str>,
}

impl<'a> TagContext<'a> {
    /// A context where the processed tag is the original tag.
    pub fn new(tag: &'a str) -> Self {
        Self {
            original: tag,
            tag: Cow::Borrowed(tag),
        }
    }

    pub fn with_processed(original: &'a str, processed: String) -> Self {
        Self {
            original,
            tag: Cow::Owned(processed),
        }
    }

    #[must_use]
    pub fn original(&self) -> &str {
        self.original
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Resolve a tag placeholder. Lookup placeholders resolve to null.
    pub fn resolve(&self, placeholder: &Placeholder) -> ResolvedValue {
        match placeholder {
            Placeholder::Tag(None) => ResolvedValue::Text(self.tag.to_string()),
            Placeholder::Tag(Some(sel)) | Placeholder::TagParts(sel) => self.select(*sel),
            Placeholder::Geo { .. } => ResolvedValue::Null,
        }
    }

    /// Select parts of the original tag.
    ///
    /// Negative indices count from the end. A range is inclusive, its end is
    /// clamped to the last part, and it is null if its start is out of range
    /// or after its end.
    pub fn select(&self, selector: TagSelector) -> ResolvedValue {
        let parts: Vec<&str> = self.original.split('.').collect();
        let len = parts.len() as isize;
        let normalize = |i: isize| if i < 0 { len + i } else { i };

        match selector {
            TagSelector::Index(i) => {
                let i = normalize(i);
                if (0..len).contains(&i) {
                    ResolvedValue::Text(parts[i as usize].to_string())
                } else {
                    ResolvedValue::Null
                }
            }
            TagSelector::Range(a, b) => {
                let start = normalize(a);
                let end = normalize(b).min(len - 1);
                if !(0..len).contains(&start) || start > end {
                    return ResolvedValue::Null;
                }
                ResolvedValue::Text(parts[start as usize..=end as usize].join("."))
            }
        }
    }
}

/// Rewrites the tag of each record.
///
/// The tag is first processed by removing and adding prefixes and suffixes,
/// in that order. If a tag template is configured it is then rendered with
/// `${tag}` bound to the processed tag.
#[derive(Clone, Debug, Default)]
pub struct TagRewriter {
    remove_prefix: Option<String>,
    remove_suffix: Option<String>,
    add_prefix: Option<String>,
    add_suffix: Option<String>,
    template: Option<Template>,
}

impl TagRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tag template.
    ///
    /// # Errors
    ///
    /// Fails if the template is malformed or uses lookup placeholders.
    pub fn template(mut self, raw: &str) -> Result<Self> {
        let template = Template::parse(raw)?;
        if template.placeholders().any(Placeholder::is_geo) {
            return Err(Error::GeoPlaceholderInTag {
                template: raw.to_string(),
            });
        }
        self.template = Some(template);
        Ok(self)
    }

    pub fn remove_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.remove_prefix = Some(prefix.into());
        self
    }

    pub fn remove_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.remove_suffix = Some(suffix.into());
        self
    }

    pub fn add_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.add_prefix = Some(prefix.into());
        self
    }

    pub fn add_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.add_suffix = Some(suffix.into());
        self
    }

    /// Apply prefix and suffix handling to `tag`.
    pub fn context<'a>(&self, tag: &'a str) -> TagContext<'a> {
        let mut processed = tag;
        if let Some(prefix) = &self.remove_prefix {
            processed = processed.strip_prefix(prefix.as_str()).unwrap_or(processed);
        }
        if let Some(suffix) = &self.remove_suffix {
            processed = processed.strip_suffix(suffix.as_str()).unwrap_or(processed);
        }
        if self.add_prefix.is_none() && self.add_suffix.is_none() && processed.len() == tag.len() {
            return TagContext::new(tag);
        }

        let mut owned = String::with_capacity(processed.len() + 16);
        if let Some(prefix) = &self.add_prefix {
            owned.push_str(prefix);
        }
        owned.push_str(processed);
        if let Some(suffix) = &self.add_suffix {
            owned.push_str(suffix);
        }
        TagContext::with_processed(tag, owned)
    }

    /// The tag to emit for a record arriving with `ctx`.
    pub fn render(&self, ctx: &TagContext<'_>) -> String {
        match &self.template {
            Some(template) => template.render_text(|p| ctx.resolve(p)),
            None => ctx.tag().to_string(),
        }
    }

    /// Process and render `tag` in one step.
    pub fn rewrite(&self, tag: &str) -> String {
        self.render(&self.context(tag))
    }
}
