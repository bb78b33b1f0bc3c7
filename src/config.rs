//! Plugin configuration and its normalization into output specs.
//!
//! Two surface syntaxes declare output fields:
//!
//! * the `enable_key_<kind>` shorthand, a comma separated list of field
//!   names aligned with `geoip_lookup_key`, and
//! * the `record` map of field name to template.
//!
//! Both normalize into the same list of [`OutputSpec`]s.

use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::lookup::GeoKind;
use crate::render::RecordTemplate;
use crate::tag::TagRewriter;
use crate::template::Placeholder;

const SHORTHAND_PREFIX: &str = "enable_key_";

fn default_lookup_key() -> String {
    "host".to_string()
}

/// Configuration as loaded from a JSON document.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Path to the City database.
    #[serde(default)]
    pub geoip_database: Option<Utf8PathBuf>,

    /// Comma separated record fields holding addresses.
    #[serde(default = "default_lookup_key")]
    pub geoip_lookup_key: String,

    /// Leave a field out instead of storing null when nothing resolved.
    #[serde(default)]
    pub skip_adding_null_record: bool,

    /// Output field name to template, in declaration order. Non-string
    /// values are used as JSON templates.
    #[serde(default)]
    pub record: Map<String, Value>,

    /// Tag template, e.g. `geoip.${tag}`.
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub remove_tag_prefix: Option<String>,
    #[serde(default)]
    pub remove_tag_suffix: Option<String>,
    #[serde(default)]
    pub add_tag_prefix: Option<String>,
    #[serde(default)]
    pub add_tag_suffix: Option<String>,

    /// `enable_key_<kind>` entries, and anything unrecognized.
    #[serde(flatten)]
    pub shorthand: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geoip_database: None,
            geoip_lookup_key: default_lookup_key(),
            skip_adding_null_record: false,
            record: Map::new(),
            tag: None,
            remove_tag_prefix: None,
            remove_tag_suffix: None,
            add_tag_prefix: None,
            add_tag_suffix: None,
            shorthand: Map::new(),
        }
    }
}

impl FromStr for Config {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

/// One output field and the template producing its value.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub template: RecordTemplate,
    /// Declared through `enable_key_<kind>` rather than `record`.
    pub shorthand: bool,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_path(path: &Utf8Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| Error::ConfigFile {
            path: path.to_owned(),
            source,
        })
    }

    /// The lookup key list, split on commas and trimmed.
    pub fn lookup_keys(&self) -> Vec<&str> {
        split_list(&self.geoip_lookup_key)
    }

    /// Normalize the shorthand and `record` entries into output specs.
    ///
    /// Shorthand entries come first, in declaration order, each expanded to
    /// one bare placeholder per lookup key; `record` entries follow.
    ///
    /// # Errors
    ///
    /// Fails on unknown keys or shorthand kinds, shorthand lists whose length
    /// differs from the lookup key list, malformed templates, and when no
    /// output field is declared at all.
    pub fn output_specs(&self) -> Result<Vec<OutputSpec>> {
        let keys = self.lookup_keys();
        if keys.is_empty() {
            return Err(Error::NoLookupKey);
        }

        let mut specs = Vec::new();
        for (key, value) in &self.shorthand {
            let Some(kind_name) = key.strip_prefix(SHORTHAND_PREFIX) else {
                return Err(Error::UnknownConfigKey { key: key.clone() });
            };
            let kind: GeoKind = kind_name
                .parse()
                .map_err(|_| Error::UnknownShorthand { key: key.clone() })?;
            let Some(list) = value.as_str() else {
                return Err(Error::InvalidTemplate {
                    template: value.to_string(),
                    reason: format!("{key} expects a comma separated list of field names"),
                });
            };

            let names = split_list(list);
            if names.len() != keys.len() {
                return Err(Error::KeyCountMismatch {
                    key: key.clone(),
                    expected: keys.len(),
                    found: names.len(),
                });
            }
            for (field, name) in keys.iter().zip(names) {
                specs.push(OutputSpec {
                    name: name.to_string(),
                    template: RecordTemplate::bare(Placeholder::Geo {
                        kind,
                        field: field.to_string(),
                    }),
                    shorthand: true,
                });
            }
        }

        for (name, value) in &self.record {
            let template = match value {
                Value::String(raw) => RecordTemplate::parse(raw)?,
                other => RecordTemplate::parse(&other.to_string())?,
            };
            specs.push(OutputSpec {
                name: name.clone(),
                template,
                shorthand: false,
            });
        }

        if specs.is_empty() {
            return Err(Error::NoOutputFields);
        }
        Ok(specs)
    }

    /// Build the tag rewriter from the tag options.
    pub fn tag_rewriter(&self) -> Result<TagRewriter> {
        let mut rewriter = TagRewriter::new();
        if let Some(prefix) = &self.remove_tag_prefix {
            rewriter = rewriter.remove_prefix(prefix.as_str());
        }
        if let Some(suffix) = &self.remove_tag_suffix {
            rewriter = rewriter.remove_suffix(suffix.as_str());
        }
        if let Some(prefix) = &self.add_tag_prefix {
            rewriter = rewriter.add_prefix(prefix.as_str());
        }
        if let Some(suffix) = &self.add_tag_suffix {
            rewriter = rewriter.add_suffix(suffix.as_str());
        }
        if let Some(template) = &self.tag {
            rewriter = rewriter.template(template)?;
        }
        Ok(rewriter)
    }
}

fn split_list(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
