use camino::Utf8PathBuf;

/// Error types for the georecord library.
///
/// Every variant is a configuration-time failure. Per-record problems
/// (missing fields, unresolvable addresses) never surface as errors; they
/// resolve to null instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `${...}` placeholder could not be parsed.
    #[error("invalid placeholder in {template:?}: {reason}")]
    InvalidPlaceholder { template: String, reason: String },

    /// A placeholder names a kind that is neither a lookup kind nor a tag form.
    #[error("unknown placeholder kind {kind:?} in {template:?}")]
    UnknownKind { template: String, kind: String },

    /// An array or object template is not valid JSON once its placeholders are filled.
    #[error("failed to parse {template:?} as json")]
    InvalidJson {
        template: String,
        #[source]
        source: serde_json::Error,
    },

    /// A structural template uses a placeholder where only literal text is allowed.
    #[error("invalid template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// The tag template references something other than the tag.
    #[error("tag template {template:?} may only use ${{tag}}, ${{tag[n]}} and ${{tag_parts[..]}}")]
    GeoPlaceholderInTag { template: String },

    /// `enable_key_*` lists and `geoip_lookup_key` disagree on their length.
    #[error("{key} has {found} entries but geoip_lookup_key has {expected}")]
    KeyCountMismatch {
        key: String,
        expected: usize,
        found: usize,
    },

    /// `enable_key_<kind>` names an unsupported lookup kind.
    #[error("unknown shorthand {key:?}")]
    UnknownShorthand { key: String },

    /// A configuration key that is not understood.
    #[error("unknown configuration key {key:?}")]
    UnknownConfigKey { key: String },

    /// Neither `enable_key_*` nor `record` produced any output field.
    #[error("required at least one option of 'enable_key_*' or 'record'")]
    NoOutputFields,

    /// `geoip_lookup_key` is empty.
    #[error("geoip_lookup_key must name at least one field")]
    NoLookupKey,

    /// MMDB database file could not be opened.
    #[error("failed to open database {path}")]
    Database {
        path: Utf8PathBuf,
        #[source]
        source: maxminddb::MaxMindDbError,
    },

    /// The configuration file is not valid JSON.
    #[error("failed to read configuration {path}")]
    ConfigFile {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using the library error.
pub type Result<T> = std::result::Result<T, Error>;
