//! The georecord library for geolocation enrichment of structured records.
//!
//! Records are enriched through templates embedded in configuration. A
//! template such as `${city['host']}` looks up the address stored in the
//! record's `host` field; templates can also build text
//! (`${latitude['host']},${longitude['host']}`) or JSON structures
//! (`[${longitude['host']}, ${latitude['host']}]`) while keeping numbers
//! numeric. Tags are rewritten with the same placeholder syntax
//! (`geoip.${tag_parts[1]}`).
//!
//! # Examples
//!
//! ```rust
//! use georecord::{Config, GeoipFilter, Location, MemoryLookup};
//! use serde_json::json;
//!
//! let config: Config = r#"{
//!     "geoip_lookup_key": "host",
//!     "record": { "geopoint": "[${longitude['host']}, ${latitude['host']}]" },
//!     "remove_tag_prefix": "input.",
//!     "tag": "geoip.${tag}"
//! }"#
//! .parse()
//! .unwrap();
//!
//! let lookup = MemoryLookup::new().with(
//!     "8.8.8.8",
//!     Location {
//!         latitude: Some(37.38600158691406),
//!         longitude: Some(-122.08380126953125),
//!         ..Location::default()
//!     },
//! );
//! let filter = GeoipFilter::new(&config, lookup).unwrap();
//!
//! let record = json!({"host": "8.8.8.8"}).as_object().unwrap().clone();
//! let (tag, record) = filter.emit("input.access", record);
//! assert_eq!(tag, "geoip.access");
//! assert_eq!(record["geopoint"], json!([-122.08380126953125, 37.38600158691406]));
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod input;
pub mod lookup;
pub mod record;
pub mod render;
pub mod resolve;
pub mod tag;
pub mod template;
pub mod value;

pub use crate::config::{Config, OutputSpec};
pub use crate::error::{Error, Result};
pub use crate::filter::GeoipFilter;
pub use crate::lookup::{GeoKind, GeoLookup, Location, MemoryLookup, MmdbLookup};
pub use crate::record::RecordBuilder;
pub use crate::render::{RecordTemplate, TemplateShape};
pub use crate::resolve::{Record, Resolver};
pub use crate::tag::{TagContext, TagRewriter};
pub use crate::template::{Placeholder, Segment, TagSelector, Template};
pub use crate::value::ResolvedValue;
