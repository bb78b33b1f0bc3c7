use crate::config::Config;
use crate::error::Result;
use crate::lookup::GeoLookup;
use crate::record::RecordBuilder;
use crate::resolve::Record;
use crate::tag::{TagContext, TagRewriter};

/// Enriches records with geolocation fields and rewrites their tags.
///
/// All templates are validated and parsed when the filter is built;
/// processing a record cannot fail. The filter holds no mutable state and
/// can be shared across threads when its lookup can.
#[derive(Debug)]
pub struct GeoipFilter<L> {
    lookup: L,
    builder: RecordBuilder,
    rewriter: TagRewriter,
}

impl<L: GeoLookup> GeoipFilter<L> {
    /// Build a filter from configuration.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found in the output fields or
    /// the tag options.
    pub fn new(config: &Config, lookup: L) -> Result<Self> {
        let builder = RecordBuilder::from_config(config)?;
        let rewriter = config.tag_rewriter()?;
        Ok(Self::from_parts(lookup, builder, rewriter))
    }

    /// Assemble a filter from an already validated builder and rewriter.
    pub fn from_parts(lookup: L, builder: RecordBuilder, rewriter: TagRewriter) -> Self {
        Self {
            lookup,
            builder,
            rewriter,
        }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn builder(&self) -> &RecordBuilder {
        &self.builder
    }

    /// Enrich `record`, leaving the tag alone.
    pub fn filter(&self, tag: &str, record: Record) -> Record {
        self.builder
            .apply(record, &self.lookup, &TagContext::new(tag))
    }

    /// Enrich `record` and compute the tag to emit it under.
    ///
    /// Record templates see `${tag}` as the processed tag.
    pub fn emit(&self, tag: &str, record: Record) -> (String, Record) {
        let ctx = self.rewriter.context(tag);
        let record = self.builder.apply(record, &self.lookup, &ctx);
        (self.rewriter.render(&ctx), record)
    }
}
