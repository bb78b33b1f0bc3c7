use serde_json::Value;

use crate::config::{Config, OutputSpec};
use crate::error::Result;
use crate::lookup::GeoLookup;
use crate::resolve::{Record, Resolver};
use crate::tag::TagContext;

/// Applies output specs to records.
///
/// Templates are parsed once when the builder is created and shared
/// read-only by every record, so one builder can serve many threads.
#[derive(Clone, Debug)]
pub struct RecordBuilder {
    specs: Vec<OutputSpec>,
    skip_adding_null_record: bool,
}

impl RecordBuilder {
    pub fn new(specs: Vec<OutputSpec>, skip_adding_null_record: bool) -> Self {
        Self {
            specs,
            skip_adding_null_record,
        }
    }

    /// Normalize and validate the output fields declared in `config`.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Config::output_specs`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let builder = Self::new(config.output_specs()?, config.skip_adding_null_record);
        log::info!(
            "configured {} output field(s) from lookup key(s) {:?}",
            builder.specs.len(),
            config.lookup_keys()
        );
        Ok(builder)
    }

    #[must_use]
    pub fn specs(&self) -> &[OutputSpec] {
        &self.specs
    }

    #[must_use]
    pub fn skips_null(&self) -> bool {
        self.skip_adding_null_record
    }

    /// Render every output field against `record` without modifying it.
    ///
    /// Fields are returned in declaration order. With
    /// `skip_adding_null_record`, a field is left out when its value is null
    /// or is an array or object whose leaves are all null. Text templates
    /// always produce a value.
    pub fn render<L: GeoLookup + ?Sized>(
        &self,
        record: &Record,
        lookup: &L,
        tag: &TagContext<'_>,
    ) -> Vec<(String, Value)> {
        let resolver = Resolver::new(lookup, record, tag);
        let mut fields = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let value = spec.template.render(|p| resolver.resolve(p));
            if self.skip_adding_null_record && value.is_deeply_null() {
                log::trace!("skipping null field {}", spec.name);
                continue;
            }
            fields.push((spec.name.clone(), value.to_json()));
        }
        fields
    }

    /// Add the rendered fields to `record`.
    ///
    /// Every template sees the record as it arrived; a value written for one
    /// output field is not visible to the next.
    pub fn apply<L: GeoLookup + ?Sized>(
        &self,
        mut record: Record,
        lookup: &L,
        tag: &TagContext<'_>,
    ) -> Record {
        let fields = self.render(&record, lookup, tag);
        for (name, value) in fields {
            record.insert(name, value);
        }
        record
    }

    /// Like [`RecordBuilder::apply`], leaving the input untouched.
    pub fn build<L: GeoLookup + ?Sized>(
        &self,
        record: &Record,
        lookup: &L,
        tag: &TagContext<'_>,
    ) -> Record {
        self.apply(record.clone(), lookup, tag)
    }
}
