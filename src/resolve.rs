use serde_json::{Map, Value};

use crate::lookup::GeoLookup;
use crate::tag::TagContext;
use crate::template::Placeholder;
use crate::value::ResolvedValue;

/// A structured log record.
pub type Record = Map<String, Value>;

/// Find the value stored at `path` in `record`.
///
/// A top-level key equal to the whole path wins (`"ip.origin"`). Otherwise
/// the path is split on `.` and followed through nested objects.
pub fn field<'r>(record: &'r Record, path: &str) -> Option<&'r Value> {
    if let Some(value) = record.get(path) {
        return Some(value);
    }
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Resolves placeholders against one record and its tag.
///
/// Resolution never fails: a missing field, a value that is not a string,
/// or an address unknown to the lookup all resolve to null.
pub struct Resolver<'a, L: ?Sized> {
    lookup: &'a L,
    record: &'a Record,
    tag: &'a TagContext<'a>,
}

impl<'a, L: GeoLookup + ?Sized> Resolver<'a, L> {
    pub fn new(lookup: &'a L, record: &'a Record, tag: &'a TagContext<'a>) -> Self {
        Self {
            lookup,
            record,
            tag,
        }
    }

    pub fn resolve(&self, placeholder: &Placeholder) -> ResolvedValue {
        match placeholder {
            Placeholder::Geo { kind, field: path } => {
                let Some(address) = field(self.record, path).and_then(Value::as_str) else {
                    log::trace!("no address at {path:?}");
                    return ResolvedValue::Null;
                };
                self.lookup.lookup(*kind, address).unwrap_or_else(|| {
                    log::debug!("no {kind} for {address:?} (from {path:?})");
                    ResolvedValue::Null
                })
            }
            _ => self.tag.resolve(placeholder),
        }
    }
}
