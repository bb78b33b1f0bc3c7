//! Geolocation lookup capability.
//!
//! The template engine only ever sees the [`GeoLookup`] trait: given a
//! [`GeoKind`] and an address it returns a typed value or `None`. Two
//! implementations are provided, one backed by a MaxMind City database and
//! one backed by an in-memory table.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use camino::Utf8Path;
use maxminddb::{geoip2, Reader};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::value::ResolvedValue;

/// A geolocation attribute that can be resolved from an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeoKind {
    City,
    CountryName,
    CountryCode,
    Latitude,
    Longitude,
    /// `[longitude, latitude]`, longitude first.
    Geopoint,
    Region,
    RegionCode,
    PostalCode,
    ContinentCode,
    TimeZone,
}

impl GeoKind {
    pub const ALL: [GeoKind; 11] = [
        GeoKind::City,
        GeoKind::CountryName,
        GeoKind::CountryCode,
        GeoKind::Latitude,
        GeoKind::Longitude,
        GeoKind::Geopoint,
        GeoKind::Region,
        GeoKind::RegionCode,
        GeoKind::PostalCode,
        GeoKind::ContinentCode,
        GeoKind::TimeZone,
    ];

    /// The name used in placeholders and `enable_key_<name>` shorthands.
    pub fn name(self) -> &'static str {
        match self {
            GeoKind::City => "city",
            GeoKind::CountryName => "country_name",
            GeoKind::CountryCode => "country_code",
            GeoKind::Latitude => "latitude",
            GeoKind::Longitude => "longitude",
            GeoKind::Geopoint => "geopoint",
            GeoKind::Region => "region",
            GeoKind::RegionCode => "region_code",
            GeoKind::PostalCode => "postal_code",
            GeoKind::ContinentCode => "continent_code",
            GeoKind::TimeZone => "time_zone",
        }
    }
}

impl fmt::Display for GeoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GeoKind {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        GeoKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or(())
    }
}

/// Looks up geolocation attributes of an address.
///
/// Implementations must be safe for concurrent reads; the engine shares one
/// instance across every record it renders.
pub trait GeoLookup: Send + Sync {
    /// Resolve `kind` for `address`, or `None` if the address is not an IP,
    /// is not in the database, or the database has no value for `kind`.
    fn lookup(&self, kind: GeoKind, address: &str) -> Option<ResolvedValue>;
}

impl<L: GeoLookup + ?Sized> GeoLookup for &L {
    fn lookup(&self, kind: GeoKind, address: &str) -> Option<ResolvedValue> {
        (**self).lookup(kind, address)
    }
}

impl<L: GeoLookup + ?Sized> GeoLookup for Box<L> {
    fn lookup(&self, kind: GeoKind, address: &str) -> Option<ResolvedValue> {
        (**self).lookup(kind, address)
    }
}

/// Everything known about one address.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Location {
    pub city: Option<String>,
    pub country_name: Option<String>,
    pub country_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub region: Option<String>,
    pub region_code: Option<String>,
    pub postal_code: Option<String>,
    pub continent_code: Option<String>,
    pub time_zone: Option<String>,
}

impl Location {
    /// Extract one attribute as a typed value.
    pub fn get(&self, kind: GeoKind) -> Option<ResolvedValue> {
        let text = |s: &Option<String>| s.clone().map(ResolvedValue::Text);
        match kind {
            GeoKind::City => text(&self.city),
            GeoKind::CountryName => text(&self.country_name),
            GeoKind::CountryCode => text(&self.country_code),
            GeoKind::Latitude => self.latitude.map(ResolvedValue::Number),
            GeoKind::Longitude => self.longitude.map(ResolvedValue::Number),
            GeoKind::Geopoint => match (self.longitude, self.latitude) {
                (Some(lon), Some(lat)) => Some(ResolvedValue::Array(vec![
                    ResolvedValue::Number(lon),
                    ResolvedValue::Number(lat),
                ])),
                _ => None,
            },
            GeoKind::Region => text(&self.region),
            GeoKind::RegionCode => text(&self.region_code),
            GeoKind::PostalCode => text(&self.postal_code),
            GeoKind::ContinentCode => text(&self.continent_code),
            GeoKind::TimeZone => text(&self.time_zone),
        }
    }
}

/// Lookup backed by a MaxMind GeoLite2/GeoIP2 City database.
pub struct MmdbLookup {
    reader: Reader<Vec<u8>>,
}

impl fmt::Debug for MmdbLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmdbLookup")
            .field("database_type", &self.reader.metadata.database_type)
            .finish()
    }
}

impl MmdbLookup {
    /// Open a City database file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the file cannot be read or is not an MMDB file.
    pub fn open(path: &Utf8Path) -> Result<Self> {
        let reader = Reader::open_readfile(path).map_err(|source| Error::Database {
            path: path.to_owned(),
            source,
        })?;
        log::info!(
            "opened {} database at {}",
            reader.metadata.database_type,
            path
        );
        Ok(Self { reader })
    }

    /// Decode everything the database knows about `address`.
    pub fn locate(&self, address: &str) -> Option<Location> {
        let ip: IpAddr = address.parse().ok()?;
        let result = self.reader.lookup(ip).ok()?;
        if !result.has_data() {
            return None;
        }
        let city = result.decode::<geoip2::City>().ok()??;

        let subdivision = city.subdivisions.first();
        Some(Location {
            city: city.city.names.english.map(str::to_owned),
            country_name: city.country.names.english.map(str::to_owned),
            country_code: city.country.iso_code.map(str::to_owned),
            latitude: city.location.latitude,
            longitude: city.location.longitude,
            region: subdivision.and_then(|s| s.names.english).map(str::to_owned),
            region_code: subdivision.and_then(|s| s.iso_code).map(str::to_owned),
            postal_code: city.postal.code.map(str::to_owned),
            continent_code: city.continent.code.map(str::to_owned),
            time_zone: city.location.time_zone.map(str::to_owned),
        })
    }
}

impl GeoLookup for MmdbLookup {
    fn lookup(&self, kind: GeoKind, address: &str) -> Option<ResolvedValue> {
        self.locate(address)?.get(kind)
    }
}

/// Lookup backed by an in-memory table keyed by address.
///
/// Keys are normalized through [`IpAddr`], so `"::1"` and `"0:0::1"` hit the
/// same entry and non-addresses never match.
#[derive(Clone, Debug, Default)]
pub struct MemoryLookup {
    table: FxHashMap<IpAddr, Location>,
}

impl MemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry for `address`. Non-IP keys are ignored.
    pub fn insert(&mut self, address: &str, location: Location) -> &mut Self {
        match address.parse::<IpAddr>() {
            Ok(ip) => {
                self.table.insert(ip, location);
            }
            Err(_) => log::warn!("ignoring non-IP lookup table key {address:?}"),
        }
        self
    }

    pub fn with(mut self, address: &str, location: Location) -> Self {
        self.insert(address, location);
        self
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl GeoLookup for MemoryLookup {
    fn lookup(&self, kind: GeoKind, address: &str) -> Option<ResolvedValue> {
        let ip: IpAddr = address.parse().ok()?;
        self.table.get(&ip)?.get(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mountain_view() -> Location {
        Location {
            city: Some("Mountain View".into()),
            country_name: Some("United States".into()),
            country_code: Some("US".into()),
            latitude: Some(37.4192008972168),
            longitude: Some(-122.05740356445312),
            ..Location::default()
        }
    }

    #[test]
    fn kind_names_roundtrip() {
        for kind in GeoKind::ALL {
            assert_eq!(kind.name().parse::<GeoKind>(), Ok(kind));
        }
        assert!("cities".parse::<GeoKind>().is_err());
    }

    #[test]
    fn typed_values() {
        let db = MemoryLookup::new().with("66.102.3.80", mountain_view());
        assert_eq!(
            db.lookup(GeoKind::City, "66.102.3.80"),
            Some(ResolvedValue::Text("Mountain View".into()))
        );
        assert_eq!(
            db.lookup(GeoKind::Latitude, "66.102.3.80"),
            Some(ResolvedValue::Number(37.4192008972168))
        );
    }

    #[test]
    fn geopoint_is_longitude_first() {
        let db = MemoryLookup::new().with("66.102.3.80", mountain_view());
        assert_eq!(
            db.lookup(GeoKind::Geopoint, "66.102.3.80"),
            Some(ResolvedValue::Array(vec![
                ResolvedValue::Number(-122.05740356445312),
                ResolvedValue::Number(37.4192008972168),
            ]))
        );
    }

    #[test]
    fn misses_are_none() {
        let db = MemoryLookup::new().with("66.102.3.80", mountain_view());
        assert_eq!(db.lookup(GeoKind::City, "203.0.113.1"), None);
        assert_eq!(db.lookup(GeoKind::City, "0"), None);
        assert_eq!(db.lookup(GeoKind::City, "not an ip"), None);
        assert_eq!(db.lookup(GeoKind::PostalCode, "66.102.3.80"), None);
        assert_eq!(db.lookup(GeoKind::Geopoint, "203.0.113.1"), None);
    }

    #[test]
    fn non_ip_keys_are_ignored() {
        let mut db = MemoryLookup::new();
        db.insert("localhost", mountain_view());
        assert!(db.is_empty());
    }

    #[test]
    fn missing_database_is_an_error() {
        let err = MmdbLookup::open(Utf8Path::new("/nonexistent/GeoLite2-City.mmdb")).unwrap_err();
        assert!(matches!(err, Error::Database { .. }));
    }
}
