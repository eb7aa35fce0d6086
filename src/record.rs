//! The normalized geolocation record.
//!
//! [`GeoRecord`] is the canonical, source-agnostic output of every
//! resolver: a flat document with presence flags for each optional
//! capability (city detail, autonomous-system info, anonymity info) and
//! independently owned sub-records. A false presence flag means the
//! matching sub-section holds zero values and must not be trusted.
//!
//! Conversions from the `maxminddb` document types live here so the
//! resolvers only ever hand owned records across their boundary.

use std::collections::BTreeMap;

use maxminddb::geoip2;
use serde::{Deserialize, Serialize};

/// Locale-keyed display names (e.g. `"en" -> "Lisbon"`).
pub type Names = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub geoname_id: u32,
    pub names: Names,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Continent {
    pub code: String,
    pub geoname_id: u32,
    pub names: Names,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub geoname_id: u32,
    pub is_in_european_union: bool,
    pub iso_code: String,
    pub names: Names,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub accuracy_radius: u16,
    pub latitude: f64,
    pub longitude: f64,
    pub metro_code: u32,
    pub time_zone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Postal {
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subdivision {
    pub geoname_id: u32,
    pub iso_code: String,
    pub names: Names,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Traits {
    pub is_anonymous_proxy: bool,
    pub is_satellite_provider: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Asn {
    pub autonomous_system_number: u32,
    pub autonomous_system_organization: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnonymousIp {
    pub is_anonymous: bool,
    pub is_anonymous_vpn: bool,
    pub is_hosting_provider: bool,
    pub is_public_proxy: bool,
    pub is_tor_exit_node: bool,
}

/// Canonical output of any resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub address: String,
    pub source: String,
    pub is_fallback: bool,
    pub has_city: bool,
    pub city: City,
    pub continent: Continent,
    pub country: Country,
    pub location: Location,
    pub postal: Postal,
    pub registered_country: Country,
    pub represented_country: Country,
    pub subdivisions: Vec<Subdivision>,
    pub traits: Traits,
    pub has_asn: bool,
    pub asn: Asn,
    pub has_anonymous_ip: bool,
    pub anonymous_ip: AnonymousIp,
}

impl GeoRecord {
    /// An empty record stamped with the caller's fallback flag; presence
    /// flags stay false until a dataset populates its section.
    pub fn new(address: &str, source: &str, as_fallback: bool) -> Self {
        GeoRecord {
            address: address.to_string(),
            source: source.to_string(),
            is_fallback: as_fallback,
            ..Default::default()
        }
    }

    /// Populates the city-level sections from a city dataset document.
    pub fn apply_city(&mut self, doc: &geoip2::City<'_>) {
        if let Some(city) = &doc.city {
            self.city = convert::city(city);
        }
        if let Some(continent) = &doc.continent {
            self.continent = convert::continent(continent);
        }
        if let Some(country) = &doc.country {
            self.country = convert::country(country);
        }
        if let Some(location) = &doc.location {
            self.location = convert::location(location);
        }
        if let Some(postal) = &doc.postal {
            self.postal = convert::postal(postal);
        }
        if let Some(registered) = &doc.registered_country {
            self.registered_country = convert::country(registered);
        }
        if let Some(represented) = &doc.represented_country {
            self.represented_country = convert::represented_country(represented);
        }
        if let Some(subdivisions) = &doc.subdivisions {
            self.subdivisions = subdivisions.iter().map(convert::subdivision).collect();
        }
        if let Some(traits) = &doc.traits {
            self.traits = convert::traits(traits);
        }
        self.has_city = true;
    }

    /// Populates the country-level sections from a country-only dataset
    /// document. Leaves `has_city` untouched.
    pub fn apply_country(&mut self, doc: &geoip2::Country<'_>) {
        if let Some(continent) = &doc.continent {
            self.continent = convert::continent(continent);
        }
        if let Some(country) = &doc.country {
            self.country = convert::country(country);
        }
        if let Some(registered) = &doc.registered_country {
            self.registered_country = convert::country(registered);
        }
        if let Some(represented) = &doc.represented_country {
            self.represented_country = convert::represented_country(represented);
        }
        if let Some(traits) = &doc.traits {
            self.traits = convert::traits(traits);
        }
    }

    pub fn apply_asn(&mut self, doc: &geoip2::Asn<'_>) {
        self.asn = Asn {
            autonomous_system_number: doc.autonomous_system_number.unwrap_or_default(),
            autonomous_system_organization: doc
                .autonomous_system_organization
                .unwrap_or_default()
                .to_string(),
        };
        self.has_asn = true;
    }

    pub fn apply_anonymous(&mut self, doc: &geoip2::AnonymousIp) {
        self.anonymous_ip = AnonymousIp {
            is_anonymous: doc.is_anonymous.unwrap_or_default(),
            is_anonymous_vpn: doc.is_anonymous_vpn.unwrap_or_default(),
            is_hosting_provider: doc.is_hosting_provider.unwrap_or_default(),
            is_public_proxy: doc.is_public_proxy.unwrap_or_default(),
            is_tor_exit_node: doc.is_tor_exit_node.unwrap_or_default(),
        };
        self.has_anonymous_ip = true;
    }
}

mod convert {
    use super::*;

    pub(super) fn names(names: &Option<BTreeMap<&str, &str>>) -> Names {
        names
            .as_ref()
            .map(|m| {
                m.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(super) fn city(m: &geoip2::city::City<'_>) -> City {
        City {
            geoname_id: m.geoname_id.unwrap_or_default(),
            names: names(&m.names),
        }
    }

    pub(super) fn continent(m: &geoip2::country::Continent<'_>) -> Continent {
        Continent {
            code: m.code.unwrap_or_default().to_string(),
            geoname_id: m.geoname_id.unwrap_or_default(),
            names: names(&m.names),
        }
    }

    pub(super) fn country(m: &geoip2::country::Country<'_>) -> Country {
        Country {
            geoname_id: m.geoname_id.unwrap_or_default(),
            is_in_european_union: m.is_in_european_union.unwrap_or_default(),
            iso_code: m.iso_code.unwrap_or_default().to_string(),
            names: names(&m.names),
            kind: String::new(),
        }
    }

    pub(super) fn represented_country(m: &geoip2::country::RepresentedCountry<'_>) -> Country {
        Country {
            geoname_id: m.geoname_id.unwrap_or_default(),
            is_in_european_union: m.is_in_european_union.unwrap_or_default(),
            iso_code: m.iso_code.unwrap_or_default().to_string(),
            names: names(&m.names),
            kind: m.representation_type.unwrap_or_default().to_string(),
        }
    }

    pub(super) fn location(m: &geoip2::city::Location<'_>) -> Location {
        Location {
            accuracy_radius: m.accuracy_radius.unwrap_or_default(),
            latitude: m.latitude.unwrap_or_default(),
            longitude: m.longitude.unwrap_or_default(),
            metro_code: u32::from(m.metro_code.unwrap_or_default()),
            time_zone: m.time_zone.unwrap_or_default().to_string(),
        }
    }

    pub(super) fn postal(m: &geoip2::city::Postal<'_>) -> Postal {
        Postal {
            code: m.code.unwrap_or_default().to_string(),
        }
    }

    pub(super) fn subdivision(m: &geoip2::city::Subdivision<'_>) -> Subdivision {
        Subdivision {
            geoname_id: m.geoname_id.unwrap_or_default(),
            iso_code: m.iso_code.unwrap_or_default().to_string(),
            names: names(&m.names),
        }
    }

    pub(super) fn traits(m: &geoip2::country::Traits) -> Traits {
        Traits {
            is_anonymous_proxy: m.is_anonymous_proxy.unwrap_or_default(),
            is_satellite_provider: m.is_satellite_provider.unwrap_or_default(),
        }
    }
}
