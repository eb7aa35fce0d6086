//! Remote lookup-API resolver.
//!
//! Queries a hosted geolocation API per request instead of local dataset
//! files. The vendor's JSON document is translated into the normalized
//! record; city and ASN data always travel together in these responses,
//! so both presence flags are set on success. Refresh is a no-op; there
//! is nothing local to keep current.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::config::SourceSettings;
use crate::error::{GeoError, Result};
use crate::record::{
    AnonymousIp, Asn, City, Continent, Country, GeoRecord, Location, Names, Postal, Subdivision,
    Traits,
};
use crate::resolver::Resolver;

pub struct ApiResolver {
    name: String,
    endpoint: String,
    key: String,
    client: Client,
}

impl ApiResolver {
    pub fn from_settings(name: &str, settings: &SourceSettings) -> Result<Self> {
        Ok(ApiResolver {
            name: name.to_string(),
            endpoint: settings.api.endpoint.trim_end_matches('/').to_string(),
            key: settings.api.key.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
        })
    }
}

#[async_trait]
impl Resolver for ApiResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        info!(source = %self.name, "starting resolver");
        if self.key.is_empty() {
            return Err(GeoError::Configuration(format!(
                "source '{}' has no API key configured",
                self.name
            )));
        }
        Ok(())
    }

    async fn lookup(&self, address: &str, as_fallback: bool) -> Result<Option<GeoRecord>> {
        let ip = IpAddr::from_str(address).map_err(|_| GeoError::InvalidAddress)?;
        if self.key.is_empty() {
            return Err(GeoError::Configuration(format!(
                "source '{}' has no API key configured",
                self.name
            )));
        }

        let url = format!("{}/{}?access_key={}", self.endpoint, ip, self.key);
        let payload: ApiPayload = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| GeoError::SourceRead(err.to_string()))?
            .error_for_status()
            .map_err(|err| GeoError::SourceRead(err.to_string()))?
            .json()
            .await
            .map_err(|err| GeoError::SourceRead(err.to_string()))?;

        Ok(Some(payload.into_record(&self.name, as_fallback)))
    }

    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) {
        info!(source = %self.name, "shutting down resolver");
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiPayload {
    ip: String,
    continent_code: String,
    continent_name: String,
    country_code: String,
    country_name: String,
    region_code: String,
    region_name: String,
    city: String,
    zip: String,
    latitude: f64,
    longitude: f64,
    location: ApiLocation,
    time_zone: ApiTimeZone,
    connection: ApiConnection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiLocation {
    geoname_id: u32,
    calling_code: String,
    is_eu: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiTimeZone {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiConnection {
    asn: u32,
    isp: String,
}

impl ApiPayload {
    fn into_record(self, source: &str, as_fallback: bool) -> GeoRecord {
        let calling_code = self.location.calling_code.parse::<u32>().unwrap_or_default();
        let country = Country {
            geoname_id: 0,
            is_in_european_union: self.location.is_eu,
            iso_code: self.country_code,
            names: en_names(self.country_name),
            kind: String::new(),
        };

        GeoRecord {
            address: self.ip,
            source: source.to_string(),
            is_fallback: as_fallback,
            has_city: true,
            city: City {
                geoname_id: self.location.geoname_id,
                names: en_names(self.city),
            },
            continent: Continent {
                code: self.continent_code,
                geoname_id: 0,
                names: en_names(self.continent_name),
            },
            country: country.clone(),
            registered_country: country.clone(),
            represented_country: country,
            location: Location {
                accuracy_radius: 0,
                latitude: self.latitude,
                longitude: self.longitude,
                metro_code: calling_code,
                time_zone: self.time_zone.id,
            },
            postal: Postal { code: self.zip },
            subdivisions: vec![Subdivision {
                geoname_id: 0,
                iso_code: self.region_code,
                names: en_names(self.region_name),
            }],
            traits: Traits::default(),
            has_asn: true,
            asn: Asn {
                autonomous_system_number: self.connection.asn,
                autonomous_system_organization: self.connection.isp,
            },
            has_anonymous_ip: false,
            anonymous_ip: AnonymousIp::default(),
        }
    }
}

fn en_names(value: String) -> Names {
    let mut names = Names::new();
    names.insert("en".to_string(), value);
    names
}
