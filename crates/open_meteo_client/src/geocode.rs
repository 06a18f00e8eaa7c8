//! Place-name lookup via the Open-Meteo geocoding API.

use async_trait::async_trait;
use common::config::FetchConfig;
use common::{Coordinates, Error};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::failure::{self, FetchFailure};

/// Resolves a free-form place name to coordinates.
///
/// `Ok(None)` means the provider answered and knows no such place.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Option<Coordinates>, FetchFailure>;
}

#[async_trait]
impl<T: Geocoder + ?Sized> Geocoder for Arc<T> {
    async fn resolve(&self, name: &str) -> Result<Option<Coordinates>, FetchFailure> {
        (**self).resolve(name).await
    }
}

#[derive(Debug, Clone)]
pub struct OpenMeteoGeocoder {
    client: reqwest::Client,
    base_url: String,
}

/// Response from `/v1/search`.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<Place>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Place {
    #[serde(default)]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub country: Option<String>,
}

impl SearchResponse {
    /// Best match, skipping entries with out-of-range coordinates.
    pub fn best_match(&self) -> Option<Coordinates> {
        self.results
            .iter()
            .find_map(|place| Coordinates::new(place.latitude, place.longitude))
    }
}

impl OpenMeteoGeocoder {
    pub fn new(config: &FetchConfig) -> Result<Self, Error> {
        Ok(Self {
            client: crate::build_http_client(config)?,
            base_url: config.geocoding_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for OpenMeteoGeocoder {
    async fn resolve(&self, name: &str) -> Result<Option<Coordinates>, FetchFailure> {
        debug!("Geocoding '{}' via {}", name, self.base_url);

        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("name", name),
                ("count", "1"),
                ("language", "en"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| FetchFailure::from_reqwest(&e))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let retry_after = failure::retry_after_header(&resp);
            return Err(FetchFailure::from_status(status, retry_after.as_deref()));
        }

        let payload: SearchResponse = resp
            .json()
            .await
            .map_err(|_| FetchFailure::UpstreamError { status_code: status })?;

        let found = payload.best_match();
        debug!("Geocoded '{}' -> {:?}", name, found);
        Ok(found)
    }
}
