use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::models::Location;

const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// GeocodeError
///
/// `Unresolvable` is the client's fault (bad address) and maps to 422;
/// `Unavailable` is ours (network, quota, upstream outage) and maps to 500.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("address could not be resolved: {0}")]
    Unresolvable(String),
    #[error("geocoding service unavailable: {0}")]
    Unavailable(String),
}

/// Geocoder
///
/// Resolves a free-text address to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Location, GeocodeError>;
}

pub type GeocoderState = Arc<dyn Geocoder>;

// --- Google Geocoding API ---

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: Location,
}

/// GoogleGeocoder
///
/// Calls the Google Geocoding API and takes the first match.
#[derive(Clone)]
pub struct GoogleGeocoder {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(api_key, GOOGLE_GEOCODE_URL)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<Location, GeocodeError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| GeocodeError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeocodeError::Unavailable(format!(
                "geocoding API returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .json::<GeocodeResponse>()
            .await
            .map_err(|e| GeocodeError::Unavailable(e.to_string()))?;

        interpret(address, body)
    }
}

fn interpret(address: &str, body: GeocodeResponse) -> Result<Location, GeocodeError> {
    match body.status.as_str() {
        "OK" => body
            .results
            .into_iter()
            .next()
            .map(|result| result.geometry.location)
            .ok_or_else(|| GeocodeError::Unresolvable(address.to_string())),
        "ZERO_RESULTS" => Err(GeocodeError::Unresolvable(address.to_string())),
        other => Err(GeocodeError::Unavailable(format!("geocoding API status {}", other))),
    }
}

// --- Mock ---

#[derive(Debug, Clone, Copy, PartialEq)]
enum MockOutcome {
    Resolve(Location),
    Unresolvable,
    Unavailable,
}

/// MockGeocoder
///
/// Answers every address with a fixed outcome. Used in tests and for local runs
/// without a `GOOGLE_API_KEY`.
#[derive(Debug, Clone, Copy)]
pub struct MockGeocoder {
    outcome: MockOutcome,
}

impl Default for MockGeocoder {
    fn default() -> Self {
        // Empire State Building, the placeholder the frontend has always used.
        Self::resolving(Location {
            lat: 40.7484474,
            lng: -73.9871516,
        })
    }
}

impl MockGeocoder {
    pub fn resolving(location: Location) -> Self {
        Self {
            outcome: MockOutcome::Resolve(location),
        }
    }

    pub fn unresolvable() -> Self {
        Self {
            outcome: MockOutcome::Unresolvable,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            outcome: MockOutcome::Unavailable,
        }
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, address: &str) -> Result<Location, GeocodeError> {
        match self.outcome {
            MockOutcome::Resolve(location) => Ok(location),
            MockOutcome::Unresolvable => Err(GeocodeError::Unresolvable(address.to_string())),
            MockOutcome::Unavailable => {
                Err(GeocodeError::Unavailable("mock geocoder offline".to_string()))
            }
        }
    }
}
