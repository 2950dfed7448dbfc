//! Travel costs from the table service of an OSRM routing server.

use std::env;
use std::time::Duration;

use geo::Point;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::SamplerError;
use crate::sampler::{CostSample, CostSampler};

pub const DEFAULT_SERVER: &str = "https://router.project-osrm.org/";
pub const DEFAULT_PROFILE: &str = "driving";
/// The public demo server accepts at most 100 coordinates per table request.
pub const DEFAULT_MAX_DESTINATIONS: usize = 99;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where and how to query the routing backend.
#[derive(Debug, Clone, PartialEq)]
pub struct OsrmConfig {
    pub server_base_url: String,
    pub profile: String,
    /// Road classes to avoid, e.g. `motorway` or `toll,ferry`.
    pub exclude: Option<String>,
    pub max_destinations_per_request: usize,
    pub timeout: Duration,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            server_base_url: DEFAULT_SERVER.to_string(),
            profile: DEFAULT_PROFILE.to_string(),
            exclude: None,
            max_destinations_per_request: DEFAULT_MAX_DESTINATIONS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl OsrmConfig {
    /// Reads `OSRM_SERVER`, `OSRM_PROFILE`, `OSRM_EXCLUDE`,
    /// `OSRM_MAX_TABLE_DESTINATIONS` and `OSRM_TIMEOUT_SECS`, keeping the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_base_url: env::var("OSRM_SERVER").unwrap_or(defaults.server_base_url),
            profile: env::var("OSRM_PROFILE").unwrap_or(defaults.profile),
            exclude: env::var("OSRM_EXCLUDE")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            max_destinations_per_request: env::var("OSRM_MAX_TABLE_DESTINATIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_destinations_per_request),
            timeout: env::var("OSRM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Table request for one source and `destinations`, with the source at
    /// coordinate index 0.
    fn table_url(&self, origin: Point<f64>, destinations: &[Point<f64>]) -> String {
        let coordinates = std::iter::once(&origin)
            .chain(destinations)
            .map(|p| format!("{:.6},{:.6}", p.x(), p.y()))
            .collect::<Vec<_>>()
            .join(";");
        let destination_indices = (1..=destinations.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");

        let mut url = format!(
            "{}/table/v1/{}/{}?sources=0&destinations={}&annotations=duration",
            self.server_base_url.trim_end_matches('/'),
            self.profile,
            coordinates,
            destination_indices
        );
        if let Some(exclude) = &self.exclude {
            url.push_str("&exclude=");
            url.push_str(exclude);
        }
        url
    }
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    code: String,
    message: Option<String>,
    durations: Option<Vec<Vec<Option<f64>>>>,
    destinations: Option<Vec<Waypoint>>,
}

#[derive(Debug, Deserialize)]
struct Waypoint {
    location: [f64; 2],
}

/// Checks a table response for `expected` destinations and converts durations
/// from seconds to minutes.
fn parse_table(body: &str, expected: usize) -> Result<Vec<CostSample>, SamplerError> {
    let response: TableResponse = serde_json::from_str(body)
        .map_err(|e| SamplerError::Malformed(format!("invalid table response: {e}")))?;

    if response.code != "Ok" {
        return Err(SamplerError::Backend {
            message: response.message.unwrap_or_default(),
            code: response.code,
        });
    }

    let row = response
        .durations
        .and_then(|rows| rows.into_iter().next())
        .ok_or_else(|| SamplerError::Malformed("missing durations".to_string()))?;
    let waypoints = response
        .destinations
        .ok_or_else(|| SamplerError::Malformed("missing destinations".to_string()))?;

    if row.len() != expected || waypoints.len() != expected {
        return Err(SamplerError::Malformed(format!(
            "expected {expected} destinations, got {} durations and {} locations",
            row.len(),
            waypoints.len()
        )));
    }

    Ok(waypoints
        .into_iter()
        .zip(row)
        .map(|(waypoint, seconds)| CostSample {
            location: Point::new(waypoint.location[0], waypoint.location[1]),
            cost: seconds.map(|s| s / 60.0),
        })
        .collect())
}

/// Blocking OSRM table client. Holds no per-query state and can be shared
/// between computations.
pub struct OsrmClient {
    client: Client,
    config: OsrmConfig,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, SamplerError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

impl CostSampler for OsrmClient {
    fn query_costs(
        &self,
        origin: Point<f64>,
        destinations: &[Point<f64>],
    ) -> Result<Vec<CostSample>, SamplerError> {
        let chunk_size = self.config.max_destinations_per_request.max(1);
        let mut samples = Vec::with_capacity(destinations.len());

        for (index, chunk) in destinations.chunks(chunk_size).enumerate() {
            let url = self.config.table_url(origin, chunk);
            debug!(chunk = index, destinations = chunk.len(), "querying OSRM table service");

            // Error bodies still carry an OSRM code and message.
            let body = self.client.get(&url).send()?.text()?;
            samples.extend(parse_table(&body, chunk.len())?);
        }

        Ok(samples)
    }
}
