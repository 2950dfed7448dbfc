use thiserror::Error;

use crate::crs::Crs;

/// Failures of a single isochrone computation.
#[derive(Debug, Error)]
pub enum IsochroneError {
    #[error("invalid breaks: {0}")]
    InvalidBreaks(String),

    #[error("invalid sample grid: {0}")]
    InvalidGrid(String),

    #[error("cost sampler failed: {0}")]
    Sampler(#[from] SamplerError),

    #[error("no reachable area: {0}")]
    NoReachableArea(String),

    #[error("contour tracing failed: {0}")]
    Contour(#[from] contour::Error),

    #[error("reprojection failed: {0}")]
    Reprojection(#[from] ReprojectionError),
}

/// Failures reported by a [`CostSampler`](crate::CostSampler).
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("request to routing backend failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("routing backend answered {code}: {message}")]
    Backend { code: String, message: String },

    #[error("malformed routing response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReprojectionError {
    #[error("no transformation from {from} to {to}")]
    UnsupportedCrs { from: Crs, to: Crs },

    #[error("coordinate ({x}, {y}) is outside the valid area of {crs}")]
    OutOfBounds { x: f64, y: f64, crs: Crs },

    #[error("cannot parse CRS {0:?}")]
    InvalidCrs(String),
}
