use std::fmt;
use std::str::FromStr;

use geo::{Coord, MapCoords};
use serde::{Deserialize, Serialize};

use crate::error::ReprojectionError;

const EARTH_RADIUS: f64 = 6_378_137.0;
const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_78;
const HALF_WORLD_WIDTH: f64 = std::f64::consts::PI * EARTH_RADIUS;

/// Easting span of one full turn around the globe in EPSG:3857.
pub const WORLD_WIDTH: f64 = 2.0 * HALF_WORLD_WIDTH;

/// Brings a longitude back into `[-180, 180]`.
pub fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Coordinate reference system tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    /// Geographic longitude/latitude, EPSG:4326.
    #[default]
    Wgs84,
    /// Spherical Mercator in meters, EPSG:3857.
    WebMercator,
    Epsg(u32),
}

impl Crs {
    pub fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Crs::Wgs84,
            3857 | 900913 => Crs::WebMercator,
            other => Crs::Epsg(other),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::Epsg(code) => *code,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = ReprojectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "wgs84" | "wgs 84" => return Ok(Crs::Wgs84),
            "webmercator" | "web mercator" => return Ok(Crs::WebMercator),
            _ => {}
        }

        let code = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .unwrap_or(trimmed);

        code.parse::<u32>()
            .map(Crs::from_epsg)
            .map_err(|_| ReprojectionError::InvalidCrs(s.to_string()))
    }
}

/// Coordinate transformation between two reference systems.
pub trait Reproject {
    fn transform(&self, coord: Coord<f64>, from: Crs, to: Crs)
        -> Result<Coord<f64>, ReprojectionError>;
}

/// Reprojects any geo geometry into a new value; the input is never modified.
pub fn reproject<G, P>(
    geometry: &G,
    from: Crs,
    to: Crs,
    projector: &P,
) -> Result<G::Output, ReprojectionError>
where
    G: MapCoords<f64, f64>,
    P: Reproject + ?Sized,
{
    geometry.try_map_coords(|coord| projector.transform(coord, from, to))
}

/// Spherical Mercator forward and inverse formulas between EPSG:4326 and EPSG:3857.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphericalMercator;

impl SphericalMercator {
    /// Longitudes past ±180 are projected as they are, so shapes crossing the
    /// antimeridian stay continuous.
    fn to_mercator(coord: Coord<f64>) -> Result<Coord<f64>, ReprojectionError> {
        if !coord.x.is_finite() || !coord.y.is_finite() || coord.y.abs() > MAX_MERCATOR_LATITUDE
        {
            return Err(ReprojectionError::OutOfBounds {
                x: coord.x,
                y: coord.y,
                crs: Crs::Wgs84,
            });
        }

        let x = coord.x.to_radians() * EARTH_RADIUS;
        let y = ((coord.y.to_radians() / 2.0 + std::f64::consts::FRAC_PI_4).tan()).ln()
            * EARTH_RADIUS;
        Ok(Coord { x, y })
    }

    fn from_mercator(coord: Coord<f64>) -> Result<Coord<f64>, ReprojectionError> {
        if !coord.x.is_finite() || !coord.y.is_finite() || coord.y.abs() > HALF_WORLD_WIDTH {
            return Err(ReprojectionError::OutOfBounds {
                x: coord.x,
                y: coord.y,
                crs: Crs::WebMercator,
            });
        }

        let x = (coord.x / EARTH_RADIUS).to_degrees();
        let y = (2.0 * (coord.y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
            .to_degrees();
        Ok(Coord { x, y })
    }
}

impl Reproject for SphericalMercator {
    fn transform(
        &self,
        coord: Coord<f64>,
        from: Crs,
        to: Crs,
    ) -> Result<Coord<f64>, ReprojectionError> {
        match (from, to) {
            (a, b) if a == b => Ok(coord),
            (Crs::Wgs84, Crs::WebMercator) => Self::to_mercator(coord),
            (Crs::WebMercator, Crs::Wgs84) => Self::from_mercator(coord),
            (from, to) => Err(ReprojectionError::UnsupportedCrs { from, to }),
        }
    }
}
