mod breaks;
mod crs;
mod error;
mod grid;
mod isochrone;
mod osrm;
mod raster;
mod sampler;
pub use crate::breaks::{Breaks, DEFAULT_BREAKS};
pub use crate::crs::{reproject, Crs, Reproject, SphericalMercator};
pub use crate::error::{IsochroneError, ReprojectionError, SamplerError};
pub use crate::grid::{meters_per_minute, SampleGrid, DEFAULT_RESOLUTION, DEFAULT_SPEED_KMH};
pub use crate::isochrone::{
    compute_isochrones, extract_bands, IsochroneBand, IsochroneOptions, IsochroneSet, Origin,
};
pub use crate::osrm::{OsrmClient, OsrmConfig};
pub use crate::raster::CostRaster;
pub use crate::sampler::{CostSample, CostSampler};
