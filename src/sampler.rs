use geo::Point;

use crate::error::SamplerError;

/// Travel cost reported for one destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostSample {
    /// Where the backend placed the destination, usually snapped to the
    /// nearest road.
    pub location: Point<f64>,
    /// Travel time in minutes, `None` when unreachable.
    pub cost: Option<f64>,
}

/// Source of travel costs from one origin to many destinations.
///
/// Coordinates going in and out are geographic lon/lat. Implementations return
/// exactly one sample per destination, in destination order.
pub trait CostSampler {
    fn query_costs(
        &self,
        origin: Point<f64>,
        destinations: &[Point<f64>],
    ) -> Result<Vec<CostSample>, SamplerError>;
}
