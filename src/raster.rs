use geo::Coord;
use tracing::{debug, warn};

use crate::error::IsochroneError;
use crate::grid::SampleGrid;
use crate::sampler::CostSample;

/// Minimum travel cost per grid cell, row-major like [`SampleGrid`].
#[derive(Debug, Clone, PartialEq)]
pub struct CostRaster {
    size: usize,
    min: Coord<f64>,
    step: f64,
    values: Vec<f64>,
    sentinel: f64,
    sampled_cells: usize,
}

impl CostRaster {
    /// Aggregates samples onto the cells of `grid`.
    ///
    /// Sample locations must be in the grid's coordinate space. Unreachable
    /// samples count as the worst finite cost; cells without samples get
    /// `worst + 1`.
    pub fn rasterize(grid: &SampleGrid, samples: &[CostSample]) -> Result<Self, IsochroneError> {
        let worst = samples
            .iter()
            .filter_map(|sample| sample.cost.filter(|cost| cost.is_finite()))
            .fold(None, |acc: Option<f64>, cost| {
                Some(acc.map_or(cost, |current| current.max(cost)))
            })
            .ok_or_else(|| {
                IsochroneError::NoReachableArea(format!(
                    "none of the {} sampled destinations can be reached",
                    samples.len()
                ))
            })?;
        let sentinel = worst + 1.0;

        let size = grid.resolution();
        let mut cells: Vec<Option<f64>> = vec![None; size * size];
        let mut outside = 0;

        for sample in samples {
            let cost = sample.cost.filter(|cost| cost.is_finite()).unwrap_or(worst);
            match grid.cell_of(sample.location.0) {
                Some((row, col)) => {
                    let cell = &mut cells[row * size + col];
                    *cell = Some(cell.map_or(cost, |current| current.min(cost)));
                }
                None => outside += 1,
            }
        }

        if outside > 0 {
            warn!(outside, "samples snapped outside of the sampling grid were dropped");
        }

        let sampled_cells = cells.iter().filter(|cell| cell.is_some()).count();
        if sampled_cells == 0 {
            return Err(IsochroneError::NoReachableArea(format!(
                "all {} samples fall outside of the sampling grid",
                samples.len()
            )));
        }

        debug!(
            sampled_cells,
            total_cells = cells.len(),
            worst,
            "rasterized travel costs"
        );

        Ok(Self {
            size,
            min: grid.min(),
            step: grid.step(),
            values: cells
                .into_iter()
                .map(|cell| cell.unwrap_or(sentinel))
                .collect(),
            sentinel,
            sampled_cells,
        })
    }

    /// Number of rows, which equals the number of columns.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Center of the lower-left cell.
    pub fn min(&self) -> Coord<f64> {
        self.min
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.size || col >= self.size {
            return None;
        }
        self.values.get(row * self.size + col).copied()
    }

    /// Cost assigned to cells that received no sample.
    pub fn sentinel(&self) -> f64 {
        self.sentinel
    }

    pub fn sampled_cells(&self) -> usize {
        self.sampled_cells
    }
}
