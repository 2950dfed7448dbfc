use geo::Coord;

use crate::error::IsochroneError;

pub const DEFAULT_RESOLUTION: usize = 30;
pub const DEFAULT_SPEED_KMH: f64 = 140.0;

/// Converts a speed in km/h to meters per minute.
pub fn meters_per_minute(speed_kmh: f64) -> f64 {
    speed_kmh * 1000.0 / 60.0
}

/// Square sampling grid in a metric coordinate space.
///
/// Points are stored row-major: row 0 holds the smallest y, column 0 the
/// smallest x.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    center: Coord<f64>,
    dmax: f64,
    resolution: usize,
    step: f64,
    points: Vec<Coord<f64>>,
}

impl SampleGrid {
    /// Builds `resolution × resolution` evenly spaced points over
    /// `[center − dmax, center + dmax]` on both axes.
    pub fn generate(
        center: Coord<f64>,
        dmax: f64,
        resolution: usize,
    ) -> Result<Self, IsochroneError> {
        if !dmax.is_finite() || dmax <= 0.0 {
            return Err(IsochroneError::InvalidGrid(format!(
                "sampling radius must be positive, got {dmax}"
            )));
        }
        if resolution < 2 {
            return Err(IsochroneError::InvalidGrid(format!(
                "resolution must be at least 2, got {resolution}"
            )));
        }
        if !center.x.is_finite() || !center.y.is_finite() {
            return Err(IsochroneError::InvalidGrid(format!(
                "grid center ({}, {}) is not finite",
                center.x, center.y
            )));
        }

        let step = 2.0 * dmax / (resolution - 1) as f64;
        let min_x = center.x - dmax;
        let min_y = center.y - dmax;

        let points = (0..resolution)
            .flat_map(|row| {
                (0..resolution).map(move |col| Coord {
                    x: min_x + step * col as f64,
                    y: min_y + step * row as f64,
                })
            })
            .collect();

        Ok(Self {
            center,
            dmax,
            resolution,
            step,
            points,
        })
    }

    pub fn center(&self) -> Coord<f64> {
        self.center
    }

    pub fn dmax(&self) -> f64 {
        self.dmax
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Distance between neighbouring points on either axis.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Lower-left grid point.
    pub fn min(&self) -> Coord<f64> {
        Coord {
            x: self.center.x - self.dmax,
            y: self.center.y - self.dmax,
        }
    }

    pub fn points(&self) -> &[Coord<f64>] {
        &self.points
    }

    /// Row and column of the grid point nearest to `coord`, if `coord` lies
    /// within half a step of the grid.
    pub fn cell_of(&self, coord: Coord<f64>) -> Option<(usize, usize)> {
        let min = self.min();
        let col = ((coord.x - min.x) / self.step).round();
        let row = ((coord.y - min.y) / self.step).round();
        let limit = self.resolution as f64;

        if !(0.0..limit).contains(&col) || !(0.0..limit).contains(&row) {
            return None;
        }
        Some((row as usize, col as usize))
    }
}
