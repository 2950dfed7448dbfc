use crate::error::IsochroneError;

pub const DEFAULT_BREAKS: [f64; 7] = [0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0];

/// Sorted, de-duplicated travel-time thresholds in minutes.
///
/// Always holds at least two values, so the largest one is strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct Breaks(Vec<f64>);

impl Breaks {
    pub fn new(values: &[f64]) -> Result<Self, IsochroneError> {
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(IsochroneError::InvalidBreaks(format!(
                "{bad} is not a finite non-negative number of minutes"
            )));
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        sorted.dedup();

        if sorted.len() < 2 {
            return Err(IsochroneError::InvalidBreaks(format!(
                "need at least 2 distinct values, got {values:?}"
            )));
        }

        Ok(Breaks(sorted))
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn max(&self) -> f64 {
        self.0[self.0.len() - 1]
    }

    /// Consecutive `(lower, upper)` pairs, innermost first.
    pub fn intervals(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.0.windows(2).map(|pair| (pair[0], pair[1]))
    }
}

impl Default for Breaks {
    fn default() -> Self {
        Breaks(DEFAULT_BREAKS.to_vec())
    }
}
