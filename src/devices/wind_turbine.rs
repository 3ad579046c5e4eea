use crate::error::{Error, Result};

/// Small wind turbine described by a cubic power curve.
///
/// Output is zero below cut-in and at or above cut-out, rated power from the
/// rated speed up to cut-out, and scales with the cube of the normalized
/// speed in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindTurbine {
    pub rated_kw: f64,
    pub rated_speed_ms: f64,
    pub cut_in_ms: f64,
    pub cut_out_ms: f64,
}

impl Default for WindTurbine {
    fn default() -> Self {
        Self {
            rated_kw: 3.0,
            rated_speed_ms: 12.0,
            cut_in_ms: 3.0,
            cut_out_ms: 25.0,
        }
    }
}

impl WindTurbine {
    /// Checks that the curve speeds are ordered and the rating is non-negative.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the violated ordering.
    pub fn validate(&self) -> Result<()> {
        if !(self.rated_kw >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "wind.rated_kw {} must be >= 0",
                self.rated_kw
            )));
        }
        if !(0.0 <= self.cut_in_ms
            && self.cut_in_ms < self.rated_speed_ms
            && self.rated_speed_ms <= self.cut_out_ms)
        {
            return Err(Error::InvalidConfig(format!(
                "wind speeds must satisfy 0 <= cut_in ({}) < rated ({}) <= cut_out ({})",
                self.cut_in_ms, self.rated_speed_ms, self.cut_out_ms
            )));
        }
        Ok(())
    }

    /// Electrical output (kW) at hub wind speed `wind_ms`.
    pub fn power_kw(&self, wind_ms: f64) -> f64 {
        if !(wind_ms >= self.cut_in_ms) || wind_ms >= self.cut_out_ms {
            return 0.0;
        }
        if wind_ms >= self.rated_speed_ms {
            return self.rated_kw;
        }
        let frac = (wind_ms - self.cut_in_ms) / (self.rated_speed_ms - self.cut_in_ms).max(1e-6);
        self.rated_kw * frac.powi(3).clamp(0.0, 1.0)
    }
}
