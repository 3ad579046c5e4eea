use chrono::{DateTime, Timelike, Utc};
use rand::{SeedableRng, rngs::StdRng};

use crate::devices::types::{Device, DeviceContext, gaussian_noise};
use crate::error::Result;
use crate::series::{Horizon, HourlySeries};
use crate::site::LOCAL_TZ;

/// Synthetic site consumption with a daily shape and seeded noise.
///
/// Demand follows `base · (0.6 + 0.4 · sin²(2π(day_frac − 0.2)))` where
/// `day_frac` is the Copenhagen local hour over 24, plus Gaussian noise,
/// floored at `floor_kw`. Two profiles built with the same seed produce the
/// same series.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use microgrid_sim::devices::ConsumptionProfile;
/// use microgrid_sim::series::Horizon;
///
/// let horizon = Horizon::from_days(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 1).unwrap();
/// let series = ConsumptionProfile::new(8.0, 0.4, 0.5, 42).series(&horizon).unwrap();
/// assert_eq!(series.len(), 24);
/// ```
#[derive(Debug, Clone)]
pub struct ConsumptionProfile {
    /// Peak of the daily shape in kilowatts.
    pub base_kw: f64,

    /// Standard deviation of the Gaussian noise in kilowatts.
    pub noise_std_kw: f64,

    /// Lower bound on demand in kilowatts.
    pub floor_kw: f64,

    rng: StdRng,
}

impl ConsumptionProfile {
    /// Creates a profile.
    ///
    /// # Arguments
    ///
    /// * `base_kw` - Peak of the daily shape in kilowatts
    /// * `noise_std_kw` - Standard deviation of the Gaussian noise in kilowatts
    /// * `floor_kw` - Minimum demand in kilowatts
    /// * `seed` - Random seed for reproducible noise generation
    pub fn new(base_kw: f64, noise_std_kw: f64, floor_kw: f64, seed: u64) -> Self {
        Self {
            base_kw,
            noise_std_kw,
            floor_kw,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Noise-free demand for the hour starting at `ts`.
    pub fn shape_kw(&self, ts: DateTime<Utc>) -> f64 {
        let local_hour = ts.with_timezone(&LOCAL_TZ).hour();
        let day_frac = f64::from(local_hour) / 24.0;
        let s = (2.0 * std::f64::consts::PI * (day_frac - 0.2)).sin();
        self.base_kw * (0.6 + 0.4 * s * s)
    }

    /// Demand for the hour starting at `ts`; draws one noise sample.
    pub fn demand_kw(&mut self, ts: DateTime<Utc>) -> f64 {
        let noise = gaussian_noise(&mut self.rng, self.noise_std_kw);
        (self.shape_kw(ts) + noise).max(self.floor_kw)
    }

    /// Generates the consumption series for `horizon`, consuming the profile.
    ///
    /// # Errors
    ///
    /// Never fails for a valid horizon; the result type follows the series constructors.
    pub fn series(mut self, horizon: &Horizon) -> Result<HourlySeries> {
        let values = horizon
            .timestamps()
            .map(|ts| self.power_kw(&DeviceContext::new(ts)))
            .collect();
        HourlySeries::from_values(horizon, values)
    }
}

impl Device for ConsumptionProfile {
    fn power_kw(&mut self, context: &DeviceContext) -> f64 {
        self.demand_kw(context.timestamp)
    }
}
