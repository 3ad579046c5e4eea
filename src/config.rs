//! TOML-based site configuration.
//!
//! Every section except `[battery]` has defaults. The battery's capacity,
//! initial state of charge, rate limits and dispatch policy must be given
//! explicitly; only the efficiencies default (to lossless).

use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::devices::{BatteryState, ConsumptionProfile, WindTurbine};
use crate::error::{Error, Result};
use crate::series::Horizon;
use crate::sim::PolicyKind;
use crate::site::{Location, PriceArea, PvSystem};
use crate::sources::prices::DEFAULT_DATASETS;

/// Top-level configuration parsed from TOML.
///
/// Load with [`Settings::from_toml_file`] and check with
/// [`Settings::validate`] before any network access.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Market zone and coordinates.
    #[serde(default)]
    pub site: SiteConfig,
    /// PV array and estimation model.
    #[serde(default)]
    pub pv: PvConfig,
    /// Wind turbine power curve.
    #[serde(default)]
    pub wind: WindConfig,
    /// Battery storage parameters (required).
    pub battery: BatteryConfig,
    /// Synthetic consumption profile.
    #[serde(default)]
    pub consumption: ConsumptionConfig,
    /// Simulated date range.
    #[serde(default)]
    pub horizon: HorizonConfig,
    /// Upstream endpoints and timeouts.
    #[serde(default)]
    pub sources: SourcesConfig,
    /// Series cache location.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Status server.
    #[serde(default)]
    pub server: ServerConfig,
    /// Periodic runs while serving.
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Market zone and site coordinates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// `"DK1"` or `"DK2"`.
    pub price_area: PriceArea,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        // Aalborg, DK1.
        Self {
            price_area: PriceArea::DK1,
            latitude: 57.0488,
            longitude: 9.9217,
        }
    }
}

/// Which estimator produces the PV series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PvModel {
    /// PVGIS reference-year output projected onto the horizon.
    Pvgis,
    /// Local clear-sky geometry model, no network access.
    ClearSky,
    /// Geometry model driven by the weather source's measured irradiance.
    Irradiance,
}

impl PvModel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pvgis => "pvgis",
            Self::ClearSky => "clear_sky",
            Self::Irradiance => "irradiance",
        }
    }
}

/// PV array parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PvConfig {
    pub model: PvModel,
    /// Installed peak power (kWp).
    pub peak_kwp: f64,
    /// Tilt from horizontal (degrees).
    pub tilt_deg: f64,
    /// Azimuth (degrees, 0 = south, -90 = east, 90 = west).
    pub azimuth_deg: f64,
    /// System losses as a fraction (0.14 = 14 %).
    pub loss_fraction: f64,
    /// Irradiance year requested from PVGIS.
    pub reference_year: i32,
}

impl Default for PvConfig {
    fn default() -> Self {
        Self {
            model: PvModel::Pvgis,
            peak_kwp: 5.0,
            tilt_deg: 35.0,
            azimuth_deg: 0.0,
            loss_fraction: 0.14,
            reference_year: 2020,
        }
    }
}

impl PvConfig {
    pub fn system(&self) -> PvSystem {
        PvSystem {
            peak_kwp: self.peak_kwp,
            tilt_deg: self.tilt_deg,
            azimuth_deg: self.azimuth_deg,
            loss_fraction: self.loss_fraction,
        }
    }
}

/// Wind turbine power curve parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindConfig {
    /// Rated output (kW).
    pub rated_kw: f64,
    /// Wind speed at which rated output is reached (m/s).
    pub rated_speed_ms: f64,
    pub cut_in_ms: f64,
    pub cut_out_ms: f64,
}

impl Default for WindConfig {
    fn default() -> Self {
        let t = WindTurbine::default();
        Self {
            rated_kw: t.rated_kw,
            rated_speed_ms: t.rated_speed_ms,
            cut_in_ms: t.cut_in_ms,
            cut_out_ms: t.cut_out_ms,
        }
    }
}

impl WindConfig {
    pub fn turbine(&self) -> WindTurbine {
        WindTurbine {
            rated_kw: self.rated_kw,
            rated_speed_ms: self.rated_speed_ms,
            cut_in_ms: self.cut_in_ms,
            cut_out_ms: self.cut_out_ms,
        }
    }
}

fn lossless() -> f64 {
    1.0
}

/// Battery storage parameters. No defaults except the efficiencies.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatteryConfig {
    /// Total energy capacity (kWh).
    pub capacity_kwh: f64,
    /// Initial stored energy (kWh).
    pub initial_soc_kwh: f64,
    /// Maximum charging power (kW).
    pub max_charge_kw: f64,
    /// Maximum discharging power (kW).
    pub max_discharge_kw: f64,
    /// `"greedy"` or `"price_aware"`.
    pub policy: PolicyKind,
    #[serde(default = "lossless")]
    pub charge_efficiency: f64,
    #[serde(default = "lossless")]
    pub discharge_efficiency: f64,
}

impl BatteryConfig {
    /// Builds the initial battery state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a parameter is out of range.
    pub fn initial_state(&self) -> Result<BatteryState> {
        BatteryState::try_new(
            self.capacity_kwh,
            self.initial_soc_kwh,
            self.max_charge_kw,
            self.max_discharge_kw,
            self.charge_efficiency,
            self.discharge_efficiency,
        )
    }
}

/// Synthetic consumption profile parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsumptionConfig {
    /// Peak of the daily shape (kW).
    pub base_kw: f64,
    /// Gaussian noise standard deviation (kW).
    pub noise_std_kw: f64,
    /// Minimum demand (kW).
    pub floor_kw: f64,
    /// Noise seed.
    pub seed: u64,
}

impl Default for ConsumptionConfig {
    fn default() -> Self {
        Self {
            base_kw: 8.0,
            noise_std_kw: 0.4,
            floor_kw: 0.5,
            seed: 42,
        }
    }
}

impl ConsumptionConfig {
    pub fn profile(&self) -> ConsumptionProfile {
        ConsumptionProfile::new(self.base_kw, self.noise_std_kw, self.floor_kw, self.seed)
    }
}

/// Longest horizon accepted from the file or the command line.
pub const MAX_HORIZON_DAYS: u32 = 366;

/// Simulated date range in whole UTC days.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HorizonConfig {
    /// First day; today (UTC) if unset.
    pub start: Option<NaiveDate>,
    pub days: u32,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            start: None,
            days: 1,
        }
    }
}

/// Upstream endpoints, timeouts and conversion rates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    /// Energi Data Service dataset root.
    pub prices_url: String,
    /// Price datasets tried in order.
    pub price_datasets: Vec<String>,
    /// Open-Meteo forecast endpoint.
    pub weather_url: String,
    /// PVGIS `seriescalc` endpoint.
    pub pvgis_url: String,
    /// Per-request timeout (seconds).
    pub timeout_secs: u64,
    /// DKK per EUR, used when only EUR prices are published.
    pub dkk_per_eur: f64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            prices_url: "https://api.energidataservice.dk/dataset".to_string(),
            price_datasets: DEFAULT_DATASETS.iter().map(|s| s.to_string()).collect(),
            weather_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            pvgis_url: "https://re.jrc.ec.europa.eu/api/v5_3/seriescalc".to_string(),
            timeout_secs: 30,
            dkk_per_eur: 7.45,
        }
    }
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Series cache location.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Serve cached series instead of re-fetching.
    pub reuse: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/cache"),
            reuse: true,
        }
    }
}

/// Status server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
        }
    }
}

/// Periodic runs while serving.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Minutes between scheduled runs; disabled if unset.
    pub interval_minutes: Option<u64>,
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"battery.capacity_kwh"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl Settings {
    /// Parses settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid, contains unknown
    /// fields, or omits a required battery field.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Overrides site parameters from the command line or environment.
    pub fn apply_overrides(
        &mut self,
        price_area: Option<PriceArea>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) {
        if let Some(area) = price_area {
            self.site.price_area = area;
        }
        if let Some(lat) = latitude {
            self.site.latitude = lat;
        }
        if let Some(lon) = longitude {
            self.site.longitude = lon;
        }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |field: &str, result: Result<()>| {
            if let Err(e) = result {
                let message = match e {
                    Error::InvalidConfig(m) => m,
                    other => other.to_string(),
                };
                errors.push(ConfigError {
                    field: field.to_string(),
                    message,
                });
            }
        };

        check("site", self.location().map(|_| ()));
        check("pv", self.pv.system().validate());
        check("wind", self.wind.turbine().validate());
        check("battery", self.battery.initial_state().map(|_| ()));

        let c = &self.consumption;
        if !(c.base_kw >= 0.0 && c.noise_std_kw >= 0.0 && c.floor_kw >= 0.0) {
            errors.push(ConfigError {
                field: "consumption".into(),
                message: "base_kw, noise_std_kw and floor_kw must be >= 0".into(),
            });
        }
        if self.horizon.days == 0 || self.horizon.days > MAX_HORIZON_DAYS {
            errors.push(ConfigError {
                field: "horizon.days".into(),
                message: format!("must be between 1 and {MAX_HORIZON_DAYS}"),
            });
        }
        if self.sources.timeout_secs == 0 {
            errors.push(ConfigError {
                field: "sources.timeout_secs".into(),
                message: "must be > 0".into(),
            });
        }
        if self.sources.price_datasets.is_empty() {
            errors.push(ConfigError {
                field: "sources.price_datasets".into(),
                message: "must name at least one dataset".into(),
            });
        }
        if !(self.sources.dkk_per_eur > 0.0) {
            errors.push(ConfigError {
                field: "sources.dkk_per_eur".into(),
                message: "must be > 0".into(),
            });
        }
        if self.schedule.interval_minutes == Some(0) {
            errors.push(ConfigError {
                field: "schedule.interval_minutes".into(),
                message: "must be > 0 when set".into(),
            });
        }

        errors
    }

    /// Runs [`Settings::validate`] and folds any violations into one error.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` listing every violation.
    pub fn check(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            return Ok(());
        }
        let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
        Err(Error::InvalidConfig(joined.join("; ")))
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` if a coordinate is out of range.
    pub fn location(&self) -> Result<Location> {
        Location::new(self.site.latitude, self.site.longitude)
    }

    /// Resolves the horizon, letting `start`/`days` override the file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the resulting span is empty or longer
    /// than [`MAX_HORIZON_DAYS`].
    pub fn horizon(&self, start: Option<NaiveDate>, days: Option<u32>) -> Result<Horizon> {
        let start = start
            .or(self.horizon.start)
            .unwrap_or_else(|| Utc::now().date_naive());
        let days = days.unwrap_or(self.horizon.days);
        if days > MAX_HORIZON_DAYS {
            return Err(Error::InvalidConfig(format!(
                "horizon of {days} days exceeds {MAX_HORIZON_DAYS}"
            )));
        }
        Horizon::from_days(start, days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[battery]
capacity_kwh = 10.0
initial_soc_kwh = 5.0
max_charge_kw = 3.0
max_discharge_kw = 3.0
policy = "greedy"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = Settings::from_toml_str(MINIMAL).unwrap();
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.site.price_area, PriceArea::DK1);
        assert_eq!(cfg.battery.charge_efficiency, 1.0);
        assert_eq!(cfg.consumption.seed, 42);
        assert_eq!(cfg.pv.model, PvModel::Pvgis);
        assert_eq!(cfg.cache.dir, PathBuf::from("data/cache"));
        assert!(cfg.schedule.interval_minutes.is_none());
    }

    #[test]
    fn shipped_config_is_valid() {
        let cfg = Settings::from_toml_str(include_str!("../microgrid.toml")).unwrap();
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.schedule.interval_minutes, Some(60));
    }

    #[test]
    fn missing_battery_section_is_rejected() {
        let err = Settings::from_toml_str("[site]\nprice_area = \"DK2\"\n").unwrap_err();
        assert!(err.message.contains("battery"), "{err}");
    }

    #[test]
    fn missing_policy_is_rejected() {
        let toml = MINIMAL.replace("policy = \"greedy\"\n", "");
        let err = Settings::from_toml_str(&toml).unwrap_err();
        assert!(err.message.contains("policy"), "{err}");
    }

    #[test]
    fn unknown_price_area_fails_at_parse() {
        let toml = format!("{MINIMAL}\n[site]\nprice_area = \"SE3\"\n");
        let err = Settings::from_toml_str(&toml).unwrap_err();
        assert!(err.message.contains("SE3"), "{err}");
    }

    #[test]
    fn unknown_field_rejected() {
        let toml = format!("{MINIMAL}\n[wind]\nhub_height_m = 30.0\n");
        assert!(Settings::from_toml_str(&toml).is_err());
    }

    #[test]
    fn full_config_parses() {
        let toml = r#"
[site]
price_area = "dk2"
latitude = 55.6761
longitude = 12.5683

[pv]
model = "clear_sky"
peak_kwp = 8.0
tilt_deg = 30.0
azimuth_deg = -10.0
loss_fraction = 0.1
reference_year = 2019

[wind]
rated_kw = 5.0

[battery]
capacity_kwh = 13.5
initial_soc_kwh = 6.75
max_charge_kw = 5.0
max_discharge_kw = 5.0
policy = "price_aware"
charge_efficiency = 0.95
discharge_efficiency = 0.95

[consumption]
base_kw = 4.0

[horizon]
start = "2025-03-01"
days = 2

[sources]
timeout_secs = 10

[cache]
dir = "/tmp/microgrid"
reuse = false

[server]
bind = "0.0.0.0:9000"

[schedule]
interval_minutes = 60
"#;
        let cfg = Settings::from_toml_str(toml).unwrap();
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.site.price_area, PriceArea::DK2);
        assert_eq!(cfg.pv.model, PvModel::ClearSky);
        assert_eq!(cfg.battery.policy, PolicyKind::PriceAware);
        assert_eq!(cfg.wind.turbine().cut_in_ms, 3.0);
        let horizon = cfg.horizon(None, None).unwrap();
        assert_eq!(horizon.hours(), 48);
        assert_eq!(cfg.server.bind.port(), 9000);
        assert_eq!(cfg.schedule.interval_minutes, Some(60));
    }

    #[test]
    fn validate_collects_every_violation() {
        let mut cfg = Settings::from_toml_str(MINIMAL).unwrap();
        cfg.battery.initial_soc_kwh = 20.0;
        cfg.site.latitude = 100.0;
        cfg.pv.loss_fraction = 1.5;
        cfg.horizon.days = 0;
        let errors = cfg.validate();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["site", "pv", "battery", "horizon.days"]);
        assert!(matches!(cfg.check(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn overlong_horizon_is_rejected() {
        let mut cfg = Settings::from_toml_str(MINIMAL).unwrap();
        cfg.horizon.days = 200_000_000;
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "horizon.days");

        let cfg = Settings::from_toml_str(MINIMAL).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 1, 1);
        assert!(cfg.horizon(day, Some(MAX_HORIZON_DAYS)).is_ok());
        assert!(matches!(
            cfg.horizon(day, Some(MAX_HORIZON_DAYS + 1)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn overrides_replace_site_fields() {
        let mut cfg = Settings::from_toml_str(MINIMAL).unwrap();
        cfg.apply_overrides(Some(PriceArea::DK2), Some(55.0), None);
        assert_eq!(cfg.site.price_area, PriceArea::DK2);
        assert_eq!(cfg.site.latitude, 55.0);
        assert_eq!(cfg.site.longitude, 9.9217);
    }
}
