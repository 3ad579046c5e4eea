use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use microgrid_sim::site::PriceArea;

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    /// Site configuration file.
    #[clap(long, default_value = "microgrid.toml", env = "MICROGRID_CONFIG")]
    pub config: PathBuf,

    /// Overrides `site.price_area` (DK1 or DK2).
    #[clap(long = "price-area", env = "PRICE_AREA")]
    pub price_area: Option<PriceArea>,

    /// Overrides `site.latitude`.
    #[clap(long = "lat", env = "LAT", allow_hyphen_values = true)]
    pub latitude: Option<f64>,

    /// Overrides `site.longitude`.
    #[clap(long = "lon", env = "LON", allow_hyphen_values = true)]
    pub longitude: Option<f64>,

    /// Log as JSON lines instead of the compact text format.
    #[clap(long = "log-json", env = "LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch the inputs, simulate once, and print the hour records and KPIs.
    Run(RunArgs),

    /// Fetch and cache prices, weather and PV without simulating.
    Fetch(HorizonArgs),

    /// Start the status server.
    Serve(ServeArgs),
}

#[derive(Parser)]
pub struct HorizonArgs {
    /// First simulated day (UTC), overrides `horizon.start`.
    #[clap(long)]
    pub start: Option<NaiveDate>,

    /// Number of days, overrides `horizon.days`.
    #[clap(long)]
    pub days: Option<u32>,

    /// Ignore cached series and fetch again.
    #[clap(long)]
    pub refresh: bool,
}

#[derive(Parser)]
pub struct RunArgs {
    #[clap(flatten)]
    pub horizon: HorizonArgs,

    /// Export the hour records to CSV.
    #[clap(long = "telemetry-out")]
    pub telemetry_out: Option<PathBuf>,
}

#[derive(Parser)]
pub struct ServeArgs {
    /// Overrides `server.bind`.
    #[clap(long, env = "BIND")]
    pub bind: Option<SocketAddr>,

    /// Run the pipeline once before accepting requests.
    #[clap(long = "run-on-start")]
    pub run_on_start: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let args = Args::try_parse_from([
            "microgrid-sim",
            "--config",
            "site.toml",
            "--price-area",
            "dk2",
            "--lon",
            "-3.5",
            "run",
            "--start",
            "2025-01-01",
            "--days",
            "2",
            "--telemetry-out",
            "out.csv",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("site.toml"));
        assert_eq!(args.price_area, Some(PriceArea::DK2));
        assert_eq!(args.longitude, Some(-3.5));
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.horizon.start, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(run.horizon.days, Some(2));
        assert!(!run.horizon.refresh);
        assert_eq!(run.telemetry_out, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn rejects_unknown_price_area() {
        assert!(Args::try_parse_from(["microgrid-sim", "--price-area", "NO2", "fetch"]).is_err());
    }

    #[test]
    fn parses_serve() {
        let args =
            Args::try_parse_from(["microgrid-sim", "serve", "--bind", "0.0.0.0:8080", "--run-on-start"])
                .unwrap();
        let Command::Serve(serve) = args.command else {
            panic!("expected serve");
        };
        assert_eq!(serve.bind.map(|b| b.port()), Some(8080));
        assert!(serve.run_on_start);
    }
}
