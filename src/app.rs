//! Command-line application wiring: CLI parsing, logging, and the run
//! itself. The `geosweep` binary is a thin wrapper over [`run`].

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{Parser, error::ErrorKind};
use tracing::info;

use crate::checkpoint::Checkpointer;
use crate::client::{ApiCallCounter, HttpSearchClient, SearchApi};
use crate::config::{CrawlConfig, SeedRegion};
use crate::errors::CrawlError;
use crate::scheduler::{CrawlScheduler, StopFlag};
use crate::store::RecordStore;

#[derive(Debug, Parser)]
#[command(
    name = "geosweep",
    disable_help_subcommand = true,
    about = "Adaptive spatial-grid crawler for capped geographic search services",
    long_about = "Covers each seed region with a fixed-step grid, probes every cell's \
        result count, paginates cells under the service cap, subdivides dense cells \
        down a resolution ladder, and checkpoints the deduplicated record set so runs \
        are resumable.",
    after_help = "Seed regions come from repeated --region arguments, a --regions-file, \
        or both. Logging is controlled with RUST_LOG (e.g. RUST_LOG=geosweep=debug)."
)]
struct CrawlCli {
    #[arg(
        long = "region",
        value_name = "NAME,LAT,LNG[,RADIUS_KM]",
        value_parser = parse_region_arg,
        help = "Seed region to cover; repeat as needed"
    )]
    regions: Vec<SeedRegion>,
    #[arg(
        long = "regions-file",
        value_name = "PATH",
        help = "JSON file holding an array of {name, lat, lng, radius_km} regions"
    )]
    regions_file: Option<PathBuf>,
    #[arg(long, value_name = "URL", help = "Override the search service base URL")]
    base_url: Option<String>,
    #[arg(long, value_name = "N", help = "Worker thread count")]
    workers: Option<usize>,
    #[arg(long, value_name = "N", help = "Max trustworthy results per query")]
    cap: Option<usize>,
    #[arg(
        long = "max-level",
        value_name = "N",
        help = "Deepest ladder index before best-effort acceptance"
    )]
    max_level: Option<usize>,
    #[arg(
        long = "output-dir",
        value_name = "DIR",
        help = "Directory receiving checkpoint artifacts"
    )]
    output_dir: Option<PathBuf>,
    #[arg(
        long = "checkpoint-every",
        value_name = "RECORDS",
        help = "New-record count that triggers a checkpoint write"
    )]
    checkpoint_every: Option<usize>,
}

/// Parse CLI args, assemble the configuration, and run the crawl.
pub fn run<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) =
        parse_cli::<CrawlCli, _>(std::iter::once("geosweep".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    let mut config = CrawlConfig::default();
    if let Some(file) = &cli.regions_file {
        let body = fs::read_to_string(file).map_err(|err| {
            CrawlError::Configuration(format!("cannot read {}: {err}", file.display()))
        })?;
        let from_file: Vec<SeedRegion> = serde_json::from_str(&body).map_err(|err| {
            CrawlError::Configuration(format!("invalid regions file {}: {err}", file.display()))
        })?;
        config.regions.extend(from_file);
    }
    config.regions.extend(cli.regions);
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    if let Some(workers) = cli.workers {
        config.worker_count = workers;
    }
    if let Some(cap) = cli.cap {
        config.cap = cap;
    }
    if let Some(max_level) = cli.max_level {
        config.max_level = max_level;
    }
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(every) = cli.checkpoint_every {
        config.checkpoint_every_records = every;
    }
    let config = config.validated()?;

    let calls = ApiCallCounter::default();
    let client = HttpSearchClient::new(
        config.api.clone(),
        config.retry,
        config.worker_count,
        calls.clone(),
    );

    // Reachability check before committing to a run: a dead service on the
    // very first call is a configuration problem, not a skippable cell.
    let first = &config.regions[0];
    client
        .probe(
            first.lat,
            first.lng,
            first.radius_km.min(config.max_radius_km),
        )
        .map_err(|err| {
            CrawlError::Configuration(format!("search service unreachable at startup: {err}"))
        })?;

    let store = RecordStore::new();
    let checkpointer = Checkpointer::new(
        &config.output_dir,
        config.checkpoint_every_records,
        config.checkpoint_every_cells,
    );
    let resumed = checkpointer.load(&store, &calls, &config.api.id_field);
    if resumed > 0 {
        info!("[geosweep:app] resuming with {resumed} known records");
    }

    let stop = StopFlag::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.trigger())?;
    }

    let scheduler = CrawlScheduler::new(&config, &client, &store, &checkpointer, &calls, stop);
    let summary = scheduler.run()?;

    println!(
        "Done: {} unique records, {} api calls, {:.1} minutes",
        summary.unique_records,
        summary.api_calls,
        summary.elapsed.as_secs_f64() / 60.0
    );
    println!(
        "Cells: {} leaves, {} subdivided, {} empty, {} failed",
        summary.counts.leaves, summary.counts.subdivided, summary.counts.empty, summary.counts.failed
    );
    if !summary.best_effort.is_empty() {
        println!(
            "Best-effort (known-incomplete) coverage in {} cells:",
            summary.best_effort.len()
        );
        for cell in &summary.best_effort {
            println!("  {} reported {}", cell.code, cell.reported_total);
        }
    }
    println!(
        "Artifacts: {} / {}",
        checkpointer.records_path().display(),
        checkpointer.table_path().display()
    );

    Ok(())
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

fn parse_region_arg(raw: &str) -> Result<SeedRegion, String> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 3 && parts.len() != 4 {
        return Err("--region expects NAME,LAT,LNG with an optional ,RADIUS_KM".to_string());
    }
    let name = parts[0].trim();
    if name.is_empty() {
        return Err("--region name must not be empty".to_string());
    }
    let lat = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid latitude '{}': must be a float", parts[1].trim()))?;
    let lng = parts[2]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid longitude '{}': must be a float", parts[2].trim()))?;
    let radius_km = match parts.get(3) {
        Some(raw_radius) => raw_radius
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("invalid radius '{}': must be a float", raw_radius.trim()))?,
        None => 200.0,
    };
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("latitude {lat} is outside [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(format!("longitude {lng} is outside [-180, 180]"));
    }
    if radius_km <= 0.0 {
        return Err(format!("radius {radius_km} must be positive"));
    }
    Ok(SeedRegion {
        name: name.to_string(),
        lat,
        lng,
        radius_km,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_arg_parses_with_and_without_radius() {
        let region = parse_region_arg("Johannesburg,-26.1834,28.0630").unwrap();
        assert_eq!(region.name, "Johannesburg");
        assert_eq!(region.radius_km, 200.0);

        let region = parse_region_arg("Cape Town, -33.9249, 18.4241, 150").unwrap();
        assert_eq!(region.name, "Cape Town");
        assert_eq!(region.radius_km, 150.0);
    }

    #[test]
    fn region_arg_rejects_bad_input() {
        assert!(parse_region_arg("OnlyAName").is_err());
        assert!(parse_region_arg(",1.0,2.0").is_err());
        assert!(parse_region_arg("X,not-a-number,2.0").is_err());
        assert!(parse_region_arg("X,95.0,2.0").is_err());
        assert!(parse_region_arg("X,1.0,2.0,-5").is_err());
    }
}
