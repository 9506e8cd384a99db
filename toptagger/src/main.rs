use std::fs;
use std::path::PathBuf;

use clap::Parser;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use toptagger::error::TaggerResult;
use toptagger::input::calibration::{CurveStore, PuppiSoftDropCorrection};
use toptagger::input::event::EventRecord;
use toptagger::tagger::config::{expand_env_vars, CfgDocument};
use toptagger::tagger::discriminant::ModelStore;
use toptagger::tagger::top_tagger::TopTagger;

fn parse_model(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok((name.to_string(), PathBuf::from(path))),
        _ => Err(format!("expected NAME=PATH, got \"{}\"", arg)),
    }
}

/// Tags the events of a JSON file and prints one summary per event.
#[derive(Parser, Debug)]
#[command(name = "toptagger", version, about)]
struct Args {
    /// Tagger configuration (JSON document of named contexts)
    #[arg(short, long)]
    config: PathBuf,

    /// JSON array of event records
    #[arg(short, long)]
    events: PathBuf,

    /// Linear discriminant model, may be repeated
    #[arg(short, long = "model", value_name = "NAME=PATH", value_parser = parse_model)]
    models: Vec<(String, PathBuf)>,

    /// Calibration curves for the PUPPI soft-drop mass correction
    #[arg(long)]
    calibration: Option<PathBuf>,

    #[arg(short, long, default_value_t = 4)]
    threads: usize,
}

fn main() -> TaggerResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut models = ModelStore::new();
    for (name, path) in &args.models {
        models.load_linear(name, path)?;
    }

    let cfg = CfgDocument::from_file(&args.config)?;
    let tagger = TopTagger::from_cfg(&cfg, &models)?;

    let correction = match &args.calibration {
        Some(path) => Some(PuppiSoftDropCorrection::from_store(&CurveStore::from_file(path)?)?),
        None => None,
    };

    let events_path = expand_env_vars(&args.events.to_string_lossy())?;
    let events: Vec<EventRecord> = serde_json::from_str(&fs::read_to_string(&events_path)?)?;
    info!(events = events.len(), path = %events_path, "read events");

    let summaries = tagger.tag_batch(&events, correction.as_ref(), args.threads)?;

    let output: Vec<serde_json::Value> = summaries
        .into_iter()
        .enumerate()
        .map(|(i, summary)| match summary {
            Ok(summary) => serde_json::to_value(summary).unwrap_or_else(|e| json!({ "error": e.to_string() })),
            Err(e) => {
                warn!(event = i, error = %e, "event failed");
                json!({ "error": e.to_string() })
            }
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
