//! DISARM command line driver

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use disarm::core::{Composition, IndexComposer};
use disarm::io::{connect, EarthEngineClient, ExportTask, MapDocument, OAuthAuthenticator};
use disarm::{DisarmConfig, VisParams};

#[derive(Parser)]
#[command(name = "disarm")]
#[command(author, version, about = "Multi-hazard disaster risk index", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the disaster index to an interactive HTML map
    Render {
        /// Output HTML file (overrides configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Submit a GeoTIFF export of the disaster index (does not wait)
    Export {
        /// Export the high-risk mask instead of the index
        #[arg(long)]
        high_risk: bool,
    },
    /// Print the disaster index expression graph without contacting the engine
    Expression {
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = match &cli.config {
        Some(path) => DisarmConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => DisarmConfig::default(),
    };

    let composition = IndexComposer::new(config.roi.clone(), config.period)
        .with_sources(config.sources.clone())
        .compose();

    match cli.command {
        Commands::Expression { pretty } => {
            let expression = composition.index_expression();
            let text = if pretty {
                serde_json::to_string_pretty(&expression)?
            } else {
                serde_json::to_string(&expression)?
            };
            println!("{}", text);
        }
        Commands::Render { output } => {
            let client = open_client(&config)?;
            let map = build_map(&config, &composition, &client)?;
            let output = output.unwrap_or_else(|| config.map.output.clone());
            map.write_html(&output)
                .with_context(|| format!("Failed to write map {}", output.display()))?;
        }
        Commands::Export { high_risk } => {
            let client = open_client(&config)?;
            let image = if high_risk { &composition.high_risk } else { &composition.index };
            let task = ExportTask::image_to_drive(image, &composition.roi, &config.export)
                .context("Invalid export request")?;
            let job = task.start(&client).context("Failed to start export")?;
            println!("Export started: {}", job.name);
        }
    }

    Ok(())
}

fn open_client(config: &DisarmConfig) -> Result<EarthEngineClient> {
    let mut auth = OAuthAuthenticator::new(
        config.credentials_path()?,
        config.project.clone(),
        config.request_timeout(),
    )?;
    let session = connect(&mut auth).context("Failed to open an engine session")?;
    Ok(EarthEngineClient::new(session, config.request_timeout())?)
}

fn build_map(
    config: &DisarmConfig,
    composition: &Composition,
    client: &EarthEngineClient,
) -> Result<MapDocument> {
    let settings = &config.map;
    let mut map = MapDocument::new((settings.center_lat, settings.center_lon), settings.zoom);

    if settings.show_hazards {
        for layer in &composition.layers {
            map.add_layer(client, &layer.display, &settings.vis, layer.hazard.layer_name())
                .with_context(|| format!("Failed to add {} layer", layer.hazard))?;
        }
    }

    map.add_layer(client, &composition.index, &settings.vis, "Global DISARM Disaster Index")
        .context("Failed to add disaster index layer")?;

    if settings.show_high_risk {
        let vis = VisParams {
            min: 0.0,
            max: 1.0,
            palette: vec!["000000".to_string(), "ff0000".to_string()],
        };
        map.add_layer(client, &composition.high_risk.self_mask(), &vis, "High Risk Areas")
            .context("Failed to add high-risk layer")?;
    }

    map.add_geometry(&composition.roi, "ROI");
    map.add_layer_control();
    Ok(map)
}
