use clap::Parser;
use monadica::{config::SimulationConfig, parse_definition, Error, Monad, Simulation};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Monad program to run
    source: PathBuf,

    /// Path to config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Override the number of ticks to run
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Write a debug snapshot of the first placed monad to this path
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the trace log of the first placed monad to this path
    #[arg(long)]
    trace: Option<PathBuf>,
}

fn run(cli: &Cli) -> Result<(), Error> {
    let config: SimulationConfig = if cli.config.exists() {
        let content = std::fs::read_to_string(&cli.config)
            .map_err(|e| Error::internal(format!("Failed to read config file: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::internal(format!("Failed to parse config file: {}", e)))?
    } else {
        SimulationConfig::default()
    };

    debug!("config: {:?}", config);

    let source = std::fs::read_to_string(&cli.source)
        .map_err(|e| Error::internal(format!("Failed to read source file: {}", e)))?;

    // Setup-time parse failures abort here, before any tick runs.
    let definition = parse_definition(&source)?;
    info!("loaded monad definition `{}`", definition.name);

    let mut sim = Simulation::new(config.width, config.height);
    for placement in &config.placements {
        sim.place_monad(placement.x, placement.y, Monad::new(&definition))?;
    }
    for reading in &config.field_values {
        sim.set_field_value(reading.x, reading.y, &reading.name, reading.value.clone());
    }

    let ticks = cli.ticks.unwrap_or(config.ticks);
    for _ in 0..ticks {
        println!("Tick {}:", sim.tick_count());
        sim.step();
        for row in sim.render_states() {
            let rendered = serde_json::to_string(&row)
                .map_err(|e| Error::internal(format!("Failed to render states: {}", e)))?;
            println!("{}", rendered);
        }
    }

    if let Some(placement) = config.placements.first() {
        if let Some(monad) = sim.monad_at(placement.x, placement.y) {
            println!("Adequacy: {}", monad.adequacy_score());

            if let Some(path) = &cli.snapshot {
                let snapshot = serde_json::to_string_pretty(&monad.export_debug_snapshot())
                    .map_err(|e| Error::internal(format!("Failed to serialize snapshot: {}", e)))?;
                std::fs::write(path, snapshot)
                    .map_err(|e| Error::internal(format!("Failed to write snapshot: {}", e)))?;
                info!("wrote snapshot to {:?}", path);
            }

            if let Some(path) = &cli.trace {
                let trace = serde_json::to_string_pretty(monad.export_trace_log())
                    .map_err(|e| Error::internal(format!("Failed to serialize trace: {}", e)))?;
                std::fs::write(path, trace)
                    .map_err(|e| Error::internal(format!("Failed to write trace: {}", e)))?;
                info!("wrote trace to {:?}", path);
            }
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
