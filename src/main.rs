mod agent;
mod config;
mod error;
mod feed;
mod generator;
mod orchestrator;
mod queue;
mod radio;
mod relationship;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::agent::Agent;
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::radio::{Radio, Track};
use crate::server::{app_router, AppState};

#[derive(Parser)]
#[command(name = "soundstage")]
#[command(about = "Autonomous AI artist orchestrator for a musician social platform")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator HTTP server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 3000)]
        port: u16,
        /// Data directory (defaults to the platform config dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Seed a demo roster of AI artists and a starter radio catalog
    Seed {
        #[arg(long, default_value_t = 6)]
        count: usize,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("soundstage=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Serve {
            host,
            port,
            data_dir,
        } => run_serve(host, port, data_dir).await,
        Commands::Seed { count, data_dir } => run_seed(count, data_dir).await,
    }
}

fn build_orchestrator(data_dir: Option<PathBuf>) -> Result<(Arc<Orchestrator>, Arc<Radio>)> {
    let config = Config::new(data_dir)?;
    let generator = generator::from_settings(&config.generator);
    let radio = Arc::new(Radio::load(&config.radio_file(), config.radio.clone())?);
    let orchestrator = Arc::new(Orchestrator::bootstrap(
        config,
        generator,
        Arc::clone(&radio),
    )?);
    Ok((orchestrator, radio))
}

async fn run_serve(host: String, port: u16, data_dir: Option<PathBuf>) -> Result<()> {
    let (orchestrator, radio) = build_orchestrator(data_dir)?;
    let app = app_router(AppState {
        orchestrator,
        radio,
    });

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

const ROSTER: &[(&str, &str)] = &[
    ("Vela Noir", "synthwave"),
    ("Nova Drift", "techno"),
    ("Echo Marrow", "ambient"),
    ("Juniper Vbox", "indie pop"),
    ("Saint Vertigo", "hip hop"),
    ("Lumen Yard", "house"),
    ("Ferro Lark", "post rock"),
    ("Mira Solace", "neo soul"),
    ("Pale Harbor", "folk"),
    ("Kinetic Wren", "drum and bass"),
];

const TRACK_WORDS_A: &[&str] = &["Neon", "Static", "Velvet", "Hollow", "Amber", "Glass"];
const TRACK_WORDS_B: &[&str] = &["Tide", "Bloom", "Signal", "Mirror", "Season", "Echo"];

async fn run_seed(count: usize, data_dir: Option<PathBuf>) -> Result<()> {
    let (orchestrator, radio) = build_orchestrator(data_dir)?;

    let mut created = 0;
    for (i, &(name, genre)) in ROSTER.iter().take(count).enumerate() {
        let exists = orchestrator.agents.read().all().any(|a| a.name == name);
        if exists {
            continue;
        }
        let cadence_mins = 30 + ((i as i64 * 37) % 150);
        let agent = Agent::new(name, vec![genre.to_string()], cadence_mins);
        let agent_id = agent.id;
        orchestrator.agents.write().insert(agent);

        for t in 0..2 {
            let title = format!(
                "{} {}",
                TRACK_WORDS_A[(i + t) % TRACK_WORDS_A.len()],
                TRACK_WORDS_B[(i * 2 + t) % TRACK_WORDS_B.len()]
            );
            radio.register_track(Track::new(title, agent_id, name, Some(genre.to_string())));
        }
        created += 1;
        println!("{} {} ({})", "+".green().bold(), name.cyan(), genre);
    }

    let (generated, failed) = orchestrator.generate_missing_personalities().await;
    orchestrator.persist()?;

    println!(
        "\n{} {created} artists seeded, {generated} personalities generated{}",
        "Done.".green().bold(),
        if failed > 0 {
            format!(", {failed} failed").red().to_string()
        } else {
            String::new()
        }
    );
    Ok(())
}
