use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pwnts_collector::config::{Cli, Command, Config};
use pwnts_collector::db::Database;
use pwnts_collector::intake::{self, BeaconListener, IntakePipeline};
use pwnts_collector::{api, metrics, registry, scope};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let db = Database::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open database {}", cli.database_url))?;
    let db = Arc::new(db);
    let now = chrono::Utc::now().timestamp();

    match cli.into_command() {
        Command::Serve(config) => serve(db, config).await,
        Command::RegisterTeam { name, password } => {
            let team = registry::register_team(&db, &name, &password, now).await?;
            println!("{}", team.team_id);
            Ok(())
        }
        Command::RegisterAgent { uuid, team_id } => {
            let agent = registry::register_agent(&db, &uuid, team_id, now).await?;
            println!("{}", agent.agent_uuid);
            Ok(())
        }
        Command::ImportTargets { path } => {
            let summary = scope::import_scope_file(&db, &path)
                .await
                .with_context(|| format!("failed to import {}", path.display()))?;
            println!("{}", serde_json::to_string(&summary)?);
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(db: Arc<Database>, config: Config) -> anyhow::Result<()> {
    metrics::register_metrics();

    if let Some(path) = &config.targets_file {
        scope::import_scope_file(&db, path)
            .await
            .with_context(|| format!("failed to import {}", path.display()))?;
    }

    let acceptor = intake::load_acceptor(&config.cert, &config.key)
        .await
        .context("failed to load TLS certificate")?;
    let policy = config.scoring_policy();
    let pipeline = Arc::new(IntakePipeline::new(db.clone(), policy));

    let listen_addr = config.listen_address();
    let beacons = BeaconListener::bind(listen_addr, acceptor, pipeline, config.read_deadline())
        .await
        .with_context(|| format!("failed to bind beacon listener on {listen_addr}"))?;

    let http = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP server on {}", config.http_addr))?;

    tracing::info!(
        targets = db.count_targets().await?,
        agents = db.count_agents().await?,
        "Registry loaded"
    );
    tracing::info!(
        beacon_addr = %listen_addr,
        http_addr = %config.http_addr,
        min_interval_secs = policy.min_interval_secs,
        max_window_secs = policy.max_window_secs,
        "pwnts collector listening"
    );

    tokio::spawn(beacons.run());

    let app = api::router(db, policy);
    axum::serve(http, app)
        .await
        .context("HTTP server failed")?;
    Ok(())
}
