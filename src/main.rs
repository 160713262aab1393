use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use logbook_core::{Clock, Login, SystemClock, TimeUuid};
use logbook_settings::{load_settings, load_settings_from_file, LogbookSettings};
use logbook_store::{Cluster, CqlSession, LoginDao, MemorySession};
use logbook_telemetry::{init_telemetry, TelemetryConfig};
use serde_json::json;

/// Record a handful of logins and read them back.
#[derive(Debug, Parser)]
#[command(name = "logbook", version)]
struct Args {
    /// Settings file to use instead of ~/.logbook/settings.json.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run against an in-process keyspace instead of a cluster.
    #[arg(long)]
    in_memory: bool,

    #[arg(long, default_value = "pepe")]
    user: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings: LogbookSettings = match &args.config {
        Some(path) => load_settings_from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => load_settings().context("loading settings")?,
    };

    let telemetry = TelemetryConfig::from_levels(
        &settings.logging.level,
        &settings.logging.modules,
        settings.logging.json,
    )?;
    let _telemetry = init_telemetry(telemetry).context("initialising logging")?;

    tracing::info!(user = %args.user, in_memory = args.in_memory, "starting logbook");

    if args.in_memory {
        let cluster = Cluster::from_session(MemorySession::new().without_journal());
        run(cluster, &args.user).await
    } else {
        let cluster = Cluster::connect(&settings.cluster)
            .await
            .context("connecting to cluster")?;
        run(cluster, &args.user).await
    }
}

async fn run<S: CqlSession>(cluster: Cluster<S>, user: &str) -> Result<()> {
    let outcome = tokio::select! {
        result = demo(&cluster, user) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    };
    cluster.shutdown();
    outcome
}

async fn demo<S: CqlSession>(cluster: &Cluster<S>, user: &str) -> Result<()> {
    let started = TimeUuid::now();
    let dao = LoginDao::new(cluster.session())
        .await
        .context("preparing statements")?;

    let area = "index";
    dao.login_sequential(user, TimeUuid::now(), area).await?;
    dao.login_concurrent(user, TimeUuid::now(), area).await?;
    dao.login_query_builder(user, TimeUuid::now(), area).await?;
    dao.login_prepared(user, TimeUuid::now(), area).await?;

    let batch = vec![
        Login::new(user, area)?,
        Login::new(user, area)?,
        Login::new(user, "backOffice")?,
    ];
    dao.login_batch(&batch).await?;

    let today = SystemClock.today();
    let logins = dao.get_logins_by_user(user).await?;
    let count = dao.get_counter_by_user_and_day(user, &today).await?;
    let recent = dao
        .get_timestamps_by_user_and_range(
            user,
            TimeUuid::start_of(started.timestamp()),
            TimeUuid::end_of(Utc::now()),
        )
        .await?;

    let report = json!({
        "user": user,
        "logins": logins,
        "today": today,
        "count": count,
        "recent": recent,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
