use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use peloton_warehouse::EtlJob;
use peloton_warehouse::common::config::{Config, PelotonConfig};
use peloton_warehouse::common::peloton_client::PelotonClient;
use peloton_warehouse::common::secrets::resolve_password;
use peloton_warehouse::peloton::{
    InstructorRow, PelotonUser, PelotonWorkout, PerformanceGraphRow, RideRow, UserRow, WorkoutRow,
};
use peloton_warehouse::warehouse::{TableRow, TableSchema};

#[derive(Parser)]
#[command(about = "Load Peloton workout history into BigQuery")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full load: users, workouts, performance graphs, rides, instructors
    Sync {
        /// Peloton username or email (overrides PELOTON_USERNAME)
        #[arg(short, long)]
        username: Option<String>,
        /// Destination dataset, optionally `project.dataset` (overrides BIGQUERY_DATASET)
        #[arg(short, long)]
        dataset: Option<String>,
    },
    /// List workout ids for the configured user, newest first
    Workouts,
    /// Print one workout row and its heart-rate zone rows as JSON
    Workout {
        /// Workout ID
        #[arg(short, long)]
        id: String,
    },
    /// Print warehouse table schemas as BigQuery JSON
    Schema {
        /// Only print this table
        #[arg(short, long)]
        table: Option<String>,
    },
}

async fn login(config: &PelotonConfig) -> Result<(PelotonClient, PelotonUser)> {
    let password = resolve_password(&config.password).await?;
    let client = PelotonClient::new(&config.base_url)?;
    let user = PelotonUser::login(&client, &config.username, &password)
        .await
        .with_context(|| format!("Failed to login as {}", config.username))?;
    Ok((client, user))
}

async fn sync(username: Option<String>, dataset: Option<String>) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(username) = username {
        config.peloton.username = username;
    }
    if let Some(dataset) = dataset {
        config.warehouse.dataset = dataset;
    }

    let report = EtlJob::from_config(&config).await?.run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn list_workouts() -> Result<()> {
    let (client, user) = login(&PelotonConfig::from_env()?).await?;
    for workout_id in user.workout_ids(&client).await? {
        println!("{workout_id}");
    }
    Ok(())
}

async fn show_workout(workout_id: &str) -> Result<()> {
    let (client, user) = login(&PelotonConfig::from_env()?).await?;
    let workout = PelotonWorkout::fetch_all(&client, &user.user_id, workout_id)
        .await
        .with_context(|| format!("Failed to fetch workout {workout_id}"))?;

    let output = json!({
        "workout": workout.to_row(),
        "performance_graph": workout.heart_rate_zones,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn all_schemas() -> Vec<TableSchema> {
    vec![
        UserRow::schema(),
        WorkoutRow::schema(),
        PerformanceGraphRow::schema(),
        RideRow::schema(),
        InstructorRow::schema(),
    ]
}

fn print_schemas(table: Option<&str>) -> Result<()> {
    let schemas: Vec<TableSchema> = all_schemas()
        .into_iter()
        .filter(|s| table.is_none_or(|t| s.table == t))
        .collect();

    if schemas.is_empty() {
        anyhow::bail!("Unknown table {}", table.unwrap_or_default());
    }

    for schema in schemas {
        let output = json!({
            "table": schema.table,
            "writeDisposition": schema.write_disposition,
            "schema": schema.to_bigquery_json(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    match args.command {
        Commands::Sync { username, dataset } => sync(username, dataset).await,
        Commands::Workouts => list_workouts().await,
        Commands::Workout { id } => show_workout(&id).await,
        Commands::Schema { table } => print_schemas(table.as_deref()),
    }
}
