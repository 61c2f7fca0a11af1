use crate::common::config::{Config, DEFAULT_FETCH_CONCURRENCY};
use crate::common::metrics;
use crate::common::peloton_client::PelotonClient;
use crate::common::secrets::resolve_password;
use crate::common::types::EtlResult;
use crate::peloton::{
    InstructorRow, PelotonInstructor, PelotonRide, PelotonUser, PelotonWorkout,
    PerformanceGraphRow, RideRow, RideTypeLookup, WorkoutRow, fetch_ride_types,
};
use crate::warehouse::{AccessTokenProvider, BigQueryWarehouse, Warehouse, load_rows};
use function_timer::time;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::hash::Hash;
use tracing::info;

/// Rows loaded per table in one run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct EtlReport {
    pub users: usize,
    pub workouts: usize,
    pub performance_graphs: usize,
    pub rides: usize,
    pub instructors: usize,
}

pub struct EtlJob<W: Warehouse> {
    client: PelotonClient,
    warehouse: W,
    username: String,
    password: String,
    fetch_concurrency: usize,
}

impl EtlJob<BigQueryWarehouse> {
    pub async fn from_config(config: &Config) -> EtlResult<Self> {
        let peloton = &config.peloton;
        let password = resolve_password(&peloton.password).await?;
        let client = PelotonClient::new(&peloton.base_url)?;
        let warehouse = BigQueryWarehouse::new(
            &config.warehouse.base_url,
            &config.warehouse.project_id,
            &config.warehouse.dataset,
            AccessTokenProvider::new(config.warehouse.token.clone()),
        );

        Ok(EtlJob::new(client, warehouse, &peloton.username, &password)
            .with_fetch_concurrency(peloton.fetch_concurrency))
    }
}

impl<W: Warehouse> EtlJob<W> {
    pub fn new(client: PelotonClient, warehouse: W, username: &str, password: &str) -> Self {
        Self {
            client,
            warehouse,
            username: username.to_string(),
            password: password.to_string(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    pub fn with_fetch_concurrency(mut self, fetch_concurrency: usize) -> Self {
        self.fetch_concurrency = fetch_concurrency.max(1);
        self
    }

    #[time("etl_run_duration")]
    pub async fn run(&self) -> EtlResult<EtlReport> {
        let mut report = EtlReport::default();

        // Phase 1: authenticate and load the user
        let user = PelotonUser::login(&self.client, &self.username, &self.password).await?;
        report.users = load_rows(&self.warehouse, &[user.to_row()]).await?.rows;

        // Phase 2: workouts and their heart-rate zones
        let workouts = self.fetch_workouts(&user).await?;
        let workout_rows: Vec<WorkoutRow> = workouts.iter().map(PelotonWorkout::to_row).collect();
        let graph_rows: Vec<PerformanceGraphRow> = workouts
            .iter()
            .flat_map(|w| w.heart_rate_zones.iter().cloned())
            .collect();
        report.workouts = load_rows(&self.warehouse, &workout_rows).await?.rows;
        report.performance_graphs = load_rows(&self.warehouse, &graph_rows).await?.rows;

        // Phase 3: rides the workouts were taken from
        let rides = self.fetch_rides(&workouts).await?;
        let ride_rows: Vec<RideRow> = rides.iter().map(PelotonRide::to_row).collect();
        report.rides = load_rows(&self.warehouse, &ride_rows).await?.rows;

        // Phase 4: instructors of those rides
        let instructors = self.fetch_instructors(&rides).await?;
        let instructor_rows: Vec<InstructorRow> =
            instructors.iter().map(PelotonInstructor::to_row).collect();
        report.instructors = load_rows(&self.warehouse, &instructor_rows).await?.rows;

        info!(
            users = report.users,
            workouts = report.workouts,
            performance_graphs = report.performance_graphs,
            rides = report.rides,
            instructors = report.instructors,
            "ETL run complete for {}",
            self.username
        );
        Ok(report)
    }

    async fn fetch_workouts(&self, user: &PelotonUser) -> EtlResult<Vec<PelotonWorkout>> {
        let workout_ids = user.workout_ids(&self.client).await?;

        // `buffered` keeps results in workout id order
        let workouts: Vec<PelotonWorkout> = stream::iter(workout_ids.iter())
            .map(|workout_id| PelotonWorkout::fetch_all(&self.client, &user.user_id, workout_id))
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await?;

        metrics::increment_workouts_fetched(workouts.len() as u64);
        info!("Fetched {} workouts", workouts.len());
        Ok(workouts)
    }

    async fn fetch_rides(&self, workouts: &[PelotonWorkout]) -> EtlResult<Vec<PelotonRide>> {
        let ride_ids = unique_in_order(workouts.iter().map(|w| w.ride_id.clone()));
        if ride_ids.is_empty() {
            return Ok(Vec::new());
        }

        info!("Fetching {} unique rides", ride_ids.len());
        let mut rides: Vec<PelotonRide> = stream::iter(ride_ids.iter())
            .map(|ride_id| PelotonRide::fetch(&self.client, ride_id))
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await?;

        RideTypeLookup::new(fetch_ride_types(&self.client).await?).apply(&mut rides);
        Ok(rides)
    }

    async fn fetch_instructors(&self, rides: &[PelotonRide]) -> EtlResult<Vec<PelotonInstructor>> {
        let instructor_ids = unique_in_order(rides.iter().filter_map(|r| r.instructor_id.clone()));

        info!("Fetching {} unique instructors", instructor_ids.len());
        stream::iter(instructor_ids.iter())
            .map(|instructor_id| PelotonInstructor::fetch(&self.client, instructor_id))
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await
    }
}

/// Drop repeated items, keeping the first occurrence of each.
pub fn unique_in_order<T, I>(items: I) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
