use crate::common::peloton_client::PelotonClient;
use crate::common::types::EtlResult;
use crate::warehouse::{FieldType, SchemaField, TableRow, TableSchema, WriteDisposition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

const HEART_RATE_METRIC: &str = "Heart Rate";
const AVERAGE_PACE_SUMMARY: &str = "Avg Pace";

#[derive(Debug, Deserialize)]
struct WorkoutDetail {
    created_at: i64,
    is_total_work_personal_record: Option<bool>,
    device_type: Option<String>,
    fitness_discipline: String,
    status: Option<String>,
    ride: WorkoutRide,
}

#[derive(Debug, Deserialize)]
struct WorkoutRide {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    difficulty_estimate: Option<f64>,
    instructor_id: Option<String>,
}

/// Totals from `/api/workout/{id}/summary`. Any metric the device did not
/// record comes back null.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct WorkoutSummary {
    pub calories: Option<f64>,
    pub avg_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub avg_resistance: Option<f64>,
    pub max_resistance: Option<f64>,
    pub avg_speed: Option<f64>,
    pub max_speed: Option<f64>,
    #[serde(rename = "total_work")]
    pub total_work_joule: Option<f64>,
    #[serde(rename = "distance")]
    pub distance_miles: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PerformanceGraph {
    metrics: Option<Vec<GraphMetric>>,
    average_summaries: Option<Vec<AverageSummary>>,
}

#[derive(Debug, Deserialize)]
struct GraphMetric {
    display_name: String,
    zones: Option<Vec<GraphZone>>,
}

#[derive(Debug, Deserialize)]
struct GraphZone {
    display_name: String,
    range: Option<String>,
    min_value: Option<i64>,
    max_value: Option<i64>,
    duration: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AverageSummary {
    display_name: String,
    value: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PelotonWorkout {
    pub workout_id: String,
    pub owner_id: String,
    pub created_at_epoch: i64,
    pub is_total_work_personal_record: Option<bool>,
    pub device_type: Option<String>,
    pub fitness_discipline: String,
    pub status: Option<String>,
    pub ride_id: String,
    pub ride_title: Option<String>,
    pub duration: Option<f64>,
    pub difficulty_estimate: Option<f64>,
    pub instructor_id: Option<String>,
    pub summary: WorkoutSummary,
    pub avg_pace: Option<f64>,
    pub heart_rate_zones: Vec<PerformanceGraphRow>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkoutRow {
    pub workout_id: String,
    pub user_id: String,
    pub ride_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub fitness_discipline: String,
    pub total_work_joule: Option<f64>,
    pub total_calories: Option<f64>,
    pub distance_miles: Option<f64>,
    pub average_pace: Option<f64>,
    pub average_speed: Option<f64>,
    pub maximum_speed: Option<f64>,
    pub average_heart_rate: Option<f64>,
    pub maximum_heart_rate: Option<f64>,
    pub is_total_work_personal_record: Option<bool>,
    pub status: Option<String>,
}

/// Time spent in one heart-rate zone during a workout.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PerformanceGraphRow {
    pub workout_id: String,
    pub display_name: String,
    pub range: Option<String>,
    pub minimum_value: Option<i64>,
    pub maximum_value: Option<i64>,
    pub duration_seconds: i64,
}

impl PelotonWorkout {
    /// Fetch the workout with its summary and performance graph.
    pub async fn fetch_all(
        client: &PelotonClient,
        owner_id: &str,
        workout_id: &str,
    ) -> EtlResult<Self> {
        let mut workout = Self::fetch(client, owner_id, workout_id).await?;
        workout.fetch_summary(client).await?;
        workout.fetch_performance_graph(client).await?;
        Ok(workout)
    }

    pub async fn fetch(client: &PelotonClient, owner_id: &str, workout_id: &str) -> EtlResult<Self> {
        let detail: WorkoutDetail = client
            .get_json(
                &format!("/api/workout/{workout_id}"),
                &format!("workout id {workout_id}"),
            )
            .await?;

        debug!(
            "Set workout {} ride id to {}, discipline to {}",
            workout_id, detail.ride.id, detail.fitness_discipline
        );

        Ok(Self {
            workout_id: workout_id.to_string(),
            owner_id: owner_id.to_string(),
            created_at_epoch: detail.created_at,
            is_total_work_personal_record: detail.is_total_work_personal_record,
            device_type: detail.device_type,
            fitness_discipline: detail.fitness_discipline,
            status: detail.status,
            ride_id: detail.ride.id,
            ride_title: detail.ride.title,
            duration: detail.ride.duration,
            difficulty_estimate: detail.ride.difficulty_estimate,
            instructor_id: detail.ride.instructor_id,
            summary: WorkoutSummary::default(),
            avg_pace: None,
            heart_rate_zones: Vec::new(),
        })
    }

    pub async fn fetch_summary(&mut self, client: &PelotonClient) -> EtlResult<()> {
        self.summary = client
            .get_json(
                &format!("/api/workout/{}/summary", self.workout_id),
                &format!("summary workout data for id {}", self.workout_id),
            )
            .await?;
        debug!("Set summary for workout {}: {:?}", self.workout_id, self.summary);
        Ok(())
    }

    pub async fn fetch_performance_graph(&mut self, client: &PelotonClient) -> EtlResult<()> {
        let graph: PerformanceGraph = client
            .get_json(
                &format!("/api/workout/{}/performance_graph", self.workout_id),
                &format!("performance graph for workout id {}", self.workout_id),
            )
            .await?;
        self.apply_performance_graph(graph);
        Ok(())
    }

    fn apply_performance_graph(&mut self, graph: PerformanceGraph) {
        // A missing pace summary reads as 0.0, a present one keeps its null
        self.avg_pace = match graph
            .average_summaries
            .unwrap_or_default()
            .into_iter()
            .find(|s| s.display_name == AVERAGE_PACE_SUMMARY)
        {
            Some(summary) => summary.value,
            None => Some(0.0),
        };

        let zones = graph
            .metrics
            .unwrap_or_default()
            .into_iter()
            .find(|m| m.display_name == HEART_RATE_METRIC)
            .and_then(|m| m.zones)
            .unwrap_or_default();

        // Zones without a duration carry no time-in-zone data
        self.heart_rate_zones = zones
            .into_iter()
            .filter_map(|zone| {
                zone.duration.map(|duration_seconds| PerformanceGraphRow {
                    workout_id: self.workout_id.clone(),
                    display_name: zone.display_name,
                    range: zone.range,
                    minimum_value: zone.min_value,
                    maximum_value: zone.max_value,
                    duration_seconds,
                })
            })
            .collect();

        debug!(
            "Set workout {} avg_pace to {:?} with {} heart rate zones",
            self.workout_id,
            self.avg_pace,
            self.heart_rate_zones.len()
        );
    }

    pub fn to_row(&self) -> WorkoutRow {
        WorkoutRow {
            workout_id: self.workout_id.clone(),
            user_id: self.owner_id.clone(),
            ride_id: self.ride_id.clone(),
            created_at: DateTime::from_timestamp(self.created_at_epoch, 0),
            fitness_discipline: capitalize(&self.fitness_discipline),
            total_work_joule: self.summary.total_work_joule,
            total_calories: self.summary.calories,
            distance_miles: self.summary.distance_miles,
            average_pace: self.avg_pace,
            average_speed: self.summary.avg_speed,
            maximum_speed: self.summary.max_speed,
            average_heart_rate: self.summary.avg_heart_rate,
            maximum_heart_rate: self.summary.max_heart_rate,
            is_total_work_personal_record: self.is_total_work_personal_record,
            status: self.status.clone(),
        }
    }
}

/// First character upper-cased, the rest lower-cased.
fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => {
            let mut capitalized: String = first.to_uppercase().collect();
            capitalized.push_str(&chars.as_str().to_lowercase());
            capitalized
        }
        None => String::new(),
    }
}

impl TableRow for WorkoutRow {
    fn schema() -> TableSchema {
        TableSchema {
            table: "workouts",
            fields: vec![
                SchemaField::nullable("workout_id", FieldType::String),
                SchemaField::nullable("user_id", FieldType::String),
                SchemaField::nullable("ride_id", FieldType::String),
                SchemaField::nullable("created_at", FieldType::Timestamp),
                SchemaField::nullable("fitness_discipline", FieldType::String),
                SchemaField::nullable("total_work_joule", FieldType::Float),
                SchemaField::nullable("total_calories", FieldType::Float),
                SchemaField::nullable("distance_miles", FieldType::Float),
                SchemaField::nullable("average_pace", FieldType::Float),
                SchemaField::nullable("average_speed", FieldType::Float),
                SchemaField::nullable("maximum_speed", FieldType::Float),
                SchemaField::nullable("average_heart_rate", FieldType::Float),
                SchemaField::nullable("maximum_heart_rate", FieldType::Float),
                SchemaField::nullable("is_total_work_personal_record", FieldType::Boolean),
                SchemaField::nullable("status", FieldType::String),
            ],
            write_disposition: WriteDisposition::Truncate,
        }
    }
}

impl TableRow for PerformanceGraphRow {
    fn schema() -> TableSchema {
        TableSchema {
            table: "performance_graphs",
            fields: vec![
                SchemaField::nullable("workout_id", FieldType::String),
                SchemaField::nullable("display_name", FieldType::String),
                SchemaField::nullable("range", FieldType::String),
                SchemaField::nullable("minimum_value", FieldType::Integer),
                SchemaField::nullable("maximum_value", FieldType::Integer),
                SchemaField::nullable("duration_seconds", FieldType::Integer),
            ],
            write_disposition: WriteDisposition::Truncate,
        }
    }
}
