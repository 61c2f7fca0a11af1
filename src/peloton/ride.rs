use crate::common::peloton_client::PelotonClient;
use crate::common::types::EtlResult;
use crate::warehouse::{FieldType, SchemaField, TableRow, TableSchema, WriteDisposition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct RideDetails {
    ride: RideDetail,
}

#[derive(Debug, Deserialize)]
struct RideDetail {
    instructor_id: Option<String>,
    ride_type_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    duration: Option<f64>,
    fitness_discipline_display_name: Option<String>,
    difficulty_estimate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MetadataMappings {
    ride_types: Vec<RideType>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RideType {
    pub id: String,
    pub display_name: String,
}

/// A class a workout was taken from.
#[derive(Debug, Clone)]
pub struct PelotonRide {
    pub ride_id: String,
    pub instructor_id: Option<String>,
    pub ride_type_id: Option<String>,
    pub ride_type_display_name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Seconds.
    pub duration: Option<f64>,
    pub fitness_discipline: Option<String>,
    pub difficulty_estimate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RideRow {
    pub ride_id: String,
    pub ride_type_id: Option<String>,
    pub ride_type: Option<String>,
    pub instructor_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: Option<i64>,
    pub fitness_discipline: Option<String>,
    pub difficulty_estimate: Option<f64>,
}

impl PelotonRide {
    pub async fn fetch(client: &PelotonClient, ride_id: &str) -> EtlResult<Self> {
        let details: RideDetails = client
            .get_json(
                &format!("/api/ride/{ride_id}/details"),
                &format!("ride id {ride_id}"),
            )
            .await?;
        let ride = details.ride;

        debug!(
            "Set ride {} instructor_id to {:?}, ride_type_id to {:?}",
            ride_id, ride.instructor_id, ride.ride_type_id
        );

        Ok(Self {
            ride_id: ride_id.to_string(),
            instructor_id: ride.instructor_id,
            ride_type_id: ride.ride_type_id,
            ride_type_display_name: None,
            title: ride.title,
            description: ride.description,
            duration: ride.duration,
            fitness_discipline: ride.fitness_discipline_display_name,
            difficulty_estimate: ride.difficulty_estimate,
        })
    }

    pub fn to_row(&self) -> RideRow {
        RideRow {
            ride_id: self.ride_id.clone(),
            ride_type_id: self.ride_type_id.clone(),
            ride_type: self.ride_type_display_name.clone(),
            instructor_id: self.instructor_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            duration_minutes: self.duration.map(|seconds| (seconds / 60.0).round() as i64),
            fitness_discipline: self.fitness_discipline.clone(),
            difficulty_estimate: self.difficulty_estimate,
        }
    }
}

/// Every ride type the platform knows about.
pub async fn fetch_ride_types(client: &PelotonClient) -> EtlResult<Vec<RideType>> {
    let mappings: MetadataMappings = client
        .get_json("/api/ride/metadata_mappings", "ride metadata mappings")
        .await?;
    info!("Fetched {} ride types", mappings.ride_types.len());
    Ok(mappings.ride_types)
}

/// Ride type display names keyed by ride type id.
#[derive(Debug, Default)]
pub struct RideTypeLookup {
    display_names: HashMap<String, String>,
}

impl RideTypeLookup {
    pub fn new(ride_types: Vec<RideType>) -> Self {
        Self {
            display_names: ride_types
                .into_iter()
                .map(|t| (t.id, t.display_name))
                .collect(),
        }
    }

    pub fn display_name(&self, ride_type_id: &str) -> Option<&str> {
        self.display_names.get(ride_type_id).map(String::as_str)
    }

    pub fn apply(&self, rides: &mut [PelotonRide]) {
        for ride in rides.iter_mut() {
            let Some(ride_type_id) = ride.ride_type_id.as_deref() else {
                continue;
            };
            match self.display_name(ride_type_id) {
                Some(name) => ride.ride_type_display_name = Some(name.to_string()),
                None => warn!(
                    "Unknown ride type {} for ride {}",
                    ride_type_id, ride.ride_id
                ),
            }
        }
    }
}

impl TableRow for RideRow {
    fn schema() -> TableSchema {
        TableSchema {
            table: "rides",
            fields: vec![
                SchemaField::nullable("ride_id", FieldType::String),
                SchemaField::nullable("ride_type_id", FieldType::String),
                SchemaField::nullable("ride_type", FieldType::String),
                SchemaField::nullable("instructor_id", FieldType::String),
                SchemaField::nullable("title", FieldType::String),
                SchemaField::nullable("description", FieldType::String),
                SchemaField::nullable("duration_minutes", FieldType::Integer),
                SchemaField::nullable("fitness_discipline", FieldType::String),
                SchemaField::nullable("difficulty_estimate", FieldType::Float),
            ],
            write_disposition: WriteDisposition::Truncate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ride(ride_id: &str, ride_type_id: Option<&str>) -> PelotonRide {
        PelotonRide {
            ride_id: ride_id.to_string(),
            instructor_id: None,
            ride_type_id: ride_type_id.map(str::to_string),
            ride_type_display_name: None,
            title: None,
            description: None,
            duration: Some(1200.0),
            fitness_discipline: None,
            difficulty_estimate: None,
        }
    }

    #[test]
    fn test_lookup_sets_known_and_leaves_unknown() {
        let lookup = RideTypeLookup::new(vec![RideType {
            id: "t-climb".to_string(),
            display_name: "Climb".to_string(),
        }]);
        let mut rides = vec![
            ride("r-1", Some("t-climb")),
            ride("r-2", Some("t-missing")),
            ride("r-3", None),
        ];

        lookup.apply(&mut rides);

        assert_eq!(rides[0].ride_type_display_name.as_deref(), Some("Climb"));
        assert!(rides[1].ride_type_display_name.is_none());
        assert!(rides[2].ride_type_display_name.is_none());
    }

    #[test]
    fn test_duration_is_reported_in_minutes() {
        let mut r = ride("r-1", None);
        assert_eq!(r.to_row().duration_minutes, Some(20));
        r.duration = Some(2730.0);
        assert_eq!(r.to_row().duration_minutes, Some(46));
        r.duration = None;
        assert_eq!(r.to_row().duration_minutes, None);
    }

    #[tokio::test]
    async fn test_fetch_ride_and_types() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ride/r-1/details"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ride": {
                    "instructor_id": null,
                    "ride_type_id": "t-climb",
                    "title": "Scenic Ride",
                    "description": "Just ride",
                    "duration": 1800,
                    "fitness_discipline_display_name": "Cycling",
                    "difficulty_estimate": 6.1
                },
                "playlist": {}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/ride/metadata_mappings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ride_types": [{"id": "t-climb", "display_name": "Climb", "fitness_discipline": "cycling"}],
                "class_types": []
            })))
            .mount(&server)
            .await;

        let client = PelotonClient::new(&server.uri()).unwrap();
        let mut rides = vec![PelotonRide::fetch(&client, "r-1").await.unwrap()];
        RideTypeLookup::new(fetch_ride_types(&client).await.unwrap()).apply(&mut rides);

        let row = rides[0].to_row();
        assert!(row.instructor_id.is_none());
        assert_eq!(row.ride_type.as_deref(), Some("Climb"));
        assert_eq!(row.title.as_deref(), Some("Scenic Ride"));
        assert_eq!(row.duration_minutes, Some(30));
        assert_eq!(row.fitness_discipline.as_deref(), Some("Cycling"));
    }
}
