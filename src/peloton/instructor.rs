use crate::common::peloton_client::PelotonClient;
use crate::common::types::EtlResult;
use crate::warehouse::{FieldType, SchemaField, TableRow, TableSchema, WriteDisposition};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
struct InstructorDetail {
    name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    spotify_playlist_uri: Option<String>,
    image_url: Option<String>,
    #[serde(default)]
    fitness_disciplines: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct PelotonInstructor {
    pub instructor_id: String,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub spotify_playlist_uri: Option<String>,
    pub image_url: Option<String>,
    pub fitness_disciplines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InstructorRow {
    pub instructor_id: String,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub spotify_playlist_uri: Option<String>,
    pub image_url: Option<String>,
    pub fitness_disciplines: Vec<String>,
}

impl PelotonInstructor {
    pub async fn fetch(client: &PelotonClient, instructor_id: &str) -> EtlResult<Self> {
        let detail: InstructorDetail = client
            .get_json(
                &format!("/api/instructor/{instructor_id}"),
                &format!("instructor id {instructor_id}"),
            )
            .await?;

        info!("Successfully fetched instructor id {}", instructor_id);

        Ok(Self {
            instructor_id: instructor_id.to_string(),
            name: detail.name,
            first_name: detail.first_name,
            last_name: detail.last_name,
            spotify_playlist_uri: detail.spotify_playlist_uri,
            image_url: detail.image_url,
            fitness_disciplines: detail.fitness_disciplines.unwrap_or_default(),
        })
    }

    pub fn to_row(&self) -> InstructorRow {
        InstructorRow {
            instructor_id: self.instructor_id.clone(),
            name: self.name.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            spotify_playlist_uri: self.spotify_playlist_uri.clone(),
            image_url: self.image_url.clone(),
            fitness_disciplines: self.fitness_disciplines.clone(),
        }
    }
}

impl TableRow for InstructorRow {
    fn schema() -> TableSchema {
        TableSchema {
            table: "instructors",
            fields: vec![
                SchemaField::nullable("instructor_id", FieldType::String),
                SchemaField::nullable("name", FieldType::String),
                SchemaField::nullable("first_name", FieldType::String),
                SchemaField::nullable("last_name", FieldType::String),
                SchemaField::nullable("spotify_playlist_uri", FieldType::String),
                SchemaField::nullable("image_url", FieldType::String),
                SchemaField::repeated("fitness_disciplines", FieldType::String),
            ],
            write_disposition: WriteDisposition::Truncate,
        }
    }
}
