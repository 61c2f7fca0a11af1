use crate::common::peloton_client::{LoginResponse, PelotonClient};
use crate::common::types::EtlResult;
use crate::warehouse::{FieldType, SchemaField, TableRow, TableSchema, WriteDisposition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const WORKOUT_PAGE_SIZE: u32 = 100;

#[derive(Deserialize)]
struct WorkoutPage {
    data: Vec<WorkoutListEntry>,
}

#[derive(Deserialize)]
struct WorkoutListEntry {
    id: String,
}

#[derive(Debug, Clone)]
pub struct PelotonUser {
    pub username: String,
    pub user_id: String,
    pub cycling_ftp: Option<i64>,
    pub email: Option<String>,
    pub last_workout_at: Option<i64>,
    pub name: Option<String>,
    pub total_workouts: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserRow {
    pub user_id: String,
    pub username: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub cycling_ftp: Option<i64>,
    pub last_workout_at: Option<DateTime<Utc>>,
    pub total_workouts: u32,
}

impl PelotonUser {
    pub async fn login(client: &PelotonClient, username: &str, password: &str) -> EtlResult<Self> {
        let login = client.login(username, password).await?;
        Ok(Self::from_login(username, login))
    }

    pub fn from_login(username: &str, login: LoginResponse) -> Self {
        let data = login.user_data.unwrap_or_default();
        debug!(
            "Set user_id to {}, total_workouts to {:?}",
            login.user_id, data.total_workouts
        );

        Self {
            username: username.to_string(),
            user_id: login.user_id,
            cycling_ftp: data.cycling_ftp,
            email: data.email,
            last_workout_at: data.last_workout_at,
            name: data.name,
            total_workouts: data.total_workouts.unwrap_or(0),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.total_workouts.div_ceil(WORKOUT_PAGE_SIZE)
    }

    /// Every workout id, newest first, gathered page by page.
    pub async fn workout_ids(&self, client: &PelotonClient) -> EtlResult<Vec<String>> {
        let mut workout_ids = Vec::with_capacity(self.total_workouts as usize);

        for page in 0..self.page_count() {
            let path = format!(
                "/api/user/{}/workouts?sort_by=-created&page={}&limit={}",
                self.user_id, page, WORKOUT_PAGE_SIZE
            );
            let response: WorkoutPage = client
                .get_json(&path, &format!("workout page {page}"))
                .await?;
            workout_ids.extend(response.data.into_iter().map(|w| w.id));
        }

        info!("Returning {} workout ids", workout_ids.len());
        Ok(workout_ids)
    }

    pub fn to_row(&self) -> UserRow {
        UserRow {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            cycling_ftp: self.cycling_ftp,
            last_workout_at: self
                .last_workout_at
                .and_then(|epoch| DateTime::from_timestamp(epoch, 0)),
            total_workouts: self.total_workouts,
        }
    }
}

impl TableRow for UserRow {
    fn schema() -> TableSchema {
        TableSchema {
            table: "users",
            fields: vec![
                SchemaField::nullable("user_id", FieldType::String),
                SchemaField::nullable("username", FieldType::String),
                SchemaField::nullable("name", FieldType::String),
                SchemaField::nullable("email", FieldType::String),
                SchemaField::nullable("cycling_ftp", FieldType::Integer),
                SchemaField::nullable("last_workout_at", FieldType::Timestamp),
                SchemaField::nullable("total_workouts", FieldType::Integer),
            ],
            write_disposition: WriteDisposition::Truncate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::peloton_client::LoginUserData;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user_with(total_workouts: u32) -> PelotonUser {
        PelotonUser::from_login(
            "rider",
            LoginResponse {
                user_id: "u-1".to_string(),
                user_data: Some(LoginUserData {
                    total_workouts: Some(total_workouts),
                    last_workout_at: Some(1_600_000_000),
                    ..Default::default()
                }),
            },
        )
    }

    #[test]
    fn test_page_count_rounds_up() {
        assert_eq!(user_with(0).page_count(), 0);
        assert_eq!(user_with(1).page_count(), 1);
        assert_eq!(user_with(100).page_count(), 1);
        assert_eq!(user_with(101).page_count(), 2);
    }

    #[test]
    fn test_login_without_user_data() {
        let user = PelotonUser::from_login(
            "rider",
            LoginResponse {
                user_id: "u-2".to_string(),
                user_data: None,
            },
        );

        assert_eq!(user.total_workouts, 0);
        assert!(user.email.is_none());
        assert_eq!(user.page_count(), 0);
    }

    #[test]
    fn test_row_converts_epoch_to_timestamp() {
        let row = user_with(5).to_row();

        assert_eq!(row.user_id, "u-1");
        assert_eq!(row.username, "rider");
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["last_workout_at"], json!("2020-09-13T12:26:40Z"));
        assert_eq!(
            UserRow::schema().field_names(),
            vec![
                "user_id",
                "username",
                "name",
                "email",
                "cycling_ftp",
                "last_workout_at",
                "total_workouts"
            ]
        );
    }

    #[tokio::test]
    async fn test_workout_ids_walks_every_page_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/u-1/workouts"))
            .and(query_param("sort_by", "-created"))
            .and(query_param("page", "0"))
            .and(query_param("limit", "100"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"id": "w3"}, {"id": "w2"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/user/u-1/workouts"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "w1"}]})))
            .expect(1)
            .mount(&server)
            .await;

        let client = PelotonClient::new(&server.uri()).unwrap();
        let ids = user_with(150).workout_ids(&client).await.unwrap();

        assert_eq!(ids, vec!["w3", "w2", "w1"]);
    }

    #[tokio::test]
    async fn test_no_workouts_makes_no_requests() {
        let server = MockServer::start().await;
        let client = PelotonClient::new(&server.uri()).unwrap();

        let ids = user_with(0).workout_ids(&client).await.unwrap();

        assert!(ids.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
