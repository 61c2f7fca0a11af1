use peloton_warehouse::EtlJob;
use peloton_warehouse::common::config::Config;
use peloton_warehouse::common::types::EtlError;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const UPLOAD_PATH: &str = "/upload/bigquery/v2/projects/test-project/jobs";

fn config_for(server: &MockServer) -> Config {
    let uri = server.uri();
    Config::from_lookup(move |key| {
        match key {
            "PELOTON_USERNAME" => Some("rider@example.com".to_string()),
            "PELOTON_PASSWORD" => Some("hunter2".to_string()),
            "BIGQUERY_PROJECT_ID" => Some("test-project".to_string()),
            "BIGQUERY_DATASET" => Some("peloton".to_string()),
            "GOOGLE_ACCESS_TOKEN" => Some("test-token".to_string()),
            "PELOTON_BASE_URL" | "BIGQUERY_BASE_URL" => Some(uri.clone()),
            _ => None,
        }
    })
    .expect("test configuration is complete")
}

async fn mount_peloton(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "u-1",
            "user_data": {
                "cycling_ftp": 200,
                "email": "rider@example.com",
                "last_workout_at": 1_600_100_000,
                "name": "Rider",
                "total_workouts": 2
            }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user/u-1/workouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "w-2"}, {"id": "w-1"}]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/workout/w-[12]$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "created_at": 1_600_000_000,
            "is_total_work_personal_record": false,
            "device_type": "home_bike_v1",
            "fitness_discipline": "cycling",
            "status": "COMPLETE",
            "user_id": "u-1",
            "ride": {
                "id": "r-1",
                "title": "20 min HIIT Ride",
                "duration": 1200,
                "difficulty_estimate": 8.0,
                "instructor_id": "i-1"
            }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/workout/w-[12]/summary$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calories": 250.0,
            "avg_heart_rate": 150.0,
            "max_heart_rate": 180.0,
            "avg_resistance": null,
            "max_resistance": null,
            "avg_speed": 20.0,
            "max_speed": 25.0,
            "total_work": 250000.0,
            "distance": 6.5
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/workout/w-[12]/performance_graph$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metrics": [{"display_name": "Heart Rate", "zones": [
                {"display_name": "Zone 4", "range": "160-175 bpm", "min_value": 160, "max_value": 175, "duration": 420},
                {"display_name": "Zone 5", "range": "> 175 bpm", "min_value": 175, "max_value": 200, "duration": 90}
            ]}],
            "average_summaries": [{"display_name": "Avg Output", "value": 180.0}]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/ride/r-1/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ride": {
                "instructor_id": "i-1",
                "ride_type_id": "t-hiit",
                "title": "20 min HIIT Ride",
                "description": "Intervals",
                "duration": 1200,
                "fitness_discipline_display_name": "Cycling",
                "difficulty_estimate": 8.0
            }
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/ride/metadata_mappings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ride_types": [{"id": "t-hiit", "display_name": "HIIT"}]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/instructor/i-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Coach One",
            "first_name": "Coach",
            "last_name": "One",
            "spotify_playlist_uri": "spotify:playlist:1",
            "image_url": "https://img.example/coach.png",
            "fitness_disciplines": ["cycling"]
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_bigquery(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": "test-project", "jobId": "ignored", "location": "US"},
            "status": {"state": "DONE"}
        })))
        .mount(server)
        .await;
}

fn upload_bodies(requests: &[Request]) -> Vec<String> {
    requests
        .iter()
        .filter(|r| r.url.path() == UPLOAD_PATH)
        .map(|r| String::from_utf8(r.body.clone()).unwrap())
        .collect()
}

#[tokio::test]
async fn test_full_run_loads_every_table() {
    let server = MockServer::start().await;
    mount_peloton(&server).await;
    mount_bigquery(&server).await;

    let job = EtlJob::from_config(&config_for(&server)).await.unwrap();
    let report = job.run().await.unwrap();

    assert_eq!(report.users, 1);
    assert_eq!(report.workouts, 2);
    assert_eq!(report.performance_graphs, 4);
    assert_eq!(report.rides, 1);
    assert_eq!(report.instructors, 1);

    let uploads = upload_bodies(&server.received_requests().await.unwrap());
    assert_eq!(uploads.len(), 5);

    let tables = ["users", "workouts", "performance_graphs", "rides", "instructors"];
    for (upload, table) in uploads.iter().zip(tables) {
        assert!(
            upload.contains(&format!("\"tableId\":\"{table}\"")),
            "upload for {table} has wrong destination"
        );
        assert!(upload.contains("\"writeDisposition\":\"WRITE_TRUNCATE\""));
    }

    assert!(uploads[1].contains("\"fitness_discipline\":\"Cycling\""));
    assert!(uploads[1].contains("\"created_at\":\"2020-09-13T12:26:40Z\""));
    assert!(uploads[2].contains("\"duration_seconds\":420"));
    assert!(uploads[3].contains("\"ride_type\":\"HIIT\""));
    assert!(uploads[3].contains("\"duration_minutes\":20"));
    assert!(uploads[4].contains("\"fitness_disciplines\":[\"cycling\"]"));
}

#[tokio::test]
async fn test_failed_login_loads_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    mount_bigquery(&server).await;

    let job = EtlJob::from_config(&config_for(&server)).await.unwrap();
    let err = job.run().await.unwrap_err();

    assert!(matches!(err, EtlError::Authentication(_)));
    assert!(upload_bodies(&server.received_requests().await.unwrap()).is_empty());
}

#[tokio::test]
async fn test_failed_workout_fetch_stops_before_workout_load() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "u-1",
            "user_data": {"total_workouts": 1}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user/u-1/workouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "w-9"}]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/workout/w-9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_bigquery(&server).await;

    let job = EtlJob::from_config(&config_for(&server)).await.unwrap();
    let err = job.run().await.unwrap_err();

    assert!(err.to_string().contains("workout id w-9"));
    // Only the users table was loaded before the failure
    let uploads = upload_bodies(&server.received_requests().await.unwrap());
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].contains("\"tableId\":\"users\""));
}
