//! Integration tests for the HTTP surface: submission, lookups, derived
//! actions, reference uploads and general middleware behaviour.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{body_json, build_test_app, channel, get, post_json, user, TestApp};
use genqueue_core::job_events::EVENT_JOB_QUEUED;
use genqueue_core::{JobId, JobOutcome};
use serde_json::json;
use tower::ServiceExt;

fn submission(requester: &str) -> serde_json::Value {
    json!({
        "requester": requester,
        "destination": { "kind": "channel", "id": "C1" },
        "model_style": "anime",
        "positive_prompt": "a red fox",
        "negative_prompt": "",
        "aspect_ratio": "768x1024",
        "reference_weight": 0.4,
    })
}

async fn submit(app: &TestApp, requester: &str) -> serde_json::Value {
    let response = post_json(app, "/api/v1/jobs", submission(requester)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

// ---------------------------------------------------------------------------
// Test: GET /health reports queue depth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_queue_depth() {
    let app = build_test_app();
    submit(&app, "U1").await;

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["pending"], 1);
    assert_eq!(json["active"], false);
}

// ---------------------------------------------------------------------------
// Test: middleware basics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = build_test_app();
    let response = get(&app, "/this-route-does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = build_test_app();
    let response = get(&app, "/health").await;

    let id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(id.to_str().unwrap().len(), 36, "x-request-id should be a UUID string");
}

#[tokio::test]
async fn artifacts_are_served_from_output_dir() {
    let app = build_test_app();
    std::fs::write(app.artifact_dir().join("ComfyUI_anime_0001.png"), b"png").unwrap();

    let response = get(&app, "/artifacts/ComfyUI_anime_0001.png").await;
    assert_eq!(response.status(), StatusCode::OK);

    let missing = get(&app, "/artifacts/nope.png").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: POST /jobs enqueues and acknowledges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_position_and_wait() {
    let app = build_test_app();
    let mut events = app.state.event_bus.subscribe();

    let first = submit(&app, "U1").await;
    let second = submit(&app, "U2").await;

    assert_eq!(first["data"]["position"], 1);
    assert_eq!(first["data"]["estimated_wait_secs"], 60);
    assert_eq!(second["data"]["position"], 2);
    assert_eq!(second["data"]["estimated_wait_secs"], 120);

    assert_eq!(
        app.notifier.texts_to(&user("U1")),
        vec!["Your image generation request has been queued. You are number 1 in line. \
              Estimated wait time: 60 seconds."]
    );

    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, EVENT_JOB_QUEUED);
    assert_eq!(event.requester.as_deref(), Some("U1"));
}

#[tokio::test]
async fn submit_applies_defaults() {
    let app = build_test_app();
    let body = submit(&app, "U1").await;
    let id: JobId = body["data"]["id"].as_str().unwrap().parse().unwrap();

    let job = app.state.store.find_by_id(id).await.unwrap();
    let params = job.parameters();
    assert_eq!((params.width, params.height), (768, 1024));
    assert_eq!(params.negative_prompt, "blurry, low quality, distorted");
    assert_eq!(params.reference_image_path, app.state.queue_config.default_reference_path);
    assert_eq!(job.destination(), Some(&channel("C1")));
}

#[tokio::test]
async fn invalid_submission_is_rejected() {
    let app = build_test_app();

    let mut bad_ratio = submission("U1");
    bad_ratio["aspect_ratio"] = json!("square");
    let response = post_json(&app, "/api/v1/jobs", bad_ratio).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    let mut heavy = submission("U1");
    heavy["reference_weight"] = json!(0.75);
    let response = post_json(&app, "/api/v1/jobs", heavy).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.state.store.pending_len().await, 0);
    assert!(app.notifier.sent().is_empty());
}

#[tokio::test]
async fn remix_submission_uses_default_reference() {
    let app = build_test_app();
    let mut body = submission("U1");
    body["reference_image_path"] = json!("/temp/1_upload.png");

    let response = post_json(&app, "/api/v1/jobs/remix", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let pending = app.state.store.pending_snapshot().await;
    assert_eq!(
        pending[0].parameters().reference_image_path,
        app.state.queue_config.default_reference_path
    );
    assert!(app.notifier.texts_to(&user("U1"))[0].starts_with("Your remixed image generation request"));
}

// ---------------------------------------------------------------------------
// Test: lookups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_job_reports_pending_and_active() {
    let app = build_test_app();
    let first = submit(&app, "U1").await;
    let second = submit(&app, "U2").await;
    let first_id = first["data"]["id"].as_str().unwrap().to_string();
    let second_id = second["data"]["id"].as_str().unwrap().to_string();

    app.state.store.dequeue_next().await.unwrap();

    let active = body_json(get(&app, &format!("/api/v1/jobs/{first_id}")).await).await;
    assert_eq!(active["data"]["status"], "active");
    assert!(active["data"]["position"].is_null());

    let pending = body_json(get(&app, &format!("/api/v1/jobs/{second_id}")).await).await;
    assert_eq!(pending["data"]["status"], "pending");
    assert_eq!(pending["data"]["position"], 1);
}

#[tokio::test]
async fn get_unknown_or_malformed_job_is_404() {
    let app = build_test_app();

    let response = get(&app, &format!("/api/v1/jobs/{}", JobId::new())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    let response = get(&app, "/api/v1/jobs/not-a-uuid").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn queue_lists_pending_in_order_with_active() {
    let app = build_test_app();
    let a = submit(&app, "U1").await;
    let b = submit(&app, "U2").await;
    let c = submit(&app, "U3").await;
    app.state.store.dequeue_next().await.unwrap();

    let json = body_json(get(&app, "/api/v1/queue").await).await;
    assert_eq!(json["data"]["active"], a["data"]["id"]);

    let pending = json["data"]["pending"].as_array().unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0]["id"], b["data"]["id"]);
    assert_eq!(pending[0]["position"], 1);
    assert_eq!(pending[0]["estimated_wait_secs"], 60);
    assert_eq!(pending[1]["id"], c["data"]["id"]);
    assert_eq!(pending[1]["position"], 2);
}

// ---------------------------------------------------------------------------
// Test: regenerate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn regenerate_enqueues_copy_for_clicking_user() {
    let app = build_test_app();
    let parent = submit(&app, "U1").await;
    let parent_id = parent["data"]["id"].as_str().unwrap();

    let response = post_json(
        &app,
        &format!("/api/v1/jobs/{parent_id}/regenerate"),
        json!({ "requester": "U9" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_ne!(body["data"]["id"], parent["data"]["id"]);
    assert_eq!(body["data"]["position"], 2);

    let pending = app.state.store.pending_snapshot().await;
    assert_eq!(pending[1].requester(), "U9");
    assert_eq!(pending[1].parameters(), pending[0].parameters());
    assert_eq!(pending[1].destination(), pending[0].destination());

    assert!(app.notifier.texts_to(&user("U9"))[0].starts_with("Your image regeneration request has been queued."));
}

#[tokio::test]
async fn regenerate_completed_job_is_404_and_tells_requester() {
    let app = build_test_app();
    let parent = submit(&app, "U1").await;
    let parent_id = parent["data"]["id"].as_str().unwrap();

    app.state.store.dequeue_next().await.unwrap();
    app.state.store.complete(JobOutcome::Success).await;

    let response = post_json(
        &app,
        &format!("/api/v1/jobs/{parent_id}/regenerate"),
        json!({ "requester": "U9" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.state.store.pending_len().await, 0);

    let texts = app.notifier.texts_to(&user("U9"));
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("An error occurred while processing your regeneration request: Job not found"));
}

// ---------------------------------------------------------------------------
// Test: remix template
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remix_template_returns_parameters() {
    let app = build_test_app();
    let parent = submit(&app, "U1").await;
    let parent_id = parent["data"]["id"].as_str().unwrap();

    let response = get(&app, &format!("/api/v1/jobs/{parent_id}/remix")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["parent_id"], parent_id);
    assert_eq!(json["data"]["aspect_ratio"], "768x1024");
    assert_eq!(json["data"]["parameters"]["model_style"], "anime");
    assert_eq!(json["data"]["parameters"]["positive_prompt"], "a red fox");
    // Nothing new was queued.
    assert_eq!(app.state.store.pending_len().await, 1);
}

#[tokio::test]
async fn remix_template_for_missing_job_tells_requester() {
    let app = build_test_app();

    let response = get(&app, &format!("/api/v1/jobs/{}/remix?requester=U5", JobId::new())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let texts = app.notifier.texts_to(&user("U5"));
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("An error occurred while processing your remix request:"));
}

// ---------------------------------------------------------------------------
// Test: reference uploads
// ---------------------------------------------------------------------------

const BOUNDARY: &str = "genqueue-test-boundary";

fn multipart_request(file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/v1/references")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn png_bytes() -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ref.png");
    image::RgbImage::new(4, 4).save(&path).unwrap();
    std::fs::read(path).unwrap()
}

#[tokio::test]
async fn upload_stores_valid_image_with_timestamp_prefix() {
    let app = build_test_app();

    let response = app
        .router
        .clone()
        .oneshot(multipart_request("ref.png", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    let path = std::path::PathBuf::from(json["data"]["path"].as_str().unwrap());
    assert!(path.exists());
    assert_eq!(path.parent(), Some(app.temp_dir().as_path()));

    let name = path.file_name().unwrap().to_str().unwrap();
    let (ts, rest) = name.split_once('_').unwrap();
    assert!(ts.parse::<i64>().is_ok());
    assert_eq!(rest, "ref.png");
}

#[tokio::test]
async fn upload_rejects_disallowed_extension() {
    let app = build_test_app();

    let response = app
        .router
        .clone()
        .oneshot(multipart_request("notes.txt", b"hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn upload_rejects_undecodable_image_and_removes_it() {
    let app = build_test_app();

    let response = app
        .router
        .clone()
        .oneshot(multipart_request("broken.png", b"not really a png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let leftovers = std::fs::read_dir(app.temp_dir()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn submission_accepts_uploaded_reference() {
    let app = build_test_app();
    let response = app
        .router
        .clone()
        .oneshot(multipart_request("ref.png", &png_bytes()))
        .await
        .unwrap();
    let uploaded = body_json(response).await["data"]["path"].as_str().unwrap().to_string();

    let mut body = submission("U1");
    body["reference_image_path"] = json!(uploaded);
    let response = post_json(&app, "/api/v1/jobs", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let pending = app.state.store.pending_snapshot().await;
    assert_eq!(
        pending[0].parameters().reference_image_path,
        std::fs::canonicalize(&uploaded).unwrap()
    );
}

#[tokio::test]
async fn submission_rejects_reference_outside_upload_dir() {
    let app = build_test_app();
    let mut body = submission("U1");
    body["reference_image_path"] = json!("/etc/shadow");

    let response = post_json(&app, "/api/v1/jobs", body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
    assert_eq!(app.state.store.pending_len().await, 0);
}
