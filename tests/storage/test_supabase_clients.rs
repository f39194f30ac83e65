// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Supabase Storage and PostgREST clients against a local fake
//!
//! A small axum app bound to 127.0.0.1:0 plays the two REST surfaces and
//! records what it received.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use pcb_defect_node::backend::SupabaseClient;
use pcb_defect_node::records::{
    NewDefectCrop, NewMainImage, PersistenceError, PostgrestRecordStore, RecordId, RecordStore,
};
use pcb_defect_node::storage::{
    ObjectStore, StorageUploader, SupabaseObjectStore, UploadError,
};
use pcb_defect_node::vision::BoundingBox;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SERVICE_KEY: &str = "service-role-key";
const BUCKET: &str = "pcb-images";

#[derive(Debug, Clone)]
struct ReceivedObject {
    bucket: String,
    path: String,
    content_type: Option<String>,
    len: usize,
}

#[derive(Debug, Default)]
struct FakeSupabase {
    objects: Vec<ReceivedObject>,
    rows: Vec<(String, Value)>,
    prefer_headers: Vec<String>,
    /// Status forced on the next storage call
    storage_status: Option<StatusCode>,
    /// Status forced on the next insert
    rest_status: Option<StatusCode>,
    /// Answer inserts with an empty array
    rest_empty: bool,
}

type Shared = Arc<Mutex<FakeSupabase>>;

fn authorized(headers: &HeaderMap) -> bool {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", SERVICE_KEY))
        .unwrap_or(false);
    let apikey = headers
        .get("apikey")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == SERVICE_KEY)
        .unwrap_or(false);
    bearer && apikey
}

async fn upload_object(
    State(state): State<Shared>,
    Path((bucket, path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid JWT").into_response();
    }
    let mut fake = state.lock().unwrap();
    if let Some(status) = fake.storage_status.take() {
        return (status, "forced failure").into_response();
    }
    fake.objects.push(ReceivedObject {
        bucket: bucket.clone(),
        path: path.clone(),
        content_type: headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        len: body.len(),
    });
    Json(json!({ "Key": format!("{}/{}", bucket, path) })).into_response()
}

async fn insert_row(
    State(state): State<Shared>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(row): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid JWT").into_response();
    }
    let mut fake = state.lock().unwrap();
    if let Some(status) = fake.rest_status.take() {
        return (status, r#"{"code":"23505","message":"duplicate key"}"#).into_response();
    }
    if let Some(prefer) = headers.get("prefer").and_then(|v| v.to_str().ok()) {
        fake.prefer_headers.push(prefer.to_string());
    }
    if fake.rest_empty {
        return (StatusCode::CREATED, Json(json!([]))).into_response();
    }

    fake.rows.push((table.clone(), row.clone()));
    let n = fake.rows.len();
    // Main images get bigint ids, crops get uuids
    let id = if table == "pcb_defect_crops" {
        json!(format!("00000000-0000-4000-8000-{:012}", n))
    } else {
        json!(n)
    };
    let mut stored = row;
    stored["id"] = id;
    (StatusCode::CREATED, Json(json!([stored]))).into_response()
}

async fn start_fake() -> (SocketAddr, Shared) {
    let state: Shared = Arc::new(Mutex::new(FakeSupabase::default()));
    let app = Router::new()
        .route("/storage/v1/object/:bucket/*path", post(upload_object))
        .route("/rest/v1/:table", post(insert_row))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn client(addr: SocketAddr, key: &str) -> SupabaseClient {
    SupabaseClient::new(
        &format!("http://{}", addr),
        key,
        BUCKET,
        Duration::from_secs(5),
    )
    .unwrap()
}

fn main_row() -> NewMainImage {
    NewMainImage {
        storage_path: "pcb/main/abc.png".to_string(),
        public_url: "http://x/storage/v1/object/public/pcb-images/pcb/main/abc.png".to_string(),
        width: 640,
        height: 480,
        original_filename: Some("board.png".to_string()),
        board_code: None,
        note: None,
    }
}

#[tokio::test]
async fn test_uploader_writes_to_bucket_and_returns_public_url() {
    let (addr, state) = start_fake().await;
    let store = SupabaseObjectStore::new(client(addr, SERVICE_KEY));
    let uploader = StorageUploader::new(Arc::new(store));

    let stored = uploader
        .upload(vec![7u8; 128], "pcb/main", "png")
        .await
        .unwrap();

    assert!(stored.stored_path.starts_with("pcb/main/"));
    assert_eq!(
        stored.public_url,
        format!(
            "http://{}/storage/v1/object/public/{}/{}",
            addr, BUCKET, stored.stored_path
        )
    );

    let fake = state.lock().unwrap();
    assert_eq!(fake.objects.len(), 1);
    let obj = &fake.objects[0];
    assert_eq!(obj.bucket, BUCKET);
    assert_eq!(obj.path, stored.stored_path);
    assert_eq!(obj.content_type.as_deref(), Some("image/png"));
    assert_eq!(obj.len, 128);
}

#[tokio::test]
async fn test_upload_with_wrong_key_is_unauthorized() {
    let (addr, state) = start_fake().await;
    let store = SupabaseObjectStore::new(client(addr, "anon-key"));

    let result = store.put_object("pcb/main/a.png", vec![1], "image/png").await;

    assert!(matches!(result, Err(UploadError::Unauthorized(_))));
    assert!(state.lock().unwrap().objects.is_empty());
}

#[tokio::test]
async fn test_upload_status_mapping() {
    let (addr, state) = start_fake().await;
    let store = SupabaseObjectStore::new(client(addr, SERVICE_KEY));

    state.lock().unwrap().storage_status = Some(StatusCode::PAYLOAD_TOO_LARGE);
    let result = store.put_object("pcb/main/a.png", vec![1], "image/png").await;
    assert!(matches!(result, Err(UploadError::QuotaExceeded)));

    state.lock().unwrap().storage_status = Some(StatusCode::BAD_REQUEST);
    let result = store.put_object("pcb/main/a.png", vec![1], "image/png").await;
    match result {
        Err(UploadError::Rejected { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "forced failure");
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_to_closed_port_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = SupabaseObjectStore::new(client(addr, SERVICE_KEY));
    let result = store.put_object("pcb/main/a.png", vec![1], "image/png").await;
    assert!(matches!(result, Err(UploadError::Transport(_))));
}

#[tokio::test]
async fn test_insert_main_returns_generated_id() {
    let (addr, state) = start_fake().await;
    let records = PostgrestRecordStore::new(client(addr, SERVICE_KEY));

    let id = records.insert_main(&main_row()).await.unwrap();

    assert_eq!(id, RecordId::Int(1));
    let fake = state.lock().unwrap();
    assert_eq!(fake.prefer_headers, vec!["return=representation"]);
    let (table, row) = &fake.rows[0];
    assert_eq!(table, "pcb_main_images");
    assert_eq!(row["width"], 640);
    assert_eq!(row["original_filename"], "board.png");
    // Absent options are sent as explicit nulls
    assert!(row.get("board_code").unwrap().is_null());
    assert!(row.get("note").unwrap().is_null());
}

#[tokio::test]
async fn test_insert_crop_sends_bbox_columns_and_reads_uuid_id() {
    let (addr, state) = start_fake().await;
    let records = PostgrestRecordStore::new(client(addr, SERVICE_KEY));
    let main_id = records.insert_main(&main_row()).await.unwrap();

    let crop = NewDefectCrop {
        main_image_id: main_id.clone(),
        crop_storage_path: "pcb/crops/def.png".to_string(),
        crop_public_url: "http://x/def.png".to_string(),
        crop_width: 15,
        crop_height: 15,
        prediction: "short".to_string(),
        confidence: 0.77,
        bbox: Some(BoundingBox {
            x: 100,
            y: 50,
            width: 15,
            height: 15,
        })
        .into(),
    };
    let id = records.insert_crop(&crop).await.unwrap();

    assert!(matches!(id, RecordId::Text(ref s) if s.ends_with("000000000002")));
    let fake = state.lock().unwrap();
    let (table, row) = &fake.rows[1];
    assert_eq!(table, "pcb_defect_crops");
    assert_eq!(row["main_image_id"], 1);
    assert_eq!(row["bbox_x"], 100);
    assert_eq!(row["bbox_y"], 50);
    assert_eq!(row["bbox_width"], 15);
    assert_eq!(row["bbox_height"], 15);
    assert_eq!(row["prediction"], "short");
}

#[tokio::test]
async fn test_insert_failures() {
    let (addr, state) = start_fake().await;
    let records = PostgrestRecordStore::new(client(addr, SERVICE_KEY));

    state.lock().unwrap().rest_status = Some(StatusCode::CONFLICT);
    let result = records.insert_main(&main_row()).await;
    match result {
        Err(PersistenceError::Constraint(msg)) => assert!(msg.contains("duplicate key")),
        other => panic!("expected Constraint, got {:?}", other),
    }

    state.lock().unwrap().rest_status = Some(StatusCode::SERVICE_UNAVAILABLE);
    let result = records.insert_main(&main_row()).await;
    assert!(matches!(result, Err(PersistenceError::Transport(_))));

    state.lock().unwrap().rest_empty = true;
    let result = records.insert_main(&main_row()).await;
    assert!(matches!(result, Err(PersistenceError::MissingId(ref t)) if t == "pcb_main_images"));

    let bad_key = PostgrestRecordStore::new(client(addr, "anon-key"));
    let result = bad_key.insert_main(&main_row()).await;
    assert!(matches!(result, Err(PersistenceError::Unauthorized(_))));
}
