use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use chunk_drive::{
    gateway::{StorageGateway, local::LocalGateway},
    routes::routes::routes,
    services::{progress_registry::ProgressRegistry, transfer_service::TransferService},
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message},
};
use tower::ServiceExt;

const BOUNDARY: &str = "chunk-drive-test-boundary";

struct TestApp {
    _dir: TempDir,
    router: Router,
    progress: ProgressRegistry,
    gateway: Arc<LocalGateway>,
}

async fn app_with_limit(limit: usize) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(LocalGateway::new(dir.path()).await.unwrap());
    let progress = ProgressRegistry::default();
    let service = TransferService::new(gateway.clone(), progress.clone());
    TestApp {
        _dir: dir,
        router: routes(limit).with_state(service),
        progress,
        gateway,
    }
}

async fn app() -> TestApp {
    app_with_limit(1024 * 1024).await
}

/// Multipart body with text fields and an optional `file` part.
fn multipart_body(fields: &[(&str, &str)], file: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(data) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"blob\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &TestApp, req: Request<Body>) -> Response {
    app.router.clone().oneshot(req).await.unwrap()
}

async fn json_of(resp: Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn chunk_fields<'a>(
    upload_id: &'a str,
    index: &'a str,
    offset: &'a str,
) -> Vec<(&'a str, &'a str)> {
    vec![
        ("uploadID", upload_id),
        ("currentPath", "/media"),
        ("chunkIndex", index),
        ("originalFilename", "clip.bin"),
        ("totalSize", "12"),
        ("startOffset", offset),
    ]
}

#[tokio::test]
async fn healthz_is_ok() {
    let app = app().await;
    let resp = send(&app, get("/healthz")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_of(resp).await["status"], "ok");

    let resp = send(&app, get("/readyz")).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn listing_defaults_to_root() {
    let app = app().await;
    let resp = send(&app, get("/api/files")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_of(resp).await, serde_json::json!([]));
}

#[tokio::test]
async fn upload_without_progress_socket_is_rejected() {
    let app = app().await;
    let body = multipart_body(&chunk_fields("nobody", "0", "0"), Some(b"hello"));
    let resp = send(&app, multipart_request("/api/upload", body)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(app.gateway.list("/").await.unwrap().is_empty());
}

#[tokio::test]
async fn upload_requires_id_and_file() {
    let app = app().await;
    let (_channel, _rx) = app.progress.register("s1");

    let body = multipart_body(&[("chunkIndex", "0")], Some(b"x"));
    let resp = send(&app, multipart_request("/api/upload", body)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = multipart_body(&chunk_fields("s1", "0", "0"), None);
    let resp = send(&app, multipart_request("/api/upload", body)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_chunk_index_is_rejected() {
    let app = app().await;
    let (_channel, _rx) = app.progress.register("s1");
    let body = multipart_body(&chunk_fields("s1", "first", "0"), Some(b"x"));
    let resp = send(&app, multipart_request("/api/upload", body)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(app.gateway.list("/").await.unwrap().is_empty());
}

#[tokio::test]
async fn chunked_upload_lists_downloads_and_deletes() {
    let app = app().await;
    let (_channel, mut rx) = app.progress.register("s1");

    for (index, offset, data) in [("0", "0", b"hello "), ("1", "6", b"world!")] {
        let body = multipart_body(&chunk_fields("s1", index, offset), Some(data));
        let resp = send(&app, multipart_request("/api/upload", body)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_of(resp).await;
        assert_eq!(json["message"], "chunk uploaded successfully");
        assert_eq!(json["totalSize"], 12);
    }

    assert_eq!(rx.recv().await.unwrap().total_written, 6);
    assert_eq!(rx.recv().await.unwrap().total_written, 12);

    let listing = json_of(send(&app, get("/api/files?path=/media")).await).await;
    assert_eq!(
        listing,
        serde_json::json!([
            { "name": "clip.bin", "path": "/media/clip.bin", "isDir": false, "size": 12 }
        ])
    );

    let resp = send(&app, get("/api/download?path=/media/clip.bin")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=clip.bin"
    );
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"hello world!");

    let resp = send(&app, delete("/api/files?path=/media/clip.bin")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_of(resp).await;
    assert_eq!(json["removed"].as_array().unwrap().len(), 2);

    let listing = json_of(send(&app, get("/api/files?path=/media")).await).await;
    assert_eq!(listing, serde_json::json!([]));
}

#[tokio::test]
async fn download_errors() {
    let app = app().await;
    let resp = send(&app, get("/api/download")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(&app, get("/api/download?path=/ghost.bin")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_requires_path() {
    let app = app().await;
    let resp = send(&app, delete("/api/files")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_folder_then_list() {
    let app = app().await;
    let body = multipart_body(&[("path", "/albums/2024")], None);
    let resp = send(&app, multipart_request("/api/folders", body)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_of(resp).await["message"], "folder created successfully");

    let listing = json_of(send(&app, get("/api/files?path=/albums")).await).await;
    assert_eq!(
        listing,
        serde_json::json!([
            { "name": "2024", "path": "/albums/2024", "isDir": true, "size": 0 }
        ])
    );

    let body = multipart_body(&[], None);
    let resp = send(&app, multipart_request("/api/folders", body)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_upload_is_refused() {
    let app = app_with_limit(256).await;
    let (_channel, _rx) = app.progress.register("big");
    let payload = vec![b'z'; 4096];
    let body = multipart_body(&chunk_fields("big", "0", "0"), Some(&payload));
    let resp = send(&app, multipart_request("/api/upload", body)).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Serve the router on an ephemeral port for real WebSocket clients.
async fn serve(app: &TestApp) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move { axum::serve(listener, router).await });
    addr
}

async fn open_progress(addr: SocketAddr, id: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws/progress?id={id}"))
        .await
        .unwrap();
    socket
}

/// Poll until `check` holds; registration happens after the handshake.
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn next_text(socket: &mut Socket) -> Value {
    loop {
        match socket.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

#[tokio::test]
async fn progress_socket_streams_json_and_unregisters_on_close() {
    let app = app().await;
    let addr = serve(&app).await;

    let mut socket = open_progress(addr, "live").await;
    eventually(|| app.progress.lookup("live").is_some()).await;

    let body = multipart_body(&chunk_fields("live", "0", "0"), Some(b"hello "));
    let resp = send(&app, multipart_request("/api/upload", body)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        next_text(&mut socket).await,
        serde_json::json!({ "totalWritten": 6, "totalSize": 12 })
    );

    socket.close(None).await.unwrap();
    eventually(|| app.progress.lookup("live").is_none()).await;

    let body = multipart_body(&chunk_fields("live", "1", "6"), Some(b"world!"));
    let resp = send(&app, multipart_request("/api/upload", body)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn closing_a_replaced_socket_keeps_the_newer_one() {
    let app = app().await;
    let addr = serve(&app).await;

    let mut old = open_progress(addr, "dup").await;
    eventually(|| app.progress.lookup("dup").is_some()).await;
    let first = app.progress.lookup("dup").unwrap();

    let mut new = open_progress(addr, "dup").await;
    eventually(|| {
        app.progress
            .lookup("dup")
            .is_some_and(|current| !Arc::ptr_eq(&current, &first))
    })
    .await;
    drop(first);

    old.close(None).await.unwrap();
    // Wait for the server to see the close frame.
    while let Some(Ok(_)) = old.next().await {}
    tokio::time::sleep(Duration::from_millis(50)).await;

    let body = multipart_body(&chunk_fields("dup", "0", "0"), Some(b"hello "));
    let resp = send(&app, multipart_request("/api/upload", body)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(next_text(&mut new).await["totalWritten"], 6);
    assert!(app.progress.lookup("dup").is_some());
}

#[tokio::test]
async fn progress_socket_requires_an_id() {
    let app = app().await;
    let addr = serve(&app).await;

    match connect_async(format!("ws://{addr}/ws/progress")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::BAD_REQUEST),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("upgrade without an id was accepted"),
    }
    assert!(app.progress.is_empty());
}
