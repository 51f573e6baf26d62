//! HTTP surface of the recorder, driven in-process.

use std::io;
use std::path::{Path, PathBuf};

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use bytes::Bytes;
use futures::stream;
use tower::ServiceExt;
use webrec_core::test_fixtures::{
    WebmFixture, count_entries, create_temp_storage_dirs, read_recording,
};
use webrec_core::{Recorder, WebrecConfig};
use webrec_web::{AppState, build_router};

fn router(scratch_dir: PathBuf, recordings_dir: PathBuf, public_dir: Option<&Path>) -> Router {
    let config = WebrecConfig::for_testing(scratch_dir, recordings_dir);
    build_router(AppState::new(Recorder::from_config(&config)), public_dir)
}

fn request(method: Method, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn test_post_stores_recording_with_duration() {
    let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let app = router(scratch_dir.clone(), recordings_dir.clone(), None);
    let fixture = WebmFixture::new().cluster(0, &[0]).cluster(5000, &[0, 200]);

    let response = app
        .oneshot(request(Method::POST, "/record/A", Body::from(fixture.to_bytes())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let (header, media) = read_recording(&recordings_dir.join("A.webm"));
    assert_eq!(header.info.duration, Some(5200.0));
    assert_eq!(media, fixture.media_bytes());
    assert_eq!(count_entries(&scratch_dir), 0);
}

#[tokio::test]
async fn test_connection_reset_mid_media_still_succeeds() {
    let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let app = router(scratch_dir, recordings_dir.clone(), None);
    let fixture = WebmFixture::new()
        .cluster(0, &[0, 120])
        .cluster(1000, &[0, 120]);

    let mut sent = fixture.header_bytes();
    sent.extend(fixture.cluster_bytes(0));
    let chunks: Vec<Result<Bytes, io::Error>> = vec![
        Ok(Bytes::from(sent)),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away")),
    ];
    let body = Body::from_stream(stream::iter(chunks));

    let response = app
        .oneshot(request(Method::POST, "/record/partial", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let (header, media) = read_recording(&recordings_dir.join("partial.webm"));
    assert_eq!(media, fixture.cluster_bytes(0));
    assert_eq!(header.info.duration, Some(120.0));
}

#[tokio::test]
async fn test_unusable_bodies_are_client_errors() {
    let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let app = router(scratch_dir.clone(), recordings_dir.clone(), None);
    let header_only = WebmFixture::new().header_bytes();

    let cases = [
        ("/record/empty", Vec::new()),
        ("/record/garbage", b"definitely not webm".to_vec()),
        ("/record/header-only", header_only.clone()),
        ("/record/cut", header_only[..header_only.len() - 3].to_vec()),
        ("/record/..%2Fescape", WebmFixture::new().cluster(0, &[0]).to_bytes()),
    ];

    for (uri, body) in cases {
        let response = app
            .clone()
            .oneshot(request(Method::POST, uri, Body::from(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }

    assert_eq!(count_entries(&scratch_dir), 0);
    assert_eq!(count_entries(&recordings_dir), 0);
}

#[tokio::test]
async fn test_route_methods() {
    let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let app = router(scratch_dir, recordings_dir, None);

    let expectations = [
        (Method::GET, "/record/A", StatusCode::NOT_FOUND),
        (Method::PUT, "/record/A", StatusCode::NOT_FOUND),
        (Method::HEAD, "/record/A", StatusCode::OK),
        (Method::OPTIONS, "/record/A", StatusCode::OK),
        (Method::GET, "/elsewhere", StatusCode::NOT_FOUND),
    ];

    for (method, uri, expected) in expectations {
        let response = app
            .clone()
            .oneshot(request(method.clone(), uri, Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), expected, "{method} {uri}");
    }
}

#[tokio::test]
async fn test_finished_recordings_are_served() {
    let (temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let public_dir = temp_dir.path().join("public");
    std::fs::create_dir_all(&public_dir).unwrap();
    std::fs::write(public_dir.join("index.html"), "<h1>recorder</h1>").unwrap();
    let app = router(scratch_dir, recordings_dir.clone(), Some(&public_dir));
    let fixture = WebmFixture::new().cluster(0, &[0, 60]);

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/record/clip", Body::from(fixture.to_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/recordings/clip.webm", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(served, std::fs::read(recordings_dir.join("clip.webm")).unwrap());

    let response = app
        .oneshot(request(Method::GET, "/index.html", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
