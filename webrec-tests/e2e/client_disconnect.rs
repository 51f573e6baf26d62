//! Uploads over a real socket, including clients that vanish mid-stream.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use webrec_core::test_fixtures::{
    WebmFixture, count_entries, create_temp_storage_dirs, read_recording,
};
use webrec_core::{Recorder, WebrecConfig};
use webrec_web::{AppState, build_router};

async fn spawn_server(
    scratch_dir: PathBuf,
    recordings_dir: PathBuf,
) -> (SocketAddr, Arc<Recorder>) {
    let config = WebrecConfig::for_testing(scratch_dir, recordings_dir);
    let state = AppState::new(Recorder::from_config(&config));
    let recorder = Arc::clone(&state.recorder);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state, None)).await.unwrap();
    });
    (address, recorder)
}

/// Opens a chunked upload to `/record/{id}` and sends `chunks` without the
/// terminating zero-length chunk.
async fn start_upload(address: SocketAddr, id: &str, chunks: &[&[u8]]) -> TcpStream {
    let mut socket = TcpStream::connect(address).await.unwrap();
    let head = format!(
        "POST /record/{id} HTTP/1.1\r\nHost: {address}\r\nTransfer-Encoding: chunked\r\n\r\n"
    );
    socket.write_all(head.as_bytes()).await.unwrap();
    for chunk in chunks {
        socket
            .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
            .await
            .unwrap();
        socket.write_all(chunk).await.unwrap();
        socket.write_all(b"\r\n").await.unwrap();
    }
    socket.flush().await.unwrap();
    socket
}

/// Waits until no session is in flight.
async fn wait_idle(recorder: &Recorder) {
    for _ in 0..250 {
        if recorder.active().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("recording session did not finish");
}

#[tokio::test]
async fn test_complete_upload_over_tcp() {
    let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let (address, _recorder) = spawn_server(scratch_dir, recordings_dir.clone()).await;
    let fixture = WebmFixture::new()
        .unknown_size_clusters()
        .cluster(0, &[0, 33, 66])
        .cluster(2000, &[0, 400]);
    let bytes = fixture.to_bytes();

    let mut socket = start_upload(address, "tcp", &[&bytes[..50], &bytes[50..]]).await;
    socket.write_all(b"0\r\n\r\n").await.unwrap();

    let mut response = Vec::new();
    let mut buffer = [0u8; 1024];
    while !response.ends_with(b"\r\n\r\n") {
        let read = socket.read(&mut buffer).await.unwrap();
        assert!(read > 0, "connection closed before response");
        response.extend_from_slice(&buffer[..read]);
    }
    assert!(response.starts_with(b"HTTP/1.1 200"));

    let (header, media) = read_recording(&recordings_dir.join("tcp.webm"));
    assert_eq!(header.info.duration, Some(2400.0));
    assert_eq!(media, fixture.media_bytes());
}

#[tokio::test]
async fn test_client_disconnect_after_first_cluster_keeps_media() {
    let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let (address, recorder) = spawn_server(scratch_dir.clone(), recordings_dir.clone()).await;
    let fixture = WebmFixture::new()
        .cluster(0, &[0, 150])
        .cluster(1000, &[0, 150]);
    let header = fixture.header_bytes();
    let cluster = fixture.cluster_bytes(0);

    let socket = start_upload(address, "vanished", &[&header, &cluster]).await;
    // Give the server a moment to read the chunks before the peer leaves.
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(socket);

    let path = recordings_dir.join("vanished.webm");
    wait_idle(&recorder).await;
    let (stored, media) = read_recording(&path);
    assert_eq!(media, cluster);
    assert_eq!(stored.info.duration, Some(150.0));
    assert_eq!(count_entries(&scratch_dir), 0);
}

#[tokio::test]
async fn test_client_disconnect_inside_header_stores_nothing() {
    let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let (address, recorder) = spawn_server(scratch_dir.clone(), recordings_dir.clone()).await;
    let header = WebmFixture::new().header_bytes();

    let socket = start_upload(address, "early", &[&header[..header.len() / 2]]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(socket);

    let path = recordings_dir.join("early.webm");
    wait_idle(&recorder).await;
    assert!(!path.exists());
    assert_eq!(count_entries(&scratch_dir), 0);
    assert_eq!(count_entries(&recordings_dir), 0);
}
