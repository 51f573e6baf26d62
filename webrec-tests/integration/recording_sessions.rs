//! Recorder behavior across whole sessions: partial streams, failure
//! cleanup, and isolation between concurrent recordings.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{StreamExt, stream};
use tokio::test;
use webrec_core::recording::{IngestEnd, RecordingId};
use webrec_core::test_fixtures::{
    WebmFixture, chunked, count_entries, create_temp_storage_dirs, read_recording,
};
use webrec_core::{Recorder, RecordingError, TransportFault, WebrecConfig};

fn recorder(scratch_dir: PathBuf, recordings_dir: PathBuf) -> Recorder {
    Recorder::from_config(&WebrecConfig::for_testing(scratch_dir, recordings_dir))
}

#[test]
async fn test_reset_after_first_cluster_keeps_that_cluster() {
    let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let recorder = recorder(scratch_dir.clone(), recordings_dir);
    let fixture = WebmFixture::new()
        .cluster(1000, &[0, 300])
        .cluster(2000, &[0, 500]);

    let mut body = fixture.header_bytes();
    body.extend(fixture.cluster_bytes(0));
    let mut chunks = chunked(&body, 100);
    chunks.push(Err(TransportFault::reset("connection reset by peer")));

    let outcome = recorder.record("partial", stream::iter(chunks)).await.unwrap();

    assert_eq!(outcome.ended_by, IngestEnd::Reset);
    let (header, media) = read_recording(&outcome.path);
    assert_eq!(media, fixture.cluster_bytes(0));
    assert_eq!(header.info.duration, Some(300.0));
    assert_eq!(count_entries(&scratch_dir), 0);
}

#[test]
async fn test_failed_sessions_leave_no_partial_files() {
    let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let recorder = recorder(scratch_dir.clone(), recordings_dir.clone());
    let fixture = WebmFixture::new().cluster(0, &[0, 40]);
    let header = fixture.header_bytes();
    let mut blockers = 0;

    for attempt in 0..100 {
        let id = format!("failing-{attempt}");
        let result = match attempt % 3 {
            0 => {
                let chunks = vec![
                    Ok(Bytes::copy_from_slice(&header[..header.len() / 2])),
                    Err(TransportFault::reset("reset before media")),
                ];
                recorder.record(&id, stream::iter(chunks)).await
            }
            1 => {
                let garbage = chunked(&[0u8; 256], 64);
                recorder.record(&id, stream::iter(garbage)).await
            }
            _ => {
                // A non-empty directory at the destination makes the final
                // rename fail after media has been captured.
                let blocker = recordings_dir.join(format!("{id}.webm"));
                std::fs::create_dir_all(blocker.join("occupied")).unwrap();
                blockers += 1;
                let chunks = chunked(&fixture.to_bytes(), 128);
                recorder.record(&id, stream::iter(chunks)).await
            }
        };

        let err = result.unwrap_err();
        match attempt % 3 {
            0 => assert!(matches!(err, RecordingError::AbortedBeforeMedia { .. })),
            1 => assert!(matches!(err, RecordingError::MalformedContainer(_))),
            _ => assert!(matches!(err, RecordingError::Storage(_))),
        }
    }

    assert_eq!(count_entries(&scratch_dir), 0);
    assert_eq!(count_entries(&recordings_dir), blockers);
    assert!(recorder.active().is_empty());
}

#[test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_sessions_do_not_share_bytes() {
    let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let recorder = recorder(scratch_dir.clone(), recordings_dir.clone());
    let first = WebmFixture::new()
        .cluster(0, &[0, 100])
        .cluster(1000, &[0, 100]);
    let second = WebmFixture::new()
        .doc_type("matroska")
        .cluster(0, &[0, 10, 20])
        .cluster(3000, &[0, 700])
        .cluster(6000, &[0]);

    let trickle = |bytes: Vec<u8>| {
        stream::iter(chunked(&bytes, 37)).then(|chunk| async move {
            tokio::task::yield_now().await;
            chunk
        })
    };

    let (a, b) = tokio::join!(
        recorder.record("A", Box::pin(trickle(first.to_bytes()))),
        recorder.record("B", Box::pin(trickle(second.to_bytes()))),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.path, recordings_dir.join("A.webm"));
    assert_eq!(b.path, recordings_dir.join("B.mkv"));
    assert_eq!(read_recording(&a.path).1, first.media_bytes());
    assert_eq!(read_recording(&b.path).1, second.media_bytes());
    assert_eq!(a.duration_ticks, 1100.0);
    assert_eq!(b.duration_ticks, 6000.0);
    assert_eq!(count_entries(&scratch_dir), 0);
}

#[test]
async fn test_same_identifier_is_refused_while_recording() {
    let (_temp_dir, scratch_dir, recordings_dir) = create_temp_storage_dirs();
    let recorder = Arc::new(recorder(scratch_dir, recordings_dir));
    let first = WebmFixture::new().cluster(0, &[0, 250]);
    let replacement = WebmFixture::new().cluster(0, &[0, 900]);
    let id = RecordingId::parse("shared").unwrap();

    let (sender, receiver) = mpsc::unbounded::<Result<Bytes, TransportFault>>();
    sender
        .unbounded_send(Ok(Bytes::from(first.header_bytes())))
        .unwrap();
    let running = {
        let recorder = Arc::clone(&recorder);
        tokio::spawn(async move { recorder.record("shared", receiver).await })
    };
    while !recorder.active().is_active(&id) {
        tokio::task::yield_now().await;
    }

    let rejected = recorder
        .record("shared", stream::iter(chunked(&replacement.to_bytes(), 64)))
        .await;
    assert!(matches!(rejected, Err(RecordingError::InProgress { .. })));

    sender
        .unbounded_send(Ok(Bytes::from(first.media_bytes())))
        .unwrap();
    drop(sender);
    let outcome = running.await.unwrap().unwrap();
    assert_eq!(read_recording(&outcome.path).1, first.media_bytes());

    // Once released, the identifier can be recorded again and is replaced.
    let outcome = recorder
        .record("shared", stream::iter(chunked(&replacement.to_bytes(), 64)))
        .await
        .unwrap();
    let (header, media) = read_recording(&outcome.path);
    assert_eq!(media, replacement.media_bytes());
    assert_eq!(header.info.duration, Some(900.0));
}
