//! HTTP transport tests against a mock server.

mod common;

use bytes::Bytes;
use common::{client_config, name, seeded_bytes, write_file};
use httpmock::Method::{DELETE, GET, POST, PUT};
use httpmock::MockServer;
use serde_json::json;
use splice_client::{ClientError, HttpTransport, Transport, UploadCoordinator};
use splice_core::config::ClientConfig;
use splice_core::{ExistsOutcome, FileFingerprint, SessionDeclaration};
use std::net::TcpListener;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn transport_for(server: &MockServer) -> HttpTransport {
    HttpTransport::new(&ClientConfig {
        server: server.base_url(),
        ..client_config(4, 2)
    })
    .unwrap()
}

fn artifact_json(name: &str, size: u64) -> serde_json::Value {
    json!({
        "name": name,
        "size_bytes": size,
        "published_at": "2024-01-01T00:00:00Z"
    })
}

#[tokio::test]
async fn exists_sends_declaration_and_parses_staged_indices() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let fp = FileFingerprint::compute(b"abcdefghij");
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/uploads/exists")
            .query_param("file_name", "a.bin")
            .query_param("fingerprint", fp.to_hex())
            .query_param("file_size", "10")
            .query_param("chunk_size", "4");
        then.status(200)
            .json_body(json!({ "exists": false, "persisted_indices": [0, 2] }));
    });

    let transport = transport_for(&server);
    let outcome = transport
        .check_exists(&name("a.bin"), &fp, Some(SessionDeclaration::new(10, 4)))
        .await
        .unwrap();
    mock.assert();
    match outcome {
        ExistsOutcome::Staged { persisted } => {
            assert_eq!(persisted.into_iter().collect::<Vec<_>>(), vec![0, 2])
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn exists_parses_published_artifact() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/uploads/exists");
        then.status(200).json_body(json!({
            "exists": true,
            "locator": "https://files.example.com/files/a.bin",
            "artifact": artifact_json("a.bin", 10)
        }));
    });

    let transport = transport_for(&server);
    let outcome = transport
        .check_exists(&name("a.bin"), &FileFingerprint::compute(b"x"), None)
        .await
        .unwrap();
    match outcome {
        ExistsOutcome::Published { locator, artifact } => {
            assert_eq!(locator, "https://files.example.com/files/a.bin");
            assert_eq!(artifact.size_bytes, 10);
            assert!(artifact.published_at.is_some());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn put_chunk_sends_raw_body_with_declaration() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let fp = FileFingerprint::compute(b"abcdefghij");
    let mock = server.mock(|when, then| {
        when.method(PUT)
            .path(format!("/v1/uploads/{fp}/chunks/1"))
            .query_param("file_size", "10")
            .query_param("chunk_size", "4")
            .body("efgh");
        then.status(200).json_body(json!({ "index": 1, "stored": true }));
    });

    let transport = transport_for(&server);
    let ack = transport
        .put_chunk(
            &fp,
            1,
            SessionDeclaration::new(10, 4),
            Bytes::from_static(b"efgh"),
        )
        .await
        .unwrap();
    mock.assert();
    assert_eq!(ack.index, 1);
    assert!(ack.stored);
}

#[tokio::test]
async fn error_bodies_map_to_typed_errors() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let fp = FileFingerprint::compute(b"abcdefghij");
    server.mock(|when, then| {
        when.method(POST).path(format!("/v1/uploads/{fp}/merge"));
        then.status(409).json_body(json!({
            "code": "incomplete_upload",
            "message": "upload incomplete",
            "missing": [1, 2]
        }));
    });
    server.mock(|when, then| {
        when.method(PUT).path(format!("/v1/uploads/{fp}/chunks/0"));
        then.status(400).json_body(json!({
            "code": "conflicting_chunk_size",
            "message": "chunk 0 is 3 bytes, expected 4"
        }));
    });
    server.mock(|when, then| {
        when.method(PUT).path(format!("/v1/uploads/{fp}/chunks/1"));
        then.status(503).body("unavailable");
    });

    let transport = transport_for(&server);
    let declaration = SessionDeclaration::new(10, 4);

    let err = transport.merge(&fp, &name("a.bin")).await.unwrap_err();
    assert!(
        matches!(&err, ClientError::IncompleteUpload { missing } if missing == &vec![1, 2]),
        "got {err:?}"
    );

    let err = transport
        .put_chunk(&fp, 0, declaration, Bytes::from_static(b"abc"))
        .await
        .unwrap_err();
    match &err {
        ClientError::Rejected { status, code, .. } => {
            assert_eq!(*status, 400);
            assert_eq!(code, "conflicting_chunk_size");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_transient());

    let err = transport
        .put_chunk(&fp, 1, declaration, Bytes::from_static(b"efgh"))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, ClientError::Transient { status: Some(503), .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn unreachable_server_is_transient() {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0") else {
        eprintln!("Skipping: cannot bind to localhost");
        return;
    };
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(&ClientConfig {
        server: format!("http://{addr}"),
        ..client_config(4, 1)
    })
    .unwrap();
    let err = transport
        .cancel(&FileFingerprint::compute(b"x"))
        .await
        .unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

#[tokio::test]
async fn cancel_reports_removal() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let fp = FileFingerprint::compute(b"abc");
    let mock = server.mock(|when, then| {
        when.method(DELETE).path(format!("/v1/uploads/{fp}"));
        then.status(200).json_body(json!({ "removed": true }));
    });

    let response = transport_for(&server).cancel(&fp).await.unwrap();
    mock.assert();
    assert!(response.removed);
}

#[tokio::test]
async fn coordinator_sends_only_missing_chunks_over_http() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let data = seeded_bytes(10, 11);
    let path = write_file(dir.path(), "a.bin", &data);
    let fp = FileFingerprint::compute(&data);

    let exists = server.mock(|when, then| {
        when.method(GET).path("/v1/uploads/exists");
        then.status(200)
            .json_body(json!({ "exists": false, "persisted_indices": [0] }));
    });
    let put0 = server.mock(|when, then| {
        when.method(PUT).path(format!("/v1/uploads/{fp}/chunks/0"));
        then.status(200).json_body(json!({ "index": 0, "stored": true }));
    });
    let put1 = server.mock(|when, then| {
        when.method(PUT)
            .path(format!("/v1/uploads/{fp}/chunks/1"))
            .query_param("file_size", "10")
            .query_param("chunk_size", "4");
        then.status(200).json_body(json!({ "index": 1, "stored": true }));
    });
    let put2 = server.mock(|when, then| {
        when.method(PUT).path(format!("/v1/uploads/{fp}/chunks/2"));
        then.status(200).json_body(json!({ "index": 2, "stored": true }));
    });
    let merge = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/v1/uploads/{fp}/merge"))
            .json_body(json!({ "file_name": "a.bin" }));
        then.status(200).json_body(json!({
            "locator": "https://files.example.com/files/a.bin",
            "artifact": artifact_json("a.bin", 10)
        }));
    });

    let config = ClientConfig {
        server: server.base_url(),
        ..client_config(4, 2)
    };
    let coordinator = UploadCoordinator::new(HttpTransport::new(&config).unwrap(), config);
    let report = coordinator.upload(&path, &name("a.bin")).await.unwrap();

    exists.assert_hits(1);
    put0.assert_hits(0);
    put1.assert_hits(1);
    put2.assert_hits(1);
    merge.assert_hits(1);
    assert_eq!(report.chunks_sent, 2);
    assert_eq!(report.locator, "https://files.example.com/files/a.bin");
}

#[tokio::test]
async fn coordinator_retries_server_errors_then_gives_up() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let data = seeded_bytes(4, 12);
    let path = write_file(dir.path(), "b.bin", &data);
    let fp = FileFingerprint::compute(&data);

    server.mock(|when, then| {
        when.method(GET).path("/v1/uploads/exists");
        then.status(200)
            .json_body(json!({ "exists": false, "persisted_indices": [] }));
    });
    let put = server.mock(|when, then| {
        when.method(PUT).path(format!("/v1/uploads/{fp}/chunks/0"));
        then.status(500).json_body(json!({
            "code": "storage_error",
            "message": "disk full"
        }));
    });
    let merge = server.mock(|when, then| {
        when.method(POST).path(format!("/v1/uploads/{fp}/merge"));
        then.status(200);
    });

    let mut config = ClientConfig {
        server: server.base_url(),
        ..client_config(4, 1)
    };
    config.max_retries = 2;
    let coordinator = UploadCoordinator::new(HttpTransport::new(&config).unwrap(), config);
    let err = coordinator.upload(&path, &name("b.bin")).await.unwrap_err();

    put.assert_hits(3);
    merge.assert_hits(0);
    assert_eq!(err.missing(), Some(&[0][..]));
}
