//! Control protocol: line parsing, replies, and a socket round trip.

use std::sync::Arc;

use crate::cli::control_socket::{respond, send_command, spawn_control_listener, Request};
use upq_core::notify::LogSink;
use upq_core::pipeline::HttpStore;
use upq_core::service::{ServiceSettings, TransferService};
use upq_core::task::{OwnerId, TaskId, TaskStatus};

/// A service without a worker: submissions stay queued.
fn idle_service() -> TransferService {
    let store = HttpStore::new("http://127.0.0.1:9/upload", None, "filecode").unwrap();
    TransferService::new(ServiceSettings::default(), Arc::new(store), Arc::new(LogSink))
}

#[test]
fn parse_every_command() {
    assert_eq!(
        Request::parse("submit 5 /tmp/a.mp4"),
        Ok(Request::Submit {
            owner: OwnerId(5),
            source: "/tmp/a.mp4".into(),
            name: None
        })
    );
    assert_eq!(
        Request::parse("submit 5 https://x.test/v.mkv  My holiday video "),
        Ok(Request::Submit {
            owner: OwnerId(5),
            source: "https://x.test/v.mkv".into(),
            name: Some("My holiday video".into())
        })
    );
    assert_eq!(Request::parse("queue"), Ok(Request::Queue));
    assert_eq!(Request::parse("list 9"), Ok(Request::List { owner: OwnerId(9) }));
    assert_eq!(
        Request::parse("  cancel 9 12 "),
        Ok(Request::Cancel {
            owner: OwnerId(9),
            id: TaskId(12)
        })
    );
    assert_eq!(
        Request::parse("cancelall -1"),
        Ok(Request::CancelAll { owner: OwnerId(-1) })
    );
}

#[test]
fn parse_rejects_malformed_lines() {
    assert!(Request::parse("").is_err());
    assert!(Request::parse("submit 5").is_err());
    assert!(Request::parse("submit me /tmp/a").is_err());
    assert!(Request::parse("cancel 5").is_err());
    assert!(Request::parse("cancel 5 x").is_err());
    assert!(Request::parse("list").is_err());
    assert_eq!(
        Request::parse("pause 3"),
        Err("unknown command: pause".to_string())
    );
}

#[test]
fn to_line_parses_back() {
    for req in [
        Request::Submit {
            owner: OwnerId(1),
            source: "/a/b.bin".into(),
            name: Some("b b".into()),
        },
        Request::Queue,
        Request::CancelAll { owner: OwnerId(3) },
    ] {
        assert_eq!(Request::parse(&req.to_line()), Ok(req));
    }
}

#[test]
fn respond_reports_positions_and_ownership() {
    let service = idle_service();
    let owner = OwnerId(10);
    let first = respond(
        &service,
        Request::Submit {
            owner,
            source: "/srv/media/one.mp4".into(),
            name: None,
        },
    );
    assert_eq!(first, vec!["task 1 queued, processing immediately".to_string()]);
    let second = respond(
        &service,
        Request::Submit {
            owner,
            source: "https://example.com/".into(),
            name: None,
        },
    );
    assert_eq!(second, vec!["task 2 queued at position #2".to_string()]);
    assert_eq!(service.get(TaskId(1)).unwrap().name, "one.mp4");
    assert_eq!(service.get(TaskId(2)).unwrap().name, "unknown_file");

    assert_eq!(respond(&service, Request::Queue), vec!["2 job(s) waiting".to_string()]);

    let listed = respond(&service, Request::List { owner });
    assert_eq!(listed.len(), 3);
    assert!(listed[1].starts_with("1 "));
    assert!(listed[1].contains("Queued"));
    assert_eq!(
        respond(&service, Request::List { owner: OwnerId(11) }),
        vec!["no tasks".to_string()]
    );

    assert_eq!(
        respond(
            &service,
            Request::Cancel {
                owner: OwnerId(11),
                id: TaskId(1)
            }
        ),
        vec!["error: task 1 does not belong to you".to_string()]
    );
    assert_eq!(
        respond(&service, Request::Cancel { owner, id: TaskId(77) }),
        vec!["error: task 77 not found".to_string()]
    );
    assert_eq!(
        respond(&service, Request::Cancel { owner, id: TaskId(1) }),
        vec!["cancel requested for task 1 (was Queued)".to_string()]
    );
    assert_eq!(service.get(TaskId(1)).unwrap().status, TaskStatus::Cancelling);
    assert_eq!(
        respond(&service, Request::CancelAll { owner }),
        vec!["cancel requested for 2 task(s)".to_string()]
    );
}

#[tokio::test]
async fn socket_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("run").join("control.sock");
    let service = Arc::new(idle_service());
    let listener = spawn_control_listener(Arc::clone(&service), &socket).unwrap();

    let reply = send_command(&socket, &Request::Queue).await.unwrap();
    assert_eq!(reply, vec!["0 job(s) waiting".to_string()]);

    let reply = send_command(
        &socket,
        &Request::Submit {
            owner: OwnerId(4),
            source: "/data/x.iso".into(),
            name: Some("install media".into()),
        },
    )
    .await
    .unwrap();
    assert_eq!(reply, vec!["task 1 queued, processing immediately".to_string()]);
    assert_eq!(service.get(TaskId(1)).unwrap().name, "install media");

    let reply = send_command(&socket, &Request::List { owner: OwnerId(4) })
        .await
        .unwrap();
    assert_eq!(reply.len(), 2);
    assert!(reply[1].contains("install media"));

    listener.abort();
}

#[tokio::test]
async fn client_reports_missing_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let err = send_command(&dir.path().join("absent.sock"), &Request::Queue)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no daemon listening"));
}
