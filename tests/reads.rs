//! One-shot read tests over `$all` and single streams.

use eventlane::{
    Engine, EnumeratorOptions, EventFilter, EventRecord, ExpectedRevision, FailureReason,
    NewEvent, Position, Principal, ReadAllRequest, ReadDirection, ReadResponse,
    ReadStreamRequest, Store, StoreConfig, StoreError, StreamAcl, StreamMetadata,
    StreamRevision,
};
use std::sync::Arc;
use tempfile::TempDir;

fn test_store(dir: &TempDir) -> Arc<Store> {
    Arc::new(
        Store::create(StoreConfig {
            path: dir.path().join("store"),
            ..Default::default()
        })
        .unwrap(),
    )
}

/// Small pages so multi-page reads are exercised.
fn engine(store: &Arc<Store>) -> Engine {
    Engine::for_store_with_options(
        store.clone(),
        EnumeratorOptions {
            read_batch_size: 3,
            ..Default::default()
        },
    )
}

fn append(store: &Store, stream: &str, count: usize) -> Vec<EventRecord> {
    let events = (0..count)
        .map(|i| NewEvent::raw(format!("{}-{}", stream, i), Vec::new()))
        .collect();
    store.append(stream, ExpectedRevision::Any, events).unwrap()
}

fn collect(responses: impl Iterator<Item = eventlane::Result<ReadResponse>>) -> Vec<ReadResponse> {
    let responses: Vec<ReadResponse> = responses.map(|r| r.unwrap()).collect();
    assert!(responses.last().map_or(false, |r| r.is_terminal()));
    responses
}

fn positions(responses: &[ReadResponse]) -> Vec<Position> {
    responses
        .iter()
        .filter_map(|r| r.as_event())
        .filter_map(|e| e.original_position())
        .collect()
}

fn revisions(responses: &[ReadResponse]) -> Vec<u64> {
    responses
        .iter()
        .filter_map(|r| r.as_event())
        .map(|e| e.original_revision().0)
        .collect()
}

fn admin_read_all() -> ReadAllRequest {
    ReadAllRequest {
        principal: Principal::admin(),
        ..Default::default()
    }
}

// --- $all ---

#[test]
fn test_read_all_forwards_across_pages() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let mut written = append(&store, "a", 4);
    written.extend(append(&store, "b", 4));

    let responses = collect(engine(&store).read_all(admin_read_all()));
    let expected: Vec<Position> = written.iter().filter_map(|r| r.position).collect();
    assert_eq!(positions(&responses), expected);
    assert!(matches!(responses.last(), Some(ReadResponse::Done)));
}

#[test]
fn test_read_all_forwards_includes_from() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let written = append(&store, "a", 5);

    let responses = collect(engine(&store).read_all(ReadAllRequest {
        from: written[2].position.unwrap(),
        max_count: 2,
        ..admin_read_all()
    }));
    assert_eq!(
        positions(&responses),
        vec![written[2].position.unwrap(), written[3].position.unwrap()]
    );
}

#[test]
fn test_read_all_backwards_from_end() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let written = append(&store, "a", 7);

    let responses = collect(engine(&store).read_all(ReadAllRequest {
        from: Position::END,
        direction: ReadDirection::Backwards,
        max_count: 5,
        ..admin_read_all()
    }));
    let expected: Vec<Position> = written[2..].iter().rev().filter_map(|r| r.position).collect();
    assert_eq!(positions(&responses), expected);
}

#[test]
fn test_read_all_backwards_filtered() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let wanted_early = append(&store, "wanted", 2);
    append(&store, "noise", 6);
    let wanted_late = append(&store, "wanted", 1);

    let responses = collect(engine(&store).read_all(ReadAllRequest {
        from: Position::END,
        direction: ReadDirection::Backwards,
        filter: EventFilter::stream_prefixes(["wanted"]).unwrap(),
        max_search_window: Some(2),
        ..admin_read_all()
    }));
    let expected = vec![
        wanted_late[0].position.unwrap(),
        wanted_early[1].position.unwrap(),
        wanted_early[0].position.unwrap(),
    ];
    assert_eq!(positions(&responses), expected);
    assert!(matches!(responses.last(), Some(ReadResponse::Done)));
}

#[test]
fn test_read_all_invalid_position() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    append(&store, "a", 3);
    let last = store.last_position().unwrap();

    let responses = collect(engine(&store).read_all(ReadAllRequest {
        from: last.minus_bytes(1),
        ..admin_read_all()
    }));
    assert_eq!(responses.len(), 1);
    assert!(matches!(
        responses[0],
        ReadResponse::Failed(FailureReason::InvalidPosition)
    ));
}

#[test]
fn test_read_all_requires_access() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    append(&store, "a", 1);

    let responses = collect(engine(&store).read_all(ReadAllRequest::default()));
    assert!(matches!(
        responses[..],
        [ReadResponse::Failed(FailureReason::AccessDenied)]
    ));
}

#[test]
fn test_read_all_stops_at_revocation() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    append(&store, "a", 3);

    let mut read = engine(&store).read_all(admin_read_all());
    assert!(matches!(read.next_response().unwrap(), Some(ReadResponse::Event(_))));

    store
        .set_stream_metadata("$all", &StreamMetadata::default().with_acl(StreamAcl::readers(&[])))
        .unwrap();

    let rest = collect(read);
    assert!(matches!(
        rest[..],
        [ReadResponse::Failed(FailureReason::AccessDenied)]
    ));
}

#[test]
fn test_requires_leader_on_follower() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        Store::create(StoreConfig {
            path: dir.path().join("store"),
            is_leader: false,
            ..Default::default()
        })
        .unwrap(),
    );
    append(&store, "a", 1);

    let mut read = engine(&store).read_all(ReadAllRequest {
        requires_leader: true,
        ..admin_read_all()
    });
    assert!(matches!(read.next_response(), Err(StoreError::NotLeader)));

    let responses = collect(engine(&store).read_all(admin_read_all()));
    assert_eq!(positions(&responses).len(), 1);
}

// --- Streams ---

#[test]
fn test_read_stream_forwards_and_backwards() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    append(&store, "orders", 7);
    append(&store, "other", 2);

    let forwards = collect(
        engine(&store)
            .read_stream(ReadStreamRequest {
                stream: "orders".into(),
                from: StreamRevision(2),
                ..Default::default()
            })
            .unwrap(),
    );
    assert_eq!(revisions(&forwards), vec![2, 3, 4, 5, 6]);

    let backwards = collect(
        engine(&store)
            .read_stream(ReadStreamRequest {
                stream: "orders".into(),
                from: StreamRevision::END,
                direction: ReadDirection::Backwards,
                max_count: 4,
                ..Default::default()
            })
            .unwrap(),
    );
    assert_eq!(revisions(&backwards), vec![6, 5, 4, 3]);
}

#[test]
fn test_read_stream_respects_truncation() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    append(&store, "orders", 6);
    store
        .set_stream_metadata("orders", &StreamMetadata::default().with_truncate_before(4))
        .unwrap();

    let responses = collect(
        engine(&store)
            .read_stream(ReadStreamRequest {
                stream: "orders".into(),
                ..Default::default()
            })
            .unwrap(),
    );
    assert_eq!(revisions(&responses), vec![4, 5]);
}

#[test]
fn test_read_stream_missing_and_deleted() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    append(&store, "gone", 2);
    store
        .delete_stream("gone", ExpectedRevision::Any, true)
        .unwrap();
    append(&store, "quiet", 2);
    store
        .delete_stream("quiet", ExpectedRevision::Any, false)
        .unwrap();

    let read = |stream: &str| {
        collect(
            engine(&store)
                .read_stream(ReadStreamRequest {
                    stream: stream.into(),
                    ..Default::default()
                })
                .unwrap(),
        )
    };

    assert!(matches!(
        read("missing")[..],
        [ReadResponse::Failed(FailureReason::StreamNotFound { .. })]
    ));
    assert!(matches!(
        read("quiet")[..],
        [ReadResponse::Failed(FailureReason::StreamNotFound { .. })]
    ));
    assert!(matches!(
        read("gone")[..],
        [ReadResponse::Failed(FailureReason::StreamDeleted { .. })]
    ));
}

#[test]
fn test_read_stream_access_denied() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    append(&store, "secret", 2);
    store
        .set_stream_metadata(
            "secret",
            &StreamMetadata::default().with_acl(StreamAcl::readers(&["$admins"])),
        )
        .unwrap();

    let denied = collect(
        engine(&store)
            .read_stream(ReadStreamRequest {
                stream: "secret".into(),
                ..Default::default()
            })
            .unwrap(),
    );
    assert!(matches!(
        denied[..],
        [ReadResponse::Failed(FailureReason::AccessDenied)]
    ));

    let allowed = collect(
        engine(&store)
            .read_stream(ReadStreamRequest {
                stream: "secret".into(),
                principal: Principal::admin(),
                ..Default::default()
            })
            .unwrap(),
    );
    assert_eq!(revisions(&allowed), vec![0, 1]);
}
