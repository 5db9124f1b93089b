// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};
use nx_core::{CallbackTarget, HandlerKind, NewOperation, OperationState, Payload, SetOrdering};
use std::thread;

fn record(id: &str, request_id: &str) -> OperationRecord {
    OperationRecord::new(
        NewOperation {
            key: OperationKey::new("billing", "charge", id),
            request_id: request_id.into(),
            input: Payload::new(b"{}".to_vec()),
            callback: None,
            kind: HandlerKind::Sync,
            task_queue: "payments".into(),
        },
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
    )
}

fn create(record: OperationRecord) -> Mutation {
    Mutation::OperationCreate {
        terminal_expires_at: record.created_at,
        record,
    }
}

#[test]
fn concurrent_creates_with_same_request_agree_on_one_operation() {
    let store = Arc::new(Store::in_memory());
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                match store.commit(create(record(&format!("order-{}", i), "r1"))) {
                    Ok(Applied::Operation(r)) => r.key.id,
                    Err(StoreError::Apply(ApplyError::DuplicateRequest { operation_id, .. })) => {
                        operation_id
                    }
                    other => panic!("unexpected {:?}", other),
                }
            })
        })
        .collect();

    let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.iter().all(|id| id == &ids[0]));
    assert_eq!(store.operation_count(), 1);
}

#[test]
fn rejected_mutations_are_not_logged() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Store::open(dir.path()).unwrap();
        store.commit(create(record("order-42", "r1"))).unwrap();
        assert!(store.commit(create(record("order-42", "r2"))).is_err());
    }
    let entries = Wal::replay(&dir.path().join(WAL_FILE)).unwrap();
    assert_eq!(entries.len(), 1);
}

#[test]
fn reopened_store_replays_state() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Store::open(dir.path()).unwrap();
        let created = match store.commit(create(record("order-42", "r1"))).unwrap() {
            Applied::Operation(r) => r,
            other => panic!("unexpected {:?}", other),
        };
        let mut done = created.clone();
        done.state = OperationState::Succeeded;
        done.result = Some(Payload::new(b"42".to_vec()));
        store
            .commit(Mutation::OperationUpdate {
                record: done,
                expected_version: created.version,
                dedup_expires_at: None,
                callback: None,
            })
            .unwrap();

        let (graph, _) = VersionGraph::new("payments", 8)
            .set_ordering(&SetOrdering::new("v1"))
            .unwrap();
        store
            .commit(Mutation::OrderingPut {
                graph,
                expected_revision: 0,
            })
            .unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    let r = store
        .operation(&OperationKey::new("billing", "charge", "order-42"))
        .unwrap();
    assert_eq!(r.state, OperationState::Succeeded);
    assert_eq!(r.version, 2);
    assert_eq!(
        store.dedup_entry(&DedupKey::new("billing", "charge", "r1")),
        Some("order-42".to_string())
    );
    assert_eq!(store.ordering("payments").map(|g| g.revision()), Some(1));
}

#[test]
fn conflict_is_reported_as_such() {
    let store = Store::in_memory();
    let created = match store.commit(create(record("order-42", "r1"))).unwrap() {
        Applied::Operation(r) => r,
        other => panic!("unexpected {:?}", other),
    };
    let err = store
        .commit(Mutation::OperationUpdate {
            record: created,
            expected_version: 7,
            dedup_expires_at: None,
            callback: None,
        })
        .unwrap_err();
    assert!(err.is_conflict());
}

#[test]
fn operations_where_filters_and_orders() {
    let store = Store::in_memory();
    store.commit(create(record("b", "r2"))).unwrap();
    store.commit(create(record("a", "r1"))).unwrap();
    let pending = store.operations_where(|r| r.state == OperationState::Pending);
    let ids: Vec<_> = pending.iter().map(|r| r.key.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn unsettled_callbacks_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let key = OperationKey::new("billing", "charge", "order-42");
    let token = {
        let store = Store::open(dir.path()).unwrap();
        let created = match store.commit(create(record("order-42", "r1"))).unwrap() {
            Applied::Operation(r) => r,
            other => panic!("unexpected {:?}", other),
        };
        let mut done = created.clone();
        done.state = OperationState::Succeeded;
        let message = CallbackMessage::for_record(
            &done,
            &CallbackTarget::new("https://caller.test/cb"),
            done.updated_at,
        );
        let token = message.token.clone();
        store
            .commit(Mutation::OperationUpdate {
                record: done,
                expected_version: created.version,
                dedup_expires_at: None,
                callback: Some(message),
            })
            .unwrap();
        token
    };

    let store = Store::open(dir.path()).unwrap();
    let pending = store.pending_callbacks();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key, key);

    let stale = store
        .commit(Mutation::CallbackSettled {
            key: key.clone(),
            token: "other".into(),
        })
        .unwrap();
    assert_eq!(stale, Applied::CallbackSettled { removed: false });
    let settled = store
        .commit(Mutation::CallbackSettled {
            key: key.clone(),
            token,
        })
        .unwrap();
    assert_eq!(settled, Applied::CallbackSettled { removed: true });
    drop(store);

    assert!(Store::open(dir.path()).unwrap().pending_callbacks().is_empty());
}
