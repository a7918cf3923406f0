//! The six concrete scenarios a complete implementation of this engine
//! must get right: TTL stale-while-revalidate, optimistic patch
//! rollback, path overlap, request dedup, queued FIFO, and push upsert.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use statesync::adapters::push::PushMode;
use statesync::adapters::queued::QueueHandle;
use statesync::{AdapterSet, Bus, Cache, CollectionStore, Error, Path, Record, SingleStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Todo {
    id: String,
    title: String,
    done: bool,
}

impl Record for Todo {
    fn id(&self) -> String {
        self.id.clone()
    }
}

fn todo(id: &str, title: &str) -> Todo {
    Todo {
        id: id.to_string(),
        title: title.to_string(),
        done: false,
    }
}

/// TTL stale-while-revalidate: a hit inside the fresh window never
/// triggers a refetch; a hit past the half-TTL mark serves the stale
/// value immediately but kicks off a background refresh that replaces
/// it once it lands.
#[tokio::test]
async fn ttl_stale_while_revalidate() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    let adapters = AdapterSet {
        get_one: Some(Arc::new(move |_params| {
            let calls = calls2.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok(todo("1", &format!("v{n}")))
            })
        })),
        ..AdapterSet::default()
    };

    let cache = Arc::new(Cache::new(10));
    let store = SingleStore::new(adapters)
        .with_cache(cache, "todo/1", Duration::from_millis(40))
        .into_shared();

    let first = store.get(false).await.unwrap();
    assert_eq!(first.title, "v0");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Still well inside the fresh window: served from cache, no refetch.
    let second = store.get(false).await.unwrap();
    assert_eq!(second.title, "v0");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Past the half-TTL mark: stale hit returns immediately, background
    // revalidation is kicked off.
    tokio::time::sleep(Duration::from_millis(25)).await;
    let stale = store.get(false).await.unwrap();
    assert_eq!(stale.title, "v0");

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.value().unwrap().title, "v1");
}

/// Optimistic patch rollback: a failing adapter call restores the
/// pre-mutation value and notifies again with the rollback.
#[tokio::test]
async fn optimistic_patch_rollback() {
    let adapters = AdapterSet {
        get_one: Some(Arc::new(|_params| {
            Box::pin(async { Ok(todo("1", "original")) })
        })),
        patch: Some(Arc::new(|_id, _patch| {
            Box::pin(async { Err(Error::Quota("disk full".into())) })
        })),
        ..AdapterSet::default()
    };
    let store = SingleStore::new(adapters);
    store.get(false).await.unwrap();

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    let _sub = store.subscribe(move |_| {
        seen2.lock().unwrap().push(());
    });

    let result = store.patch(serde_json::json!({"title": "optimistic"})).await;
    assert!(result.is_err());
    assert_eq!(store.value().unwrap().title, "original");
    // Notified once for the optimistic apply, once for the rollback.
    assert_eq!(seen.lock().unwrap().len(), 2);
}

/// Path overlap: a subscriber at a parent path is notified by a change
/// to a descendant, but not by a change to an unrelated sibling.
#[test]
fn path_overlap_notifies_ancestors_not_siblings() {
    let bus = Bus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = hits.clone();
    let _sub = bus.subscribe(
        Path::of("users"),
        Arc::new(move |_: &Path| {
            hits2.fetch_add(1, Ordering::SeqCst);
        }),
    );

    bus.notify(&[Path::of("users").child("u1").child("name")]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    bus.notify(&[Path::of("todos").child("t1")]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// Request dedup: concurrent `get` calls against an empty store collapse
/// onto a single in-flight adapter call.
#[tokio::test]
async fn concurrent_get_calls_dedupe_onto_one_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    let adapters = AdapterSet {
        get_one: Some(Arc::new(move |_params| {
            let calls = calls2.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(todo("1", "a"))
            })
        })),
        ..AdapterSet::default()
    };
    let store = Arc::new(SingleStore::new(adapters));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.get(false).await }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Queued FIFO: every operation submitted to a shared `QueueHandle`
/// from a single task runs in submission order.
#[tokio::test]
async fn queued_adapter_preserves_fifo_order() {
    let queue = QueueHandle::new();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    for i in 0..8 {
        let order = order.clone();
        queue
            .run(move || {
                Box::pin(async move {
                    order.lock().unwrap().push(i);
                })
            })
            .await;
    }

    assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
    assert!(queue.is_empty());
}

/// Push upsert: a push event for an unknown id inserts it; for a known
/// id it replaces that record in place without reordering the list.
#[test]
fn push_upsert_inserts_or_replaces_in_place() {
    let store: CollectionStore<Todo> = CollectionStore::new(AdapterSet::default());
    store.apply_push(&PushMode::Upsert, todo("1", "a"));
    store.apply_push(&PushMode::Upsert, todo("2", "b"));
    store.apply_push(&PushMode::Upsert, todo("1", "a-updated"));

    let ids: Vec<String> = store.snapshot().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    assert_eq!(store.peek("1").unwrap().title, "a-updated");
}
