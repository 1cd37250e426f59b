//! Session scenario tests
//!
//! These exercise cache, bus, transaction, and session together against an
//! in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use parking_lot::Mutex;
use thingstore::core::bus::{ChangeBus, ChangeEvent, ChangeFilter, EventKind};
use thingstore::core::cache::EntityCache;
use thingstore::core::identity::{ClassKind, IdentityKey, ThingId};
use thingstore::core::operation::OperationKind;
use thingstore::core::permission::{AllowAll, PermissionService, PermissionTarget};
use thingstore::core::remote::{MemoryRemote, RemoteError};
use thingstore::core::session::{Session, SessionError, SessionState};
use thingstore::core::thing::{Thing, ThingData};
use thingstore::core::transaction::TransactionError;
use tokio_util::sync::CancellationToken;

/// Library with one category, plus a standalone model
struct Fixture {
    rdl: Thing,
    category: Thing,
    model: Thing,
}

fn fixture() -> Fixture {
    let mut rdl = Thing::with_id(
        ThingId::new(),
        ThingData::empty(ClassKind::SiteReferenceDataLibrary),
    );
    let mut category =
        Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::Category)).contained_by(&rdl);
    category.data.set_attribute("name", "Equipment").unwrap();
    rdl.data
        .insert_child(ClassKind::Category, category.id())
        .unwrap();
    let model = Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::EngineeringModel));
    Fixture {
        rdl,
        category,
        model,
    }
}

async fn open_session(remote: &Arc<MemoryRemote>) -> Session {
    let session = Session::new(remote.clone(), Arc::new(AllowAll));
    session.open().await.unwrap();
    session
}

fn seeded_remote(fixture: &Fixture) -> Arc<MemoryRemote> {
    let remote = Arc::new(MemoryRemote::new());
    remote
        .seed(vec![
            fixture.rdl.clone(),
            fixture.category.clone(),
            fixture.model.clone(),
        ])
        .unwrap();
    remote
}

fn versioned(id: ThingId, revision: u64) -> Arc<Thing> {
    Arc::new(
        Thing::with_id(id, ThingData::empty(ClassKind::EngineeringModel)).with_revision(revision),
    )
}

// ============================================================================
// Entity cache
// ============================================================================

#[test]
fn test_concurrent_get_or_create_constructs_once() {
    let cache = Arc::new(EntityCache::new());
    let key = IdentityKey::new(ThingId::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(32));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                cache
                    .get_or_create(key, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(5));
                        Ok::<_, ()>(Thing::with_id(
                            key.id,
                            ThingData::empty(ClassKind::Glossary),
                        ))
                    })
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<Arc<Thing>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|thing| Arc::ptr_eq(thing, &results[0])));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_stale_put_keeps_newer_revision() {
    let cache = EntityCache::new();
    let id = ThingId::new();
    let key = IdentityKey::new(id);

    let created = cache
        .get_or_create(key, || Ok::<_, ()>((*versioned(id, 1)).clone()))
        .unwrap();
    assert_eq!(created.id(), id);
    assert_eq!(cache.len(), 1);

    assert!(cache.put_or_update(key, versioned(id, 5)).applied());
    assert!(!cache.put_or_update(key, versioned(id, 3)).applied());
    assert!(!cache.put_or_update(key, versioned(id, 5)).applied());
    assert_eq!(cache.try_get(&key).unwrap().revision(), 5);
}

// ============================================================================
// Change bus
// ============================================================================

#[test]
fn test_key_subscriber_sees_only_its_key_in_order() {
    let bus = ChangeBus::new();
    let (k1, k2) = (ThingId::new(), ThingId::new());
    let mut listener = bus.listen(ChangeFilter::keys([IdentityKey::new(k1)]));

    bus.publish(ChangeEvent::created(versioned(k1, 1)));
    bus.publish(ChangeEvent::created(versioned(k2, 1)));
    bus.publish(ChangeEvent::updated(versioned(k1, 2)));
    bus.publish(ChangeEvent::updated(versioned(k2, 4)));
    bus.publish(ChangeEvent::updated(versioned(k1, 4)));
    // stale: already past revision 3
    bus.publish(ChangeEvent::updated(versioned(k1, 3)));

    let events = listener.drain();
    let revisions: Vec<u64> = events.iter().map(|e| e.revision()).collect();
    assert_eq!(revisions, vec![1, 2, 4]);
    assert!(events.iter().all(|e| e.key.id == k1));
}

#[tokio::test]
async fn test_handler_subscription_is_revocable() {
    let bus = ChangeBus::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let subscription = bus.subscribe(
        ChangeFilter::kinds([ClassKind::EngineeringModel]),
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );
    assert_eq!(bus.subscriber_count(), 1);

    bus.publish(ChangeEvent::created(versioned(ThingId::new(), 1)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    drop(subscription);
    assert_eq!(bus.subscriber_count(), 0);
    bus.publish(ChangeEvent::created(versioned(ThingId::new(), 1)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_keep_handler_serial_and_ordered() {
    let bus = Arc::new(ChangeBus::new());
    let id = ThingId::new();
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let revisions: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

    let (running, overlapped, sink) = (
        Arc::clone(&active),
        Arc::clone(&overlaps),
        Arc::clone(&revisions),
    );
    let _subscription = bus.subscribe(ChangeFilter::keys([IdentityKey::new(id)]), move |event| {
        if running.fetch_add(1, Ordering::SeqCst) != 0 {
            overlapped.fetch_add(1, Ordering::SeqCst);
        }
        sink.lock().push(event.revision());
        std::thread::yield_now();
        running.fetch_sub(1, Ordering::SeqCst);
    });

    let threads = 6u64;
    let per_thread = 100u64;
    let barrier = Arc::new(Barrier::new(threads as usize));
    let publishers: Vec<_> = (0..threads)
        .map(|t| {
            let bus = Arc::clone(&bus);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                for step in 0..per_thread {
                    bus.publish(ChangeEvent::updated(versioned(id, 1 + t + step * threads)));
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.join().unwrap();
    }

    let last = threads * per_thread;
    for _ in 0..200 {
        if revisions.lock().last() == Some(&last) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let revisions = revisions.lock().clone();
    assert_eq!(revisions.last(), Some(&last));
    assert!(revisions.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test]
async fn test_finalize_orders_referenced_create_first() {
    let fx = fixture();
    let remote = seeded_remote(&fx);
    let session = open_session(&remote).await;
    let rdl = session.retrieve(&fx.rdl.key()).unwrap();

    let mut tx = session.open_transaction(&rdl).unwrap();
    // stage the referencing parameter type first
    let parameter_type =
        Thing::new(ThingData::empty(ClassKind::ParameterType)).contained_by(&rdl);
    let pt_key = tx.create_or_update(parameter_type).unwrap();
    let category = Thing::new(ThingData::empty(ClassKind::Category)).contained_by(&rdl);
    let cat_key = tx.create_or_update(category).unwrap();

    let mut parameter_type = tx.get_clone(&pt_key).cloned().unwrap();
    parameter_type
        .data
        .set_reference("categories", cat_key.id)
        .unwrap();
    tx.create_or_update(parameter_type).unwrap();

    let set = tx.finalize().unwrap();
    let position = |key: IdentityKey| set.iter().position(|op| op.key == key).unwrap();
    assert!(position(cat_key) < position(pt_key));
    assert_eq!(set.count(OperationKind::Create), 2);
    assert_eq!(set.count(OperationKind::Update), 1);
}

#[tokio::test]
async fn test_finalize_reports_cycle_among_creates() {
    let fx = fixture();
    let remote = seeded_remote(&fx);
    let session = open_session(&remote).await;
    let rdl = session.retrieve(&fx.rdl.key()).unwrap();

    let mut tx = session.open_transaction(&rdl).unwrap();
    let a = tx
        .create_or_update(Thing::new(ThingData::empty(ClassKind::Category)).contained_by(&rdl))
        .unwrap();
    let b = tx
        .create_or_update(Thing::new(ThingData::empty(ClassKind::Category)).contained_by(&rdl))
        .unwrap();

    let mut thing_a = tx.get_clone(&a).cloned().unwrap();
    thing_a.data.set_reference("super_categories", b.id).unwrap();
    tx.create_or_update(thing_a).unwrap();
    let mut thing_b = tx.get_clone(&b).cloned().unwrap();
    thing_b.data.set_reference("super_categories", a.id).unwrap();
    tx.create_or_update(thing_b).unwrap();

    match tx.finalize() {
        Err(TransactionError::CyclicDependency { ids }) => {
            assert!(ids.contains(&a.id));
            assert!(ids.contains(&b.id));
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
}

#[tokio::test]
async fn test_discarded_transaction_leaves_cache_untouched() {
    let fx = fixture();
    let remote = seeded_remote(&fx);
    let session = open_session(&remote).await;
    let cached = session.retrieve(&fx.category.key()).unwrap();

    let mut tx = session.open_transaction(&cached).unwrap();
    let mut clone = tx.root().unwrap();
    clone.data.set_attribute("name", "Renamed").unwrap();
    tx.create_or_update(clone).unwrap();
    drop(tx);

    let after = session.retrieve(&fx.category.key()).unwrap();
    assert_eq!(after.label(), "Equipment");
    assert!(Arc::ptr_eq(&cached, &after));
}

// ============================================================================
// Session write path
// ============================================================================

#[tokio::test]
async fn test_create_then_delete_submits_nothing() {
    let fx = fixture();
    let remote = seeded_remote(&fx);
    let session = open_session(&remote).await;
    let mut listener = session.bus().listen(ChangeFilter::all());
    let rdl = session.retrieve(&fx.rdl.key()).unwrap();

    let mut tx = session.open_transaction(&rdl).unwrap();
    let key = tx
        .create_or_update(Thing::new(ThingData::empty(ClassKind::Category)).contained_by(&rdl))
        .unwrap();
    let created = tx.get_clone(&key).cloned().unwrap();
    tx.delete(&created).unwrap();
    assert!(tx.is_empty());

    let receipt = session.write(tx).await.unwrap();
    assert_eq!(receipt.revision, 1);
    assert!(receipt.outcomes.is_empty());
    assert_eq!(remote.commit_count(), 0);
    assert_eq!(remote.head(), 1);
    assert_eq!(session.retrieve(&fx.rdl.key()).unwrap().revision(), 1);
    assert!(listener.drain().is_empty());
}

#[tokio::test]
async fn test_removed_keys_are_forgotten_after_write() {
    let fx = fixture();
    let remote = seeded_remote(&fx);
    let session = open_session(&remote).await;
    let mut listener = session.bus().listen(ChangeFilter::all());

    let model = session.retrieve(&fx.model.key()).unwrap();
    let mut tx = session.open_transaction(&model).unwrap();
    tx.delete(&model).unwrap();
    session.write(tx).await.unwrap();

    let events = listener.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Removed);
    assert_eq!(session.revision(), 2);
    assert_eq!(session.bus().tracked_keys(), 0);
}

#[tokio::test]
async fn test_write_reconciles_whole_set_in_one_batch() {
    let fx = fixture();
    let remote = seeded_remote(&fx);
    let session = open_session(&remote).await;
    let rdl = session.retrieve(&fx.rdl.key()).unwrap();
    let category = session.retrieve(&fx.category.key()).unwrap();
    let doomed = session.retrieve(&fx.model.key()).unwrap();

    let mut tx = session.open_transaction(&rdl).unwrap();
    let mut renamed = tx.snapshot(&category);
    renamed.data.set_attribute("name", "Flight Equipment").unwrap();
    tx.create_or_update(renamed).unwrap();
    tx.snapshot(&doomed);
    tx.delete(&doomed).unwrap();
    let new_model = tx
        .create_or_update(Thing::new(ThingData::empty(ClassKind::EngineeringModel)))
        .unwrap();

    let keys = [new_model, category.key(), doomed.key()];
    let mut listener = session.bus().listen(ChangeFilter::keys(keys));

    // every event must find the whole write already in the cache
    let torn = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));
    let cache = Arc::clone(session.cache());
    let (torn_count, handled_count) = (Arc::clone(&torn), Arc::clone(&handled));
    let (category_key, doomed_key) = (category.key(), doomed.key());
    let _subscription = session
        .bus()
        .subscribe(ChangeFilter::keys(keys), move |_| {
            let complete = cache.contains_key(&new_model)
                && !cache.contains_key(&doomed_key)
                && cache
                    .try_get(&category_key)
                    .is_some_and(|c| c.label() == "Flight Equipment");
            if !complete {
                torn_count.fetch_add(1, Ordering::SeqCst);
            }
            handled_count.fetch_add(1, Ordering::SeqCst);
        });

    let receipt = session.write(tx).await.unwrap();
    assert_eq!(receipt.revision, 2);
    assert_eq!(session.state(), SessionState::Idle);

    let events = listener.drain();
    assert_eq!(events.len(), 3);
    let kind_of = |key: IdentityKey| events.iter().find(|e| e.key == key).map(|e| e.kind);
    assert_eq!(kind_of(new_model), Some(EventKind::Created));
    assert_eq!(kind_of(category.key()), Some(EventKind::Updated));
    assert_eq!(kind_of(doomed.key()), Some(EventKind::Removed));
    assert!(events.iter().all(|e| e.revision() == 2));

    assert!(session.retrieve(&new_model).is_some());
    assert!(session.retrieve(&doomed.key()).is_none());
    assert_eq!(session.retrieve(&category.key()).unwrap().revision(), 2);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handled.load(Ordering::SeqCst), 3);
    assert_eq!(torn.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_conflict_leaves_cache_byte_identical() {
    let fx = fixture();
    let remote = seeded_remote(&fx);
    let ours = open_session(&remote).await;
    let theirs = open_session(&remote).await;

    // another writer renames the category first
    let category = theirs.retrieve(&fx.category.key()).unwrap();
    let mut tx = theirs.open_transaction(&category).unwrap();
    let mut edit = tx.root().unwrap();
    edit.data.set_attribute("name", "Theirs").unwrap();
    tx.create_or_update(edit).unwrap();
    theirs.write(tx).await.unwrap();

    let before = ours.cache().fingerprint().unwrap();
    let mut listener = ours.bus().listen(ChangeFilter::all());

    let category = ours.retrieve(&fx.category.key()).unwrap();
    let mut tx = ours.open_transaction(&category).unwrap();
    let mut edit = tx.root().unwrap();
    edit.data.set_attribute("name", "Ours").unwrap();
    tx.create_or_update(edit).unwrap();

    let err = ours.write(tx).await.unwrap_err();
    assert!(matches!(err, SessionError::Conflict { id, .. } if id == fx.category.id()));
    assert_eq!(ours.state(), SessionState::Idle);
    assert_eq!(ours.cache().fingerprint().unwrap(), before);
    assert!(listener.drain().is_empty());

    // a fresh transaction after refresh goes through
    assert_eq!(ours.refresh().await.unwrap(), 1);
    let category = ours.retrieve(&fx.category.key()).unwrap();
    assert_eq!(category.label(), "Theirs");
    let mut tx = ours.open_transaction(&category).unwrap();
    let mut edit = tx.root().unwrap();
    edit.data.set_attribute("name", "Ours").unwrap();
    tx.create_or_update(edit).unwrap();
    ours.write(tx).await.unwrap();
    assert_eq!(ours.retrieve(&fx.category.key()).unwrap().label(), "Ours");
}

#[tokio::test]
async fn test_transport_failure_publishes_nothing() {
    let fx = fixture();
    let remote = seeded_remote(&fx);
    let session = open_session(&remote).await;
    let before = session.cache().fingerprint().unwrap();
    let mut listener = session.bus().listen(ChangeFilter::all());

    let model = session.retrieve(&fx.model.key()).unwrap();
    let mut tx = session.open_transaction(&model).unwrap();
    let mut edit = tx.root().unwrap();
    edit.data.set_attribute("name", "Satellite").unwrap();
    tx.create_or_update(edit).unwrap();

    remote.fail_next(RemoteError::Transport("connection reset".to_string()));
    let err = session.write(tx).await.unwrap_err();
    assert!(matches!(err, SessionError::Transport(_)));
    assert_eq!(session.cache().fingerprint().unwrap(), before);
    assert!(listener.drain().is_empty());
    assert_eq!(remote.head(), 1);
}

/// Denies every write of one kind
struct Deny(ClassKind);

impl PermissionService for Deny {
    fn can_write(&self, class_kind: ClassKind, _target: PermissionTarget<'_>) -> bool {
        class_kind != self.0
    }
}

#[tokio::test]
async fn test_forbidden_write_never_reaches_store() {
    let fx = fixture();
    let remote = seeded_remote(&fx);
    let session = Session::new(remote.clone(), Arc::new(Deny(ClassKind::Category)));
    session.open().await.unwrap();

    let rdl = session.retrieve(&fx.rdl.key()).unwrap();
    let mut tx = session.open_transaction(&rdl).unwrap();
    tx.create_or_update(Thing::new(ThingData::empty(ClassKind::Category)).contained_by(&rdl))
        .unwrap();

    let err = session.write(tx).await.unwrap_err();
    assert!(matches!(err, SessionError::Forbidden { .. }));
    assert_eq!(remote.commit_count(), 0);
    assert_eq!(session.state(), SessionState::Idle);

    // opening a transaction on a denied kind fails up front
    let category = session.retrieve(&fx.category.key()).unwrap();
    assert!(matches!(
        session.open_transaction(&category),
        Err(SessionError::Forbidden { .. })
    ));
}

#[tokio::test]
async fn test_cancelled_write_applies_nothing() {
    let fx = fixture();
    let remote = Arc::new(MemoryRemote::new().with_latency(Duration::from_millis(200)));
    remote
        .seed(vec![fx.rdl.clone(), fx.category.clone(), fx.model.clone()])
        .unwrap();
    let session = open_session(&remote).await;
    let before = session.cache().fingerprint().unwrap();

    let model = session.retrieve(&fx.model.key()).unwrap();
    let mut tx = session.open_transaction(&model).unwrap();
    let mut edit = tx.root().unwrap();
    edit.data.set_attribute("name", "Satellite").unwrap();
    tx.create_or_update(edit).unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = session.write_cancellable(tx, token).await.unwrap_err();
    assert!(matches!(err, SessionError::Cancelled));
    assert_eq!(session.cache().fingerprint().unwrap(), before);
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(remote.head(), 1);
}

#[tokio::test]
async fn test_reads_during_write_see_pre_write_state() {
    let fx = fixture();
    let remote = Arc::new(MemoryRemote::new().with_latency(Duration::from_millis(50)));
    remote
        .seed(vec![fx.rdl.clone(), fx.category.clone(), fx.model.clone()])
        .unwrap();
    let session = Arc::new(open_session(&remote).await);

    let model = session.retrieve(&fx.model.key()).unwrap();
    let mut tx = session.open_transaction(&model).unwrap();
    let mut edit = tx.root().unwrap();
    edit.data.set_attribute("name", "Satellite").unwrap();
    tx.create_or_update(edit).unwrap();

    let writer = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.write(tx).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.state(), SessionState::Submitting);
    assert_eq!(session.retrieve(&fx.model.key()).unwrap().revision(), 1);

    writer.await.unwrap().unwrap();
    assert_eq!(session.retrieve(&fx.model.key()).unwrap().label(), "Satellite");
}

// ============================================================================
// Iteration scoping
// ============================================================================

#[tokio::test]
async fn test_same_definition_id_in_two_iterations() {
    let mut model = Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::EngineeringModel));
    let mut first = Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::Iteration))
        .contained_by(&model);
    let mut second = Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::Iteration))
        .contained_by(&model);
    model
        .data
        .insert_child(ClassKind::Iteration, first.id())
        .unwrap();
    model
        .data
        .insert_child(ClassKind::Iteration, second.id())
        .unwrap();

    let shared = ThingId::new();
    let mut in_first = Thing::with_id(shared, ThingData::empty(ClassKind::ElementDefinition))
        .contained_by(&first);
    in_first.data.set_attribute("name", "Bus A").unwrap();
    let mut in_second = Thing::with_id(shared, ThingData::empty(ClassKind::ElementDefinition))
        .contained_by(&second);
    in_second.data.set_attribute("name", "Bus B").unwrap();
    first
        .data
        .insert_child(ClassKind::ElementDefinition, shared)
        .unwrap();
    second
        .data
        .insert_child(ClassKind::ElementDefinition, shared)
        .unwrap();
    let (key_a, key_b) = (in_first.key(), in_second.key());
    assert_ne!(key_a, key_b);

    let remote = Arc::new(MemoryRemote::new());
    remote
        .seed(vec![model, first, second, in_first, in_second])
        .unwrap();
    let session = open_session(&remote).await;
    assert_eq!(session.retrieve(&key_a).unwrap().label(), "Bus A");
    assert_eq!(session.retrieve(&key_b).unwrap().label(), "Bus B");

    // editing one iteration's copy leaves the other alone
    let cached = session.retrieve(&key_a).unwrap();
    let mut tx = session.open_transaction(&cached).unwrap();
    let mut edit = tx.root().unwrap();
    edit.data.set_attribute("name", "Power Bus").unwrap();
    tx.create_or_update(edit).unwrap();
    session.write(tx).await.unwrap();

    assert_eq!(session.retrieve(&key_a).unwrap().label(), "Power Bus");
    let other = session.retrieve(&key_b).unwrap();
    assert_eq!(other.label(), "Bus B");
    assert_eq!(other.revision(), 1);
    assert_eq!(remote.get(&key_b).unwrap().label(), "Bus B");

    // each copy loads by its own key
    let fresh = Session::new(remote.clone(), Arc::new(AllowAll));
    let loaded = fresh.get_or_load(key_b).await.unwrap().unwrap();
    assert_eq!(loaded.label(), "Bus B");
    assert_eq!(loaded.key(), key_b);
    assert!(fresh
        .get_or_load(IdentityKey::new(shared))
        .await
        .unwrap()
        .is_none());
}

// ============================================================================
// Background sync
// ============================================================================

#[tokio::test]
async fn test_refresh_pulls_foreign_commits() {
    let fx = fixture();
    let remote = seeded_remote(&fx);
    let ours = Arc::new(open_session(&remote).await);
    let theirs = open_session(&remote).await;

    let received: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let _subscription = ours
        .bus()
        .subscribe(ChangeFilter::kinds([ClassKind::EngineeringModel]), move |e| {
            sink.lock().push(e)
        });

    let model = theirs.retrieve(&fx.model.key()).unwrap();
    let mut tx = theirs.open_transaction(&model).unwrap();
    let mut edit = tx.root().unwrap();
    edit.data.set_attribute("name", "Rover").unwrap();
    tx.create_or_update(edit).unwrap();
    theirs.write(tx).await.unwrap();

    let sync = ours.spawn_sync(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(ours.revision(), 2);
    assert_eq!(ours.retrieve(&fx.model.key()).unwrap().label(), "Rover");
    {
        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, EventKind::Updated);
    }

    ours.close().await;
    assert!(ours.cache().is_empty());
    assert_eq!(ours.bus().subscriber_count(), 0);
    tokio::time::timeout(Duration::from_secs(1), sync)
        .await
        .unwrap()
        .unwrap();
}
