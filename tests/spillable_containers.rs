use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use spillway::codec::{Codec, I64Codec, ValueCodec};
use spillway::collection::{
    DynMap, DynQueue, DynSet, MapLike, MemoryMap, MemorySet, QueueLike, SetLike,
};
use spillway::error::{Result, SpillError};
use spillway::spill::{SpillableMap, SpillableQueue, SpillableSet};
use spillway::store::{DiskMap, DiskQueue, DiskSet, SpillStore, StoreOptions};
use spillway::value::Value;

fn open_store() -> Arc<SpillStore> {
    Arc::new(SpillStore::open(&StoreOptions::default()).expect("open spill store"))
}

fn disk_set(store: &Arc<SpillStore>, calls: &Arc<AtomicUsize>) -> SpillableSet<Value> {
    let store = Arc::clone(store);
    let calls = Arc::clone(calls);
    SpillableSet::new(
        "set",
        2,
        Box::new(move |name: &str| -> Result<DynSet<Value>> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(DiskSet::create(
                Arc::clone(&store),
                name,
                Arc::new(ValueCodec) as Arc<dyn Codec<Value>>,
            )?))
        }),
    )
}

#[test]
fn set_spills_past_its_threshold() {
    let store = open_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut set = disk_set(&store, &calls);

    set.insert(Value::literal("a")).expect("insert a");
    set.insert(Value::literal("b")).expect("insert b");
    assert!(!set.is_spilled());
    assert_eq!(set.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    set.insert(Value::literal("c")).expect("insert c");
    assert!(set.is_spilled());
    assert_eq!(set.len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for label in ["a", "b", "c"] {
        assert!(set.contains(&Value::literal(label)).expect("contains"));
    }
    assert!(!set.contains(&Value::literal("d")).expect("contains"));

    // duplicates do not count once spilled either
    assert!(!set.insert(Value::literal("a")).expect("insert duplicate"));
    assert_eq!(set.len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn contains_is_stable_across_migration() {
    let store = open_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut set = disk_set(&store, &calls);
    let members: Vec<Value> = (0..10).map(Value::integer).collect();
    let mut seen = Vec::new();
    for member in members {
        set.insert(member.clone()).expect("insert");
        seen.push(member);
        for earlier in &seen {
            assert!(set.contains(earlier).expect("contains"));
        }
        assert!(!set.contains(&Value::integer(99)).expect("contains"));
    }
    assert!(set.contains_all(&seen).expect("contains_all"));
}

#[test]
fn insert_all_past_threshold_spills_an_empty_set() {
    let store = open_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut set = disk_set(&store, &calls);
    let batch: Vec<Value> = (0..3).map(Value::integer).collect();
    assert!(set.insert_all(batch).expect("insert_all"));
    assert!(set.is_spilled());
    assert_eq!(set.len(), 3);
}

#[test]
fn remove_retain_and_clear_after_spilling() {
    let store = open_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut set = disk_set(&store, &calls);
    set.insert_all((0..6).map(Value::integer).collect())
        .expect("insert_all");
    assert!(set.remove(&Value::integer(0)).expect("remove"));
    assert!(!set.remove(&Value::integer(0)).expect("remove again"));
    assert_eq!(set.len(), 5);

    let keep = vec![Value::integer(1), Value::integer(2), Value::integer(42)];
    assert!(set.retain_all(&keep).expect("retain_all"));
    let mut left = set.to_vec().expect("to_vec");
    left.sort();
    assert_eq!(left, vec![Value::integer(1), Value::integer(2)]);

    set.clear().expect("clear");
    assert!(set.is_empty());
    assert!(set.is_spilled());
}

#[test]
fn failed_migration_keeps_memory_state() {
    let mut set: SpillableSet<i64> = SpillableSet::new(
        "doomed",
        2,
        Box::new(|_: &str| -> Result<DynSet<i64>> {
            Err(SpillError::StoreInit("no space left on device".into()))
        }),
    );
    set.insert(1).expect("insert 1");
    set.insert(2).expect("insert 2");
    assert!(matches!(set.insert(3), Err(SpillError::StoreInit(_))));
    assert!(!set.is_spilled());
    assert_eq!(set.len(), 2);
    assert!(!set.contains(&3).expect("contains"));
    // an existing member does not grow the set, so nothing migrates
    assert!(!set.insert(2).expect("insert 2 again"));
    assert!(matches!(set.insert(3), Err(SpillError::StoreInit(_))));
    assert_eq!(set.to_vec().expect("to_vec").len(), 2);
}

#[test]
fn failed_queue_migration_drops_the_offered_element() {
    let mut queue: SpillableQueue<i64> = SpillableQueue::new(
        "doomed",
        2,
        Box::new(|_: &str| -> Result<DynQueue<i64>> {
            Err(SpillError::StoreInit("no space left on device".into()))
        }),
    );
    queue.offer(1).expect("offer 1");
    queue.offer(2).expect("offer 2");
    assert!(matches!(queue.offer(3), Err(SpillError::StoreInit(_))));
    assert!(!queue.is_spilled());
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.poll().expect("poll"), Some(1));
    queue.offer(3).expect("offer 3 after room was made");
    let rest: Vec<i64> = queue.iter().collect::<Result<_>>().expect("iter");
    assert_eq!(rest, vec![2, 3]);
}

#[test]
fn failed_map_migration_leaves_the_map_unchanged() {
    let mut map: SpillableMap<String, i64> = SpillableMap::new(
        "doomed",
        2,
        Box::new(|_: &str| -> Result<DynMap<String, i64>> {
            Err(SpillError::StoreInit("no space left on device".into()))
        }),
    );
    map.insert("a".to_string(), 1).expect("insert a");
    map.insert("b".to_string(), 2).expect("insert b");
    assert!(matches!(
        map.insert("c".to_string(), 3),
        Err(SpillError::StoreInit(_))
    ));
    assert!(!map.is_spilled());
    assert_eq!(map.len(), 2);
    assert!(!map.contains_key(&"c".to_string()).expect("contains_key"));
    // replacing a value never grows the map
    assert_eq!(map.insert("a".to_string(), 10).expect("replace a"), Some(1));
    assert_eq!(map.get(&"a".to_string()).expect("get"), Some(10));
}

#[test]
fn threshold_zero_never_spills() {
    let mut set: SpillableSet<i64> = SpillableSet::new(
        "unbounded",
        0,
        Box::new(|_: &str| -> Result<DynSet<i64>> {
            Err(SpillError::StoreInit("must not be called".into()))
        }),
    );
    set.insert_all((0..1000).collect()).expect("insert_all");
    assert!(!set.is_spilled());
    assert_eq!(set.len(), 1000);
}

#[test]
fn set_can_spill_into_another_memory_set() {
    let mut set: SpillableSet<String> = SpillableSet::new(
        "memory",
        1,
        Box::new(|_: &str| -> Result<DynSet<String>> {
            Ok(Box::new(MemorySet::<String>::default()))
        }),
    );
    set.insert("x".to_string()).expect("insert");
    set.insert("y".to_string()).expect("insert");
    assert!(set.is_spilled());
    assert_eq!(set.len(), 2);
}

fn disk_queue(store: &Arc<SpillStore>, threshold: i64) -> SpillableQueue<Value> {
    let store = Arc::clone(store);
    SpillableQueue::new(
        "queue",
        threshold,
        Box::new(move |name: &str| -> Result<DynQueue<Value>> {
            let positions: DynMap<i64, Value> = Box::new(DiskMap::create(
                Arc::clone(&store),
                name,
                Arc::new(I64Codec) as Arc<dyn Codec<i64>>,
                Arc::new(ValueCodec) as Arc<dyn Codec<Value>>,
            )?);
            Ok(Box::new(DiskQueue::new(positions)))
        }),
    )
}

#[test]
fn queue_keeps_fifo_order_through_migration() {
    let store = open_store();
    let mut queue = disk_queue(&store, 128);
    let mut polled = Vec::new();

    for i in 1..=50 {
        queue.offer(Value::integer(i)).expect("offer");
    }
    for _ in 0..10 {
        polled.push(queue.poll().expect("poll").expect("element"));
    }
    assert!(!queue.is_spilled());

    for i in 51..=200 {
        queue.offer(Value::integer(i)).expect("offer");
        if i % 25 == 0 {
            polled.push(queue.poll().expect("poll").expect("element"));
        }
    }
    assert!(queue.is_spilled());
    assert_eq!(queue.peek().expect("peek"), Some(Value::integer(17)));

    while let Some(next) = queue.poll().expect("poll") {
        polled.push(next);
    }
    let expected: Vec<Value> = (1..=200).map(Value::integer).collect();
    assert_eq!(polled, expected);
    assert!(queue.is_empty());
    assert_eq!(queue.peek().expect("peek"), None);
}

#[test]
fn queue_iterates_in_order_once_spilled() {
    let store = open_store();
    let mut queue = disk_queue(&store, 4);
    queue
        .offer_all((1..=10).map(Value::integer).collect())
        .expect("offer_all");
    assert!(queue.is_spilled());
    queue.poll().expect("poll");
    let rest: Vec<Value> = queue.iter().collect::<Result<_>>().expect("iter");
    assert_eq!(rest, (2..=10).map(Value::integer).collect::<Vec<_>>());
    assert_eq!(queue.len(), 9);
}

#[test]
fn map_spills_past_its_threshold() {
    let store = open_store();
    let spill_store = Arc::clone(&store);
    let mut map: SpillableMap<Value, i64> = SpillableMap::new(
        "map",
        3,
        Box::new(move |name: &str| -> Result<DynMap<Value, i64>> {
            Ok(Box::new(DiskMap::create(
                Arc::clone(&spill_store),
                name,
                Arc::new(ValueCodec) as Arc<dyn Codec<Value>>,
                Arc::new(I64Codec) as Arc<dyn Codec<i64>>,
            )?))
        }),
    );
    for i in 0..3 {
        map.insert(Value::integer(i), i * 10).expect("insert");
    }
    assert!(!map.is_spilled());
    map.insert(Value::integer(3), 30).expect("insert");
    assert!(map.is_spilled());
    assert_eq!(map.len(), 4);
    assert_eq!(map.get(&Value::integer(2)).expect("get"), Some(20));
    assert_eq!(
        map.insert(Value::integer(2), 21).expect("replace"),
        Some(20)
    );
    assert_eq!(map.len(), 4);
    assert_eq!(map.remove(&Value::integer(0)).expect("remove"), Some(0));
    assert!(!map.contains_key(&Value::integer(0)).expect("contains_key"));

    let mut entries: Vec<(Value, i64)> = map.iter().collect::<Result<_>>().expect("iter");
    entries.sort();
    assert_eq!(
        entries,
        vec![
            (Value::integer(1), 10),
            (Value::integer(2), 21),
            (Value::integer(3), 30)
        ]
    );
}

#[test]
fn map_insert_all_in_memory() {
    let mut map: SpillableMap<i64, i64> = SpillableMap::new(
        "small",
        100,
        Box::new(|_: &str| -> Result<DynMap<i64, i64>> {
            Ok(Box::new(MemoryMap::<i64, i64>::default()))
        }),
    );
    map.insert_all(vec![(1, 1), (2, 4), (3, 9)]).expect("insert_all");
    assert!(!map.is_spilled());
    assert_eq!(map.get(&3).expect("get"), Some(9));
}
