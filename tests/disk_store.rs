use std::sync::Arc;

use spillway::binding::{BindingSet, BindingSetCodec};
use spillway::codec::{Codec, I64Codec, SerdeCodec, ValueCodec};
use spillway::collection::{DynMap, MapLike, QueueLike, SetLike};
use spillway::error::{Result, SpillError};
use spillway::store::{DiskMap, DiskQueue, DiskSet, SpillStore, StoreOptions};
use spillway::value::Value;

fn open_store() -> Arc<SpillStore> {
    Arc::new(SpillStore::open(&StoreOptions::default()).expect("open spill store"))
}

#[test]
fn store_lives_in_the_requested_directory() {
    let directory = tempfile::tempdir().expect("tempdir");
    let options = StoreOptions {
        directory: Some(directory.path().to_path_buf()),
        memory_mapped: false,
    };
    let store = SpillStore::open(&options).expect("open");
    let path = store.path().to_path_buf();
    assert!(path.starts_with(directory.path()));
    assert!(path.exists());
    store.close().expect("close");
    assert!(!path.exists());
    store.close().expect("close twice");
    assert!(store.is_closed());
}

#[test]
fn missing_directory_is_a_store_init_error() {
    let options = StoreOptions {
        directory: Some("/definitely/not/here/spill".into()),
        memory_mapped: false,
    };
    assert!(matches!(
        SpillStore::open(&options),
        Err(SpillError::StoreInit(_))
    ));
}

#[test]
fn disk_set_pages_through_many_members() {
    let store = open_store();
    let mut set = DiskSet::create(
        Arc::clone(&store),
        "many",
        Arc::new(SerdeCodec::<String>::new()) as Arc<dyn Codec<String>>,
    )
    .expect("create");
    for i in 0..1000 {
        assert!(set.insert(format!("member-{i}")).expect("insert"));
    }
    assert!(!set.insert("member-7".to_string()).expect("insert duplicate"));
    assert_eq!(set.len(), 1000);
    let members: Vec<String> = set.iter().collect::<Result<_>>().expect("iter");
    assert_eq!(members.len(), 1000);
    assert_eq!(members[0], "member-0");
    assert_eq!(members[999], "member-999");
    store.commit().expect("commit");
    assert_eq!(store.commits(), 1);
}

#[test]
fn named_sets_do_not_share_members() {
    let store = open_store();
    let codec: Arc<dyn Codec<Value>> = Arc::new(ValueCodec);
    let mut left = DiskSet::create(Arc::clone(&store), "left", Arc::clone(&codec)).expect("left");
    let mut right = DiskSet::create(Arc::clone(&store), "right", codec).expect("right");
    left.insert(Value::iri("http://example.org/a")).expect("insert");
    right.insert(Value::iri("http://example.org/b")).expect("insert");
    assert!(!left.contains(&Value::iri("http://example.org/b")).expect("contains"));
    assert!(!right.contains(&Value::iri("http://example.org/a")).expect("contains"));
    assert_eq!(left.len(), 1);
    assert_eq!(right.len(), 1);
}

#[test]
fn disk_set_of_binding_sets() {
    let store = open_store();
    let mut set = DiskSet::create(
        Arc::clone(&store),
        "rows",
        Arc::new(BindingSetCodec::new()) as Arc<dyn Codec<BindingSet>>,
    )
    .expect("create");
    let rows = vec![
        BindingSet::new().with("x", Value::integer(1)),
        BindingSet::new().with("y", Value::integer(1)),
        BindingSet::new()
            .with("x", Value::integer(1))
            .with("y", Value::integer(2)),
    ];
    for row in &rows {
        set.insert(row.clone()).expect("insert");
    }
    // same row, different insertion order
    assert!(!set
        .insert(
            BindingSet::new()
                .with("y", Value::integer(2))
                .with("x", Value::integer(1))
        )
        .expect("insert"));
    for row in &rows {
        assert!(set.contains(row).expect("contains"));
    }
    let stored: Vec<BindingSet> = set.iter().collect::<Result<_>>().expect("iter");
    assert_eq!(stored, rows);
}

#[test]
fn disk_map_replaces_values() {
    let store = open_store();
    let mut map = DiskMap::create(
        Arc::clone(&store),
        "map",
        Arc::new(ValueCodec) as Arc<dyn Codec<Value>>,
        Arc::new(SerdeCodec::<Vec<String>>::new()) as Arc<dyn Codec<Vec<String>>>,
    )
    .expect("create");
    let key = Value::lang_literal("hello", "en");
    assert_eq!(map.insert(key.clone(), vec!["a".into()]).expect("insert"), None);
    assert_eq!(
        map.insert(key.clone(), vec!["b".into()]).expect("insert"),
        Some(vec!["a".to_string()])
    );
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&key).expect("get"), Some(vec!["b".to_string()]));
    assert_eq!(map.get(&Value::Null).expect("get"), None);
    map.clear().expect("clear");
    assert!(map.is_empty());
    assert!(!map.contains_key(&key).expect("contains_key"));
}

#[test]
fn disk_queue_is_fifo() {
    let store = open_store();
    let positions: DynMap<i64, i64> = Box::new(
        DiskMap::create(
            Arc::clone(&store),
            "queue",
            Arc::new(I64Codec) as Arc<dyn Codec<i64>>,
            Arc::new(I64Codec) as Arc<dyn Codec<i64>>,
        )
        .expect("create"),
    );
    let mut queue = DiskQueue::new(positions);
    assert_eq!(queue.poll().expect("poll"), None);
    queue.offer_all(vec![3, 1, 2]).expect("offer_all");
    assert_eq!(queue.peek().expect("peek"), Some(3));
    assert_eq!(queue.poll().expect("poll"), Some(3));
    queue.offer(0).expect("offer");
    let rest: Vec<i64> = queue.iter().collect::<Result<_>>().expect("iter");
    assert_eq!(rest, vec![1, 2, 0]);
    assert_eq!(queue.len(), 3);
}

#[test]
fn closed_store_refuses_work() {
    let store = open_store();
    let mut set = DiskSet::create(
        Arc::clone(&store),
        "closing",
        Arc::new(ValueCodec) as Arc<dyn Codec<Value>>,
    )
    .expect("create");
    set.insert(Value::literal("before")).expect("insert");
    store.close().expect("close");
    assert!(matches!(
        set.insert(Value::literal("after")),
        Err(SpillError::Closed)
    ));
    assert!(matches!(
        set.contains(&Value::literal("before")),
        Err(SpillError::Closed)
    ));
    let mut entries = set.iter();
    assert!(matches!(entries.next(), Some(Err(SpillError::Closed))));
    assert!(entries.next().is_none());
    assert!(matches!(store.commit(), Err(SpillError::Closed)));
}
