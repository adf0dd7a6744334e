//! The disk-backed store that spilled containers live in.
//!
//! One temporary SQLite database per [`SpillStore`]; every container gets its
//! own table, named after the container. Members and keys are stored as their
//! encoded bytes, which is why codecs must encode equal elements identically.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info, trace, warn};

use crate::codec::{decode_from_slice, encode_to_vec, Codec};
use crate::collection::{DynMap, Element, Entries, MapLike, QueueLike, SetLike};
use crate::error::{Result, SpillError};

// 256 MiB of address space per store when memory mapping is on
const MMAP_SIZE: i64 = 256 * 1024 * 1024;
const PAGE_SIZE: i64 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Where the temporary database file goes; the OS temp dir when `None`.
    pub directory: Option<PathBuf>,
    /// Memory-mapped I/O is much faster, but exhausts the address space of
    /// 32-bit targets, so it is off there by default.
    pub memory_mapped: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            directory: None,
            memory_mapped: cfg!(target_pointer_width = "64"),
        }
    }
}

// ------------- SpillStore -------------
pub struct SpillStore {
    // declared before the file so the connection is dropped first
    connection: Mutex<Option<Connection>>,
    file: Mutex<Option<NamedTempFile>>,
    path: PathBuf,
    commits: AtomicU64,
}

impl SpillStore {
    pub fn open(options: &StoreOptions) -> Result<Self> {
        let mut builder = Builder::new();
        builder.prefix("spill-").suffix(".db");
        let file = match &options.directory {
            Some(directory) => builder.tempfile_in(directory),
            None => builder.tempfile(),
        }
        .map_err(|e| SpillError::StoreInit(e.to_string()))?;
        let path = file.path().to_path_buf();
        let connection = Self::connect(&path, options)
            .map_err(|e| SpillError::StoreInit(e.to_string()))?;
        debug!(path = %path.display(), mmap = options.memory_mapped, "spill store opened");
        Ok(Self {
            connection: Mutex::new(Some(connection)),
            file: Mutex::new(Some(file)),
            path,
            commits: AtomicU64::new(0),
        })
    }
    fn connect(path: &Path, options: &StoreOptions) -> rusqlite::Result<Connection> {
        let connection = Connection::open(path)?;
        // scratch space for one evaluation, so durability is not a concern
        apply_pragma(&connection, "pragma journal_mode = memory")?;
        apply_pragma(&connection, "pragma synchronous = off")?;
        if options.memory_mapped {
            apply_pragma(&connection, &format!("pragma mmap_size = {}", MMAP_SIZE))?;
        }
        connection.set_prepared_statement_cache_capacity(256);
        Ok(connection)
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// Runs `f` against the open connection.
    pub fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let guard = self
            .connection
            .lock()
            .map_err(|e| SpillError::Lock(e.to_string()))?;
        let connection = guard.as_ref().ok_or(SpillError::Closed)?;
        f(connection)
    }
    /// Like [`Self::with_connection`], but inside the open write transaction.
    pub fn write<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        self.with_connection(|connection| {
            if connection.is_autocommit() {
                connection.execute_batch("begin")?;
            }
            f(connection)
        })
    }
    pub fn commit(&self) -> Result<()> {
        self.with_connection(|connection| {
            if !connection.is_autocommit() {
                connection.execute_batch("commit")?;
            }
            Ok(())
        })?;
        let commits = self.commits.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(commits, "spill store committed");
        Ok(())
    }
    /// Number of commits so far.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }
    pub fn is_closed(&self) -> bool {
        self.connection.lock().map(|c| c.is_none()).unwrap_or(true)
    }
    /// Closes the connection and deletes the database file. Closing twice is
    /// a no-op.
    pub fn close(&self) -> Result<()> {
        let connection = self
            .connection
            .lock()
            .map_err(|e| SpillError::Lock(e.to_string()))?
            .take();
        if let Some(connection) = connection {
            connection.close().map_err(|(_, e)| SpillError::from(e))?;
            info!(path = %self.path.display(), commits = self.commits(), "spill store closed");
        }
        let file = self
            .file
            .lock()
            .map_err(|e| SpillError::Lock(e.to_string()))?
            .take();
        if let Some(file) = file {
            file.close()
                .map_err(|e| SpillError::Persistence(e.to_string()))?;
        }
        Ok(())
    }
}

fn apply_pragma(connection: &Connection, sql: &str) -> rusqlite::Result<()> {
    // some pragmas answer with a row, some don't
    let mut statement = connection.prepare(sql)?;
    let mut rows = statement.query([])?;
    while rows.next()?.is_some() {}
    Ok(())
}

fn quoted(name: &str) -> String {
    format!("\"spill_{}\"", name.replace('"', "\"\""))
}

// ------------- Paging -------------
// Walks a table in rowid order, one page per lock acquisition, so that no
// statement outlives the connection guard.
struct RowPages<'a> {
    store: &'a SpillStore,
    sql: &'a str,
    columns: usize,
    after: i64,
    buffered: VecDeque<Vec<Vec<u8>>>,
    exhausted: bool,
}

impl<'a> RowPages<'a> {
    fn new(store: &'a SpillStore, sql: &'a str, columns: usize) -> Self {
        Self {
            store,
            sql,
            columns,
            after: i64::MIN,
            buffered: VecDeque::new(),
            exhausted: false,
        }
    }
    fn fetch(&mut self) -> Result<()> {
        let (sql, columns, after) = (self.sql, self.columns, self.after);
        let page = self.store.with_connection(|connection| {
            let mut statement = connection.prepare_cached(sql)?;
            let rows = statement.query_map(params![after, PAGE_SIZE], |row| {
                let rowid: i64 = row.get(0)?;
                let mut blobs = Vec::with_capacity(columns);
                for column in 1..=columns {
                    blobs.push(row.get::<_, Vec<u8>>(column)?);
                }
                Ok((rowid, blobs))
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })?;
        if (page.len() as i64) < PAGE_SIZE {
            self.exhausted = true;
        }
        for (rowid, blobs) in page {
            self.after = rowid;
            self.buffered.push_back(blobs);
        }
        Ok(())
    }
}

impl Iterator for RowPages<'_> {
    type Item = Result<Vec<Vec<u8>>>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch() {
                warn!(error = %e, "spilled rows could not be read");
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffered.pop_front().map(Ok)
    }
}

// ------------- DiskSet -------------
struct SetStatements {
    insert: String,
    remove: String,
    contains: String,
    clear: String,
    page: String,
}

pub struct DiskSet<T> {
    store: Arc<SpillStore>,
    codec: Arc<dyn Codec<T>>,
    sql: SetStatements,
    len: usize,
}

impl<T: Element> DiskSet<T> {
    /// Creates (or reopens) the named set inside `store`.
    pub fn create(store: Arc<SpillStore>, name: &str, codec: Arc<dyn Codec<T>>) -> Result<Self> {
        let table = quoted(name);
        let len = store.write(|connection| {
            connection.execute_batch(&format!(
                "
                create table if not exists {table} (
                    Member blob not null,
                    constraint unique_Member unique (
                        Member
                    )
                );
                "
            ))?;
            let count: i64 =
                connection.query_row(&format!("select count(*) from {table}"), [], |r| r.get(0))?;
            Ok(count as usize)
        })?;
        Ok(Self {
            store,
            codec,
            sql: SetStatements {
                insert: format!("insert or ignore into {table} (Member) values (?1)"),
                remove: format!("delete from {table} where Member = ?1"),
                contains: format!("select 1 from {table} where Member = ?1"),
                clear: format!("delete from {table}"),
                page: format!(
                    "select rowid, Member from {table} where rowid > ?1 order by rowid limit ?2"
                ),
            },
            len,
        })
    }
}

impl<T: Element> SetLike<T> for DiskSet<T> {
    fn insert(&mut self, item: T) -> Result<bool> {
        let member = encode_to_vec(self.codec.as_ref(), &item)?;
        let sql = &self.sql.insert;
        let changed = self.store.write(|connection| {
            Ok(connection.prepare_cached(sql)?.execute(params![member])?)
        })?;
        self.len += changed;
        Ok(changed > 0)
    }
    fn remove(&mut self, item: &T) -> Result<bool> {
        let member = encode_to_vec(self.codec.as_ref(), item)?;
        let sql = &self.sql.remove;
        let changed = self.store.write(|connection| {
            Ok(connection.prepare_cached(sql)?.execute(params![member])?)
        })?;
        self.len -= changed;
        Ok(changed > 0)
    }
    fn contains(&self, item: &T) -> Result<bool> {
        let member = encode_to_vec(self.codec.as_ref(), item)?;
        let sql = &self.sql.contains;
        self.store.with_connection(|connection| {
            Ok(connection.prepare_cached(sql)?.exists(params![member])?)
        })
    }
    fn len(&self) -> usize {
        self.len
    }
    fn clear(&mut self) -> Result<()> {
        let sql = &self.sql.clear;
        self.store
            .write(|connection| Ok(connection.prepare_cached(sql)?.execute([])?))?;
        self.len = 0;
        Ok(())
    }
    fn iter(&self) -> Entries<'_, T> {
        let codec = Arc::clone(&self.codec);
        Box::new(
            RowPages::new(&self.store, &self.sql.page, 1).map(move |row| {
                let row = row?;
                Ok(decode_from_slice(codec.as_ref(), &row[0])?)
            }),
        )
    }
}

// ------------- DiskMap -------------
struct MapStatements {
    upsert: String,
    get: String,
    remove: String,
    clear: String,
    page: String,
}

pub struct DiskMap<K, V> {
    store: Arc<SpillStore>,
    key_codec: Arc<dyn Codec<K>>,
    value_codec: Arc<dyn Codec<V>>,
    sql: MapStatements,
    len: usize,
}

impl<K: Element, V: Clone + Send + 'static> DiskMap<K, V> {
    /// Creates (or reopens) the named map inside `store`.
    pub fn create(
        store: Arc<SpillStore>,
        name: &str,
        key_codec: Arc<dyn Codec<K>>,
        value_codec: Arc<dyn Codec<V>>,
    ) -> Result<Self> {
        let table = quoted(name);
        let len = store.write(|connection| {
            connection.execute_batch(&format!(
                "
                create table if not exists {table} (
                    Spilled_Key blob not null,
                    Spilled_Value blob not null,
                    constraint unique_Spilled_Key primary key (
                        Spilled_Key
                    )
                );
                "
            ))?;
            let count: i64 =
                connection.query_row(&format!("select count(*) from {table}"), [], |r| r.get(0))?;
            Ok(count as usize)
        })?;
        Ok(Self {
            store,
            key_codec,
            value_codec,
            sql: MapStatements {
                upsert: format!(
                    "
                    insert into {table} (
                        Spilled_Key,
                        Spilled_Value
                    ) values (?1, ?2)
                    on conflict (Spilled_Key) do update set Spilled_Value = excluded.Spilled_Value
                    "
                ),
                get: format!("select Spilled_Value from {table} where Spilled_Key = ?1"),
                remove: format!("delete from {table} where Spilled_Key = ?1"),
                clear: format!("delete from {table}"),
                page: format!(
                    "
                    select rowid, Spilled_Key, Spilled_Value
                        from {table}
                        where rowid > ?1
                        order by rowid
                        limit ?2
                    "
                ),
            },
            len,
        })
    }
    fn fetch(&self, key: &[u8]) -> Result<Option<V>> {
        let sql = &self.sql.get;
        let stored = self.store.with_connection(|connection| {
            Ok(connection
                .prepare_cached(sql)?
                .query_row(params![key], |r| r.get::<_, Vec<u8>>(0))
                .optional()?)
        })?;
        match stored {
            Some(bytes) => Ok(Some(decode_from_slice(self.value_codec.as_ref(), &bytes)?)),
            None => Ok(None),
        }
    }
}

impl<K: Element, V: Clone + Send + 'static> MapLike<K, V> for DiskMap<K, V> {
    fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        let key = encode_to_vec(self.key_codec.as_ref(), &key)?;
        let value = encode_to_vec(self.value_codec.as_ref(), &value)?;
        let previous = self.fetch(&key)?;
        let sql = &self.sql.upsert;
        self.store.write(|connection| {
            Ok(connection.prepare_cached(sql)?.execute(params![key, value])?)
        })?;
        if previous.is_none() {
            self.len += 1;
        }
        Ok(previous)
    }
    fn get(&self, key: &K) -> Result<Option<V>> {
        let key = encode_to_vec(self.key_codec.as_ref(), key)?;
        self.fetch(&key)
    }
    fn remove(&mut self, key: &K) -> Result<Option<V>> {
        let key = encode_to_vec(self.key_codec.as_ref(), key)?;
        let previous = self.fetch(&key)?;
        if previous.is_some() {
            let sql = &self.sql.remove;
            self.store
                .write(|connection| Ok(connection.prepare_cached(sql)?.execute(params![key])?))?;
            self.len -= 1;
        }
        Ok(previous)
    }
    fn contains_key(&self, key: &K) -> Result<bool> {
        let key = encode_to_vec(self.key_codec.as_ref(), key)?;
        let sql = &self.sql.get;
        self.store.with_connection(|connection| {
            Ok(connection.prepare_cached(sql)?.exists(params![key])?)
        })
    }
    fn len(&self) -> usize {
        self.len
    }
    fn clear(&mut self) -> Result<()> {
        let sql = &self.sql.clear;
        self.store
            .write(|connection| Ok(connection.prepare_cached(sql)?.execute([])?))?;
        self.len = 0;
        Ok(())
    }
    fn iter(&self) -> Entries<'_, (K, V)> {
        let key_codec = Arc::clone(&self.key_codec);
        let value_codec = Arc::clone(&self.value_codec);
        Box::new(
            RowPages::new(&self.store, &self.sql.page, 2).map(move |row| {
                let row = row?;
                let key = decode_from_slice(key_codec.as_ref(), &row[0])?;
                let value = decode_from_slice(value_codec.as_ref(), &row[1])?;
                Ok((key, value))
            }),
        )
    }
}

// ------------- DiskQueue -------------
/// FIFO queue over a position-keyed map: `offer` writes at `tail`, `poll`
/// takes from `head`, and `[head, tail)` is what is queued.
pub struct DiskQueue<T: Clone + Send + 'static> {
    positions: DynMap<i64, T>,
    head: i64,
    tail: i64,
}

impl<T: Clone + Send + 'static> DiskQueue<T> {
    pub fn new(positions: DynMap<i64, T>) -> Self {
        Self {
            positions,
            head: 0,
            tail: 0,
        }
    }
    fn at(&self, position: i64) -> Result<T> {
        self.positions.get(&position)?.ok_or_else(|| {
            SpillError::Persistence(format!("queued position {} is missing", position))
        })
    }
}

impl<T: Clone + Send + 'static> QueueLike<T> for DiskQueue<T> {
    fn offer(&mut self, item: T) -> Result<()> {
        self.positions.insert(self.tail, item)?;
        self.tail += 1;
        Ok(())
    }
    fn peek(&self) -> Result<Option<T>> {
        if self.head == self.tail {
            return Ok(None);
        }
        self.at(self.head).map(Some)
    }
    fn poll(&mut self) -> Result<Option<T>> {
        if self.head == self.tail {
            return Ok(None);
        }
        let item = self.positions.remove(&self.head)?.ok_or_else(|| {
            SpillError::Persistence(format!("queued position {} is missing", self.head))
        })?;
        self.head += 1;
        Ok(Some(item))
    }
    fn len(&self) -> usize {
        (self.tail - self.head) as usize
    }
    fn iter(&self) -> Entries<'_, T> {
        Box::new((self.head..self.tail).map(move |position| self.at(position)))
    }
}
