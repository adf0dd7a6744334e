//! Spillway – containers for query evaluation that move themselves to disk
//! when they grow too large.
//!
//! Intermediate results of a query (DISTINCT sets, GROUP BY accumulators,
//! queued work) can outgrow the heap. Every container handed out by a
//! [`factory::CollectionFactory`] starts as an ordinary in-memory collection
//! and, once it exceeds its threshold, migrates all of its contents into a
//! temporary SQLite database in one go. Callers hold a
//! [`collection::SetLike`], [`collection::MapLike`] or
//! [`collection::QueueLike`] handle and never see the switch.
//!
//! Spilling needs a byte encoding for everything that is stored, so the crate
//! also carries a compact binary codec for RDF-style values:
//! * A [`value::Value`] is an IRI, a blank node, a literal (language tagged or
//!   typed), a nested triple, or null.
//! * A [`binding::BindingSet`] is one result row, variable name to value.
//! * A [`group::GroupKey`] is the key of one GROUP BY bucket, carrying the
//!   hash the evaluator computed for it.
//!
//! ## Modules
//! * [`value`] – The value model and the well-known datatype enumerations.
//! * [`codec`] – Varint primitives, the [`codec::Codec`] trait and the value codec.
//! * [`binding`] – Binding sets and their codec over an append-only name registry.
//! * [`group`] – Group keys and their codec.
//! * [`collection`] – The container traits and their in-memory implementations.
//! * [`store`] – The SQLite-backed spill store with its disk sets, maps and queues.
//! * [`commit`] – Wrappers committing the store every N mutations.
//! * [`spill`] – Sets, maps and queues that migrate to disk past a threshold.
//! * [`config`] – [`config::SpillConfig`], loaded from file and environment.
//! * [`factory`] – The [`factory::CollectionFactory`] tying it all together.
//!
//! ## Quick Start
//! ```
//! use spillway::collection::SetLike;
//! use spillway::config::SpillConfig;
//! use spillway::factory::CollectionFactory;
//! use spillway::value::Value;
//!
//! let factory = CollectionFactory::new(SpillConfig::default().with_spill_threshold_for_sets(2));
//! let mut seen = factory.create_value_set();
//! for name in ["a", "b", "c"] {
//!     seen.insert(Value::literal(name)).unwrap();
//! }
//! assert!(seen.is_spilled());
//! assert!(seen.contains(&Value::literal("a")).unwrap());
//! factory.close().unwrap();
//! ```
//!
//! ## Logging
//! Migrations, store lifecycle and commits are reported through `tracing`;
//! install any subscriber to see them.

pub mod binding;
pub mod codec;
pub mod collection;
pub mod commit;
pub mod config;
pub mod error;
pub mod factory;
pub mod group;
pub mod spill;
pub mod store;
pub mod value;

pub use error::{CodecError, Result, SpillError};
pub use factory::CollectionFactory;
