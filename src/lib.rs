//! Client-side data access and index maintenance for a REST JSON document backend.
//!
//! The backend stores JSON at paths. It offers no transactions, joins or foreign keys, so
//! everything relational is kept consistent by hand on the client:
//! * `store::EntityStore` reads and writes the primary records of one collection.
//! * `index` keeps the secondary indexes: names to ids, ids partitioned by city, visibility
//!   and owner, and the task/mission association kept on both sides.
//! * `changelog::ChangeLog` records every mutation for clients that sync incrementally.
//! * `service` strings these together into create, update and delete use cases.
//!
//! None of these writes are atomic. A use case that fails part way stops, reports the error
//! and leaves what it already wrote; every step checks before it writes, so running the use
//! case again converges.
//!
//! Use cases are driven through `operation::AsyncOperation`, which runs callbacks when a
//! pending result settles, keeps a shared busy indicator up while anything runs, and chains
//! dependent operations.
pub mod cache;
pub mod changelog;
pub mod cli;
pub mod config;
pub mod entity;
pub mod error;
pub mod index;
pub mod log;
pub mod operation;
pub mod path;
pub mod prelude;
pub mod progress;
pub mod rest;
pub mod service;
pub mod store;
pub mod sync;
pub mod transport;
pub mod worker;

pub use error::StoreError;
