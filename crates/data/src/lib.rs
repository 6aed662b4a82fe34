//! Atelier Data - client code allocation and live collection mirroring.
//!
//! This crate sits between presentation code and the remote document store:
//!
//! - [`allocator`] - globally unique 6-digit client codes, claimed with a
//!   create-only reservation before the client record exists
//! - [`repository`] / [`clients`] - owner-scoped writes and push
//!   subscriptions per entity kind
//! - [`mirror`] - one live view per entity kind, re-subscribed whenever the
//!   signed-in owner changes
//! - [`links`] - named links appended to client records
//! - [`directory`] - client lookup by shareable code
//!
//! # Data flow
//!
//! Writes go to the store; views change only when the store pushes the next
//! snapshot back. There is no read path around the mirror once subscribed,
//! and no local state is merged into the views.
//!
//! # Store backends
//!
//! [`store::MemoryStore`] runs in-process (development and tests).
//! [`store::PgDocumentStore`] keeps documents in a `PostgreSQL` JSONB table
//! and pushes changes with `LISTEN/NOTIFY`.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod allocator;
pub mod clients;
pub mod config;
pub mod directory;
pub mod entity;
pub mod error;
pub mod links;
pub mod live;
pub mod mirror;
pub mod repository;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;

pub use allocator::{CodeAllocator, CodeReservation, CodeSource, RandomCodes};
pub use clients::ClientRepository;
pub use config::{ConfigError, DataConfig, LogFormat, StoreBackend};
pub use directory::ClientDirectory;
pub use entity::{Entity, EntityKind};
pub use error::DataError;
pub use links::ClientLinks;
pub use live::{LiveView, Snapshot, Teardown};
pub use mirror::{LiveMirror, MirrorDriver};
pub use repository::Repository;
pub use session::Session;
pub use state::Studio;
pub use store::{DocumentStore, MemoryStore, PgDocumentStore, SharedStore, StoreError};
