//! Storage access for the login event log.
//!
//! [`Cluster`] owns the one session handle of the process; [`LoginDao`] binds
//! to it and records login rows and their per-day counters. The session sits
//! behind [`CqlSession`] so the same access layer runs over the scylla
//! driver or the in-process [`MemorySession`].

pub mod cluster;
pub mod dao;
pub mod driver;
pub mod error;
pub mod memory;
pub mod query;
pub mod row_helpers;
pub mod schema;
pub mod session;
pub mod statements;

pub use cluster::Cluster;
pub use dao::LoginDao;
pub use driver::ScyllaSession;
pub use error::StoreError;
pub use memory::{Executed, MemorySession};
pub use session::{BatchKind, CqlSession};
