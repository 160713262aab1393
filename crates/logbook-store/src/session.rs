use async_trait::async_trait;
use logbook_core::{LoginDay, TimeUuid};
pub use scylla::value::{Counter, CqlTimeuuid, CqlValue, Row};

use crate::error::StoreError;

/// How the statements of a batch are grouped on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchKind {
    /// Sent together to save round trips; no cross-row atomicity.
    Unlogged,
    /// Counter mutations only. Counters cannot share a batch with other writes.
    Counter,
}

/// The slice of a CQL client the access layer relies on.
///
/// One handle is shared read-only by every caller, so implementations must
/// be usable concurrently through `&self`.
#[async_trait]
pub trait CqlSession: Send + Sync + 'static {
    /// A compiled statement template.
    type Prepared: Clone + Send + Sync + 'static;

    async fn prepare(&self, cql: &str) -> Result<Self::Prepared, StoreError>;

    /// Run ad hoc statement text with positional bind values.
    async fn query(&self, cql: &str, values: Vec<CqlValue>) -> Result<Vec<Row>, StoreError>;

    async fn execute(
        &self,
        statement: &Self::Prepared,
        values: Vec<CqlValue>,
    ) -> Result<Vec<Row>, StoreError>;

    async fn batch(
        &self,
        kind: BatchKind,
        statements: Vec<(Self::Prepared, Vec<CqlValue>)>,
    ) -> Result<(), StoreError>;
}

pub fn text(value: impl Into<String>) -> CqlValue {
    CqlValue::Text(value.into())
}

pub fn day(value: LoginDay) -> CqlValue {
    CqlValue::Text(value.to_string())
}

pub fn timeuuid(value: TimeUuid) -> CqlValue {
    CqlValue::Timeuuid(CqlTimeuuid::from(uuid::Uuid::from(value)))
}

pub fn counter(delta: i64) -> CqlValue {
    CqlValue::Counter(Counter(delta))
}
