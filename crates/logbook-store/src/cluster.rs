//! The connection provider: one session handle per process lifetime.

use std::sync::Arc;

use logbook_settings::ClusterSettings;
use tracing::{info, warn};

use crate::driver::ScyllaSession;
use crate::error::StoreError;
use crate::session::CqlSession;

/// Owns the process-wide session handle.
///
/// Construct once at startup, hand [`Cluster::session`] clones to consumers,
/// and call [`Cluster::shutdown`] on the way out.
pub struct Cluster<S: CqlSession> {
    session: Arc<S>,
}

impl Cluster<ScyllaSession> {
    /// Connect using the given settings. Any failure here is fatal to startup.
    pub async fn connect(settings: &ClusterSettings) -> Result<Self, StoreError> {
        let session = ScyllaSession::connect(settings).await?;
        Ok(Self::from_session(session))
    }
}

impl<S: CqlSession> Cluster<S> {
    pub fn from_session(session: S) -> Self {
        Self {
            session: Arc::new(session),
        }
    }

    /// The shared handle. Every call returns the same session.
    pub fn session(&self) -> Arc<S> {
        Arc::clone(&self.session)
    }

    /// Release the handle. Best-effort: never fails.
    pub fn shutdown(self) {
        info!("closing cluster");
        match Arc::try_unwrap(self.session) {
            Ok(session) => {
                drop(session);
                info!("cluster closed");
            }
            Err(shared) => {
                warn!(
                    handles = Arc::strong_count(&shared) - 1,
                    "session still referenced at shutdown; it closes when the last handle drops"
                );
            }
        }
    }
}
