//! The event access layer: login rows plus per-user, per-day counters.
//!
//! Every single-event write issues the same two statements (insert the row,
//! bump today's counter) through one of four strategies:
//!
//! | entry point | statement source | dispatch |
//! |---|---|---|
//! | [`LoginDao::login_sequential`] | hand-written text | insert, then increment |
//! | [`LoginDao::login_concurrent`] | hand-written text | both at once |
//! | [`LoginDao::login_query_builder`] | [`crate::query`] output | both at once |
//! | [`LoginDao::login_prepared`] | prepared templates | both at once |
//!
//! The two writes are not linked. If one fails the other is not undone and
//! the counter diverges from the rows; the failing statement's error is
//! returned.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use logbook_core::{Clock, Login, LoginDay, SystemClock, TimeUuid};
use tracing::{debug, info, instrument, warn};

use crate::error::StoreError;
use crate::row_helpers::{get_counter, get_text, get_timeuuid};
use crate::schema::{LOGIN, LOGIN_STATS};
use crate::session::{counter, day, text, timeuuid, BatchKind, CqlSession, CqlValue};
use crate::statements::{self, INCREMENT_COUNTER, INSERT_LOGIN};

pub struct LoginDao<S: CqlSession> {
    session: Arc<S>,
    clock: Arc<dyn Clock>,
    built_insert: String,
    built_increment: String,
    insert: S::Prepared,
    increment: S::Prepared,
    increment_by: S::Prepared,
    logins_by_user: S::Prepared,
    counter: S::Prepared,
    timestamps_in_range: S::Prepared,
}

fn require(field: &'static str, value: &str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Await both writes and report the first failure.
async fn both<A, B, T, U>(insert: A, increment: B) -> Result<(), StoreError>
where
    A: Future<Output = Result<T, StoreError>>,
    B: Future<Output = Result<U, StoreError>>,
{
    match future::join(insert, increment).await {
        (Ok(_), Ok(_)) => Ok(()),
        (Ok(_), Err(e)) => {
            warn!(error = %e, "login row written but counter increment failed");
            Err(e)
        }
        (Err(e), Ok(_)) => {
            warn!(error = %e, "counter incremented but login row failed");
            Err(e)
        }
        (Err(e), Err(counter_err)) => {
            debug!(error = %counter_err, "counter increment failed too");
            Err(e)
        }
    }
}

impl<S: CqlSession> LoginDao<S> {
    /// Bind to `session` and prepare every template. Counter days come from
    /// the local calendar.
    pub async fn new(session: Arc<S>) -> Result<Self, StoreError> {
        Self::with_clock(session, Arc::new(SystemClock)).await
    }

    /// Any template that does not compile against the schema fails construction.
    pub async fn with_clock(session: Arc<S>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let built_insert = statements::insert_login();
        let built_increment = statements::increment_counter();
        let increment_by = statements::increment_counter_by();
        let logins_by_user = statements::select_logins_by_user();
        let counter = statements::select_counter();
        let timestamps_in_range = statements::select_timestamps_in_range();

        let (insert, increment, increment_by, logins_by_user, counter, timestamps_in_range) =
            futures::try_join!(
                session.prepare(&built_insert),
                session.prepare(&built_increment),
                session.prepare(&increment_by),
                session.prepare(&logins_by_user),
                session.prepare(&counter),
                session.prepare(&timestamps_in_range)
            )?;
        info!(templates = 6, "login templates prepared");

        Ok(Self {
            session,
            clock,
            built_insert,
            built_increment,
            insert,
            increment,
            increment_by,
            logins_by_user,
            counter,
            timestamps_in_range,
        })
    }

    fn row_values(user: &str, ts: TimeUuid, area: &str) -> Vec<CqlValue> {
        vec![text(user), timeuuid(ts), text(area)]
    }

    /// The counter key is always today, whatever `ts` says.
    fn counter_key(&self, user: &str) -> Vec<CqlValue> {
        vec![text(user), day(self.clock.today())]
    }

    /// Strategy 1: ad hoc text, the increment starts after the insert completes.
    #[instrument(skip_all, fields(user = %user, area = %area, strategy = "sequential"))]
    pub async fn login_sequential(&self, user: &str, ts: TimeUuid, area: &str) -> Result<(), StoreError> {
        require("user", user)?;
        require("area", area)?;
        self.session
            .query(INSERT_LOGIN, Self::row_values(user, ts, area))
            .await?;
        self.session
            .query(INCREMENT_COUNTER, self.counter_key(user))
            .await?;
        debug!(%ts, "login recorded");
        Ok(())
    }

    /// Strategy 2: ad hoc text, both writes in flight together.
    #[instrument(skip_all, fields(user = %user, area = %area, strategy = "concurrent"))]
    pub async fn login_concurrent(&self, user: &str, ts: TimeUuid, area: &str) -> Result<(), StoreError> {
        require("user", user)?;
        require("area", area)?;
        both(
            self.session.query(INSERT_LOGIN, Self::row_values(user, ts, area)),
            self.session.query(INCREMENT_COUNTER, self.counter_key(user)),
        )
        .await?;
        debug!(%ts, "login recorded");
        Ok(())
    }

    /// Strategy 3: statement text from the query builder, dispatched like strategy 2.
    #[instrument(skip_all, fields(user = %user, area = %area, strategy = "query_builder"))]
    pub async fn login_query_builder(
        &self,
        user: &str,
        ts: TimeUuid,
        area: &str,
    ) -> Result<(), StoreError> {
        require("user", user)?;
        require("area", area)?;
        both(
            self.session.query(&self.built_insert, Self::row_values(user, ts, area)),
            self.session.query(&self.built_increment, self.counter_key(user)),
        )
        .await?;
        debug!(%ts, "login recorded");
        Ok(())
    }

    /// Strategy 4: prepared templates, dispatched like strategy 2.
    #[instrument(skip_all, fields(user = %user, area = %area, strategy = "prepared"))]
    pub async fn login_prepared(&self, user: &str, ts: TimeUuid, area: &str) -> Result<(), StoreError> {
        require("user", user)?;
        require("area", area)?;
        both(
            self.session.execute(&self.insert, Self::row_values(user, ts, area)),
            self.session.execute(&self.increment, self.counter_key(user)),
        )
        .await?;
        debug!(%ts, "login recorded");
        Ok(())
    }

    /// Write many logins in two batches sent together: an unlogged batch of
    /// row inserts and a counter batch with one increment-by-N per user.
    #[instrument(skip_all, fields(logins = logins.len()))]
    pub async fn login_batch(&self, logins: &[Login]) -> Result<(), StoreError> {
        if logins.is_empty() {
            debug!("nothing to write");
            return Ok(());
        }

        let inserts: Vec<_> = logins
            .iter()
            .map(|l| (self.insert.clone(), Self::row_values(l.user(), l.ts(), l.area())))
            .collect();

        let mut per_user: BTreeMap<&str, i64> = BTreeMap::new();
        for login in logins {
            *per_user.entry(login.user()).or_insert(0) += 1;
        }
        let today = self.clock.today();
        let increments: Vec<_> = per_user
            .into_iter()
            .map(|(user, hits)| {
                (
                    self.increment_by.clone(),
                    vec![counter(hits), text(user), day(today)],
                )
            })
            .collect();
        debug!(rows = inserts.len(), counters = increments.len(), "dispatching batches");

        both(
            self.session.batch(BatchKind::Unlogged, inserts),
            self.session.batch(BatchKind::Counter, increments),
        )
        .await
    }

    /// Every stored login of `user`, grouped by area, newest first within a group.
    #[instrument(skip_all, fields(user = %user))]
    pub async fn get_logins_by_user(
        &self,
        user: &str,
    ) -> Result<HashMap<String, Vec<TimeUuid>>, StoreError> {
        require("user", user)?;
        let rows = self
            .session
            .execute(&self.logins_by_user, vec![text(user)])
            .await?;
        let mut by_area: HashMap<String, Vec<TimeUuid>> = HashMap::new();
        for row in &rows {
            let ts = get_timeuuid(row, 0, LOGIN.name, "ts")?;
            let area = get_text(row, 1, LOGIN.name, "area")?;
            by_area.entry(area).or_default().push(ts);
        }
        Ok(by_area)
    }

    /// `None` when `user` has no counter row for `day`.
    #[instrument(skip_all, fields(user = %user, date = %date))]
    pub async fn get_counter_by_user_and_day(
        &self,
        user: &str,
        date: &LoginDay,
    ) -> Result<Option<i64>, StoreError> {
        require("user", user)?;
        let rows = self
            .session
            .execute(&self.counter, vec![text(user), day(*date)])
            .await?;
        rows.first()
            .map(|row| get_counter(row, 0, LOGIN_STATS.name, "count"))
            .transpose()
    }

    /// Identifiers of `user` in `[start, end)`, newest first.
    ///
    /// The returned future owns what it needs and can be spawned, mapped or
    /// joined after `self` is gone.
    pub fn get_timestamps_by_user_and_range(
        &self,
        user: &str,
        start: TimeUuid,
        end: TimeUuid,
    ) -> BoxFuture<'static, Result<Vec<TimeUuid>, StoreError>> {
        if let Err(e) = require("user", user) {
            return future::ready(Err(e)).boxed();
        }
        let session = Arc::clone(&self.session);
        let statement = self.timestamps_in_range.clone();
        let values = vec![text(user), timeuuid(start), timeuuid(end)];
        async move {
            let rows = session.execute(&statement, values).await?;
            rows.iter()
                .map(|row| get_timeuuid(row, 0, LOGIN.name, "ts"))
                .collect()
        }
        .boxed()
    }
}
