//! An in-process keyspace that speaks the access layer's CQL subset.
//!
//! Statements are parsed and validated against the `login` / `loginStats`
//! definitions at prepare and query time, bound values are type-checked,
//! and row TTLs expire against a clock tests can move forward. The session
//! also records what it was asked to do so tests can assert on dispatch.

mod parser;

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use logbook_core::TimeUuid;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::query::Op;
use crate::schema::{ColumnKind, TableDef, LOGIN, LOGIN_STATS, TABLES};
use crate::session::{timeuuid, BatchKind, Counter, CqlSession, CqlValue, Row};
use parser::{Predicate, Statement, Term};

/// One request the session served, in dispatch order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Executed {
    /// Ad hoc statement text.
    Query(String),
    /// A prepared statement, identified by its text.
    Prepared(String),
    Batch {
        kind: BatchKind,
        statements: Vec<String>,
    },
}

#[derive(Clone, Debug)]
pub struct MemoryPrepared {
    cql: Arc<str>,
    plan: Arc<Plan>,
}

impl MemoryPrepared {
    pub fn cql(&self) -> &str {
        &self.cql
    }
}

#[derive(Debug)]
struct Plan {
    kind: PlanKind,
    markers: usize,
}

#[derive(Debug)]
enum PlanKind {
    InsertLogin {
        user: Term,
        ts: Term,
        area: Option<Term>,
        ttl: Option<Term>,
    },
    IncrementStats {
        delta: Term,
        user: Term,
        date: Term,
    },
    SelectLogins {
        columns: Vec<LoginColumn>,
        user: Term,
        bounds: Vec<(Op, Term)>,
    },
    SelectStats {
        columns: Vec<StatsColumn>,
        user: Term,
        date: Term,
    },
}

#[derive(Clone, Copy, Debug)]
enum LoginColumn {
    User,
    Ts,
    Area,
}

#[derive(Clone, Copy, Debug)]
enum StatsColumn {
    User,
    Date,
    Count,
}

fn resolve_table(tables: &[&'static TableDef], name: &str) -> Result<&'static TableDef, String> {
    tables
        .iter()
        .copied()
        .find(|t| t.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| format!("unconfigured table {name}"))
}

fn column_kind(table: &TableDef, name: &str) -> Result<ColumnKind, String> {
    table
        .column(name)
        .map(|c| c.kind)
        .ok_or_else(|| format!("undefined column {name} in table {}", table.name))
}

/// Reject literals that can never match the column type.
fn check_literal(kind: ColumnKind, term: &Term, column: &str) -> Result<(), String> {
    match (kind, term) {
        (_, Term::Bind(_))
        | (ColumnKind::Text, Term::Text(_))
        | (ColumnKind::TimeUuid, Term::Text(_))
        | (ColumnKind::Counter, Term::Int(_)) => Ok(()),
        _ => Err(format!("invalid literal for {column} of type {}", kind.cql_type())),
    }
}

/// Split equality restrictions on the partition key from the rest.
fn partition_restrictions(
    table: &TableDef,
    predicates: Vec<Predicate>,
) -> Result<(HashMap<String, Term>, Vec<Predicate>), String> {
    let mut keys = HashMap::new();
    let mut rest = Vec::new();
    for p in predicates {
        let kind = column_kind(table, &p.column)?;
        check_literal(kind, &p.value, &p.column)?;
        if table.partition_key.contains(&p.column.as_str()) {
            if p.op != Op::Eq {
                return Err(format!("partition key column {} only supports =", p.column));
            }
            if keys.insert(p.column.clone(), p.value).is_some() {
                return Err(format!("{} restricted more than once", p.column));
            }
        } else {
            rest.push(p);
        }
    }
    for key in table.partition_key {
        if !keys.contains_key(*key) {
            return Err(format!("partition key column {key} must be restricted"));
        }
    }
    Ok((keys, rest))
}

fn take(map: &mut HashMap<String, Term>, column: &str) -> Result<Term, String> {
    map.remove(column)
        .ok_or_else(|| format!("missing value for {column}"))
}

fn compile(cql: &str, tables: &[&'static TableDef]) -> Result<Plan, String> {
    let parsed = parser::parse(cql)?;
    let kind = match parsed.statement {
        Statement::Insert {
            table,
            columns,
            values,
            ttl,
        } => {
            let def = resolve_table(tables, &table)?;
            if def.is_counter_table() {
                return Err(format!("INSERT is not allowed on counter table {}", def.name));
            }
            let mut given = HashMap::new();
            for (column, value) in columns.into_iter().zip(values) {
                check_literal(column_kind(def, &column)?, &value, &column)?;
                if given.insert(column.clone(), value).is_some() {
                    return Err(format!("{column} given more than once"));
                }
            }
            for key in def.primary_key() {
                if !given.contains_key(key) {
                    return Err(format!("missing primary key column {key}"));
                }
            }
            if let Some(Term::Text(_)) = ttl {
                return Err("TTL must be an integer".into());
            }
            PlanKind::InsertLogin {
                user: take(&mut given, "user")?,
                ts: take(&mut given, "ts")?,
                area: given.remove("area"),
                ttl,
            }
        }
        Statement::Update {
            table,
            increments,
            predicates,
        } => {
            let def = resolve_table(tables, &table)?;
            let mut delta = None;
            for (column, by) in increments {
                if column_kind(def, &column)? != ColumnKind::Counter {
                    return Err(format!("{column} is not a counter column"));
                }
                check_literal(ColumnKind::Counter, &by, &column)?;
                delta = Some(by);
            }
            let delta = delta.ok_or("UPDATE without assignments")?;
            let (mut keys, rest) = partition_restrictions(def, predicates)?;
            if let Some(p) = rest.first() {
                return Err(format!("non primary key column {} in WHERE", p.column));
            }
            PlanKind::IncrementStats {
                delta,
                user: take(&mut keys, "user")?,
                date: take(&mut keys, "date")?,
            }
        }
        Statement::Select {
            table,
            columns,
            predicates,
        } => {
            let def = resolve_table(tables, &table)?;
            for column in &columns {
                column_kind(def, column)?;
            }
            let (mut keys, rest) = partition_restrictions(def, predicates)?;
            if def.name == LOGIN_STATS.name {
                if let Some(p) = rest.first() {
                    return Err(format!("non primary key column {} in WHERE", p.column));
                }
                PlanKind::SelectStats {
                    columns: columns
                        .iter()
                        .map(|c| match c.as_str() {
                            "user" => StatsColumn::User,
                            "date" => StatsColumn::Date,
                            _ => StatsColumn::Count,
                        })
                        .collect(),
                    user: take(&mut keys, "user")?,
                    date: take(&mut keys, "date")?,
                }
            } else {
                let clustering = def.clustering.map(|(name, _)| name);
                let mut bounds = Vec::new();
                for p in rest {
                    if Some(p.column.as_str()) != clustering {
                        return Err(format!("non primary key column {} in WHERE", p.column));
                    }
                    bounds.push((p.op, p.value));
                }
                PlanKind::SelectLogins {
                    columns: columns
                        .iter()
                        .map(|c| match c.as_str() {
                            "user" => LoginColumn::User,
                            "ts" => LoginColumn::Ts,
                            _ => LoginColumn::Area,
                        })
                        .collect(),
                    user: take(&mut keys, "user")?,
                    bounds,
                }
            }
        }
    };
    Ok(Plan {
        kind,
        markers: parsed.markers,
    })
}

// ── Bound value resolution ──────────────────────────────────────────────────

fn bad_value(column: &str, wanted: &str, got: &CqlValue) -> StoreError {
    StoreError::Execution(format!("expected {wanted} for {column}, got {got:?}"))
}

fn bound<'v>(values: &'v [CqlValue], idx: usize) -> Result<&'v CqlValue, StoreError> {
    values
        .get(idx)
        .ok_or_else(|| StoreError::Execution(format!("no value bound at position {idx}")))
}

fn text_of(term: &Term, values: &[CqlValue], column: &str) -> Result<String, StoreError> {
    match term {
        Term::Text(s) => Ok(s.clone()),
        Term::Bind(i) => match bound(values, *i)? {
            CqlValue::Text(s) | CqlValue::Ascii(s) => Ok(s.clone()),
            other => Err(bad_value(column, "text", other)),
        },
        Term::Int(_) => Err(StoreError::Execution(format!("expected text for {column}"))),
    }
}

fn timeuuid_of(term: &Term, values: &[CqlValue], column: &str) -> Result<TimeUuid, StoreError> {
    let parsed = match term {
        Term::Text(s) => s.parse::<TimeUuid>(),
        Term::Bind(i) => match bound(values, *i)? {
            CqlValue::Timeuuid(t) => TimeUuid::from_uuid(uuid::Uuid::from(t.clone())),
            other => return Err(bad_value(column, "timeuuid", other)),
        },
        Term::Int(_) => return Err(StoreError::Execution(format!("expected timeuuid for {column}"))),
    };
    parsed.map_err(|e| StoreError::Execution(format!("{column}: {e}")))
}

fn delta_of(term: &Term, values: &[CqlValue]) -> Result<i64, StoreError> {
    match term {
        Term::Int(n) => Ok(*n),
        Term::Bind(i) => match bound(values, *i)? {
            CqlValue::Counter(Counter(n)) | CqlValue::BigInt(n) => Ok(*n),
            other => Err(bad_value("count", "counter", other)),
        },
        Term::Text(_) => Err(StoreError::Execution("expected counter delta".into())),
    }
}

fn ttl_of(term: &Term, values: &[CqlValue]) -> Result<i64, StoreError> {
    let seconds = match term {
        Term::Int(n) => *n,
        Term::Bind(i) => match bound(values, *i)? {
            CqlValue::Int(n) => i64::from(*n),
            CqlValue::BigInt(n) => *n,
            other => return Err(bad_value("[ttl]", "int", other)),
        },
        Term::Text(_) => return Err(StoreError::Execution("TTL must be an integer".into())),
    };
    if seconds < 0 {
        return Err(StoreError::Execution(format!("negative TTL {seconds}")));
    }
    Ok(seconds)
}

// ── Storage ─────────────────────────────────────────────────────────────────

struct LoginRow {
    area: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Keyspace {
    logins: HashMap<String, BTreeMap<Reverse<TimeUuid>, LoginRow>>,
    counters: HashMap<(String, String), i64>,
}

enum Mutation {
    Insert {
        user: String,
        ts: TimeUuid,
        row: LoginRow,
    },
    Increment {
        user: String,
        date: String,
        delta: i64,
    },
}

impl Mutation {
    fn table(&self) -> &'static str {
        match self {
            Mutation::Insert { .. } => LOGIN.name,
            Mutation::Increment { .. } => LOGIN_STATS.name,
        }
    }
}

impl Keyspace {
    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Insert { user, ts, row } => {
                self.logins.entry(user).or_default().insert(Reverse(ts), row);
            }
            Mutation::Increment { user, date, delta } => {
                *self.counters.entry((user, date)).or_insert(0) += delta;
            }
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-process [`CqlSession`] with test instrumentation.
pub struct MemorySession {
    tables: Vec<&'static TableDef>,
    data: Mutex<Keyspace>,
    skew: Mutex<TimeDelta>,
    journal: Mutex<Vec<Executed>>,
    recording: AtomicBool,
    prepares: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    latency: Mutex<Option<Duration>>,
    failing: Mutex<HashSet<String>>,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    /// A keyspace holding both `login` and `loginStats`.
    pub fn new() -> Self {
        Self::with_tables(&TABLES)
    }

    /// A keyspace holding only the given tables.
    pub fn with_tables(tables: &[&'static TableDef]) -> Self {
        Self {
            tables: tables.to_vec(),
            data: Mutex::new(Keyspace::default()),
            skew: Mutex::new(TimeDelta::zero()),
            journal: Mutex::new(Vec::new()),
            recording: AtomicBool::new(true),
            prepares: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            latency: Mutex::new(None),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Delay every request by `latency` before it is served.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = Some(latency);
        self
    }

    /// Stop recording requests. The journal otherwise grows with every
    /// request, so long-running users should turn it off.
    pub fn without_journal(self) -> Self {
        self.recording.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Move the TTL clock forward.
    pub fn advance(&self, by: Duration) {
        if let Ok(delta) = TimeDelta::from_std(by) {
            let mut skew = self.skew.lock();
            *skew = *skew + delta;
        }
    }

    /// Make every write touching `table` fail until [`Self::clear_failures`].
    pub fn fail_writes_to(&self, table: &str) {
        self.failing.lock().insert(table.to_ascii_lowercase());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.journal.lock().clone()
    }

    pub fn clear_executed(&self) {
        self.journal.lock().clear();
    }

    pub fn prepare_count(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    /// Highest number of requests served at the same time so far.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset_peak_in_flight(&self) {
        self.peak_in_flight.store(0, Ordering::SeqCst);
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.skew.lock()
    }

    /// Record, count as in flight, apply latency, then serve.
    async fn serve<T>(
        &self,
        record: Option<Executed>,
        serve: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if let Some(record) = record {
            debug!(request = ?record, "memory session request");
            if self.recording.load(Ordering::SeqCst) {
                self.journal.lock().push(record);
            }
        }
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        serve()
    }

    fn check_arity(plan: &Plan, values: &[CqlValue]) -> Result<(), StoreError> {
        if plan.markers != values.len() {
            return Err(StoreError::Execution(format!(
                "statement expects {} bound values, got {}",
                plan.markers,
                values.len()
            )));
        }
        Ok(())
    }

    fn mutation(&self, plan: &Plan, values: &[CqlValue]) -> Result<Option<Mutation>, StoreError> {
        Self::check_arity(plan, values)?;
        let mutation = match &plan.kind {
            PlanKind::InsertLogin { user, ts, area, ttl } => {
                let ttl = ttl.as_ref().map(|t| ttl_of(t, values)).transpose()?;
                let expires_at = match ttl {
                    Some(seconds) if seconds > 0 => {
                        let ttl = TimeDelta::try_seconds(seconds).ok_or_else(|| {
                            StoreError::Execution(format!("TTL {seconds} out of range"))
                        })?;
                        Some(self.now() + ttl)
                    }
                    _ => None,
                };
                Mutation::Insert {
                    user: text_of(user, values, "user")?,
                    ts: timeuuid_of(ts, values, "ts")?,
                    row: LoginRow {
                        area: area.as_ref().map(|a| text_of(a, values, "area")).transpose()?,
                        expires_at,
                    },
                }
            }
            PlanKind::IncrementStats { delta, user, date } => Mutation::Increment {
                user: text_of(user, values, "user")?,
                date: text_of(date, values, "date")?,
                delta: delta_of(delta, values)?,
            },
            PlanKind::SelectLogins { .. } | PlanKind::SelectStats { .. } => return Ok(None),
        };
        if self
            .failing
            .lock()
            .contains(&mutation.table().to_ascii_lowercase())
        {
            return Err(StoreError::Execution(format!(
                "injected failure writing to {}",
                mutation.table()
            )));
        }
        Ok(Some(mutation))
    }

    fn run(&self, plan: &Plan, values: &[CqlValue]) -> Result<Vec<Row>, StoreError> {
        if let Some(mutation) = self.mutation(plan, values)? {
            self.data.lock().apply(mutation);
            return Ok(Vec::new());
        }
        let now = self.now();
        let data = self.data.lock();
        match &plan.kind {
            PlanKind::SelectLogins {
                columns,
                user,
                bounds,
            } => {
                let user = text_of(user, values, "user")?;
                let bounds = bounds
                    .iter()
                    .map(|(op, term)| Ok((*op, timeuuid_of(term, values, "ts")?)))
                    .collect::<Result<Vec<_>, StoreError>>()?;
                let Some(partition) = data.logins.get(&user) else {
                    return Ok(Vec::new());
                };
                let rows = partition
                    .iter()
                    .filter(|(_, row)| row.expires_at.map_or(true, |at| at > now))
                    .filter(|(Reverse(ts), _)| bounds.iter().all(|(op, b)| within(*op, ts, b)))
                    .map(|(Reverse(ts), row)| Row {
                        columns: columns
                            .iter()
                            .map(|c| match c {
                                LoginColumn::User => Some(CqlValue::Text(user.clone())),
                                LoginColumn::Ts => Some(timeuuid(*ts)),
                                LoginColumn::Area => row.area.clone().map(CqlValue::Text),
                            })
                            .collect(),
                    })
                    .collect();
                Ok(rows)
            }
            PlanKind::SelectStats {
                columns,
                user,
                date,
            } => {
                let user = text_of(user, values, "user")?;
                let date = text_of(date, values, "date")?;
                let Some(count) = data.counters.get(&(user.clone(), date.clone())) else {
                    return Ok(Vec::new());
                };
                Ok(vec![Row {
                    columns: columns
                        .iter()
                        .map(|c| {
                            Some(match c {
                                StatsColumn::User => CqlValue::Text(user.clone()),
                                StatsColumn::Date => CqlValue::Text(date.clone()),
                                StatsColumn::Count => CqlValue::Counter(Counter(*count)),
                            })
                        })
                        .collect(),
                }])
            }
            PlanKind::InsertLogin { .. } | PlanKind::IncrementStats { .. } => Ok(Vec::new()),
        }
    }

    fn compile(&self, cql: &str) -> Result<Plan, String> {
        compile(cql, &self.tables)
    }
}

fn within(op: Op, ts: &TimeUuid, bound: &TimeUuid) -> bool {
    match op {
        Op::Eq => ts == bound,
        Op::Lt => ts < bound,
        Op::Lte => ts <= bound,
        Op::Gt => ts > bound,
        Op::Gte => ts >= bound,
    }
}

#[async_trait]
impl CqlSession for MemorySession {
    type Prepared = MemoryPrepared;

    async fn prepare(&self, cql: &str) -> Result<MemoryPrepared, StoreError> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        self.serve(None, || {
            let plan = self.compile(cql).map_err(|detail| StoreError::Prepare {
                statement: cql.to_string(),
                detail,
            })?;
            Ok(MemoryPrepared {
                cql: Arc::from(cql),
                plan: Arc::new(plan),
            })
        })
        .await
    }

    async fn query(&self, cql: &str, values: Vec<CqlValue>) -> Result<Vec<Row>, StoreError> {
        self.serve(Some(Executed::Query(cql.to_string())), || {
            let plan = self.compile(cql).map_err(StoreError::Execution)?;
            self.run(&plan, &values)
        })
        .await
    }

    async fn execute(
        &self,
        statement: &MemoryPrepared,
        values: Vec<CqlValue>,
    ) -> Result<Vec<Row>, StoreError> {
        self.serve(Some(Executed::Prepared(statement.cql.to_string())), || {
            self.run(&statement.plan, &values)
        })
        .await
    }

    async fn batch(
        &self,
        kind: BatchKind,
        statements: Vec<(MemoryPrepared, Vec<CqlValue>)>,
    ) -> Result<(), StoreError> {
        let record = Executed::Batch {
            kind,
            statements: statements.iter().map(|(s, _)| s.cql.to_string()).collect(),
        };
        self.serve(Some(record), || {
            let mut mutations = Vec::with_capacity(statements.len());
            for (statement, values) in &statements {
                let mutation = self.mutation(&statement.plan, values)?.ok_or_else(|| {
                    StoreError::Execution("only INSERT and UPDATE are allowed in a batch".into())
                })?;
                let is_counter = matches!(mutation, Mutation::Increment { .. });
                match (kind, is_counter) {
                    (BatchKind::Unlogged, true) => {
                        return Err(StoreError::Execution(
                            "cannot include a counter statement in a non-counter batch".into(),
                        ))
                    }
                    (BatchKind::Counter, false) => {
                        return Err(StoreError::Execution(
                            "cannot include a non-counter statement in a counter batch".into(),
                        ))
                    }
                    _ => mutations.push(mutation),
                }
            }
            let mut data = self.data.lock();
            for mutation in mutations {
                data.apply(mutation);
            }
            Ok(())
        })
        .await
    }
}
