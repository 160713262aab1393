//! Table definitions for the login event log.
//! The DDL is generated from these, and the in-memory session validates
//! statements against them.

use crate::query::ident;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    TimeUuid,
    Counter,
}

impl ColumnKind {
    pub fn cql_type(self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::TimeUuid => "timeuuid",
            ColumnKind::Counter => "counter",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusteringOrder {
    Asc,
    Desc,
}

#[derive(Debug)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
}

#[derive(Debug)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub partition_key: &'static [&'static str],
    pub clustering: Option<(&'static str, ClusteringOrder)>,
}

/// One row per login: partitioned by user, newest first.
pub const LOGIN: TableDef = TableDef {
    name: "login",
    columns: &[
        ColumnDef { name: "user", kind: ColumnKind::Text },
        ColumnDef { name: "ts", kind: ColumnKind::TimeUuid },
        ColumnDef { name: "area", kind: ColumnKind::Text },
    ],
    partition_key: &["user"],
    clustering: Some(("ts", ClusteringOrder::Desc)),
};

/// Per-user, per-day login counters.
pub const LOGIN_STATS: TableDef = TableDef {
    name: "loginStats",
    columns: &[
        ColumnDef { name: "user", kind: ColumnKind::Text },
        ColumnDef { name: "date", kind: ColumnKind::Text },
        ColumnDef { name: "count", kind: ColumnKind::Counter },
    ],
    partition_key: &["user", "date"],
    clustering: None,
};

pub const TABLES: [&TableDef; 2] = [&LOGIN, &LOGIN_STATS];

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_counter_table(&self) -> bool {
        self.columns.iter().any(|c| c.kind == ColumnKind::Counter)
    }

    /// Partition key columns followed by the clustering column, if any.
    pub fn primary_key(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.partition_key
            .iter()
            .copied()
            .chain(self.clustering.map(|(name, _)| name))
    }

    pub fn create_cql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("{} {}", ident(c.name), c.kind.cql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        let partition = self
            .partition_key
            .iter()
            .map(|c| ident(c).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        let mut cql = match self.clustering {
            Some((ck, _)) => format!(
                "CREATE TABLE IF NOT EXISTS {} ({columns}, PRIMARY KEY (({partition}), {}))",
                ident(self.name),
                ident(ck)
            ),
            None => format!(
                "CREATE TABLE IF NOT EXISTS {} ({columns}, PRIMARY KEY (({partition})))",
                ident(self.name)
            ),
        };
        if let Some((ck, order)) = self.clustering {
            let order = match order {
                ClusteringOrder::Asc => "ASC",
                ClusteringOrder::Desc => "DESC",
            };
            cql.push_str(&format!(" WITH CLUSTERING ORDER BY ({} {order})", ident(ck)));
        }
        cql
    }
}

pub fn create_keyspace_cql(keyspace: &str, replication_factor: u32) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {replication_factor}}}",
        ident(keyspace)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_ddl() {
        assert_eq!(
            LOGIN.create_cql(),
            "CREATE TABLE IF NOT EXISTS login (user text, ts timeuuid, area text, \
             PRIMARY KEY ((user), ts)) WITH CLUSTERING ORDER BY (ts DESC)"
        );
    }

    #[test]
    fn login_stats_ddl() {
        assert_eq!(
            LOGIN_STATS.create_cql(),
            "CREATE TABLE IF NOT EXISTS loginStats (user text, date text, count counter, \
             PRIMARY KEY ((user, date)))"
        );
    }

    #[test]
    fn keyspace_ddl() {
        assert_eq!(
            create_keyspace_cql("test", 1),
            "CREATE KEYSPACE IF NOT EXISTS test WITH replication = \
             {'class': 'SimpleStrategy', 'replication_factor': 1}"
        );
    }

    #[test]
    fn primary_keys() {
        assert_eq!(LOGIN.primary_key().collect::<Vec<_>>(), vec!["user", "ts"]);
        assert_eq!(LOGIN_STATS.primary_key().collect::<Vec<_>>(), vec!["user", "date"]);
        assert!(LOGIN_STATS.is_counter_table());
        assert!(!LOGIN.is_counter_table());
    }
}
