//! Runs against a real cluster. Enable with `--features integration`; the
//! cluster is located through the usual `LOGBOOK_*` settings and the schema
//! is created if missing.
#![cfg(feature = "integration")]

use std::sync::Arc;

use chrono::Utc;
use logbook_core::{Clock, Login, SystemClock, TimeUuid};
use logbook_settings::load_settings;
use logbook_store::{Cluster, LoginDao, ScyllaSession, StoreError};

async fn connect() -> Cluster<ScyllaSession> {
    let mut settings = load_settings().expect("settings");
    settings.cluster.create_schema = true;
    Cluster::connect(&settings.cluster).await.expect("connect")
}

fn unique_user() -> String {
    format!("it-{}", TimeUuid::now())
}

#[tokio::test]
async fn single_writes_round_trip() {
    let cluster = connect().await;
    let dao = LoginDao::new(cluster.session()).await.unwrap();
    let user = unique_user();

    let ids: Vec<_> = (0..4).map(|_| TimeUuid::now()).collect();
    dao.login_sequential(&user, ids[0], "index").await.unwrap();
    dao.login_concurrent(&user, ids[1], "index").await.unwrap();
    dao.login_query_builder(&user, ids[2], "index").await.unwrap();
    dao.login_prepared(&user, ids[3], "index").await.unwrap();

    let logins = dao.get_logins_by_user(&user).await.unwrap();
    for id in &ids {
        assert!(logins["index"].contains(id));
    }
    let today = SystemClock.today();
    assert_eq!(dao.get_counter_by_user_and_day(&user, &today).await.unwrap(), Some(4));

    let ranged = dao
        .get_timestamps_by_user_and_range(&user, ids[1], ids[3])
        .await
        .unwrap();
    assert_eq!(ranged, vec![ids[2], ids[1]]);

    drop(dao);
    cluster.shutdown();
}

#[tokio::test]
async fn batch_round_trip() {
    let cluster = connect().await;
    let session = cluster.session();
    let dao = LoginDao::new(Arc::clone(&session)).await.unwrap();
    let user = unique_user();
    let start = TimeUuid::start_of(Utc::now());

    let batch = vec![
        Login::new(user.as_str(), "index").unwrap(),
        Login::new(user.as_str(), "index").unwrap(),
        Login::new(user.as_str(), "backoffice").unwrap(),
    ];
    dao.login_batch(&batch).await.unwrap();

    let logins = dao.get_logins_by_user(&user).await.unwrap();
    assert_eq!(logins["index"].len(), 2);
    assert_eq!(logins["backoffice"].len(), 1);
    assert_eq!(
        dao.get_counter_by_user_and_day(&user, &SystemClock.today()).await.unwrap(),
        Some(3)
    );
    let all = dao
        .get_timestamps_by_user_and_range(&user, start, TimeUuid::end_of(Utc::now()))
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    drop(dao);
    drop(session);
    cluster.shutdown();
}

#[tokio::test]
async fn missing_keyspace_is_fatal() {
    let mut settings = load_settings().expect("settings");
    settings.cluster.create_schema = false;
    settings.cluster.keyspace = "logbook_absent_keyspace".to_string();
    match Cluster::connect(&settings.cluster).await {
        Err(StoreError::Keyspace(_)) => {}
        Err(other) => panic!("expected a keyspace error, got {other}"),
        Ok(_) => panic!("selected a keyspace that does not exist"),
    }
}
