#![allow(dead_code)]

use super::{Actor, ActorAdapter, mysql_pool, mysql_url, pg_client, pg_url};
use connectors::{
    profile::SqlProfile,
    script::{KEY_COLUMNS, KEY_CONDITION, KEY_OPERATION, KEY_SUPPORT, KEY_TABLE, OPERATION_INSERT_AFTER_TRUNCATE},
};
use model::execution::{
    process::{DriverScript, ProcessScript},
    profile::ResourceProfile,
};
use mysql_async::prelude::Queryable;
use std::io::Write;

pub const MYSQL_RESOURCE: &str = "mysql_source";
pub const PG_RESOURCE: &str = "pg_target";
pub const ACTOR_COLUMNS: &str = "ACTOR_ID, FIRST_NAME, LAST_NAME";

/// DDL shared by both backends.
pub fn actor_table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE {table} (
            ACTOR_ID INTEGER PRIMARY KEY,
            FIRST_NAME VARCHAR(45) NOT NULL,
            LAST_NAME VARCHAR(45) NOT NULL
        )"
    )
}

pub fn sample_actors() -> Vec<Actor> {
    vec![
        Actor::new(1, "PENELOPE", "GUINESS"),
        Actor::new(2, "NICK", "WAHLBERG"),
        Actor::new(3, "ED", "CHASE"),
        Actor::new(4, "JENNIFER", "DAVIS"),
        Actor::new(5, "JOHNNY", "LOLLOBRIGIDA"),
    ]
}

fn insert_actors_sql(table: &str, actors: &[Actor]) -> String {
    let values = actors
        .iter()
        .map(|a| format!("({}, '{}', '{}')", a.actor_id, a.first_name, a.last_name))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} (ACTOR_ID, FIRST_NAME, LAST_NAME) VALUES {values}")
}

/// Drop & recreate `table` in MySQL, filled with `actors`.
pub async fn reset_mysql_table(table: &str, actors: &[Actor]) {
    let pool = mysql_pool();
    let mut conn = pool.get_conn().await.expect("mysql connection");
    conn.query_drop(format!("DROP TABLE IF EXISTS {table}"))
        .await
        .expect("drop mysql table");
    conn.query_drop(actor_table_ddl(table))
        .await
        .expect("create mysql table");
    if !actors.is_empty() {
        conn.query_drop(insert_actors_sql(table, actors))
            .await
            .expect("seed mysql table");
    }
    drop(conn);
    pool.disconnect().await.expect("disconnect mysql");
}

/// Drop & recreate `table` in Postgres, filled with `actors`.
pub async fn reset_pg_table(table: &str, actors: &[Actor]) {
    let client = pg_client().await;
    client
        .batch_execute(&format!("DROP TABLE IF EXISTS {table}; {}", actor_table_ddl(table)))
        .await
        .expect("reset postgres table");
    if !actors.is_empty() {
        client
            .batch_execute(&insert_actors_sql(table, actors))
            .await
            .expect("seed postgres table");
    }
}

pub async fn pg_row_count(table: &str) -> i64 {
    let client = pg_client().await;
    let row = client
        .query_one(&format!("SELECT COUNT(*) FROM {table}"), &[])
        .await
        .expect("count postgres rows");
    row.get(0)
}

pub async fn pg_actors(table: &str) -> Vec<Actor> {
    let client = pg_client().await;
    client
        .query(
            &format!("SELECT ACTOR_ID, FIRST_NAME, LAST_NAME FROM {table} ORDER BY ACTOR_ID"),
            &[],
        )
        .await
        .expect("read postgres rows")
        .iter()
        .map(|row| {
            let id: i32 = row.get(0);
            Actor::new(i64::from(id), row.get(1), row.get(2))
        })
        .collect()
}

/// Loads a profile the way a deployment would: from a properties file.
pub fn load_profile(name: &str, driver: &str, url: &str, extra: &[(&str, &str)]) -> SqlProfile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "# generated by engine-tests").expect("write properties");
    writeln!(file, "driver={driver}").expect("write properties");
    writeln!(file, "url={url}").expect("write properties");
    for (key, value) in extra {
        writeln!(file, "{key}={value}").expect("write properties");
    }

    let resource = ResourceProfile::load(name, file.path()).expect("load properties");
    SqlProfile::convert(&resource).expect("valid profile")
}

pub fn mysql_profile(extra: &[(&str, &str)]) -> SqlProfile {
    load_profile(MYSQL_RESOURCE, "mysql", &mysql_url(), extra)
}

pub fn pg_profile(extra: &[(&str, &str)]) -> SqlProfile {
    load_profile(PG_RESOURCE, "postgres", &pg_url(), extra)
}

/// A process copying `source_table` of MySQL into `target_table` of Postgres.
pub fn copy_process(source_table: &str, target_table: &str, condition: Option<&str>) -> ProcessScript {
    let mut source = DriverScript::new(MYSQL_RESOURCE)
        .with(KEY_SUPPORT, ActorAdapter::NAME)
        .with(KEY_TABLE, source_table)
        .with(KEY_COLUMNS, ACTOR_COLUMNS);
    if let Some(condition) = condition {
        source = source.with(KEY_CONDITION, condition);
    }

    let drain = DriverScript::new(PG_RESOURCE)
        .with(KEY_SUPPORT, ActorAdapter::NAME)
        .with(KEY_TABLE, target_table)
        .with(KEY_COLUMNS, ACTOR_COLUMNS)
        .with(KEY_OPERATION, OPERATION_INSERT_AFTER_TRUNCATE);

    ProcessScript::new("copy_actor", source, drain)
}
