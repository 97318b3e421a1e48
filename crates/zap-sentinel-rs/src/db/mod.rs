use std::time::Duration;

use sqlx::{migrate::Migrator, sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::{Alert, AlertRecord};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn create_pool(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> anyhow::Result<SqlitePool> {
    Ok(SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await?)
}

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

/// Writes every alert in one transaction; a failing row rolls back the batch.
pub async fn insert_alerts(pool: &SqlitePool, alerts: &[Alert]) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut written = 0;
    for alert in alerts {
        let res = sqlx::query(
            "INSERT INTO scan_results(alert_id, url, risk, description, solution, other_info, reference, cwe_id, wasc_id) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&alert.alert_id)
        .bind(&alert.url)
        .bind(&alert.risk)
        .bind(&alert.description)
        .bind(&alert.solution)
        .bind(&alert.other_info)
        .bind(&alert.reference)
        .bind(&alert.cwe_id)
        .bind(&alert.wasc_id)
        .execute(&mut *tx)
        .await?;
        written += res.rows_affected();
    }
    tx.commit().await?;
    Ok(written)
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<AlertRecord>, sqlx::Error> {
    sqlx::query_as::<_, AlertRecord>(
        "SELECT id, alert_id, url, risk, description, solution, other_info, reference, cwe_id, wasc_id FROM scan_results ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

pub async fn delete_all(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("DELETE FROM scan_results").execute(pool).await?;
    Ok(res.rows_affected())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // A single connection keeps every query on the same in-memory database.
    let pool = create_pool("sqlite::memory:", 1, Duration::from_secs(5))
        .await
        .expect("in-memory pool");
    run_migrations(&pool).await.expect("migrations");
    pool
}
