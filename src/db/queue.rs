use sqlx::SqliteConnection;
use tokio_stream::StreamExt as _;

use crate::{error::Error, queue::Queue};

pub async fn insert(
    db: &mut SqliteConnection,
    tenant: u64,
    name: &str,
    visibility_timeout: u64,
    delay_seconds: u64,
    now: i64,
) -> Result<u64, Error> {
    let res = sqlx::query_scalar(
        "
        INSERT INTO queues (tenant, name, visibility_timeout, delay_seconds, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        ",
    )
    .bind(tenant as i64)
    .bind(name)
    .bind(visibility_timeout as i64)
    .bind(delay_seconds as i64)
    .bind(now)
    .fetch_one(&mut *db)
    .await;

    match res {
        Ok(id) => Ok(id),
        Err(sqlx::Error::Database(e))
            if e.kind() == sqlx::error::ErrorKind::UniqueViolation =>
        {
            Err(Error::QueueAlreadyExists {
                queue: name.to_owned(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn find(
    db: &mut SqliteConnection,
    tenant: u64,
    name: &str,
) -> Result<Option<Queue>, Error> {
    Ok(
        sqlx::query_as("SELECT * FROM queues WHERE tenant = $1 AND name = $2")
            .bind(tenant as i64)
            .bind(name)
            .fetch_optional(&mut *db)
            .await?,
    )
}

/// Removes the queue row. Messages and attributes go with it through the
/// `ON DELETE CASCADE` chain, which is what makes queue deletion atomic with
/// respect to in-flight leases.
pub async fn delete(db: &mut SqliteConnection, tenant: u64, name: &str) -> Result<bool, Error> {
    let res = sqlx::query("DELETE FROM queues WHERE tenant = $1 AND name = $2")
        .bind(tenant as i64)
        .bind(name)
        .execute(&mut *db)
        .await?;

    Ok(res.rows_affected() > 0)
}

pub async fn list(db: &mut SqliteConnection, tenant: u64) -> Result<Vec<Queue>, Error> {
    let mut stream = sqlx::query_as("SELECT * FROM queues WHERE tenant = $1 ORDER BY name")
        .bind(tenant as i64)
        .fetch(&mut *db);

    let mut queues = Vec::new();

    while let Some(queue) = stream.next().await.transpose()? {
        queues.push(queue);
    }

    Ok(queues)
}
