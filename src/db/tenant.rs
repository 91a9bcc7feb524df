use sqlx::SqliteConnection;

use crate::{error::Error, tenant::Tenant};

/// Inserts a tenant if its access key is not already registered, returning
/// the tenant id either way.
pub async fn ensure(
    db: &mut SqliteConnection,
    access_key_id: &str,
    secret_access_key: &str,
    now: i64,
) -> Result<u64, Error> {
    sqlx::query(
        "
        INSERT INTO tenants (access_key_id, secret_access_key, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (access_key_id) DO NOTHING
        ",
    )
    .bind(access_key_id)
    .bind(secret_access_key)
    .bind(now)
    .execute(&mut *db)
    .await?;

    Ok(
        sqlx::query_scalar("SELECT id FROM tenants WHERE access_key_id = $1")
            .bind(access_key_id)
            .fetch_one(&mut *db)
            .await?,
    )
}

pub async fn by_access_key(
    db: &mut SqliteConnection,
    access_key_id: &str,
) -> Result<Option<Tenant>, Error> {
    Ok(
        sqlx::query_as("SELECT * FROM tenants WHERE access_key_id = $1")
            .bind(access_key_id)
            .fetch_optional(&mut *db)
            .await?,
    )
}
