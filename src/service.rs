//! The queue engine.
//!
//! [`Service`] is the single mutation path for queues and messages: the wire
//! API and the admin listener both go through it, so the lifecycle invariants
//! hold no matter who the caller is. It owns validation and policy (bounds,
//! clamps, defaults) and delegates row access to [`crate::db`], deciding the
//! transaction scope per operation.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use sqlx::{
    sqlite::{
        SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
        SqliteSynchronous,
    },
    SqlitePool,
};

use crate::{
    config::Config,
    db,
    error::Error,
    message::{AttributeValue, FilterCriteria, Message, MessageState},
    queue::{self, Queue, QueueStats},
    tenant::Tenant,
};

/// Hard bound on message bodies, matching SQS (256 KiB).
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;
/// Upper bound for `DelaySeconds`.
pub const MAX_DELAY_SECONDS: u64 = 900;
/// Upper bound for visibility timeouts (12 hours).
pub const MAX_VISIBILITY_SECONDS: u64 = 43_200;
/// Upper bound for `WaitTimeSeconds` on receive.
pub const MAX_WAIT_SECONDS: u64 = 20;
/// Largest receive batch.
pub const MAX_BATCH: u64 = 10;
/// Result cap for the observability filter.
pub const FILTER_LIMIT: u64 = 1000;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct Service {
    db: SqlitePool,
    config: Arc<Config>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl Service {
    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn connect() -> Result<Self, Error> {
        Self::connect_with(Config::default()).await
    }

    pub async fn connect_with(config: Config) -> Result<Self, Error> {
        let opts = SqliteConnectOptions::new()
            .filename(config.db_path())
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            // An acknowledged write must survive a crash.
            .synchronous(SqliteSynchronous::Full)
            .optimize_on_close(true, None)
            .auto_vacuum(SqliteAutoVacuum::Full);

        let pool = SqlitePoolOptions::new().connect_with(opts).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let svc = Self {
            db: pool,
            config: Arc::new(config),
        };

        if svc.config.uses_default_credentials() {
            tracing::warn!(
                "Using built-in root credentials; set BURROW_ROOT_ACCESS_KEY_ID and \
                 BURROW_ROOT_SECRET_ACCESS_KEY for anything beyond local testing"
            );
        }

        svc.create_tenant(
            svc.config.root_access_key_id(),
            svc.config.root_secret_access_key(),
        )
        .await?;

        Ok(svc)
    }

    // --- tenant directory ---

    /// Registers a tenant keyed by its access key id. Idempotent; this is the
    /// out-of-band provisioning path, the wire API never reaches it.
    pub async fn create_tenant(
        &self,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Result<u64, Error> {
        let mut db = self.db.acquire().await?;
        db::tenant::ensure(&mut db, access_key_id, secret_access_key, now_ms()).await
    }

    /// Looks up the tenant owning an access key. The region is part of the
    /// credential scope but carries no routing meaning in a single-region
    /// deployment.
    pub async fn resolve_tenant(
        &self,
        access_key_id: &str,
        _region: &str,
    ) -> Result<Tenant, Error> {
        let mut db = self.db.acquire().await?;

        db::tenant::by_access_key(&mut db, access_key_id)
            .await?
            .ok_or_else(|| Error::UnknownAccessKey {
                key_id: access_key_id.to_owned(),
            })
    }

    /// The ambient tenant the admin listener operates as: the server
    /// operator's root tenant.
    pub async fn current_tenant(&self) -> Result<Tenant, Error> {
        let mut db = self.db.acquire().await?;

        db::tenant::by_access_key(&mut db, self.config.root_access_key_id())
            .await?
            .ok_or_else(|| Error::internal(eyre::eyre!("root tenant missing")))
    }

    // --- queue lifecycle ---

    pub async fn create_queue(
        &self,
        tenant: u64,
        name: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<Queue, Error> {
        if !queue::valid_name(name) {
            return Err(Error::invalid_parameter(format!(
                "queue name must match [A-Za-z0-9_-]{{1,{}}}",
                queue::MAX_QUEUE_NAME_LEN
            )));
        }

        let visibility_timeout = match attributes.get("VisibilityTimeout") {
            Some(raw) => parse_bounded(raw, "VisibilityTimeout", MAX_VISIBILITY_SECONDS)?,
            None => 30,
        };
        let delay_seconds = match attributes.get("DelaySeconds") {
            Some(raw) => parse_bounded(raw, "DelaySeconds", MAX_DELAY_SECONDS)?,
            None => 0,
        };

        let mut db = self.db.acquire().await?;

        db::queue::insert(
            &mut db,
            tenant,
            name,
            visibility_timeout,
            delay_seconds,
            now_ms(),
        )
        .await?;

        tracing::info!(tenant, queue = name, "Created queue");

        db::queue::find(&mut db, tenant, name)
            .await?
            .ok_or_else(|| Error::internal(eyre::eyre!("queue vanished after insert")))
    }

    pub async fn delete_queue(&self, tenant: u64, name: &str) -> Result<(), Error> {
        let mut db = self.db.acquire().await?;

        if !db::queue::delete(&mut db, tenant, name).await? {
            return Err(Error::queue_not_found(name));
        }

        tracing::info!(tenant, queue = name, "Deleted queue");

        Ok(())
    }

    pub async fn list_queues(
        &self,
        tenant: u64,
        prefix: Option<&str>,
    ) -> Result<Vec<Queue>, Error> {
        let mut db = self.db.acquire().await?;

        let queues = db::queue::list(&mut db, tenant).await?;

        Ok(match prefix {
            Some(prefix) => queues
                .into_iter()
                .filter(|q| q.name.starts_with(prefix))
                .collect(),
            None => queues,
        })
    }

    pub async fn get_queue(&self, tenant: u64, name: &str) -> Result<Queue, Error> {
        let mut db = self.db.acquire().await?;

        db::queue::find(&mut db, tenant, name)
            .await?
            .ok_or_else(|| Error::queue_not_found(name))
    }

    /// Best-effort purge: deletes the messages present at call time. Returns
    /// the number of rows removed.
    pub async fn purge_queue(&self, tenant: u64, name: &str) -> Result<u64, Error> {
        let queue = self.get_queue(tenant, name).await?;

        let mut db = self.db.acquire().await?;
        let purged = db::message::purge(&mut db, queue.id).await?;

        tracing::info!(tenant, queue = name, purged, "Purged queue");

        Ok(purged)
    }

    // --- message lifecycle ---

    /// Stores a message. `delay` and `visibility` fall back to the queue
    /// defaults when absent; both are validated against the SQS bounds.
    pub async fn enqueue(
        &self,
        tenant: u64,
        queue_name: &str,
        body: &[u8],
        attributes: BTreeMap<String, AttributeValue>,
        delay: Option<u64>,
        visibility: Option<u64>,
    ) -> Result<u64, Error> {
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(Error::invalid_parameter(format!(
                "message body exceeds {MAX_MESSAGE_SIZE} bytes"
            )));
        }

        let queue = self.get_queue(tenant, queue_name).await?;

        let delay = check_bounds(delay, "DelaySeconds", MAX_DELAY_SECONDS)?
            .unwrap_or(queue.delay_seconds);
        let visibility = check_bounds(visibility, "VisibilityTimeout", MAX_VISIBILITY_SECONDS)?
            .unwrap_or(queue.visibility_timeout);

        let now = now_ms();
        let state = if delay > 0 {
            MessageState::Delayed
        } else {
            MessageState::Visible
        };

        let mut tx = self.db.begin().await?;

        let id = db::message::insert(
            &mut tx,
            queue.id,
            body,
            &attributes,
            state,
            now + (delay * 1000) as i64,
            visibility,
            now,
        )
        .await?;

        tx.commit().await?;

        tracing::debug!(tenant, queue = queue_name, id, "Enqueued message");

        Ok(id)
    }

    /// Claims up to `max` messages, leasing each until now plus the
    /// per-receive `visibility` override or its stored timeout. `max` is
    /// clamped to `1..=10`. A `wait` of up to 20 seconds turns an empty
    /// result into a bounded sleep-poll.
    pub async fn dequeue(
        &self,
        tenant: u64,
        queue_name: &str,
        max: u64,
        visibility: Option<u64>,
        wait: Option<u64>,
    ) -> Result<Vec<Message>, Error> {
        let queue = self.get_queue(tenant, queue_name).await?;

        let max = max.clamp(1, MAX_BATCH);
        let visibility = check_bounds(visibility, "VisibilityTimeout", MAX_VISIBILITY_SECONDS)?;
        let wait = check_bounds(wait, "WaitTimeSeconds", MAX_WAIT_SECONDS)?.unwrap_or(0);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(wait);

        loop {
            let messages = self.claim(queue.id, max, visibility).await?;

            if !messages.is_empty() || tokio::time::Instant::now() >= deadline {
                return Ok(messages);
            }

            tokio::time::sleep(POLL_INTERVAL.min(deadline - tokio::time::Instant::now())).await;
        }
    }

    async fn claim(
        &self,
        queue: u64,
        max: u64,
        visibility: Option<u64>,
    ) -> Result<Vec<Message>, Error> {
        let mut tx = self.db.begin().await?;

        let mut messages = db::message::claim(&mut tx, queue, now_ms(), visibility, max).await?;
        db::message::load_attributes(&mut tx, &mut messages).await?;

        tx.commit().await?;

        Ok(messages)
    }

    /// Tombstones a message. Deleting an already tombstoned message is fine;
    /// `MessageNotFound` is only returned for ids that never existed in this
    /// queue.
    pub async fn delete_message(&self, tenant: u64, queue_name: &str, id: u64) -> Result<(), Error> {
        let queue = self.get_queue(tenant, queue_name).await?;

        let mut db = self.db.acquire().await?;

        if !db::message::tombstone(&mut db, queue.id, id).await? {
            return Err(Error::MessageNotFound { id });
        }

        tracing::debug!(tenant, queue = queue_name, id, "Deleted message");

        Ok(())
    }

    // --- observability ---

    /// Non-mutating single-message inspection.
    pub async fn peek(
        &self,
        tenant: u64,
        queue_name: &str,
        id: u64,
    ) -> Result<Option<Message>, Error> {
        let queue = self.get_queue(tenant, queue_name).await?;

        let mut db = self.db.acquire().await?;
        db::message::peek(&mut db, queue.id, id).await
    }

    /// Ids of messages matching all criteria, capped at [`FILTER_LIMIT`].
    pub async fn filter(
        &self,
        tenant: u64,
        queue_name: &str,
        criteria: &FilterCriteria,
    ) -> Result<Vec<u64>, Error> {
        let queue = self.get_queue(tenant, queue_name).await?;

        let mut db = self.db.acquire().await?;
        let candidates =
            db::message::candidates(&mut db, queue.id, criteria.message_id, FILTER_LIMIT).await?;

        Ok(candidates
            .into_iter()
            .filter(|m| criteria.matches(m))
            .map(|m| m.id)
            .collect())
    }

    pub async fn stats(&self, tenant: u64, queue_name: &str) -> Result<QueueStats, Error> {
        let queue = self.get_queue(tenant, queue_name).await?;

        let mut db = self.db.acquire().await?;
        let rows = db::message::counts_by_state(&mut db, queue.id).await?;

        let counts: HashMap<MessageState, u64> = rows.into_iter().collect();
        let total_messages = counts
            .iter()
            .filter(|(state, _)| **state != MessageState::Tombstoned)
            .map(|(_, n)| n)
            .sum();

        Ok(QueueStats {
            total_messages,
            counts,
        })
    }
}

fn parse_bounded(raw: &str, name: &str, max: u64) -> Result<u64, Error> {
    let value = raw
        .parse::<u64>()
        .map_err(|_| Error::invalid_parameter(format!("{name} must be an integer")))?;

    check_bounds(Some(value), name, max)?;

    Ok(value)
}

fn check_bounds(value: Option<u64>, name: &str, max: u64) -> Result<Option<u64>, Error> {
    match value {
        Some(v) if v > max => Err(Error::invalid_parameter(format!(
            "{name} must be between 0 and {max}"
        ))),
        other => Ok(other),
    }
}
