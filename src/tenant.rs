use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// An isolation boundary keyed by an AWS access key id.
///
/// Tenants are provisioned out of band (at startup from configuration, or by
/// an operator through the engine); the wire API can neither create nor
/// destroy them. Every queue and message belongs to exactly one tenant, and
/// every storage query is scoped by the tenant id resolved during
/// authentication.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: u64,
    pub access_key_id: String,
    #[serde(skip_serializing)]
    pub secret_access_key: String,
    pub created_at: i64,
}

impl PartialEq for Tenant {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
