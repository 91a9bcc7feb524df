use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

pub mod defaults {
    pub const DB_PATH: &str = "burrow.db";
    pub const HOST: &str = "127.0.0.1";
    pub const API_PORT: u16 = 3001;
    pub const UI_PORT: u16 = 3000;
    pub const REGION: &str = "us-east-1";
    pub const ROOT_ACCESS_KEY_ID: &str = "burrow-root";
    pub const ROOT_SECRET_ACCESS_KEY: &str = "burrow-secret";
}

#[derive(Clone, Deserialize, Default)]
pub struct Config {
    pub db_path: Option<String>,
    pub host: Option<String>,
    pub api_port: Option<u16>,
    pub ui_port: Option<u16>,

    /// Region name embedded in queue URLs. SigV4 credential scopes are accepted
    /// for any region; this one is what we hand back to clients.
    pub region: Option<String>,

    pub root_access_key_id: Option<String>,
    pub root_secret_access_key: Option<SecretString>,
}

impl Config {
    pub fn load() -> eyre::Result<Self> {
        Ok(envy::prefixed("BURROW_").from_env::<Self>()?)
    }

    pub fn db_path(&self) -> &str {
        self.db_path.as_deref().unwrap_or(defaults::DB_PATH)
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(defaults::HOST)
    }

    pub fn api_port(&self) -> u16 {
        self.api_port.unwrap_or(defaults::API_PORT)
    }

    pub fn ui_port(&self) -> u16 {
        self.ui_port.unwrap_or(defaults::UI_PORT)
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(defaults::REGION)
    }

    pub fn root_access_key_id(&self) -> &str {
        self.root_access_key_id
            .as_deref()
            .unwrap_or(defaults::ROOT_ACCESS_KEY_ID)
    }

    pub fn root_secret_access_key(&self) -> &str {
        self.root_secret_access_key
            .as_ref()
            .map(|s| s.expose_secret())
            .unwrap_or(defaults::ROOT_SECRET_ACCESS_KEY)
    }

    pub fn uses_default_credentials(&self) -> bool {
        self.root_access_key_id.is_none() || self.root_secret_access_key.is_none()
    }
}
