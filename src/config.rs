use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Runtime configuration. Every field can be overridden with a
/// `WISHLISTS_`-prefixed environment variable, e.g. `WISHLISTS_DATABASE_URL`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub loglevel: String,
    /// Sessions created earlier than this many days ago are purged at startup.
    pub session_ttl_days: u32,
    /// Extra connection attempts before giving up on the database.
    pub connect_retries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/wishlists.sqlite".to_string(),
            loglevel: "info".to_string(),
            session_ttl_days: 7,
            connect_retries: 3,
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Env::prefixed("WISHLISTS_"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// The database url with any password masked, safe to log.
    pub fn redacted_database_url(&self) -> String {
        match Url::parse(&self.database_url) {
            Ok(mut url) if url.password().is_some() => match url.set_password(Some("***")) {
                Ok(()) => url.to_string(),
                Err(()) => "***".to_string(),
            },
            _ => self.database_url.clone(),
        }
    }
}
