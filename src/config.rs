use log::{error, info};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::clock::SystemClock;
use crate::store::Store;
use crate::voting::VotingService;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // secrets
    jwt_secret: String,
}

impl Config {
    /// Secret key used to sign and verify JWTs. Shared with the identity
    /// service that issues them.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which storage backend to run on.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Mongodb,
    Memory,
}

/// Configuration for the storage layer.
#[derive(Deserialize)]
struct StorageConfig {
    #[serde(default)]
    storage: StorageBackend,
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: Option<String>,
}

fn default_db_name() -> String {
    "campus".to_string()
}

/// A fairing that loads the storage config, connects to the database if
/// needed, performs any setup necessary, and places the `VotingService`
/// into managed state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Storage",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StorageConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load storage config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let store = match config.storage {
            StorageBackend::Memory => {
                info!("Using in-memory storage; nothing will survive a restart");
                Store::memory()
            }
            StorageBackend::Mongodb => {
                let Some(db_uri) = config.db_uri else {
                    error!("`db_uri` must be set when `storage = \"mongodb\"`");
                    return Err(rocket);
                };
                info!("Loaded database config, connecting...");
                // Construct the connection.
                let client = match MongoClient::with_uri_str(db_uri).await {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                let db = client.database(&config.db_name);

                // Ensure the required indexes exist.
                match Store::mongodb(client, &db).await {
                    Ok(store) => {
                        info!("...database connection online!");
                        store
                    }
                    Err(e) => {
                        error!("Failed to prepare database: {e}");
                        return Err(rocket);
                    }
                }
            }
        };

        // Manage the state.
        rocket = rocket.manage(VotingService::new(store, SystemClock));
        Ok(rocket)
    }
}

/// Get a fresh database name for a test, to avoid collisions between tests.
#[cfg(test)]
pub(crate) fn test_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

#[cfg(test)]
mod tests {
    use rocket::figment::{providers::Serialized, Figment};

    use super::*;

    #[test]
    fn storage_defaults_to_mongodb() {
        let figment = Figment::from(Serialized::default("db_uri", "mongodb://localhost"));
        let config: StorageConfig = figment.extract().unwrap();
        assert_eq!(config.storage, StorageBackend::Mongodb);
        assert_eq!(config.db_name, "campus");
    }

    #[test]
    fn memory_storage_needs_no_uri() {
        let figment = Figment::from(Serialized::default("storage", "memory"));
        let config: StorageConfig = figment.extract().unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.db_uri.is_none());
    }

    #[test]
    fn jwt_secret_is_required() {
        let figment = Figment::from(Serialized::default("jwt_secret", "s3cret"));
        let config: Config = figment.extract().unwrap();
        assert_eq!(config.jwt_secret(), b"s3cret");
        assert!(Figment::new().extract::<Config>().is_err());
    }
}
