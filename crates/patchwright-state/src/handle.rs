//! SurrealDB Handle - Connection and Schema
//!
//! Supports the embedded in-memory engine (`mem://`) and any remote URL the
//! `any` engine understands (`ws://`, `wss://`). Remote connections may sign
//! in as a root user when credentials are supplied.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::schema::SCHEMA;
use crate::storage_traits::StorageResult;

const NAMESPACE: &str = "patchwright";
const DATABASE: &str = "main";

/// Root credentials for a remote SurrealDB instance
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// SurrealDB connection handle with the Patchwright schema applied
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

impl SurrealHandle {
    /// Connect to SurrealDB in-memory and set up the schema
    #[instrument(skip_all)]
    pub async fn setup_db() -> StorageResult<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        Self::connect("mem://", None).await
    }

    /// Connect to `url`, optionally sign in, select the namespace and apply the schema
    #[instrument(skip(credentials))]
    pub async fn connect(url: &str, credentials: Option<Credentials>) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StorageError::Connection(format!("failed to connect to {url}: {e}")))?;

        if let Some(creds) = credentials {
            db.signin(Root {
                username: &creds.username,
                password: &creds.password,
            })
            .await
            .map_err(|e| StorageError::Connection(format!("root authentication failed: {e}")))?;
        }

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let handle = SurrealHandle { db };
        handle.init_schema().await?;
        info!(url, "SurrealDB connected and schema initialized");
        Ok(handle)
    }

    /// Connect using environment variables
    ///
    /// Reads `SURREALDB_URL` (falls back to in-memory when unset) and the
    /// optional `SURREALDB_USERNAME` / `SURREALDB_PASSWORD` pair.
    pub async fn setup_from_env() -> StorageResult<Self> {
        let Ok(url) = std::env::var("SURREALDB_URL") else {
            return Self::setup_db().await;
        };
        let credentials = match (
            std::env::var("SURREALDB_USERNAME"),
            std::env::var("SURREALDB_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) => Some(Credentials { username, password }),
            _ => None,
        };
        Self::connect(&url, credentials).await
    }

    async fn init_schema(&self) -> StorageResult<()> {
        debug!("Initializing Patchwright schema");
        self.db
            .query(SCHEMA)
            .await
            .map_err(|e| StorageError::SchemaSetup(e.to_string()))?
            .check()
            .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
        Ok(())
    }

    pub(crate) fn db(&self) -> &Surreal<Any> {
        &self.db
    }
}
