use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

use crate::{
    error::AppError, storage::types::verification::VerificationSnapshot,
    utils::config::AppConfig,
};

const DOCUMENT_STATS: &str = r"
    SELECT
        COUNT(*) AS total_documents,
        COUNT(DISTINCT collection_id) AS total_collections
    FROM documents
";

const EMBEDDING_STATS: &str = r"
    SELECT COUNT(*) AS total_embeddings
    FROM embeddings
";

/// Connection parameters for the indexing service's PostgreSQL database.
#[derive(Clone)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DbSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            host: cfg.db_host.clone(),
            port: cfg.db_port,
            user: cfg.db_user.clone(),
            password: cfg.db_password.clone(),
            database: cfg.db_name.clone(),
        }
    }
}

impl std::fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

pub struct PostgresClient {
    pub client: Client,
}

impl PostgresClient {
    /// # Open a connection to the database
    ///
    /// The connection future is driven on a background task for as long as the
    /// returned client is alive.
    pub async fn connect(settings: &DbSettings) -> Result<Self, AppError> {
        let (client, connection) = tokio_postgres::Config::new()
            .host(&settings.host)
            .port(settings.port)
            .user(&settings.user)
            .password(&settings.password)
            .dbname(&settings.database)
            .connect(NoTls)
            .await?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection closed with error");
            }
        });

        debug!(host = %settings.host, port = settings.port, "connected to postgres");

        Ok(Self { client })
    }

    /// Read the global document, collection and embedding counts.
    pub async fn snapshot(&self) -> Result<VerificationSnapshot, AppError> {
        let doc_stats = self.client.query_one(DOCUMENT_STATS, &[]).await?;
        let total_documents: i64 = doc_stats.try_get(0)?;
        let total_collections: i64 = doc_stats.try_get(1)?;

        let emb_stats = self.client.query_one(EMBEDDING_STATS, &[]).await?;
        let total_embeddings: i64 = emb_stats.try_get(0)?;

        Ok(VerificationSnapshot {
            total_documents,
            total_collections,
            total_embeddings,
        })
    }
}
