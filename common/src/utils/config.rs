use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

/// Where the documents for a run come from.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Download everything under the key prefix first, then ingest the local copy.
    S3,
    /// Ingest `documents_path` as it is, e.g. a mounted volume.
    Local,
}

fn default_source_kind() -> SourceKind {
    SourceKind::S3
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_source_kind")]
    pub source: SourceKind,
    #[serde(default = "default_documents_path")]
    pub documents_path: String,
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,

    #[serde(default)]
    pub s3_endpoint: String,
    #[serde(default)]
    pub s3_bucket: String,
    #[serde(default)]
    pub s3_prefix: String,
    #[serde(default)]
    pub s3_access_key: String,
    #[serde(default)]
    pub s3_secret_key: String,
    #[serde(default = "default_s3_region")]
    pub s3_region: String,
    #[serde(default = "default_s3_page_size")]
    pub s3_page_size: usize,

    #[serde(default = "default_service_url")]
    pub service_url: String,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_ingest_concurrency")]
    pub ingest_concurrency: usize,
    #[serde(default = "default_source_tag")]
    pub source_tag: String,

    #[serde(default = "default_db_host")]
    pub db_host: String,
    #[serde(default = "default_db_port")]
    pub db_port: u16,
    #[serde(default = "default_db_user")]
    pub db_user: String,
    pub db_password: String,
    #[serde(default = "default_db_name")]
    pub db_name: String,

    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,
}

fn default_documents_path() -> String {
    "/tmp/documents".to_string()
}

fn default_file_extensions() -> Vec<String> {
    vec![".md".to_string(), ".txt".to_string(), ".html".to_string()]
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

/// S3 caps a single `ListObjectsV2` response at 1000 keys.
fn default_s3_page_size() -> usize {
    1000
}

fn default_service_url() -> String {
    "http://vector-search-service:8000".to_string()
}

fn default_collection_name() -> String {
    "default".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_ingest_concurrency() -> usize {
    1
}

fn default_source_tag() -> String {
    "document-ingestion-pipeline".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "raguser".to_string()
}

fn default_db_name() -> String {
    "ragdb".to_string()
}

fn default_artifacts_dir() -> String {
    "./artifacts".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: default_source_kind(),
            documents_path: default_documents_path(),
            file_extensions: default_file_extensions(),
            s3_endpoint: String::new(),
            s3_bucket: String::new(),
            s3_prefix: String::new(),
            s3_access_key: String::new(),
            s3_secret_key: String::new(),
            s3_region: default_s3_region(),
            s3_page_size: default_s3_page_size(),
            service_url: default_service_url(),
            collection_name: default_collection_name(),
            batch_size: default_batch_size(),
            request_timeout_secs: default_request_timeout_secs(),
            ingest_concurrency: default_ingest_concurrency(),
            source_tag: default_source_tag(),
            db_host: default_db_host(),
            db_port: default_db_port(),
            db_user: default_db_user(),
            db_password: String::new(),
            db_name: default_db_name(),
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

impl AppConfig {
    /// Rejects settings that would make a stage misbehave instead of failing loudly.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.batch_size == 0 {
            return Err(AppError::Validation("batch_size must be greater than 0".into()));
        }
        if self.ingest_concurrency == 0 {
            return Err(AppError::Validation(
                "ingest_concurrency must be greater than 0".into(),
            ));
        }
        if self.s3_page_size == 0 {
            return Err(AppError::Validation("s3_page_size must be greater than 0".into()));
        }
        if self.file_extensions.iter().all(|ext| ext.is_empty()) {
            return Err(AppError::Validation(
                "file_extensions must contain at least one extension".into(),
            ));
        }
        if self.source == SourceKind::S3 {
            if self.s3_endpoint.trim().is_empty() {
                return Err(AppError::Validation(
                    "s3_endpoint is required when source is s3".into(),
                ));
            }
            if self.s3_bucket.trim().is_empty() {
                return Err(AppError::Validation(
                    "s3_bucket is required when source is s3".into(),
                ));
            }
        }
        Ok(())
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::default()
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("file_extensions"),
        )
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> AppConfig {
        AppConfig {
            source: SourceKind::Local,
            ..Default::default()
        }
    }

    #[test]
    fn defaults_validate_for_local_source() {
        let cfg = local_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.file_extensions, vec![".md", ".txt", ".html"]);
        assert_eq!(cfg.request_timeout_secs, 300);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let cfg = AppConfig {
            batch_size: 0,
            ..local_config()
        };
        assert!(matches!(cfg.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let cfg = AppConfig {
            ingest_concurrency: 0,
            ..local_config()
        };
        assert!(matches!(cfg.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn s3_source_requires_endpoint_and_bucket() {
        let cfg = AppConfig::default();
        assert!(matches!(cfg.validate(), Err(AppError::Validation(_))));

        let cfg = AppConfig {
            s3_endpoint: "https://minio.local".into(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(AppError::Validation(_))));

        let cfg = AppConfig {
            s3_endpoint: "https://minio.local".into(),
            s3_bucket: "kb-documents".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserializes_with_only_required_keys() {
        let cfg: AppConfig = Config::builder()
            .set_override("db_password", "secret")
            .expect("override")
            .set_override("source", "local")
            .expect("override")
            .build()
            .expect("build config")
            .try_deserialize()
            .expect("deserialize config");

        assert_eq!(cfg.source, SourceKind::Local);
        assert_eq!(cfg.db_password, "secret");
        assert_eq!(cfg.db_port, 5432);
        assert_eq!(cfg.collection_name, "default");
    }

    #[test]
    fn missing_password_fails_deserialization() {
        let result: Result<AppConfig, _> = Config::builder()
            .build()
            .expect("build config")
            .try_deserialize();
        assert!(result.is_err());
    }
}
