use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    S3,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

/// Runtime configuration for the ingestion/enrichment/consolidation pipeline.
///
/// Every field named in spec.md §6 "Configuration options" is represented here,
/// layered from an optional `config` file and then environment variables (the
/// same precedence the rest of the stack uses), with defaults matching the
/// spec's stated defaults so a bare environment still boots.
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Bedrock-shaped AI endpoint base (chat + embedding invocations are POSTed here).
    pub ai_base_url: String,
    #[serde(default)]
    pub ai_api_key: Option<String>,

    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default)]
    pub default_s3_bucket: Option<String>,
    #[serde(default)]
    pub default_json_file_path: Option<String>,

    /// Chat-completion permits per second (spec.md §4.5 rate limiter, default 0.5).
    #[serde(default = "default_chat_qps")]
    pub chat_qps: f64,
    /// Embedding permits per second (default 5.0).
    #[serde(default = "default_embed_qps")]
    pub embed_qps: f64,

    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_queue_url")]
    pub queue_url: String,
    #[serde(default = "default_queue_visibility_sec")]
    pub queue_visibility_sec: i64,
    #[serde(default = "default_throttle_delay_sec")]
    pub throttle_delay_sec: i64,
    #[serde(default = "default_max_receive_count")]
    pub queue_max_receive_count: u32,

    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_embedding_model_id")]
    pub embedding_model_id: String,
    #[serde(default = "default_bedrock_max_tokens")]
    pub bedrock_max_tokens: u32,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    #[serde(default = "default_length_threshold")]
    pub length_threshold: usize,
    #[serde(default = "default_sentences_per_chunk")]
    pub sentences_per_chunk: usize,
    #[serde(default = "default_sentence_overlap")]
    pub sentence_overlap: usize,

    #[serde(default = "default_deduplicate_consolidated")]
    pub deduplicate_consolidated: bool,

    #[serde(default = "default_ingest_max_files")]
    pub ingest_max_files: usize,
    #[serde(default = "default_ingest_max_content_bytes")]
    pub ingest_max_content_bytes: usize,
    #[serde(default = "default_ingest_max_context_bytes")]
    pub ingest_max_context_bytes: usize,
    #[serde(default = "default_ingest_max_category_bytes")]
    pub ingest_max_category_bytes: usize,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_chat_qps() -> f64 {
    0.5
}

fn default_embed_qps() -> f64 {
    5.0
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_queue_url() -> String {
    "mem://enrichment_queue".to_string()
}

fn default_queue_visibility_sec() -> i64 {
    300
}

fn default_throttle_delay_sec() -> i64 {
    180
}

fn default_max_receive_count() -> u32 {
    5
}

fn default_model_id() -> String {
    "anthropic.claude-3-haiku".to_string()
}

fn default_embedding_model_id() -> String {
    "amazon.titan-embed-text-v2".to_string()
}

fn default_bedrock_max_tokens() -> u32 {
    1024
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_length_threshold() -> usize {
    500
}

fn default_sentences_per_chunk() -> usize {
    2
}

fn default_sentence_overlap() -> usize {
    1
}

fn default_deduplicate_consolidated() -> bool {
    true
}

fn default_ingest_max_files() -> usize {
    50
}

fn default_ingest_max_content_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_ingest_max_context_bytes() -> usize {
    256 * 1024
}

fn default_ingest_max_category_bytes() -> usize {
    256
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: "ws://localhost:8000".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "enrichment".to_string(),
            surrealdb_database: "enrichment".to_string(),
            data_dir: default_data_dir(),
            http_port: default_http_port(),
            ai_base_url: "http://localhost:4000".to_string(),
            ai_api_key: None,
            storage: default_storage_kind(),
            default_s3_bucket: None,
            default_json_file_path: None,
            chat_qps: default_chat_qps(),
            embed_qps: default_embed_qps(),
            worker_pool_size: default_worker_pool_size(),
            queue_url: default_queue_url(),
            queue_visibility_sec: default_queue_visibility_sec(),
            throttle_delay_sec: default_throttle_delay_sec(),
            queue_max_receive_count: default_max_receive_count(),
            model_id: default_model_id(),
            embedding_model_id: default_embedding_model_id(),
            bedrock_max_tokens: default_bedrock_max_tokens(),
            embedding_dimension: default_embedding_dimension(),
            length_threshold: default_length_threshold(),
            sentences_per_chunk: default_sentences_per_chunk(),
            sentence_overlap: default_sentence_overlap(),
            deduplicate_consolidated: default_deduplicate_consolidated(),
            ingest_max_files: default_ingest_max_files(),
            ingest_max_content_bytes: default_ingest_max_content_bytes(),
            ingest_max_context_bytes: default_ingest_max_context_bytes(),
            ingest_max_category_bytes: default_ingest_max_category_bytes(),
        }
    }
}

impl AppConfig {
    /// The rate limiter floors both gates at 0.1 QPS regardless of configuration
    /// (spec.md §4.5 "Both enforce a minimum of 0.1").
    pub fn chat_qps_clamped(&self) -> f64 {
        self.chat_qps.max(0.1)
    }

    pub fn embed_qps_clamped(&self) -> f64 {
        self.embed_qps.max(0.1)
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
