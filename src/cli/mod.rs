use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Message Store Args ---
    /// Message store type (memory, sqlite, redis). `memory` is read-only.
    #[arg(long, env = "STORE_TYPE", default_value = "sqlite")]
    pub store_type: String,

    /// Path to the JSON seed document (an array of messages with nested options).
    #[arg(long, env = "SEED_PATH", default_value = "data.json")]
    pub seed_path: String,

    /// Title given to the seeded flow. Seeding is skipped when a flow with this title exists.
    #[arg(long, env = "FLOW_TITLE", default_value = "default")]
    pub flow_title: String,

    /// SQLite database file used by the `sqlite` store.
    #[arg(long, env = "DB_PATH", default_value = "assistant.db")]
    pub db_path: String,

    /// Redis endpoint used by the `redis` store (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Prefix for every Redis key written by the `redis` store.
    #[arg(long, env = "REDIS_PREFIX", default_value = "assistant:")]
    pub redis_prefix: String,

    // --- HTTP Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    /// Versioned prefix every route is mounted under.
    #[arg(long, env = "API_PREFIX", default_value = "/api/v1")]
    pub api_prefix: String,

    /// Message returned by `/assist/` when no id is given.
    /// Defaults to 0 for the memory store and 1 for persistent stores.
    #[arg(long, env = "DEFAULT_MESSAGE_ID")]
    pub default_message_id: Option<u32>,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
