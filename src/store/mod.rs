mod memory;
mod redis;
mod sqlite;

pub use self::memory::MemoryMessageStore;
pub use self::redis::RedisMessageStore;
pub use self::sqlite::SqliteMessageStore;

use crate::cli::Args;
use crate::config::{ load_flow, load_messages };
use crate::models::{ FlowId, Message, MessageId, MessageOption };
use std::collections::HashMap;
use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message {0} not found")]
    NotFound(MessageId),

    #[error("message store is read-only")]
    ReadOnly,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task join error: {0}")]
    Task(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Loaded from the seed on every start, never mutated.
    Ephemeral,
    /// Seeded once, then mutated through the message operations.
    Persistent,
}

/// Storage capability behind the HTTP surface. Each call touches exactly one
/// message aggregate (the message and its options).
#[async_trait]
pub trait MessageStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    async fn get_all(&self) -> StoreResult<Vec<Message>>;

    async fn get_by_id(&self, id: MessageId) -> StoreResult<Message>;

    /// Inserts `message` under a freshly assigned identifier.
    async fn create_message(&self, message: Message) -> StoreResult<Message>;

    /// Replaces body, flow and options of `message.id` wholesale. An unknown
    /// identifier is a no-op and the input is returned unchanged.
    async fn update_message(&self, message: Message) -> StoreResult<Message>;

    async fn delete_message(&self, id: MessageId) -> StoreResult<()>;
}

pub async fn create_message_store(
    args: &Args
) -> Result<Arc<dyn MessageStore>, Box<dyn Error + Send + Sync>> {
    match args.store_type.to_lowercase().as_str() {
        "memory" => {
            let messages = load_messages(&args.seed_path)?;
            Ok(Arc::new(MemoryMessageStore::new(messages)?))
        }
        "sqlite" => {
            let flow = load_flow(&args.seed_path, &args.flow_title)?;
            let store = SqliteMessageStore::new(&args.db_path);
            store.init().await?;
            store.seed(&flow).await?;
            Ok(Arc::new(store))
        }
        "redis" => {
            let flow = load_flow(&args.seed_path, &args.flow_title)?;
            let store = RedisMessageStore::new(&args.redis_url, &args.redis_prefix)?;
            store.seed(&flow).await?;
            Ok(Arc::new(store))
        }
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported message store type: {}", args.store_type)
                    )
                )
            ),
    }
}

pub async fn initialize_message_store(
    args: &Args
) -> Result<Arc<dyn MessageStore>, Box<dyn Error + Send + Sync>> {
    info!("Dialog messages will be served from: {} (seed {})", args.store_type, args.seed_path);
    create_message_store(args).await
}

/// Lays a seed flow out on fresh store identifiers: the n-th source message
/// becomes `first_id + n`, so identifier order is source order. Option targets
/// that name a seed message are rewritten to its new identifier; targets
/// outside the seed are kept as they are.
pub(crate) fn plan_seed(messages: &[Message], first_id: MessageId, flow_id: FlowId) -> Vec<Message> {
    let mut renumbered: HashMap<MessageId, MessageId> = HashMap::with_capacity(messages.len());
    for (offset, message) in (0..).zip(messages) {
        renumbered.entry(message.id).or_insert(first_id + offset);
    }

    (0..)
        .zip(messages)
        .map(|(offset, message)| Message {
            id: first_id + offset,
            body: message.body.clone(),
            options: message.options
                .iter()
                .map(|option| MessageOption {
                    next_message_id: renumbered
                        .get(&option.next_message_id)
                        .copied()
                        .unwrap_or(option.next_message_id),
                    ..option.clone()
                })
                .collect(),
            flow_id: Some(flow_id),
        })
        .collect()
}
