use async_trait::async_trait;
use crate::models::{ Flow, FlowId, Message, MessageId };
use crate::store::{ plan_seed, MessageStore, StoreError, StoreKind, StoreResult };
use log::{ debug, info };
use redis::{ AsyncCommands, Client };
use redis::aio::MultiplexedConnection;

/// Key layout under a common prefix:
/// `message:{id}` holds the message JSON, `messages` is a sorted set of ids
/// scored by id, `flows` maps flow titles to ids, and `next_message_id` /
/// `next_flow_id` are the identifier counters.
struct Keys {
    prefix: String,
}

impl Keys {
    fn message(&self, id: MessageId) -> String {
        format!("{}message:{}", self.prefix, id)
    }

    fn messages(&self) -> String {
        format!("{}messages", self.prefix)
    }

    fn flows(&self) -> String {
        format!("{}flows", self.prefix)
    }

    fn next_message_id(&self) -> String {
        format!("{}next_message_id", self.prefix)
    }

    fn next_flow_id(&self) -> String {
        format!("{}next_flow_id", self.prefix)
    }
}

pub struct RedisMessageStore {
    client: Client,
    keys: Keys,
}

impl RedisMessageStore {
    pub fn new(url: &str, key_prefix: &str) -> StoreResult<Self> {
        Ok(Self {
            client: Client::open(url)?,
            keys: Keys { prefix: key_prefix.to_string() },
        })
    }

    async fn get_connection(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn write_message(
        &self,
        conn: &mut MultiplexedConnection,
        message: &Message
    ) -> StoreResult<()> {
        let json = serde_json::to_string(message)?;
        redis::pipe()
            .atomic()
            .set(self.keys.message(message.id), json)
            .ignore()
            .zadd(self.keys.messages(), message.id, message.id)
            .ignore()
            .query_async::<_, ()>(conn).await?;
        Ok(())
    }

    async fn assign_id(&self, conn: &mut MultiplexedConnection) -> StoreResult<MessageId> {
        Ok(conn.incr(self.keys.next_message_id(), 1).await?)
    }

    /// Writes `flow` unless its title is already registered. The message ids
    /// are reserved up front and every key, the title included, is written in
    /// one MULTI/EXEC block, so a failed seed leaves no partial flow behind.
    pub async fn seed(&self, flow: &Flow) -> StoreResult<bool> {
        let mut conn = self.get_connection().await?;
        let present: bool = conn.hexists(self.keys.flows(), &flow.title).await?;
        if present {
            info!("Flow '{}' already present in redis, skipping seed", flow.title);
            return Ok(false);
        }

        let count = MessageId::try_from(flow.messages.len()).map_err(|_| {
            StoreError::InvalidData(format!("flow '{}' has too many messages", flow.title))
        })?;
        let flow_id: FlowId = conn.incr(self.keys.next_flow_id(), 1).await?;
        let last_id: MessageId = conn.incr(self.keys.next_message_id(), count).await?;
        let planned = plan_seed(&flow.messages, last_id - count + 1, flow_id);

        let mut pipe = redis::pipe();
        pipe.atomic();
        for message in &planned {
            pipe.set(self.keys.message(message.id), serde_json::to_string(message)?)
                .ignore()
                .zadd(self.keys.messages(), message.id, message.id)
                .ignore();
        }
        pipe.hset(self.keys.flows(), &flow.title, flow_id).ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;

        info!("Seeded flow '{}' into redis ({} messages)", flow.title, planned.len());
        Ok(true)
    }
}

#[async_trait]
impl MessageStore for RedisMessageStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Persistent
    }

    async fn get_all(&self) -> StoreResult<Vec<Message>> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<MessageId> = conn.zrange(self.keys.messages(), 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| self.keys.message(*id))
            .collect();
        let entries: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn).await?;

        let mut messages = Vec::with_capacity(entries.len());
        for entry in entries.into_iter().flatten() {
            messages.push(serde_json::from_str(&entry)?);
        }
        Ok(messages)
    }

    async fn get_by_id(&self, id: MessageId) -> StoreResult<Message> {
        if id == 0 {
            return Err(StoreError::NotFound(id));
        }
        let mut conn = self.get_connection().await?;
        let entry: Option<String> = conn.get(self.keys.message(id)).await?;
        match entry {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn create_message(&self, message: Message) -> StoreResult<Message> {
        let mut conn = self.get_connection().await?;
        let id = self.assign_id(&mut conn).await?;
        let stored = Message { id, ..message };
        self.write_message(&mut conn, &stored).await?;
        debug!("Created message {}", id);
        Ok(stored)
    }

    async fn update_message(&self, message: Message) -> StoreResult<Message> {
        let mut conn = self.get_connection().await?;
        let exists: bool = conn.exists(self.keys.message(message.id)).await?;
        if message.id == 0 || !exists {
            debug!("Update of unknown message {} ignored", message.id);
            return Ok(message);
        }
        self.write_message(&mut conn, &message).await?;
        Ok(message)
    }

    async fn delete_message(&self, id: MessageId) -> StoreResult<()> {
        let mut conn = self.get_connection().await?;
        let exists: bool = conn.exists(self.keys.message(id)).await?;
        if !exists {
            return Err(StoreError::NotFound(id));
        }
        redis::pipe()
            .atomic()
            .del(self.keys.message(id))
            .ignore()
            .zrem(self.keys.messages(), id)
            .ignore()
            .query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}
