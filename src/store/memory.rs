use async_trait::async_trait;
use crate::config::LoadError;
use crate::models::{ Message, MessageId };
use crate::store::{ MessageStore, StoreError, StoreKind, StoreResult };
use std::collections::HashMap;

/// Read-only store over the decoded seed. Identifiers come from the seed
/// document itself, so `0` is a valid message here.
pub struct MemoryMessageStore {
    messages: Vec<Message>,
    index: HashMap<MessageId, usize>,
}

impl MemoryMessageStore {
    pub fn new(messages: Vec<Message>) -> Result<Self, LoadError> {
        let mut index = HashMap::with_capacity(messages.len());
        for (position, message) in messages.iter().enumerate() {
            if index.insert(message.id, position).is_some() {
                return Err(LoadError::DuplicateId(message.id));
            }
        }
        Ok(Self {
            messages,
            index,
        })
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Ephemeral
    }

    async fn get_all(&self) -> StoreResult<Vec<Message>> {
        Ok(self.messages.clone())
    }

    async fn get_by_id(&self, id: MessageId) -> StoreResult<Message> {
        self.index
            .get(&id)
            .map(|&position| self.messages[position].clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn create_message(&self, _message: Message) -> StoreResult<Message> {
        Err(StoreError::ReadOnly)
    }

    async fn update_message(&self, _message: Message) -> StoreResult<Message> {
        Err(StoreError::ReadOnly)
    }

    async fn delete_message(&self, _id: MessageId) -> StoreResult<()> {
        Err(StoreError::ReadOnly)
    }
}
