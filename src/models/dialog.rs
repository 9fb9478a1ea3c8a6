use serde::{ Deserialize, Deserializer, Serialize };

pub type MessageId = u32;
pub type FlowId = u32;

/// One selectable choice on a message. `next_message_id` is a plain
/// identifier: it may point at a message that does not exist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOption {
    #[serde(default, alias = "ID")]
    pub id: u32,
    pub body: String,
    #[serde(rename = "nextMessageId")]
    pub next_message_id: MessageId,
}

/// A node of the dialog tree. Options are kept in presentation order; a
/// message without options is a terminal node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, alias = "ID")]
    pub id: MessageId,
    pub body: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub options: Vec<MessageOption>,
    #[serde(
        rename = "flowId",
        alias = "FlowID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub flow_id: Option<FlowId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(default)]
    pub id: FlowId,
    pub title: String,
    pub messages: Vec<Message>,
}

impl Flow {
    pub fn new(title: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            messages,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<MessageOption>, D::Error>
    where D: Deserializer<'de>
{
    Ok(Option::<Vec<MessageOption>>::deserialize(deserializer)?.unwrap_or_default())
}
