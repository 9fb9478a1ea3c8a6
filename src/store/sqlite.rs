use async_trait::async_trait;
use crate::models::{ Flow, FlowId, Message, MessageId, MessageOption };
use crate::store::{ plan_seed, MessageStore, StoreError, StoreKind, StoreResult };
use log::{ debug, info };
use rusqlite::{ params, Connection, OptionalExtension };
use std::collections::HashMap;
use std::path::{ Path, PathBuf };

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS flows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        body TEXT NOT NULL,
        flow_id INTEGER
    );

    CREATE TABLE IF NOT EXISTS message_options (
        message_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        option_id INTEGER NOT NULL,
        body TEXT NOT NULL,
        next_message_id INTEGER NOT NULL,
        PRIMARY KEY (message_id, position),
        FOREIGN KEY(message_id) REFERENCES messages(id) ON DELETE CASCADE
    );
"#;

/// Next identifier AUTOINCREMENT would hand out, counting deleted rows.
const NEXT_MESSAGE_ID: &str = r#"
    SELECT MAX(
        COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'messages'), 0),
        COALESCE((SELECT MAX(id) FROM messages), 0)
    ) + 1
"#;

/// Persistent store backed by a single SQLite file. `flow_id` and
/// `next_message_id` are plain columns without foreign keys.
#[derive(Debug, Clone)]
pub struct SqliteMessageStore {
    db_path: PathBuf,
}

impl SqliteMessageStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    async fn with_connection<T, F>(&self, func: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = open_connection(&db_path)?;
            func(&mut connection)
        }).await.map_err(|e| StoreError::Task(e.to_string()))?
    }

    pub async fn init(&self) -> StoreResult<()> {
        self.with_connection(|connection| {
            connection.execute_batch(SCHEMA)?;
            Ok(())
        }).await
    }

    /// Writes `flow` and its messages unless a flow with the same title is
    /// already stored. Returns whether anything was written.
    ///
    /// Seed messages are numbered from the next free identifier in source
    /// order, so the first message of the first flow is message 1.
    pub async fn seed(&self, flow: &Flow) -> StoreResult<bool> {
        let flow = flow.clone();
        let title = flow.title.clone();

        let seeded = self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            let existing: Option<FlowId> = tx
                .query_row("SELECT id FROM flows WHERE title = ?1", params![flow.title], |row| row.get(0))
                .optional()?;
            if existing.is_some() {
                return Ok(false);
            }

            tx.execute("INSERT INTO flows (title) VALUES (?1)", params![flow.title])?;
            let flow_id = row_id(tx.last_insert_rowid())?;
            let first_id = row_id(tx.query_row(NEXT_MESSAGE_ID, [], |row| row.get::<_, i64>(0))?)?;

            for message in plan_seed(&flow.messages, first_id, flow_id) {
                insert_message(&tx, Some(message.id), &message.body, message.flow_id, &message.options)?;
            }
            tx.commit()?;
            Ok(true)
        }).await?;

        if seeded {
            info!("Seeded flow '{}' into {}", title, self.db_path.display());
        } else {
            info!("Flow '{}' already present in {}, skipping seed", title, self.db_path.display());
        }
        Ok(seeded)
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Persistent
    }

    async fn get_all(&self) -> StoreResult<Vec<Message>> {
        self.with_connection(|connection| {
            let mut options = load_all_options(connection)?;
            let mut statement = connection.prepare("SELECT id, body, flow_id FROM messages ORDER BY id")?;
            let rows = statement.query_map([], |row| {
                Ok((row.get::<_, MessageId>(0)?, row.get::<_, String>(1)?, row.get::<_, Option<FlowId>>(2)?))
            })?;

            let mut messages = Vec::new();
            for row in rows {
                let (id, body, flow_id) = row?;
                messages.push(Message {
                    id,
                    body,
                    options: options.remove(&id).unwrap_or_default(),
                    flow_id,
                });
            }
            Ok(messages)
        }).await
    }

    async fn get_by_id(&self, id: MessageId) -> StoreResult<Message> {
        if id == 0 {
            return Err(StoreError::NotFound(id));
        }
        self.with_connection(move |connection| {
            let found = connection
                .query_row(
                    "SELECT body, flow_id FROM messages WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<FlowId>>(1)?))
                )
                .optional()?;
            let (body, flow_id) = found.ok_or(StoreError::NotFound(id))?;
            Ok(Message {
                id,
                body,
                options: load_options(connection, id)?,
                flow_id,
            })
        }).await
    }

    async fn create_message(&self, message: Message) -> StoreResult<Message> {
        self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            let id = insert_message(&tx, None, &message.body, message.flow_id, &message.options)?;
            tx.commit()?;
            debug!("Created message {}", id);
            Ok(Message { id, ..message })
        }).await
    }

    async fn update_message(&self, message: Message) -> StoreResult<Message> {
        self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            let changed = tx.execute(
                "UPDATE messages SET body = ?1, flow_id = ?2 WHERE id = ?3",
                params![message.body, message.flow_id, message.id]
            )?;
            if changed == 0 {
                debug!("Update of unknown message {} ignored", message.id);
                return Ok(message);
            }

            tx.execute("DELETE FROM message_options WHERE message_id = ?1", params![message.id])?;
            insert_options(&tx, message.id, &message.options)?;
            tx.commit()?;
            Ok(message)
        }).await
    }

    async fn delete_message(&self, id: MessageId) -> StoreResult<()> {
        self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            let exists = tx
                .query_row("SELECT 1 FROM messages WHERE id = ?1", params![id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Err(StoreError::NotFound(id));
            }

            tx.execute("DELETE FROM message_options WHERE message_id = ?1", params![id])?;
            tx.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(())
        }).await
    }
}

fn open_connection(path: &Path) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let connection = Connection::open(path)?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        PRAGMA synchronous = NORMAL;
        "#
    )?;
    Ok(connection)
}

fn row_id(raw: i64) -> StoreResult<u32> {
    u32::try_from(raw).map_err(|_| StoreError::InvalidData(format!("row id {} out of range", raw)))
}

/// `id: None` lets SQLite assign the next identifier.
fn insert_message(
    connection: &Connection,
    id: Option<MessageId>,
    body: &str,
    flow_id: Option<FlowId>,
    options: &[MessageOption]
) -> StoreResult<MessageId> {
    connection.execute(
        "INSERT INTO messages (id, body, flow_id) VALUES (?1, ?2, ?3)",
        params![id, body, flow_id]
    )?;
    let id = row_id(connection.last_insert_rowid())?;
    insert_options(connection, id, options)?;
    Ok(id)
}

fn insert_options(
    connection: &Connection,
    message_id: MessageId,
    options: &[MessageOption]
) -> StoreResult<()> {
    let mut statement = connection.prepare(
        r#"
        INSERT INTO message_options (message_id, position, option_id, body, next_message_id)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#
    )?;
    for (position, option) in options.iter().enumerate() {
        statement.execute(
            params![message_id, position as i64, option.id, option.body, option.next_message_id]
        )?;
    }
    Ok(())
}

fn load_options(connection: &Connection, message_id: MessageId) -> StoreResult<Vec<MessageOption>> {
    let mut statement = connection.prepare(
        r#"
        SELECT option_id, body, next_message_id
        FROM message_options
        WHERE message_id = ?1
        ORDER BY position
        "#
    )?;
    let options = statement
        .query_map(params![message_id], |row| {
            Ok(MessageOption {
                id: row.get(0)?,
                body: row.get(1)?,
                next_message_id: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(options)
}

fn load_all_options(connection: &Connection) -> StoreResult<HashMap<MessageId, Vec<MessageOption>>> {
    let mut statement = connection.prepare(
        r#"
        SELECT message_id, option_id, body, next_message_id
        FROM message_options
        ORDER BY message_id, position
        "#
    )?;
    let rows = statement.query_map([], |row| {
        let option = MessageOption {
            id: row.get(1)?,
            body: row.get(2)?,
            next_message_id: row.get(3)?,
        };
        Ok((row.get::<_, MessageId>(0)?, option))
    })?;

    let mut grouped: HashMap<MessageId, Vec<MessageOption>> = HashMap::new();
    for row in rows {
        let (message_id, option) = row?;
        grouped.entry(message_id).or_default().push(option);
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{ tempdir, TempDir };

    fn option(id: u32, body: &str, next: MessageId) -> MessageOption {
        MessageOption { id, body: body.into(), next_message_id: next }
    }

    fn message(id: MessageId, body: &str, options: Vec<MessageOption>) -> Message {
        Message { id, body: body.into(), options, flow_id: None }
    }

    fn targets(message: &Message) -> Vec<MessageId> {
        message.options
            .iter()
            .map(|o| o.next_message_id)
            .collect()
    }

    /// Source ids 0, 1, 2, 3, 7 are stored as 1, 2, 3, 4, 5.
    fn seed_flow(title: &str) -> Flow {
        Flow::new(title, vec![
            message(0, "Hello, I am a virtual assistant. How can I help you?", vec![
                option(1, "Restore password", 3),
                option(2, "Something else", 1)
            ]),
            message(1, "Let me clarify what exactly you need?", vec![
                option(1, "Billing", 2),
                option(2, "Done", 7)
            ]),
            message(2, "Write to billing@help.com", vec![option(1, "Thanks", 7)]),
            message(3, "Follow the [link](http://help.com/pwd)", vec![option(1, "Thanks", 7)]),
            message(7, "Thank you for using our service!", Vec::new())
        ])
    }

    async fn seeded_store() -> (TempDir, SqliteMessageStore) {
        let dir = tempdir().expect("temp dir");
        let store = SqliteMessageStore::new(dir.path().join("assistant.db"));
        store.init().await.expect("init store");
        assert!(store.seed(&seed_flow("default")).await.expect("seed"));
        (dir, store)
    }

    #[tokio::test]
    async fn seed_numbers_messages_in_source_order() {
        let (_dir, store) = seeded_store().await;

        let all = store.get_all().await.expect("get all");
        let ids: Vec<_> = all.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert!(all.iter().all(|m| m.flow_id == Some(1)));

        let greeting = store.get_by_id(1).await.expect("entry message");
        assert_eq!(greeting.body, "Hello, I am a virtual assistant. How can I help you?");
        assert_eq!(greeting.options, vec![option(1, "Restore password", 4), option(2, "Something else", 2)]);
        assert_eq!(targets(&all[1]), vec![3, 5]);
        assert_eq!(all[4].body, "Thank you for using our service!");
    }

    #[tokio::test]
    async fn seeding_twice_is_a_no_op() {
        let (_dir, store) = seeded_store().await;
        assert!(!store.seed(&seed_flow("default")).await.expect("second seed"));
        assert_eq!(store.get_all().await.expect("get all").len(), 5);
    }

    #[tokio::test]
    async fn second_title_is_seeded_after_the_first() {
        let (_dir, store) = seeded_store().await;
        assert!(store.seed(&seed_flow("billing")).await.expect("second flow"));

        let all = store.get_all().await.expect("get all");
        let ids: Vec<_> = all.iter().map(|m| m.id).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<MessageId>>());

        let greeting = store.get_by_id(6).await.expect("second entry");
        assert_eq!(greeting.flow_id, Some(2));
        assert_eq!(targets(&greeting), vec![9, 7]);
        assert_eq!(targets(&store.get_by_id(1).await.expect("first entry")), vec![4, 2]);
    }

    #[tokio::test]
    async fn seed_skips_ids_of_deleted_messages() {
        let (_dir, store) = seeded_store().await;
        let created = store.create_message(message(0, "temporary", Vec::new())).await.expect("create");
        store.delete_message(created.id).await.expect("delete");

        assert!(store.seed(&seed_flow("other")).await.expect("seed"));
        let greeting = store.get_by_id(created.id + 1).await.expect("next entry");
        assert_eq!(greeting.flow_id, Some(2));
        assert!(store.get_by_id(created.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn zero_and_unknown_ids_are_not_found() {
        let (_dir, store) = seeded_store().await;
        assert!(store.get_by_id(0).await.unwrap_err().is_not_found());
        assert!(store.get_by_id(100).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn created_message_round_trips_with_new_id() {
        let (_dir, store) = seeded_store().await;
        let input = Message {
            id: 3,
            body: "New question".into(),
            options: vec![option(4, "Go nowhere", 555), option(1, "Back", 1)],
            flow_id: Some(42),
        };

        let created = store.create_message(input.clone()).await.expect("create");
        assert_eq!(created.id, 6);

        let stored = store.get_by_id(created.id).await.expect("stored");
        assert_eq!(stored, Message { id: created.id, ..input });
        assert_eq!(store.get_by_id(3).await.expect("untouched").body, "Write to billing@help.com");
    }

    #[tokio::test]
    async fn update_replaces_body_options_and_flow() {
        let (_dir, store) = seeded_store().await;
        let replacement = Message {
            id: 1,
            body: "Hi again".into(),
            options: vec![option(9, "Only choice", 5)],
            flow_id: Some(5),
        };

        store.update_message(replacement.clone()).await.expect("update");
        assert_eq!(store.get_by_id(1).await.expect("updated"), replacement);

        let cleared = Message { options: Vec::new(), ..replacement };
        store.update_message(cleared.clone()).await.expect("clear options");
        assert_eq!(store.get_by_id(1).await.expect("cleared"), cleared);
    }

    #[tokio::test]
    async fn update_of_unknown_id_changes_nothing() {
        let (_dir, store) = seeded_store().await;
        let ghost = message(100, "ghost", vec![option(1, "x", 1)]);

        let echoed = store.update_message(ghost.clone()).await.expect("update");
        assert_eq!(echoed, ghost);
        assert!(store.get_by_id(100).await.unwrap_err().is_not_found());
        assert_eq!(store.get_all().await.expect("get all").len(), 5);
    }

    #[tokio::test]
    async fn delete_removes_message_and_leaves_dangling_references() {
        let (_dir, store) = seeded_store().await;

        store.delete_message(5).await.expect("delete");
        assert!(store.get_by_id(5).await.unwrap_err().is_not_found());

        let clarify = store.get_by_id(2).await.expect("message 2");
        assert_eq!(clarify.options[1].next_message_id, 5);

        assert!(store.delete_message(5).await.unwrap_err().is_not_found());
        assert_eq!(store.get_all().await.expect("get all").len(), 4);
    }

    #[tokio::test]
    async fn deleted_ids_are_not_reused() {
        let (_dir, store) = seeded_store().await;
        store.delete_message(5).await.expect("delete");
        let created = store.create_message(message(0, "fresh", Vec::new())).await.expect("create");
        assert_eq!(created.id, 6);
    }

    #[tokio::test]
    async fn data_survives_reopening_the_file() {
        let (dir, store) = seeded_store().await;
        let created = store.create_message(message(0, "kept", Vec::new())).await.expect("create");
        drop(store);

        let reopened = SqliteMessageStore::new(dir.path().join("assistant.db"));
        reopened.init().await.expect("init again");
        assert!(!reopened.seed(&seed_flow("default")).await.expect("seed again"));
        assert_eq!(reopened.get_by_id(created.id).await.expect("reopened").body, "kept");
    }
}
