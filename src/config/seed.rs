use crate::models::{ Flow, Message };
use log::info;
use std::collections::HashSet;
use std::fs;
use std::path::{ Path, PathBuf };
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read seed file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("seed file '{}' is empty", path.display())]
    Empty {
        path: PathBuf,
    },

    #[error("cannot decode seed file '{}': {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("message id {0} appears more than once")]
    DuplicateId(u32),
}

/// Decodes a seed document: a JSON array of messages with nested options.
/// Array order is preserved at every level. Option targets are not
/// checked, but message ids must be unique.
pub fn decode_messages(path: &Path, bytes: &[u8]) -> Result<Vec<Message>, LoadError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(LoadError::Empty { path: path.to_path_buf() });
    }
    let messages: Vec<Message> = serde_json::from_slice(bytes).map_err(|source| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let mut seen = HashSet::with_capacity(messages.len());
    if let Some(message) = messages.iter().find(|m| !seen.insert(m.id)) {
        return Err(LoadError::DuplicateId(message.id));
    }
    Ok(messages)
}

pub fn load_messages<P: AsRef<Path>>(path: P) -> Result<Vec<Message>, LoadError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let messages = decode_messages(path, &bytes)?;
    info!("Loaded {} seed messages from {}", messages.len(), path.display());
    Ok(messages)
}

pub fn load_flow<P: AsRef<Path>>(path: P, title: &str) -> Result<Flow, LoadError> {
    Ok(Flow::new(title, load_messages(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn seed_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write seed");
        file
    }

    #[test]
    fn keeps_message_and_option_order() {
        let file = seed_file(
            r#"[
                {"id": 3, "body": "third", "options": [
                    {"id": 2, "body": "b", "nextMessageId": 7},
                    {"id": 1, "body": "a", "nextMessageId": 0}
                ]},
                {"id": 0, "body": "first", "options": []},
                {"id": 7, "body": "end"}
            ]"#
        );

        let messages = load_messages(file.path()).expect("load");
        let ids: Vec<_> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 0, 7]);

        let option_ids: Vec<_> = messages[0].options.iter().map(|o| o.id).collect();
        assert_eq!(option_ids, vec![2, 1]);
        assert!(messages[2].options.is_empty());
    }

    #[test]
    fn flow_carries_title() {
        let file = seed_file(r#"[{"id": 1, "body": "hi"}]"#);
        let flow = load_flow(file.path(), "default").expect("load");
        assert_eq!(flow.title, "default");
        assert_eq!(flow.id, 0);
        assert_eq!(flow.messages.len(), 1);
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = seed_file("  \n");
        assert!(matches!(load_messages(file.path()), Err(LoadError::Empty { .. })));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let file = seed_file(r#"{"id": 1, "body": "not an array"}"#);
        assert!(matches!(load_messages(file.path()), Err(LoadError::Decode { .. })));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let file = seed_file(
            r#"[
                {"id": 1, "body": "first"},
                {"id": 2, "body": "second", "options": [{"id": 1, "body": "x", "nextMessageId": 9}]},
                {"id": 1, "body": "again"}
            ]"#
        );
        assert!(matches!(load_messages(file.path()), Err(LoadError::DuplicateId(1))));
    }

    #[test]
    fn missing_file_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = load_messages(dir.path().join("absent.json"));
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }
}
