//! SQLite persistence for users, collections, documents, chats, and
//! messages. One shared connection behind a mutex; rows are addressed
//! by UUID strings.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

const SCHEMA: &str = r#"
-- Registered accounts. Passwords are stored as PHC hash strings.
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

-- A named set of documents backed by one vector store collection.
CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY,
    name TEXT,
    user_id TEXT NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL
);

-- Uploaded files, with their resting place on disk.
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL REFERENCES collections(id),
    filename TEXT,
    file_path TEXT NOT NULL,
    file_size TEXT,
    created_at TEXT NOT NULL
);

-- Conversations, optionally grounded in a collection.
CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    name TEXT,
    description TEXT,
    user_id TEXT NOT NULL REFERENCES users(id),
    collection_id TEXT REFERENCES collections(id),
    created_at TEXT NOT NULL,
    updated_at TEXT
);

-- Conversation turns. Sources holds the citation JSON for assistant turns.
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    chat_id TEXT NOT NULL REFERENCES chats(id),
    content TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'user',
    sources TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_collections_user_id ON collections(user_id);
CREATE INDEX IF NOT EXISTS idx_documents_collection_id ON documents(collection_id);
CREATE INDEX IF NOT EXISTS idx_chats_user_id ON chats(user_id);
CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages(chat_id);
"#;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionRecord {
    pub id: String,
    pub name: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub collection_id: String,
    pub filename: Option<String>,
    pub file_path: String,
    pub file_size: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRecord {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub user_id: String,
    pub collection_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub id: String,
    pub chat_id: String,
    pub content: String,
    pub role: String,
    pub sources: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Handle to the SQLite store. Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and apply the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to apply database schema")?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // users

    pub fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password: password_hash.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        self.lock()
            .execute(
                "INSERT INTO users (id, name, email, password, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id,
                    user.name,
                    user.email,
                    user.password,
                    user.is_active,
                    user.created_at
                ],
            )
            .with_context(|| format!("Failed to insert user {}", user.email))?;
        Ok(user)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, email, password, is_active, created_at
             FROM users WHERE email = ?1",
        )?;
        stmt.query_row(params![email], user_from_row)
            .optional()
            .with_context(|| format!("Failed to look up user {}", email))
    }

    // collections

    pub fn create_collection(
        &self,
        user_id: &str,
        name: Option<&str>,
    ) -> Result<CollectionRecord> {
        let collection = CollectionRecord {
            id: Uuid::new_v4().to_string(),
            name: name.map(str::to_string),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        };
        self.lock()
            .execute(
                "INSERT INTO collections (id, name, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    collection.id,
                    collection.name,
                    collection.user_id,
                    collection.created_at
                ],
            )
            .context("Failed to insert collection")?;
        Ok(collection)
    }

    pub fn collections_for_user(&self, user_id: &str) -> Result<Vec<CollectionRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, user_id, created_at FROM collections WHERE user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id], collection_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list collections")
    }

    pub fn collection_for_user(
        &self,
        collection_id: &str,
        user_id: &str,
    ) -> Result<Option<CollectionRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, user_id, created_at FROM collections
             WHERE id = ?1 AND user_id = ?2",
        )?;
        stmt.query_row(params![collection_id, user_id], collection_from_row)
            .optional()
            .context("Failed to look up collection")
    }

    pub fn delete_collection(&self, collection_id: &str) -> Result<()> {
        self.lock()
            .execute("DELETE FROM collections WHERE id = ?1", params![collection_id])
            .context("Failed to delete collection")?;
        Ok(())
    }

    // documents

    pub fn create_document(
        &self,
        collection_id: &str,
        filename: Option<&str>,
        file_path: &str,
        file_size: Option<&str>,
    ) -> Result<DocumentRecord> {
        let document = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            collection_id: collection_id.to_string(),
            filename: filename.map(str::to_string),
            file_path: file_path.to_string(),
            file_size: file_size.map(str::to_string),
            created_at: Utc::now(),
        };
        self.lock()
            .execute(
                "INSERT INTO documents (id, collection_id, filename, file_path, file_size, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    document.id,
                    document.collection_id,
                    document.filename,
                    document.file_path,
                    document.file_size,
                    document.created_at
                ],
            )
            .context("Failed to insert document")?;
        Ok(document)
    }

    pub fn documents_in_collection(&self, collection_id: &str) -> Result<Vec<DocumentRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, collection_id, filename, file_path, file_size, created_at
             FROM documents WHERE collection_id = ?1",
        )?;
        let rows = stmt.query_map(params![collection_id], document_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list documents")
    }

    pub fn document_by_id(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, collection_id, filename, file_path, file_size, created_at
             FROM documents WHERE id = ?1",
        )?;
        stmt.query_row(params![document_id], document_from_row)
            .optional()
            .context("Failed to look up document")
    }

    pub fn delete_document(&self, document_id: &str) -> Result<()> {
        self.lock()
            .execute("DELETE FROM documents WHERE id = ?1", params![document_id])
            .context("Failed to delete document")?;
        Ok(())
    }

    pub fn delete_documents_in_collection(&self, collection_id: &str) -> Result<()> {
        self.lock()
            .execute(
                "DELETE FROM documents WHERE collection_id = ?1",
                params![collection_id],
            )
            .context("Failed to delete documents")?;
        Ok(())
    }

    // chats

    pub fn create_chat(
        &self,
        user_id: &str,
        name: &str,
        collection_id: Option<&str>,
    ) -> Result<ChatRecord> {
        let now = Utc::now();
        let chat = ChatRecord {
            id: Uuid::new_v4().to_string(),
            name: Some(name.to_string()),
            description: None,
            user_id: user_id.to_string(),
            collection_id: collection_id.map(str::to_string),
            created_at: now,
            updated_at: Some(now),
        };
        self.lock()
            .execute(
                "INSERT INTO chats (id, name, description, user_id, collection_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    chat.id,
                    chat.name,
                    chat.description,
                    chat.user_id,
                    chat.collection_id,
                    chat.created_at,
                    chat.updated_at
                ],
            )
            .context("Failed to insert chat")?;
        Ok(chat)
    }

    /// Chats for a user, most recently created first.
    pub fn chats_for_user(&self, user_id: &str) -> Result<Vec<ChatRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, user_id, collection_id, created_at, updated_at
             FROM chats WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], chat_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list chats")
    }

    pub fn chat_for_user(&self, chat_id: &str, user_id: &str) -> Result<Option<ChatRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, user_id, collection_id, created_at, updated_at
             FROM chats WHERE id = ?1 AND user_id = ?2",
        )?;
        stmt.query_row(params![chat_id, user_id], chat_from_row)
            .optional()
            .context("Failed to look up chat")
    }

    /// Apply the provided fields, leaving the rest untouched.
    pub fn update_chat(
        &self,
        chat_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        if name.is_none() && description.is_none() {
            return Ok(());
        }
        let now = Utc::now();
        let conn = self.lock();
        if let Some(name) = name {
            conn.execute(
                "UPDATE chats SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now, chat_id],
            )
            .context("Failed to update chat name")?;
        }
        if let Some(description) = description {
            conn.execute(
                "UPDATE chats SET description = ?1, updated_at = ?2 WHERE id = ?3",
                params![description, now, chat_id],
            )
            .context("Failed to update chat description")?;
        }
        Ok(())
    }

    pub fn set_chat_collection(&self, chat_id: &str, collection_id: &str) -> Result<()> {
        self.lock()
            .execute(
                "UPDATE chats SET collection_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![collection_id, Utc::now(), chat_id],
            )
            .context("Failed to attach collection to chat")?;
        Ok(())
    }

    /// Clear the collection reference from every chat using it.
    pub fn detach_collection_from_chats(&self, collection_id: &str) -> Result<()> {
        self.lock()
            .execute(
                "UPDATE chats SET collection_id = NULL, updated_at = ?1 WHERE collection_id = ?2",
                params![Utc::now(), collection_id],
            )
            .context("Failed to detach collection from chats")?;
        Ok(())
    }

    pub fn chats_using_collection(&self, collection_id: &str) -> Result<i64> {
        let conn = self.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM chats WHERE collection_id = ?1",
            params![collection_id],
            |row| row.get(0),
        )
        .context("Failed to count chats using collection")
    }

    pub fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.lock()
            .execute("DELETE FROM chats WHERE id = ?1", params![chat_id])
            .context("Failed to delete chat")?;
        Ok(())
    }

    // messages

    pub fn create_message(
        &self,
        chat_id: &str,
        content: &str,
        role: &str,
        sources: Option<&str>,
    ) -> Result<MessageRecord> {
        let message = MessageRecord {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            role: role.to_string(),
            sources: sources.map(str::to_string),
            created_at: Utc::now(),
        };
        self.lock()
            .execute(
                "INSERT INTO messages (id, chat_id, content, role, sources, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id,
                    message.chat_id,
                    message.content,
                    message.role,
                    message.sources,
                    message.created_at
                ],
            )
            .context("Failed to insert message")?;
        Ok(message)
    }

    /// Messages of a chat in conversation order.
    pub fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<MessageRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, content, role, sources, created_at
             FROM messages WHERE chat_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![chat_id], message_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list messages")
    }

    pub fn message_count(&self, chat_id: &str) -> Result<i64> {
        let conn = self.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
            params![chat_id],
            |row| row.get(0),
        )
        .context("Failed to count messages")
    }

    pub fn delete_messages_for_chat(&self, chat_id: &str) -> Result<()> {
        self.lock()
            .execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])
            .context("Failed to delete messages")?;
        Ok(())
    }
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn collection_from_row(row: &Row) -> rusqlite::Result<CollectionRecord> {
    Ok(CollectionRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        user_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn document_from_row(row: &Row) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: row.get(0)?,
        collection_id: row.get(1)?,
        filename: row.get(2)?,
        file_path: row.get(3)?,
        file_size: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn chat_from_row(row: &Row) -> rusqlite::Result<ChatRecord> {
    Ok(ChatRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        user_id: row.get(3)?,
        collection_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn message_from_row(row: &Row) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        content: row.get(2)?,
        role: row.get(3)?,
        sources: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn user(db: &Database) -> User {
        db.create_user("Ada", "ada@example.com", "hash").unwrap()
    }

    // Ordering tests compare `created_at`; consecutive writes need distinct timestamps.
    fn tick() {
        std::thread::sleep(std::time::Duration::from_millis(2));
    }

    #[test]
    fn test_user_round_trip() {
        let db = db();
        let created = user(&db);

        let found = db.user_by_email("ada@example.com").unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.name, "Ada");
        assert_eq!(found.password, "hash");
        assert!(found.is_active);

        assert!(db.user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let db = db();
        user(&db);
        assert!(db.create_user("Eve", "ada@example.com", "other").is_err());
    }

    #[test]
    fn test_user_serialization_hides_password() {
        let db = db();
        let created = user(&db);
        let json = serde_json::to_value(&created).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["email"], "ada@example.com");
    }

    #[test]
    fn test_chats_listed_newest_first() {
        let db = db();
        let owner = user(&db);

        let first = db.create_chat(&owner.id, "First", None).unwrap();
        tick();
        let second = db.create_chat(&owner.id, "Second", None).unwrap();

        let chats = db.chats_for_user(&owner.id).unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].id, second.id);
        assert_eq!(chats[1].id, first.id);
    }

    #[test]
    fn test_chat_scoped_to_owner() {
        let db = db();
        let owner = user(&db);
        let other = db.create_user("Eve", "eve@example.com", "hash").unwrap();

        let chat = db.create_chat(&owner.id, "Private", None).unwrap();
        assert!(db.chat_for_user(&chat.id, &owner.id).unwrap().is_some());
        assert!(db.chat_for_user(&chat.id, &other.id).unwrap().is_none());
    }

    #[test]
    fn test_update_chat_fields_independently() {
        let db = db();
        let owner = user(&db);
        let chat = db.create_chat(&owner.id, "New Chat", None).unwrap();

        db.update_chat(&chat.id, Some("Renamed"), None).unwrap();
        let updated = db.chat_for_user(&chat.id, &owner.id).unwrap().unwrap();
        assert_eq!(updated.name.as_deref(), Some("Renamed"));
        assert_eq!(updated.description, None);

        db.update_chat(&chat.id, None, Some("About databases")).unwrap();
        let updated = db.chat_for_user(&chat.id, &owner.id).unwrap().unwrap();
        assert_eq!(updated.name.as_deref(), Some("Renamed"));
        assert_eq!(updated.description.as_deref(), Some("About databases"));
    }

    #[test]
    fn test_messages_in_conversation_order() {
        let db = db();
        let owner = user(&db);
        let chat = db.create_chat(&owner.id, "Chat", None).unwrap();

        assert_eq!(db.message_count(&chat.id).unwrap(), 0);

        db.create_message(&chat.id, "question", "user", None).unwrap();
        tick();
        db.create_message(&chat.id, "answer", "assistant", Some("[]")).unwrap();

        let messages = db.messages_for_chat(&chat.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "question");
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].sources, None);
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].sources.as_deref(), Some("[]"));

        assert_eq!(db.message_count(&chat.id).unwrap(), 2);

        db.delete_messages_for_chat(&chat.id).unwrap();
        assert_eq!(db.message_count(&chat.id).unwrap(), 0);
    }

    #[test]
    fn test_collection_lifecycle() {
        let db = db();
        let owner = user(&db);

        let collection = db.create_collection(&owner.id, Some("Papers")).unwrap();
        assert_eq!(db.collections_for_user(&owner.id).unwrap().len(), 1);
        assert!(db
            .collection_for_user(&collection.id, &owner.id)
            .unwrap()
            .is_some());

        let doc = db
            .create_document(&collection.id, Some("paper.pdf"), "uploads/x.pdf", Some("1.2 KB"))
            .unwrap();
        assert_eq!(db.documents_in_collection(&collection.id).unwrap().len(), 1);
        assert_eq!(
            db.document_by_id(&doc.id).unwrap().unwrap().filename.as_deref(),
            Some("paper.pdf")
        );

        db.delete_documents_in_collection(&collection.id).unwrap();
        assert!(db.documents_in_collection(&collection.id).unwrap().is_empty());

        db.delete_collection(&collection.id).unwrap();
        assert!(db
            .collection_for_user(&collection.id, &owner.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_detach_collection_from_chats() {
        let db = db();
        let owner = user(&db);
        let collection = db.create_collection(&owner.id, Some("Docs")).unwrap();

        let chat = db.create_chat(&owner.id, "Chat", Some(&collection.id)).unwrap();
        assert_eq!(db.chats_using_collection(&collection.id).unwrap(), 1);

        db.detach_collection_from_chats(&collection.id).unwrap();
        assert_eq!(db.chats_using_collection(&collection.id).unwrap(), 0);

        let chat = db.chat_for_user(&chat.id, &owner.id).unwrap().unwrap();
        assert_eq!(chat.collection_id, None);
    }

    #[test]
    fn test_attach_collection_to_chat() {
        let db = db();
        let owner = user(&db);
        let chat = db.create_chat(&owner.id, "Chat", None).unwrap();
        let collection = db.create_collection(&owner.id, Some("Chat docs")).unwrap();

        db.set_chat_collection(&chat.id, &collection.id).unwrap();
        let chat = db.chat_for_user(&chat.id, &owner.id).unwrap().unwrap();
        assert_eq!(chat.collection_id.as_deref(), Some(collection.id.as_str()));
    }

    #[test]
    fn test_delete_chat() {
        let db = db();
        let owner = user(&db);
        let chat = db.create_chat(&owner.id, "Gone soon", None).unwrap();

        db.delete_chat(&chat.id).unwrap();
        assert!(db.chat_for_user(&chat.id, &owner.id).unwrap().is_none());
        assert!(db.chats_for_user(&owner.id).unwrap().is_empty());
    }
}
