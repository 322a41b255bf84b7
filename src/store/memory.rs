use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LedgerStore, StoreError};
use crate::models::{DateRange, JournalEntry, User};

#[derive(Default)]
struct Books {
    /// Keyed by LINE user ID
    users: HashMap<String, User>,
    entries: Vec<JournalEntry>,
}

/// In-process store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    books: RwLock<Books>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find_user(&self, line_user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.books.read().await.users.get(line_user_id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut books = self.books.write().await;
        if books.users.contains_key(&user.line_user_id) {
            return Err(StoreError::DuplicateUser(user.line_user_id.clone()));
        }
        books.users.insert(user.line_user_id.clone(), user.clone());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let books = self.books.read().await;
        let mut users: Vec<User> = books.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn insert_entry(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        self.books.write().await.entries.push(entry.clone());
        Ok(())
    }

    async fn entries_for_user(
        &self,
        user_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<JournalEntry>, StoreError> {
        let books = self.books.read().await;
        let mut entries: Vec<JournalEntry> = books
            .entries
            .iter()
            .filter(|e| e.user_id == user_id && range.contains(e.date))
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.date, e.created_at));
        Ok(entries)
    }

    async fn delete_entry(&self, user_id: Uuid, entry_id: Uuid) -> Result<bool, StoreError> {
        let mut books = self.books.write().await;
        let before = books.entries.len();
        books
            .entries
            .retain(|e| !(e.id == entry_id && e.user_id == user_id));
        Ok(books.entries.len() != before)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
