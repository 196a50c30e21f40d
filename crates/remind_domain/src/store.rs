use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::exceptions::DateSet;
use crate::model::{Item, ItemStatus};

/// The fields the engine is allowed to write back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub skipped_dates: Option<DateSet>,
    pub completed_dates: Option<DateSet>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub remind_at: Option<Option<DateTime<Utc>>>,
    /// Only used for one-off items, whose status is their occurrence's status.
    pub status: Option<ItemStatus>,
}

impl ItemPatch {
    pub fn skipped(dates: DateSet) -> Self {
        Self {
            skipped_dates: Some(dates),
            ..Self::default()
        }
    }

    pub fn completed(dates: DateSet) -> Self {
        Self {
            completed_dates: Some(dates),
            ..Self::default()
        }
    }

    pub fn status(status: ItemStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn times(due_at: Option<DateTime<Utc>>, remind_at: Option<DateTime<Utc>>) -> Self {
        Self {
            due_at: Some(due_at),
            remind_at: Some(remind_at),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(self, item: &mut Item) {
        if let Some(dates) = self.skipped_dates {
            item.skipped_dates = dates;
        }
        if let Some(dates) = self.completed_dates {
            item.completed_dates = dates;
        }
        if let Some(due_at) = self.due_at {
            item.due_at = due_at;
        }
        if let Some(remind_at) = self.remind_at {
            item.remind_at = remind_at;
        }
        if let Some(status) = self.status {
            item.status = status;
        }
    }
}

/// Persistent item storage owned outside the engine.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Item>>;

    async fn get(&self, id: &str) -> Result<Option<Item>>;

    async fn create(&self, item: Item) -> Result<Item>;

    /// Applies `patch` and returns the updated item.
    async fn update(&self, id: &str, patch: ItemPatch) -> Result<Item>;

    async fn delete(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryItemStore {
    items: RwLock<HashMap<String, Item>>,
}

impl InMemoryItemStore {
    pub fn new(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            items: RwLock::new(
                items
                    .into_iter()
                    .map(|item| (item.id.clone(), item))
                    .collect(),
            ),
        }
    }

    pub fn snapshot(&self, id: &str) -> Option<Item> {
        self.items.read().get(id).cloned()
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn list(&self) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self.items.read().values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn get(&self, id: &str) -> Result<Option<Item>> {
        Ok(self.snapshot(id))
    }

    async fn create(&self, item: Item) -> Result<Item> {
        anyhow::ensure!(!item.id.trim().is_empty(), "item id must not be empty");
        let mut items = self.items.write();
        if items.contains_key(&item.id) {
            return Err(anyhow!("item `{}` already exists", item.id));
        }
        items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn update(&self, id: &str, patch: ItemPatch) -> Result<Item> {
        let mut items = self.items.write();
        let item = items
            .get_mut(id)
            .ok_or_else(|| anyhow!("item `{id}` not found"))?;
        patch.apply(item);
        Ok(item.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.items
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("item `{id}` not found"))
    }
}
