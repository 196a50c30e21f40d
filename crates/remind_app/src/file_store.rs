use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use remind_domain::{
    store::{ItemPatch, ItemStore},
    Item,
};

/// Item store backed by a single JSON array on disk. Every mutation rewrites
/// the file.
pub struct JsonFileItemStore {
    path: PathBuf,
    items: RwLock<Vec<Item>>,
}

impl JsonFileItemStore {
    /// Loads the file, treating a missing file as an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let items = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
        } else {
            Vec::new()
        };
        tracing::debug!(path = %path.display(), count = items.len(), "loaded items");
        Ok(Self {
            path,
            items: RwLock::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &[Item]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_string_pretty(items)?;
        fs::write(&self.path, payload).with_context(|| format!("writing {}", self.path.display()))
    }
}

#[async_trait]
impl ItemStore for JsonFileItemStore {
    async fn list(&self) -> Result<Vec<Item>> {
        Ok(self.items.read().clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Item>> {
        Ok(self.items.read().iter().find(|item| item.id == id).cloned())
    }

    async fn create(&self, item: Item) -> Result<Item> {
        anyhow::ensure!(!item.id.trim().is_empty(), "item id must not be empty");
        let mut items = self.items.write();
        if items.iter().any(|existing| existing.id == item.id) {
            return Err(anyhow!("item `{}` already exists", item.id));
        }
        items.push(item.clone());
        self.persist(&items)?;
        Ok(item)
    }

    async fn update(&self, id: &str, patch: ItemPatch) -> Result<Item> {
        let mut items = self.items.write();
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| anyhow!("item `{id}` not found"))?;
        patch.apply(item);
        let updated = item.clone();
        self.persist(&items)?;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|item| item.id != id);
        anyhow::ensure!(items.len() != before, "item `{id}` not found");
        self.persist(&items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use remind_domain::{exceptions::DateSet, Repeat};
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_exception_sets_through_disk() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("items.json");
        let store = JsonFileItemStore::open(&path).expect("open empty");
        assert!(store.list().await.unwrap().is_empty());

        let created = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let item = Item::new("a", "Walk", created)
            .with_repeat(Repeat::Daily)
            .with_remind_at(created);
        store.create(item).await.unwrap();

        let skip = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        store
            .update("a", ItemPatch::skipped(DateSet::new().with(skip)))
            .await
            .unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("2025-03-12"));

        let reopened = JsonFileItemStore::open(&path).unwrap();
        let item = reopened.get("a").await.unwrap().expect("item persisted");
        assert!(item.is_skipped_on(skip));
        assert!(item.completed_dates.is_empty());
    }

    #[tokio::test]
    async fn delete_of_unknown_item_fails() {
        let temp = tempdir().expect("tempdir");
        let store = JsonFileItemStore::open(temp.path().join("items.json")).unwrap();
        assert!(store.delete("missing").await.is_err());
    }
}
