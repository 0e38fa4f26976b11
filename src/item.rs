//! The clothing item record and its store.
//!
//! One record per upload. The store is a trait so handlers never touch the
//! backing map directly; the in-memory implementation is the only one
//! shipped, but a persistent store slots in behind the same interface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Sentinel values the UI sends when the user leaves an option untouched.
/// Anything else is forwarded to the prompt builder verbatim.
pub const DEFAULT_MODEL_TYPE: &str = "Automatic (default)";
pub const DEFAULT_BACKGROUND_TYPE: &str = "Studio (default)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    /// Path under the uploads root, e.g. `original/1712345678901-0-shirt.jpg`.
    pub original_image: String,
    /// Set exactly when `status == Completed`.
    pub generated_image: Option<String>,
    pub model_type: String,
    pub background_type: String,
    pub prompt_text: Option<String>,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the caller at creation time.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub original_image: String,
    pub model_type: Option<String>,
    pub background_type: Option<String>,
    pub prompt_text: Option<String>,
}

/// A status transition. Only the three constructors exist, so a patch can
/// never pair a generated image with a non-completed status.
#[derive(Debug, Clone)]
pub struct ItemPatch {
    pub status: ItemStatus,
    pub generated_image: Option<String>,
}

impl ItemPatch {
    pub fn processing() -> Self {
        Self {
            status: ItemStatus::Processing,
            generated_image: None,
        }
    }

    pub fn completed(generated_image: String) -> Self {
        Self {
            status: ItemStatus::Completed,
            generated_image: Some(generated_image),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: ItemStatus::Failed,
            generated_image: None,
        }
    }
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn create(&self, new: NewItem) -> Item;
    async fn get(&self, id: i64) -> Option<Item>;
    async fn update(&self, id: i64, patch: ItemPatch) -> Option<Item>;
}

pub struct MemoryItemStore {
    items: RwLock<HashMap<i64, Item>>,
    next_id: AtomicI64,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryItemStore {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn create(&self, new: NewItem) -> Item {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let item = Item {
            id,
            original_image: new.original_image,
            generated_image: None,
            model_type: non_empty_or(new.model_type, DEFAULT_MODEL_TYPE),
            background_type: non_empty_or(new.background_type, DEFAULT_BACKGROUND_TYPE),
            prompt_text: new.prompt_text.filter(|p| !p.trim().is_empty()),
            status: ItemStatus::Pending,
            created_at: Utc::now(),
        };
        self.items.write().await.insert(id, item.clone());
        item
    }

    async fn get(&self, id: i64) -> Option<Item> {
        self.items.read().await.get(&id).cloned()
    }

    async fn update(&self, id: i64, patch: ItemPatch) -> Option<Item> {
        let mut items = self.items.write().await;
        let item = items.get_mut(&id)?;
        item.status = patch.status;
        item.generated_image = patch.generated_image;
        Some(item.clone())
    }
}
