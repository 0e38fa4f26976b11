//! Generation pipeline.
//!
//! Walks an item through pending -> processing -> completed | failed.
//! Runs against the same item are serialized by a per-item lock; each run
//! starts the pipeline from scratch, so retrying a failed item is just
//! calling generate again.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::item::{Item, ItemPatch, ItemStore};
use crate::prompt::build_prompt;
use crate::provider::{self, ImagePayload, ProviderChain};
use crate::storage::ImageStore;

/// Per-item locks so two generate calls for the same id cannot interleave
/// their status transitions.
#[derive(Default)]
pub struct ItemLocks {
    locks: RwLock<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the lock for an item. Returns an Arc to the mutex.
    pub async fn get_lock(&self, id: i64) -> Arc<Mutex<()>> {
        // Fast path: lock already exists
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(&id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct Orchestrator {
    store: Arc<dyn ItemStore>,
    images: Arc<ImageStore>,
    providers: Arc<ProviderChain>,
    locks: ItemLocks,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ItemStore>,
        images: Arc<ImageStore>,
        providers: Arc<ProviderChain>,
    ) -> Self {
        Self {
            store,
            images,
            providers,
            locks: ItemLocks::new(),
        }
    }

    /// Run the full pipeline for one item and return its final state.
    pub async fn generate(&self, id: i64) -> Result<Item, ApiError> {
        let item = self
            .store
            .get(id)
            .await
            .ok_or_else(|| ApiError::NotFound("Clothing item not found".to_string()))?;

        if self.providers.is_empty() {
            return Err(ApiError::Unavailable(
                "Image generation is not configured. Set GEMINI_API_KEY or ANTHROPIC_API_KEY."
                    .to_string(),
            ));
        }

        let lock = self.locks.get_lock(id).await;
        let _guard = lock.lock().await;

        self.store
            .update(id, ItemPatch::processing())
            .await
            .ok_or_else(|| ApiError::NotFound("Clothing item not found".to_string()))?;

        match self.run(&item).await {
            Ok(generated) => {
                let updated = self
                    .store
                    .update(id, ItemPatch::completed(generated))
                    .await
                    .ok_or_else(|| ApiError::NotFound("Clothing item not found".to_string()))?;
                info!(
                    "Generation completed for item {} -> {}",
                    id,
                    updated.generated_image.as_deref().unwrap_or("")
                );
                Ok(updated)
            }
            Err(err) => {
                let _ = self.store.update(id, ItemPatch::failed()).await;
                warn!("Generation failed for item {}: {}", id, err);
                Err(err)
            }
        }
    }

    async fn run(&self, item: &Item) -> Result<String, ApiError> {
        let bytes = self.images.load(&item.original_image).await.map_err(|_| {
            ApiError::NotFound(format!("Image file not found: {}", item.original_image))
        })?;

        let payload = ImagePayload::from_path_hint(&item.original_image, bytes);
        let payload = provider::prepare_for_upload(&payload);
        let prompt = build_prompt(
            item.prompt_text.as_deref(),
            &item.model_type,
            &item.background_type,
        );

        let generated = self
            .providers
            .generate(&payload, &prompt)
            .await
            .map_err(|e| ApiError::Generation(format!("{e:#}")))?;

        let path = self
            .images
            .save_generated(item.id, &generated)
            .await
            .map_err(ApiError::Internal)?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemStatus, MemoryItemStore, NewItem};
    use crate::provider::ImageProvider;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedProvider {
        fail: bool,
        delay: Duration,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        fn succeeding() -> Self {
            Self {
                fail: false,
                delay: Duration::ZERO,
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::succeeding()
            }
        }
    }

    #[async_trait]
    impl ImageProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, _image: &ImagePayload, _prompt: &str) -> anyhow::Result<Vec<u8>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                Err(anyhow!("vendor exploded"))
            } else {
                Ok(b"generated-bytes".to_vec())
            }
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        store: Arc<MemoryItemStore>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(provider: Option<ScriptedProvider>) -> (Fixture, i64) {
        let dir = tempfile::tempdir().unwrap();
        let images = Arc::new(ImageStore::new(dir.path()));
        images.ensure_dirs().await.unwrap();

        let store = Arc::new(MemoryItemStore::new());
        let original = images.save_original("shirt.jpg", b"jpeg").await.unwrap();
        let item = store
            .create(NewItem {
                original_image: original,
                ..Default::default()
            })
            .await;

        let providers: Vec<Box<dyn ImageProvider>> = match provider {
            Some(p) => vec![Box::new(p)],
            None => vec![],
        };
        let orchestrator = Orchestrator::new(
            store.clone(),
            images,
            Arc::new(ProviderChain::new(providers)),
        );

        (
            Fixture {
                orchestrator,
                store,
                _dir: dir,
            },
            item.id,
        )
    }

    #[tokio::test]
    async fn test_successful_generation_completes_item() {
        let (fx, id) = fixture(Some(ScriptedProvider::succeeding())).await;

        let item = fx.orchestrator.generate(id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        let generated = item.generated_image.expect("generated image set");
        assert!(generated.starts_with("generated/"));

        let fetched = fx.store.get(id).await.unwrap();
        assert_eq!(fetched.generated_image.as_deref(), Some(generated.as_str()));
    }

    #[tokio::test]
    async fn test_vendor_failure_marks_item_failed() {
        let (fx, id) = fixture(Some(ScriptedProvider::failing())).await;

        let err = fx.orchestrator.generate(id).await.unwrap_err();
        assert!(matches!(err, ApiError::Generation(_)));
        assert!(err.to_string().contains("vendor exploded"));

        let item = fx.store.get(id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.generated_image, None);
    }

    #[tokio::test]
    async fn test_unknown_id_has_no_side_effects() {
        let (fx, _id) = fixture(Some(ScriptedProvider::succeeding())).await;

        let err = fx.orchestrator.generate(999).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(fx.store.get(999).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_chain_is_unavailable_and_leaves_item_pending() {
        let (fx, id) = fixture(None).await;

        let err = fx.orchestrator.generate(id).await.unwrap_err();
        assert!(matches!(err, ApiError::Unavailable(_)));

        let item = fx.store.get(id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_original_file_fails_item() {
        let (fx, _id) = fixture(Some(ScriptedProvider::succeeding())).await;

        let item = fx
            .store
            .create(NewItem {
                original_image: "original/does-not-exist.jpg".to_string(),
                ..Default::default()
            })
            .await;

        let err = fx.orchestrator.generate(item.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let item = fx.store.get(item.id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
    }

    #[tokio::test]
    async fn test_retry_after_failure_reruns_pipeline() {
        let (fx, id) = fixture(Some(ScriptedProvider::failing())).await;
        let _ = fx.orchestrator.generate(id).await;
        assert_eq!(
            fx.store.get(id).await.unwrap().status,
            ItemStatus::Failed
        );

        // Second run hits the same failing provider and fails again
        let err = fx.orchestrator.generate(id).await.unwrap_err();
        assert!(matches!(err, ApiError::Generation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_generates_on_same_item_are_serialized() {
        let provider = ScriptedProvider {
            fail: false,
            delay: Duration::from_millis(50),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        };
        let max_in_flight = provider.max_in_flight.clone();
        let (fx, id) = fixture(Some(provider)).await;
        let orchestrator = Arc::new(fx.orchestrator);

        let a = tokio::spawn({
            let orch = orchestrator.clone();
            async move { orch.generate(id).await }
        });
        let b = tokio::spawn({
            let orch = orchestrator.clone();
            async move { orch.generate(id).await }
        });

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }
}
