//! Once-only asynchronous engine module loading.

use crate::error::{BridgeError, BridgeResult, EngineError};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::OnceCell;

type LoadFuture<M> = Pin<Box<dyn Future<Output = Result<M, EngineError>> + Send>>;

/// Loads the external engine module at most once per process lifetime.
///
/// The factory fetches and instantiates the compiled module (in the
/// original deployment, a network fetch of a binary artifact). Callers
/// that arrive while a load is in flight await the same in-flight
/// result instead of starting a second load; a successful result is
/// cached for the loader's lifetime.
///
/// A failed load is not cached: the failure is surfaced to every caller
/// awaiting it, and a later `load` call runs the factory again. The
/// bridge never issues that later call on its own (a failed `init` is
/// terminal for a bridge instance).
pub struct EngineLoader<M> {
    factory: Box<dyn Fn() -> LoadFuture<M> + Send + Sync>,
    cell: OnceCell<Arc<M>>,
}

impl<M: Send + Sync + 'static> EngineLoader<M> {
    /// Creates a loader around an async module factory.
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M, EngineError>> + Send + 'static,
    {
        Self {
            factory: Box::new(move || Box::pin(factory())),
            cell: OnceCell::new(),
        }
    }

    /// Loads the module, reusing the cached or in-flight result.
    ///
    /// # Errors
    ///
    /// [`BridgeError::EngineLoadFailed`] if the factory fails.
    pub async fn load(&self) -> BridgeResult<Arc<M>> {
        self.cell
            .get_or_try_init(|| async {
                tracing::debug!("loading engine module");
                match (self.factory)().await {
                    Ok(module) => Ok(Arc::new(module)),
                    Err(e) => {
                        tracing::warn!(error = %e, "engine module load failed");
                        Err(BridgeError::EngineLoadFailed(e))
                    }
                }
            })
            .await
            .cloned()
    }

    /// Whether a module has been loaded successfully.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

impl<M> fmt::Debug for EngineLoader<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLoader")
            .field("loaded", &self.cell.initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_loader(count: Arc<AtomicUsize>) -> EngineLoader<u32> {
        EngineLoader::new(move || {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(41)
            }
        })
    }

    #[tokio::test]
    async fn successful_load_is_cached() {
        let count = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(Arc::clone(&count));
        assert!(!loader.is_loaded());

        let first = loader.load().await.unwrap();
        let second = loader.load().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded());
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_flight() {
        let count = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(Arc::clone(&count));

        let (a, b) = tokio::join!(loader.load(), loader.load());
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_surfaces_and_is_not_cached() {
        let fail = Arc::new(AtomicBool::new(true));
        let loader: EngineLoader<u32> = EngineLoader::new({
            let fail = Arc::clone(&fail);
            move || {
                let fail = Arc::clone(&fail);
                async move {
                    if fail.load(Ordering::SeqCst) {
                        Err(EngineError::new("module fetch failed"))
                    } else {
                        Ok(7)
                    }
                }
            }
        });

        let result = loader.load().await;
        assert!(matches!(result, Err(BridgeError::EngineLoadFailed(_))));
        assert!(!loader.is_loaded());

        // An explicit later call may retry; the loader itself never does.
        fail.store(false, Ordering::SeqCst);
        assert_eq!(*loader.load().await.unwrap(), 7);
    }
}
