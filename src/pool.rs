//! Fixed-size pool of conversion services.
//!
//! Each service owns one renderer (one browser process for Chrome), so the
//! pool size caps how many browsers run at once.
//!
//! # Architecture
//!
//! ```text
//! ServicePool
//!   └─ Arc<PoolInner>
//!        ├─ bounded queue (capacity = size)
//!        │    [ None ][ Some(svc) ][ None ] ...
//!        ├─ factory: RendererFactory
//!        └─ closed flag
//!
//! acquire(): take a slot (blocks while empty)
//!              None      → create a service through the factory
//!              Some(svc) → reuse it
//! drop(handle): put Some(svc) back, or close it if the pool is closed
//! ```
//!
//! The queue starts with `size` empty slots, so an idle pool owns no browser
//! processes. A failed creation puts the empty slot back.
//!
//! # Example
//!
//! ```rust,ignore
//! use md2pdf::{ChromeRendererFactory, ConversionContext, ConversionInput, ServicePool};
//!
//! let pool = ServicePool::builder()
//!     .size(4)
//!     .factory(Box::new(ChromeRendererFactory::with_defaults()))
//!     .build()?;
//!
//! let mut service = pool.acquire()?;
//! let pdf = service.convert(&ConversionContext::new(), &ConversionInput::new("# Hi"))?;
//! drop(service);
//!
//! pool.close()?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::config::ConverterConfig;
use crate::error::{Md2PdfError, Result};
use crate::factory::{ChromeRendererFactory, RendererFactory};
use crate::handle::ServiceHandle;
use crate::service::{ConversionService, ServiceOptions};
use crate::stats::PoolStats;

/// Smallest automatically chosen pool size.
pub const MIN_POOL_SIZE: usize = 1;

/// Largest automatically chosen pool size.
pub const MAX_POOL_SIZE: usize = 8;

/// Pool size for a configured worker count.
///
/// A positive count is used as-is. Zero picks half the available
/// parallelism, clamped to `[MIN_POOL_SIZE, MAX_POOL_SIZE]`.
///
/// ```rust
/// use md2pdf::pool::{resolve_pool_size, MAX_POOL_SIZE, MIN_POOL_SIZE};
///
/// assert_eq!(resolve_pool_size(3), 3);
/// let auto = resolve_pool_size(0);
/// assert!((MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&auto));
/// ```
pub fn resolve_pool_size(workers: usize) -> usize {
    if workers > 0 {
        return workers;
    }
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_POOL_SIZE);
    (cpus / 2).clamp(MIN_POOL_SIZE, MAX_POOL_SIZE)
}

type Slot = Option<ConversionService>;

// ============================================================================
// PoolInner
// ============================================================================

/// State shared between the pool and its outstanding handles.
pub(crate) struct PoolInner {
    size: usize,
    factory: Box<dyn RendererFactory>,
    options: ServiceOptions,
    sender: Sender<Slot>,
    receiver: Receiver<Slot>,
    closed: AtomicBool,
    created: AtomicUsize,
}

impl PoolInner {
    fn new(size: usize, factory: Box<dyn RendererFactory>, options: ServiceOptions) -> Arc<Self> {
        let (sender, receiver) = crossbeam_channel::bounded(size);
        for _ in 0..size {
            // Capacity equals size, so this never blocks.
            let _ = sender.send(None);
        }

        Arc::new(Self {
            size,
            factory,
            options,
            sender,
            receiver,
            closed: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn create_service(&self) -> Result<ConversionService> {
        let renderer = self.factory.create()?;
        let service = ConversionService::new(renderer, self.options.clone());
        let total = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!(
            "✅ Created conversion service {} ({} of {} slots started)",
            service.id(),
            total,
            self.size
        );
        Ok(service)
    }

    /// Turn a dequeued slot into a handle.
    fn fill_slot(self: &Arc<Self>, slot: Slot) -> Result<ServiceHandle> {
        let service = match slot {
            Some(service) => service,
            None => match self.create_service() {
                Ok(service) => service,
                Err(e) => {
                    log::error!("❌ Failed to create conversion service: {}", e);
                    let _ = self.sender.try_send(None);
                    return Err(e);
                }
            },
        };
        log::debug!("📤 Acquired service {}", service.id());
        Ok(ServiceHandle::new(service, Arc::clone(self)))
    }

    /// Put a service back, or close it if the pool is already closed.
    pub(crate) fn return_service(self_arc: &Arc<Self>, mut service: ConversionService) {
        let id = service.id();
        if self_arc.is_closed() {
            log::debug!("🛑 Pool closed, closing returned service {}", id);
            if let Err(e) = service.close() {
                log::warn!("⚠️ Failed to close service {}: {}", id, e);
            }
            return;
        }

        match self_arc.sender.try_send(Some(service)) {
            Ok(()) => {
                log::debug!("📥 Service {} returned to pool", id);
                // close() may have drained between the check above and the send.
                if self_arc.is_closed() {
                    let (closed, _) = self_arc.drain();
                    log::debug!("🛑 Pool closed during return, shut down {} services", closed);
                }
            }
            Err(TrySendError::Full(slot)) | Err(TrySendError::Disconnected(slot)) => {
                log::warn!("⚠️ No room for service {}, closing it", id);
                if let Some(mut service) = slot {
                    let _ = service.close();
                }
            }
        }
    }

    /// Close every queued service. Returns how many were closed and the
    /// first close error.
    fn drain(&self) -> (usize, Option<Md2PdfError>) {
        let mut first_error = None;
        let mut closed = 0usize;
        while let Ok(slot) = self.receiver.try_recv() {
            let Some(mut service) = slot else {
                continue;
            };
            closed += 1;
            if let Err(e) = service.close() {
                log::warn!("⚠️ Failed to close service {}: {}", service.id(), e);
                first_error.get_or_insert(e);
            }
        }
        (closed, first_error)
    }
}

// ============================================================================
// ServicePool
// ============================================================================

/// Fixed-size pool of [`ConversionService`]s with blocking acquisition.
pub struct ServicePool {
    inner: Arc<PoolInner>,
}

impl ServicePool {
    pub fn builder() -> ServicePoolBuilder {
        ServicePoolBuilder::new()
    }

    /// Chrome-backed pool sized and configured from `config`.
    pub fn from_config(config: &ConverterConfig) -> Self {
        let inner = PoolInner::new(
            resolve_pool_size(config.workers),
            Box::new(ChromeRendererFactory::from_config(config)),
            ServiceOptions::from_config(config),
        );
        log::info!("🏊 Service pool ready with {} slots", inner.size);
        Self { inner }
    }

    /// Take a service, blocking until one is free.
    ///
    /// After [`close`](Self::close) this blocks forever; callers must not
    /// acquire from a closed pool.
    ///
    /// # Errors
    ///
    /// The factory's error when a new service cannot be created. The slot
    /// stays usable.
    pub fn acquire(&self) -> Result<ServiceHandle> {
        loop {
            let slot = self.inner.receiver.recv().map_err(|_| {
                Md2PdfError::Configuration("service pool queue disconnected".to_string())
            })?;

            if self.inner.is_closed() {
                if let Some(mut service) = slot {
                    let _ = service.close();
                }
                continue;
            }

            return self.inner.fill_slot(slot);
        }
    }

    /// Take a service if one is free right now.
    pub fn try_acquire(&self) -> Result<Option<ServiceHandle>> {
        if self.inner.is_closed() {
            return Ok(None);
        }
        match self.inner.receiver.try_recv() {
            Ok(slot) => self.inner.fill_slot(slot).map(Some),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    /// Return a service early. Dropping the handle does the same.
    pub fn release(&self, handle: ServiceHandle) {
        drop(handle);
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.inner.size,
            available: self.inner.receiver.len(),
            created: self.inner.created.load(Ordering::SeqCst),
        }
    }

    /// Close every pooled service once.
    ///
    /// Services currently on loan are closed when their handles drop.
    /// Repeated calls are no-ops.
    ///
    /// # Errors
    ///
    /// The first error from closing a service; the rest are still closed.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::info!("🛑 Closing service pool...");

        let (closed, first_error) = self.inner.drain();

        log::info!("✅ Service pool closed ({} services shut down)", closed);
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for ServicePool {
    fn drop(&mut self) {
        if !self.is_closed() {
            log::debug!("ServicePool dropped without close(), closing now");
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for ServicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePool")
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// ServicePoolBuilder
// ============================================================================

/// Builder for [`ServicePool`].
pub struct ServicePoolBuilder {
    size: usize,
    factory: Option<Box<dyn RendererFactory>>,
    options: ServiceOptions,
}

impl ServicePoolBuilder {
    pub fn new() -> Self {
        Self {
            size: 0,
            factory: None,
            options: ServiceOptions::default(),
        }
    }

    /// Number of slots; `0` picks one via [`resolve_pool_size`].
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Renderer factory (required).
    pub fn factory(mut self, factory: Box<dyn RendererFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    /// # Errors
    ///
    /// [`Md2PdfError::Configuration`] if no factory was set.
    pub fn build(self) -> Result<ServicePool> {
        let factory = self
            .factory
            .ok_or_else(|| Md2PdfError::Configuration("No renderer factory provided".to_string()))?;
        let size = resolve_pool_size(self.size);

        log::info!("🏊 Building service pool with {} slots", size);
        Ok(ServicePool {
            inner: PoolInner::new(size, factory, self.options),
        })
    }
}

impl Default for ServicePoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::mock::MockRendererFactory;

    fn pool(size: usize, factory: &MockRendererFactory) -> ServicePool {
        ServicePool::builder()
            .size(size)
            .factory(Box::new(factory.clone()))
            .build()
            .unwrap()
    }

    /// Verifies the builder rejects a missing factory.
    #[test]
    fn test_builder_missing_factory() {
        match ServicePool::builder().size(2).build() {
            Err(Md2PdfError::Configuration(msg)) => {
                assert!(msg.contains("No renderer factory provided"), "got: {msg}")
            }
            _ => panic!("Expected Configuration error for missing factory"),
        }
    }

    /// Verifies services are created lazily, once per slot.
    #[test]
    fn test_lazy_creation() {
        let factory = MockRendererFactory::new();
        let pool = pool(2, &factory);
        assert_eq!(pool.stats(), PoolStats { size: 2, available: 2, created: 0 });

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.stats().in_use(), 2);
        drop((a, b));

        let _again = pool.acquire().unwrap();
        assert_eq!(factory.counters().created(), 2);
    }

    /// Verifies try_acquire reports an exhausted pool without blocking.
    #[test]
    fn test_try_acquire() {
        let pool = pool(1, &MockRendererFactory::new());
        let held = pool.try_acquire().unwrap().unwrap();
        assert!(pool.try_acquire().unwrap().is_none());
        pool.release(held);
        assert!(pool.try_acquire().unwrap().is_some());
    }

    /// Verifies a failed creation keeps the slot for the next attempt.
    #[test]
    fn test_failed_creation_returns_slot() {
        let pool = pool(1, &MockRendererFactory::always_fails("no chrome"));
        assert!(matches!(pool.acquire(), Err(Md2PdfError::BrowserLaunch(_))));
        assert_eq!(pool.stats().available, 1);
        assert!(matches!(pool.acquire(), Err(Md2PdfError::BrowserLaunch(_))));
    }

    /// Verifies close shuts pooled services once and late returns are closed.
    #[test]
    fn test_close() {
        let factory = MockRendererFactory::new();
        let pool = pool(2, &factory);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        drop(a);

        pool.close().unwrap();
        pool.close().unwrap();
        assert_eq!(factory.counters().closed(), 1);

        drop(b);
        assert_eq!(factory.counters().closed(), 2);
        assert_eq!(pool.stats().available, 0);
        assert!(pool.try_acquire().unwrap().is_none());
    }

    /// Verifies a service requeued after close drained the queue is still closed.
    #[test]
    fn test_return_after_drain_is_closed() {
        let factory = MockRendererFactory::new();
        let pool = pool(1, &factory);

        let service = pool.inner.create_service().unwrap();
        // Make room, as if the slot had been taken by an acquire.
        assert!(matches!(pool.inner.receiver.try_recv(), Ok(None)));

        // close() has flipped the flag and drained; the return lands afterwards.
        pool.inner.closed.store(true, Ordering::SeqCst);
        PoolInner::return_service(&pool.inner, service);

        assert_eq!(factory.counters().closed(), 1);
        assert!(pool.inner.receiver.is_empty());
    }

    /// Verifies automatic sizing stays within bounds.
    #[test]
    fn test_resolve_pool_size() {
        assert_eq!(resolve_pool_size(5), 5);
        assert_eq!(resolve_pool_size(20), 20);
        let auto = resolve_pool_size(0);
        assert!((MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&auto));
    }
}
