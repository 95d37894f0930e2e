//! RAII handle for pooled conversion services.
//!
//! A [`ServiceHandle`] gives its holder exclusive use of one
//! [`ConversionService`] and returns it to the pool when dropped, even on
//! early return or panic.
//!
//! ```rust,ignore
//! let mut service = pool.acquire()?;
//!
//! // Deref/DerefMut to ConversionService
//! let pdf = service.convert(&ctx, &input)?;
//!
//! // Returned to the pool here
//! ```

use std::sync::Arc;

use crate::pool::PoolInner;
use crate::service::ConversionService;

/// Exclusive loan of a [`ConversionService`] from a
/// [`ServicePool`](crate::ServicePool).
pub struct ServiceHandle {
    service: Option<ConversionService>,
    pool: Arc<PoolInner>,
}

impl ServiceHandle {
    pub(crate) fn new(service: ConversionService, pool: Arc<PoolInner>) -> Self {
        Self {
            service: Some(service),
            pool,
        }
    }

    /// Id of the underlying service.
    pub fn id(&self) -> u64 {
        self.service.as_ref().map(|s| s.id()).unwrap_or(0)
    }
}

impl std::ops::Deref for ServiceHandle {
    type Target = ConversionService;

    fn deref(&self) -> &Self::Target {
        match &self.service {
            Some(service) => service,
            None => unreachable!("service is only taken in Drop"),
        }
    }
}

impl std::ops::DerefMut for ServiceHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.service {
            Some(service) => service,
            None => unreachable!("service is only taken in Drop"),
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        if let Some(service) = self.service.take() {
            log::trace!("ServiceHandle {} dropped, returning to pool", service.id());
            PoolInner::return_service(&self.pool, service);
        }
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.service {
            Some(service) => f
                .debug_struct("ServiceHandle")
                .field("id", &service.id())
                .finish(),
            None => f
                .debug_struct("ServiceHandle")
                .field("state", &"returned")
                .finish(),
        }
    }
}
