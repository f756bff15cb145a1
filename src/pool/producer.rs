use crate::pool::{BoundedPool, PoolStats};
use crate::producer::ProducerResource;
use crate::{Error, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a dispatcher hands a producer resource back after a send.
pub trait ResourcePool: Send + Sync {
    fn return_resource(&self, resource: ProducerResource);
}

type ResourceMaker = Box<dyn Fn() -> Option<ProducerResource> + Send + Sync>;

/// Caches producer resources between sends. New resources come from the
/// maker, which yields `None` when it could not build one.
pub struct ProducerPool {
    make: ResourceMaker,
    pool: BoundedPool<ProducerResource>,
}

impl ProducerPool {
    pub fn new<F>(producer_count: usize, borrow_timeout: Duration, make: F) -> Self
    where
        F: Fn() -> Option<ProducerResource> + Send + Sync + 'static,
    {
        Self {
            make: Box::new(make),
            pool: BoundedPool::new("producer", producer_count, borrow_timeout),
        }
    }

    pub fn borrow(&self) -> Result<ProducerResource> {
        self.pool.borrow(|| {
            (self.make)().ok_or_else(|| Error::ResourceUnavailable {
                message: "unable to create a producer resource".to_string(),
            })
        })
    }

    /// Builds up to `count` resources ahead of the first send. Returns how
    /// many were created.
    pub fn prefill(&self, count: usize) -> usize {
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            match self.borrow() {
                Ok(resource) => created.push(resource),
                Err(e) => {
                    warn!("Stopped prefilling producer pool: {}", e);
                    break;
                }
            }
        }

        let filled = created.len();
        for resource in created {
            self.return_resource(resource);
        }
        info!("Producer pool prefilled with {}/{} resource(s)", filled, count);
        filled
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn close(&self) {
        let idle = self.pool.close();
        debug!("Closing {} idle producer resource(s)", idle.len());
        for resource in idle {
            resource.close();
        }
    }
}

impl ResourcePool for ProducerPool {
    fn return_resource(&self, resource: ProducerResource) {
        if let Some(resource) = self.pool.give_back(resource) {
            resource.close();
        }
    }
}
