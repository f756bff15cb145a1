use crate::exchange::CompletionCallback;
use crate::pool::ResourcePool;
use crate::producer::ProducerResource;

/// Returns the resource to its pool and then fires the callback when
/// dropped, on every exit path of a send including unwinding.
pub struct ReleaseGuard<'a> {
    resource: Option<ProducerResource>,
    pool: &'a dyn ResourcePool,
    callback: Option<Box<dyn CompletionCallback>>,
    synchronous: bool,
}

impl<'a> ReleaseGuard<'a> {
    pub fn new(
        resource: ProducerResource,
        pool: &'a dyn ResourcePool,
        callback: Box<dyn CompletionCallback>,
        synchronous: bool,
    ) -> Self {
        Self {
            resource: Some(resource),
            pool,
            callback: Some(callback),
            synchronous,
        }
    }

    pub fn resource(&self) -> &ProducerResource {
        // Only taken in drop.
        self.resource
            .as_ref()
            .unwrap_or_else(|| unreachable!("resource released before guard dropped"))
    }
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.return_resource(resource);
        }
        if let Some(callback) = self.callback.take() {
            callback.done(self.synchronous);
        }
    }
}
