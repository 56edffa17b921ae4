use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::FetchResult;
use crate::transport::{fetch_typed, Payload, Resource, Transport};

/// Something a [`Poller`](super::Poller) can pull values from.
#[async_trait]
pub trait Source<T>: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Loads the current value. `force` asks the source to skip any reuse it
    /// would otherwise do. Must return `FetchError::Cancelled` promptly once
    /// `cancel` fires.
    async fn load(&self, force: bool, cancel: &CancellationToken) -> FetchResult<Arc<T>>;
}

/// Uncached source: every load is one transport call.
pub struct DirectSource<T> {
    /// Network boundary used for every load.
    transport: Arc<dyn Transport>,
    /// The resource fetched on every load.
    resource: Resource,
    _value: PhantomData<fn() -> T>,
}

impl<T> DirectSource<T> {
    /// Creates a source that fetches `resource` on every load.
    pub fn new(transport: Arc<dyn Transport>, resource: Resource) -> Self {
        Self {
            transport,
            resource,
            _value: PhantomData,
        }
    }

    /// The resource this source fetches.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }
}

#[async_trait]
impl<T: Payload> Source<T> for DirectSource<T> {
    fn name(&self) -> &str {
        self.resource.path()
    }

    async fn load(&self, _force: bool, cancel: &CancellationToken) -> FetchResult<Arc<T>> {
        fetch_typed::<T>(self.transport.as_ref(), &self.resource, cancel)
            .await
            .map(Arc::new)
    }
}
