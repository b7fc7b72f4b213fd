//! Backend selection and failover for a fixed pool of upstreams.
//!
//! The pool is built once and never mutated. The only shared mutable state is
//! the rotation counter, so a [`Dispatcher`] can be shared behind an `Arc` and
//! called from any number of tasks at once.

use std::{future::Future, ops::Index};

mod dispatcher;
mod rotation;

pub use dispatcher::{DispatchError, Dispatched, Dispatcher, FailoverPolicy, alternate};
pub use rotation::{Rotation, RotationPolicy};

/// Something a request can be sent to.
///
/// Implementations own whatever connection pooling and timeouts they need;
/// the dispatcher only sees success or failure.
pub trait Forward: Send + Sync {
    type Request: Sync;
    type Response: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Short human readable name used in logs.
    fn label(&self) -> &str;

    fn forward(
        &self,
        req: &Self::Request,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send;
}

/// Ordered, fixed-size set of backends.
pub struct BackendPool<B> {
    backends: Vec<B>,
}

impl<B> BackendPool<B> {
    pub fn new(backends: Vec<B>) -> Self {
        Self { backends }
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&B> {
        self.backends.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &B> {
        self.backends.iter()
    }
}

impl<B> Index<usize> for BackendPool<B> {
    type Output = B;

    fn index(&self, index: usize) -> &B {
        &self.backends[index]
    }
}

impl<B> FromIterator<B> for BackendPool<B> {
    fn from_iter<I: IntoIterator<Item = B>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
