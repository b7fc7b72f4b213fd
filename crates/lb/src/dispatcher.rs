use log::{debug, warn};

use crate::{BackendPool, Forward, Rotation, RotationPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailoverPolicy {
    /// Retry on "the other one", only defined for a pool of exactly two.
    #[default]
    Pair,
    /// Retry on the next index in pool order, for any pool of two or more.
    Next,
    /// Never retry.
    Off,
}

impl FailoverPolicy {
    pub fn from_config(value: &str) -> Result<Self, String> {
        let mode = value.trim().to_lowercase();
        match mode.as_str() {
            "pair" => Ok(Self::Pair),
            "next" => Ok(Self::Next),
            "off" | "none" | "disabled" => Ok(Self::Off),
            _ => Err(format!("unsupported failover policy: {value}")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FailoverPolicy::Pair => "pair",
            FailoverPolicy::Next => "next",
            FailoverPolicy::Off => "off",
        }
    }
}

/// Index of the backend to retry on after `primary` failed, if any.
///
/// Never returns `primary` itself, so a request touches at most two distinct
/// backends.
pub fn alternate(policy: FailoverPolicy, primary: usize, len: usize) -> Option<usize> {
    if primary >= len {
        return None;
    }

    match policy {
        FailoverPolicy::Off => None,
        FailoverPolicy::Pair if len == 2 => Some(1 - primary),
        FailoverPolicy::Pair => None,
        FailoverPolicy::Next if len >= 2 => Some((primary + 1) % len),
        FailoverPolicy::Next => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError<E> {
    #[error("no backends configured")]
    NoBackendsConfigured,

    #[error("backend {backend} unavailable: {source}")]
    BackendUnavailable {
        backend: usize,
        #[source]
        source: E,
    },

    #[error(
        "all backends failed (primary {primary}: {primary_error}; fallback {fallback}: {fallback_error})"
    )]
    AllBackendsFailed {
        primary: usize,
        primary_error: E,
        fallback: usize,
        #[source]
        fallback_error: E,
    },
}

/// Successful dispatch outcome.
#[derive(Debug)]
pub struct Dispatched<R> {
    pub backend: usize,
    pub fallback: bool,
    pub response: R,
}

pub struct Dispatcher<B> {
    pool: BackendPool<B>,
    rotation: Rotation,
    failover: FailoverPolicy,
}

impl<B: Forward> Dispatcher<B> {
    pub fn new(pool: BackendPool<B>, rotation: RotationPolicy, failover: FailoverPolicy) -> Self {
        Self {
            pool,
            rotation: Rotation::new(rotation),
            failover,
        }
    }

    pub fn pool(&self) -> &BackendPool<B> {
        &self.pool
    }

    pub fn rotation(&self) -> &Rotation {
        &self.rotation
    }

    pub fn failover(&self) -> FailoverPolicy {
        self.failover
    }

    /// Sends `req` to the next backend in rotation, retrying once on the
    /// alternate backend when the first attempt fails.
    ///
    /// Failures leave no trace: the failed backend keeps its place in the
    /// rotation for the next request.
    pub async fn dispatch(
        &self,
        req: &B::Request,
    ) -> Result<Dispatched<B::Response>, DispatchError<B::Error>> {
        let primary = self
            .rotation
            .next(self.pool.len())
            .ok_or(DispatchError::NoBackendsConfigured)?;
        let backend = &self.pool[primary];

        let primary_error = match backend.forward(req).await {
            Ok(response) => {
                debug!("Request served by {}", backend.label());
                return Ok(Dispatched {
                    backend: primary,
                    fallback: false,
                    response,
                });
            }
            Err(err) => err,
        };

        let Some(fallback) = alternate(self.failover, primary, self.pool.len()) else {
            warn!("Backend {} failed: {}", backend.label(), primary_error);
            return Err(DispatchError::BackendUnavailable {
                backend: primary,
                source: primary_error,
            });
        };

        let other = &self.pool[fallback];
        warn!(
            "Backend {} failed: {}; retrying on {}",
            backend.label(),
            primary_error,
            other.label()
        );

        match other.forward(req).await {
            Ok(response) => Ok(Dispatched {
                backend: fallback,
                fallback: true,
                response,
            }),
            Err(fallback_error) => {
                warn!(
                    "Fallback backend {} failed too: {}",
                    other.label(),
                    fallback_error
                );
                Err(DispatchError::AllBackendsFailed {
                    primary,
                    primary_error,
                    fallback,
                    fallback_error,
                })
            }
        }
    }
}
