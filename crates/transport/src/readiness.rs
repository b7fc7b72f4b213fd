//! Startup gate: wait for backend sockets to appear before serving.
//!
//! Readiness is advisory. A socket that never shows up is logged and the
//! caller carries on; requests to it will fail over or error at dispatch time.

use std::{
    os::unix::fs::FileTypeExt,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Readiness::Ready { attempts } | Readiness::TimedOut { attempts } => *attempts,
        }
    }
}

/// True when `path` exists and is a Unix domain socket.
pub async fn is_socket(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.file_type().is_socket())
        .unwrap_or(false)
}

/// Polls `path` up to `max_attempts` times, `interval` apart.
///
/// There is no sleep after the final poll, so the worst case is
/// `(max_attempts - 1) * interval`. A `max_attempts` of 0 still checks once.
pub async fn await_ready(path: &Path, max_attempts: u32, interval: Duration) -> Readiness {
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if is_socket(path).await {
            info!("Socket {} is ready", path.display());
            return Readiness::Ready { attempts: attempt };
        }

        if attempt < max_attempts {
            info!(
                "Waiting for socket {}... ({}/{})",
                path.display(),
                attempt,
                max_attempts
            );
            tokio::time::sleep(interval).await;
        }
    }

    warn!(
        "Socket {} not found after {} attempts, continuing anyway",
        path.display(),
        max_attempts
    );
    Readiness::TimedOut {
        attempts: max_attempts,
    }
}

/// Runs [`await_ready`] for every path concurrently; results keep input order.
pub async fn await_all_ready(
    paths: &[PathBuf],
    max_attempts: u32,
    interval: Duration,
) -> Vec<Readiness> {
    let handles: Vec<_> = paths
        .iter()
        .cloned()
        .map(|path| {
            tokio::spawn(async move { await_ready(&path, max_attempts, interval).await })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (handle, path) in handles.into_iter().zip(paths) {
        match handle.await {
            Ok(readiness) => results.push(readiness),
            Err(err) => {
                error!("Readiness check for {} aborted: {}", path.display(), err);
                results.push(Readiness::TimedOut { attempts: 0 });
            }
        }
    }
    results
}
