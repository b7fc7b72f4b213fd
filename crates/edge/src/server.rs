use std::{convert::Infallible, future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use hyper::{Request, body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::{TokioIo, TokioTimer};
use log::{debug, error, info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinSet,
    time::{sleep, timeout},
};

use sluice_lb::Dispatcher;
use sluice_transport::uds_client::UdsBackend;

use crate::{
    EdgeSettings,
    handler::handle,
    idle::{Activity, Tracked},
};

// pause after a failed accept (EMFILE and friends) before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("listener error: {0}")]
    Io(#[from] io::Error),
}

/// TCP front end: accepts connections and hands every request to the
/// dispatcher on its own task.
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher<UdsBackend>>,
    settings: EdgeSettings,
}

impl Server {
    pub async fn bind(
        addr: &str,
        dispatcher: Arc<Dispatcher<UdsBackend>>,
        settings: EdgeSettings,
    ) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            dispatcher,
            settings,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> Result<(), ServeError> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts until `shutdown` resolves, then asks every open connection to
    /// finish its current request and close. Returns once they are all gone,
    /// or after `shutdown_timeout`, whichever comes first.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServeError>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        let Server {
            listener,
            dispatcher,
            settings,
        } = self;
        info!("Listening on {}", addr);

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        let listener_ref = &listener;
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => continue,
                accepted = next_connection(move || listener_ref.accept()) => accepted,
            };

            if let Err(err) = stream.set_nodelay(true) {
                debug!("set_nodelay failed for {}: {}", peer, err);
            }

            connections.spawn(serve_connection(
                stream,
                peer,
                dispatcher.clone(),
                settings.clone(),
                stop_rx.clone(),
            ));
        }

        drop(listener);
        info!(
            "Stopped accepting on {}, draining {} connections",
            addr,
            connections.len()
        );

        let _ = stop_tx.send(true);
        let drained = timeout(settings.shutdown_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                "{} connections still open after {:?}, closing them",
                connections.len(),
                settings.shutdown_timeout
            );
            connections.shutdown().await;
        }

        Ok(())
    }
}

/// Calls `accept` until it succeeds, pausing [`ACCEPT_BACKOFF`] after each
/// failure so a persistent error cannot spin the loop.
async fn next_connection<T, A, Fut>(mut accept: A) -> T
where
    A: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(err) => {
                error!("Accept failed: {}", err);
                sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher<UdsBackend>>,
    settings: EdgeSettings,
    mut stop: watch::Receiver<bool>,
) {
    let read_timeout = settings.read_timeout;
    let service = service_fn(move |req: Request<Incoming>| {
        let dispatcher = dispatcher.clone();
        async move { Ok::<_, Infallible>(handle(&dispatcher, req, read_timeout).await) }
    });

    let activity = Activity::new();
    let io = TokioIo::new(Tracked::new(stream, activity.clone()));

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(settings.read_timeout)
        .keep_alive(true);

    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        let idle_left = settings.idle_timeout.saturating_sub(activity.idle_for());

        tokio::select! {
            res = conn.as_mut() => {
                if let Err(err) = res {
                    debug!("Connection from {} closed: {}", peer, err);
                }
                return;
            }
            _ = sleep(idle_left), if !closing => {
                if activity.idle_for() >= settings.idle_timeout {
                    debug!("Closing idle connection from {}", peer);
                    conn.as_mut().graceful_shutdown();
                    closing = true;
                }
            }
            _ = stop.changed(), if !closing => {
                conn.as_mut().graceful_shutdown();
                closing = true;
            }
        }
    }
}
