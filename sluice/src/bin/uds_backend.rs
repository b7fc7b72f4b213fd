use std::{convert::Infallible, path::PathBuf, sync::Arc};

use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::{Request, Response, body::Incoming, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::UnixListener;

#[derive(Parser)]
#[command(version, about = "Minimal HTTP/1.1 worker on a Unix socket, for trying out sluice")]
struct Cli {
    #[arg(long, default_value = "/tmp/rinhex/api1.sock")]
    socket: PathBuf,

    /// Name echoed in every response body
    #[arg(long, default_value = "api")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    if let Some(parent) = cli.socket.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // stale socket from a previous run
    let _ = std::fs::remove_file(&cli.socket);

    let listener = UnixListener::bind(&cli.socket)?;
    println!("{} listening on {}", cli.name, cli.socket.display());

    let name: Arc<str> = Arc::from(cli.name);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let name = name.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let text = format!("{} {} {}\n", name, req.method(), req.uri().path());
            async move { Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(text)))) }
        });

        tokio::spawn(async move {
            let _ = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await;
        });
    }
}
