mod forward;

pub use forward::Forwarder;

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::gate::{Limiter, RateLimited};

/// Run the gate: accept connections, apply admission control, forward
/// admitted requests to the upstream.
pub async fn run(config: Arc<Config>) -> Result<()> {
    let addr = config.listen;
    let listener = TcpListener::bind(addr).await.map_err(crate::error::GateError::Io)?;

    let builder = ConnBuilder::new(TokioExecutor::new());
    let forwarder = Forwarder::new(config.upstream.clone());
    let limiter = config.limit.as_ref().map(|limit| Arc::new(Limiter::new(limit)));

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        crate::error::GateError::Io(std::io::Error::other(format!(
            "Failed to setup SIGTERM handler: {e}"
        )))
    })?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
        crate::error::GateError::Io(std::io::Error::other(format!(
            "Failed to setup SIGINT handler: {e}"
        )))
    })?;

    info!(?addr, upstream = %config.upstream, limited = limiter.is_some(), "starting gate (h1/h2)");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                let builder = builder.clone();
                let forwarder = forwarder.clone();
                let limiter = limiter.clone();

                tokio::spawn(async move {
                    let svc = service_fn(move |req: Request<Incoming>| {
                        let forwarder = forwarder.clone();
                        async move { Ok::<_, hyper::Error>(forwarder.forward(req, peer).await) }
                    });

                    let served = match limiter {
                        Some(limiter) => {
                            builder
                                .serve_connection(
                                    TokioIo::new(stream),
                                    RateLimited::new(limiter, peer, svc),
                                )
                                .await
                        }
                        None => builder.serve_connection(TokioIo::new(stream), svc).await,
                    };

                    if let Err(e) = served {
                        warn!(?peer, error = %e, "serve_connection error");
                    }
                });
            }
        }
    }

    info!("Gate stopped");
    Ok(())
}
