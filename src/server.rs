//! TCP listener feeding the [`Pipeline`].
//!
//! Each connection speaks HTTP/1.1 or HTTP/2, whichever the client picks,
//! and every request on it goes through [`Pipeline::handle`]. On SIGTERM or
//! Ctrl-C the listener stops accepting and [`Server::serve`] returns once the
//! open connections have finished.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::app::App;
use crate::body::ResponseBody;
use crate::error::{BoxError, Error};
use crate::pipeline::Pipeline;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use waypost::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Freezes `app` and serves it until a shutdown signal arrives.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.serve_pipeline(Arc::new(app.into_pipeline())).await
    }

    /// Starts accepting connections and dispatching them through `pipeline`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve_pipeline(self, pipeline: Arc<Pipeline>) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, routes = pipeline.router().len(), "waypost listening");

        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    tasks.spawn(serve_connection(Arc::clone(&pipeline), stream, remote_addr));
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("waypost stopped");
        Ok(())
    }
}

async fn serve_connection(pipeline: Arc<Pipeline>, stream: TcpStream, peer: SocketAddr) {
    let svc = service_fn(move |req| dispatch(Arc::clone(&pipeline), req));
    let conn = ConnBuilder::new(TokioExecutor::new());
    if let Err(e) = conn.serve_connection(TokioIo::new(stream), svc).await {
        debug!(%peer, "connection closed with error: {e}");
    }
}

/// Boxes the hyper body and runs the pipeline. Failures are answered inside
/// the pipeline, so hyper never sees an error.
async fn dispatch(
    pipeline: Arc<Pipeline>,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<ResponseBody>, Infallible> {
    let req = req.map(|body| body.map_err(|e| -> BoxError { Box::new(e) }).boxed_unsync());
    Ok(pipeline.handle(req).await)
}

/// SIGTERM or Ctrl-C, whichever comes first. Ctrl-C only off Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
