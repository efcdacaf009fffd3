/// Liveness endpoint - readiness and a metrics snapshot over HTTP
///
/// Purely observational: the poller writes to [`Metrics`], the server only
/// reads it. A server failure is logged and never stops the poller.
mod routes;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpServer, web};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::metrics::Metrics;

pub struct HealthServer {
    handle: ServerHandle,
    task: JoinHandle<()>,
    addr: SocketAddr,
}

impl HealthServer {
    /// Bind and start serving in the background.
    pub fn start(addr: SocketAddr, metrics: Arc<Metrics>) -> io::Result<Self> {
        let data = web::Data::from(metrics);
        let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::routes))
            .workers(1)
            .disable_signals()
            .bind(addr)?;

        let addr = server.addrs().first().copied().unwrap_or(addr);
        let server = server.run();
        let handle = server.handle();

        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                warn!(error = %e, "Health server stopped with an error");
            }
        });

        Ok(Self { handle, task, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Health server task failed");
        }
    }
}
