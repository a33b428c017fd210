// src/server/connection_loop.rs

//! The control service's accept loop: for every inbound TCP connection,
//! completes the TLS handshake (if enabled), builds a `ControlServiceLocator`
//! bound to the fan-out engine, drives the connection's `ConnectionHandler`
//! and runs a `Pinger` alongside it for the
//! connection's lifetime, with a signal-driven graceful shutdown.

use super::context::ServerContext;
use super::stream::AnyStream;
use crate::connection::ConnectionHandler;
use crate::control::ControlServiceLocator;
use crate::pinger::Pinger;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
#[cfg(windows)]
use tokio::signal;

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
            _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
        }
    }
    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Ctrl-C received, initiating graceful shutdown.");
    }
}

/// The main accept loop. Runs until a shutdown signal arrives, then closes
/// the listener, lets in-flight connections drain on their own shutdown
/// broadcast, and joins the fan-out engine's task.
pub async fn run(mut ctx: ServerContext) {
    let mut connection_tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = await_shutdown_signal() => {
                break;
            }

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        info!("accepted agent connection from {addr}");
                        let fanout = ctx.fanout.clone();
                        let aggregator = ctx.aggregator.clone();
                        let acceptor = ctx.acceptor.clone();
                        let conn_shutdown_rx = ctx.shutdown_tx.subscribe();
                        let ping_interval = Duration::from_secs(ctx.config.ping_interval_secs);

                        connection_tasks.spawn(async move {
                            let stream = match acceptor {
                                Some(acceptor) => match acceptor.accept(socket).await {
                                    Ok(tls_stream) => AnyStream::TlsServer(Box::new(tls_stream)),
                                    Err(e) => {
                                        warn!("TLS handshake with {addr} failed: {e}");
                                        return;
                                    }
                                },
                                None => AnyStream::Tcp(socket),
                            };

                            let locator = Arc::new(ControlServiceLocator::new(fanout, aggregator));
                            let (mut handler, handle) = ConnectionHandler::new(stream, addr, locator, conn_shutdown_rx);
                            let pinger = Pinger::start(handle.outbound(), ping_interval);

                            if let Err(e) = handler.run().await {
                                warn!("connection from {addr} ended with error: {e}");
                            }
                            pinger.stop();
                            info!("connection from {addr} closed");
                        });
                    }
                    Err(e) => error!("failed to accept connection: {e}"),
                }
            }

            Some(res) = connection_tasks.join_next(), if !connection_tasks.is_empty() => {
                if let Err(e) = res {
                    if e.is_panic() {
                        error!("a connection task panicked: {e:?}");
                    }
                }
            }
        }
    }

    info!("shutting down: closing listener and signaling live connections");
    if ctx.shutdown_tx.send(()).is_err() {
        warn!("no connections were listening for the shutdown signal");
    }

    if tokio::time::timeout(Duration::from_secs(10), async {
        while connection_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("timed out waiting for connections to close cleanly");
    }

    if let Some(metrics_task) = ctx.metrics_task.take() {
        metrics_task.abort();
    }
    ctx.fanout_task.abort();
    info!("control service shutdown complete");
}
