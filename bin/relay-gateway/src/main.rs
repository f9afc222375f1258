use anyhow::Result;
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::tokio::TokioIo;
use relay_core::RelayRegistry;
use relay_feed::HttpFeed;
use relay_http::{ConfigurationStore, RelayService, TlsServerConfig};
use relay_sync::{RefreshMetrics, RefreshPipeline, RefreshScheduler};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::GatewayConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::from_env()?;
    init_tracing(config.json_logs);

    info!("Starting relay-gateway...");
    info!("OVPN files location: {}", config.files_location.display());

    let registry = Arc::new(RelayRegistry::new());
    let metrics = RefreshMetrics::new()?;

    let feed = Arc::new(HttpFeed::new(config.feed.clone())?);
    info!("Upstream feed: {}", feed.url());

    let pipeline = Arc::new(RefreshPipeline::new(
        feed,
        registry.clone(),
        metrics.clone(),
        config.refresh.clone(),
    ));
    let scheduler = RefreshScheduler::new(pipeline)?;
    let trigger = scheduler.trigger();

    let shutdown = CancellationToken::new();
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

    let service = Arc::new(
        RelayService::new(registry, ConfigurationStore::new(&config.files_location))
            .with_metrics(metrics)
            .with_trigger(trigger),
    );

    let http_listener = TcpListener::bind(config.http_addr).await?;
    info!("HTTP server listening on {}", config.http_addr);
    let http_task = tokio::spawn(accept_connections(
        http_listener,
        service.clone(),
        None,
        shutdown.clone(),
    ));

    let https_task = match load_tls_acceptor(&config) {
        Some(acceptor) => {
            let https_listener = TcpListener::bind(config.https_addr).await?;
            info!("HTTPS server listening on {} (TLS configured)", config.https_addr);
            Some(tokio::spawn(accept_connections(
                https_listener,
                service.clone(),
                Some(acceptor),
                shutdown.clone(),
            )))
        }
        None => {
            warn!("TLS not configured - HTTPS listener not started");
            warn!(
                "Set {} and {} to enable HTTPS",
                config::ENV_TLS_CERT,
                config::ENV_TLS_KEY
            );
            None
        }
    };

    shutdown_signal().await?;
    info!("Shutdown signal received, stopping...");
    shutdown.cancel();

    scheduler_task.await?;
    http_task.await?;
    if let Some(task) = https_task {
        task.await?;
    }

    info!("relay-gateway stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Load TLS configuration when both certificate and key are configured
fn load_tls_acceptor(config: &GatewayConfig) -> Option<TlsAcceptor> {
    let (cert_path, key_path) = config.tls.as_ref()?;
    match TlsServerConfig::from_files(cert_path, key_path) {
        Ok(tls) => Some(TlsAcceptor::from(tls.config)),
        Err(e) => {
            warn!("Failed to load TLS configuration: {:#}", e);
            None
        }
    }
}

/// Resolve on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Accept connections until shutdown, wrapping them in TLS when an acceptor is given
async fn accept_connections(
    listener: TcpListener,
    service: Arc<RelayService>,
    tls_acceptor: Option<TlsAcceptor>,
    shutdown: CancellationToken,
) {
    loop {
        let (stream, peer_addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    warn!("Error accepting connection: {}", e);
                    continue;
                }
            },
        };

        let service = service.clone();
        let tls_acceptor = tls_acceptor.clone();

        tokio::task::spawn(async move {
            match tls_acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => serve_connection(TokioIo::new(tls_stream), peer_addr, service).await,
                    Err(e) => debug!("TLS error from {}: {}", peer_addr, e),
                },
                None => serve_connection(TokioIo::new(stream), peer_addr, service).await,
            }
        });
    }
}

async fn serve_connection<I>(io: I, peer_addr: SocketAddr, service: Arc<RelayService>)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let handler = service_fn(move |req| {
        let service = service.clone();
        async move { service.handle(req).await }
    });

    if let Err(e) = http1::Builder::new().serve_connection(io, handler).await {
        debug!("Error serving connection from {}: {}", peer_addr, e);
    }
}
