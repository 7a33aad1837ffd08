//! Process wiring
//!
//! Builds the exporters in registration order (broadcast, OSC, metrics),
//! binds every listener before anything starts serving, then runs the
//! selected ingestion transport alongside the exporter servers.

use anyhow::{bail, Context};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::task::JoinSet;

use hds_relay_core::{Exporter, ExporterSet, IngestMode, RelayConfig};

use crate::exporters::{BroadcastServer, MetricsEndpoint, SignalSender, UdpSink};
use crate::http;
use crate::receivers::{PullReceiver, PushReceiver};

pub const PUSH_RECEIVER: &str = "push receiver";
pub const BROADCAST_SERVER: &str = "broadcast server";
pub const METRICS_ENDPOINT: &str = "metrics endpoint";

struct BoundListener {
    component: &'static str,
    listener: TcpListener,
    router: Router,
}

enum Ingest {
    Push(Arc<PushReceiver>),
    Pull(PullReceiver),
}

/// A fully bound relay, ready to run
pub struct Relay {
    exporters: ExporterSet,
    listeners: Vec<BoundListener>,
    ingest: Ingest,
}

async fn bind_listener(component: &'static str, port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {} on {}", component, addr))?;
    tracing::info!(component, addr = %listener.local_addr()?, "Listening");
    Ok(listener)
}

impl Relay {
    /// Construct every component and bind its listener.
    ///
    /// Must run inside a Tokio runtime. Fails on the first listener that
    /// cannot be bound; nothing is served until [`Relay::run`].
    pub async fn bind(config: &RelayConfig) -> anyhow::Result<Self> {
        let mut exporters: Vec<Arc<dyn Exporter>> = Vec::new();
        let mut listeners = Vec::new();

        if config.broadcast.enabled {
            let listener = bind_listener(BROADCAST_SERVER, config.broadcast.port).await?;
            let server = Arc::new(BroadcastServer::new());
            listeners.push(BoundListener {
                component: BROADCAST_SERVER,
                listener,
                router: server.router(),
            });
            exporters.push(server);
        }

        if config.signal.enabled {
            let target = config.signal.target();
            let sink = UdpSink::connect(&target)
                .with_context(|| format!("opening OSC socket to {}", target))?;
            exporters.push(Arc::new(SignalSender::new(
                &config.signal,
                Arc::new(sink),
                &Handle::current(),
            )));
        }

        if config.metrics.enabled {
            let listener = bind_listener(METRICS_ENDPOINT, config.metrics.port).await?;
            let endpoint = Arc::new(
                MetricsEndpoint::new(&config.metrics).context("registering metrics collector")?,
            );
            listeners.push(BoundListener {
                component: METRICS_ENDPOINT,
                listener,
                router: endpoint.router(),
            });
            exporters.push(endpoint);
        }

        let exporters = ExporterSet::new(exporters);
        tracing::info!(
            mode = ?config.ingest.mode,
            exporters = ?exporters.names(),
            "Relay configured"
        );

        let ingest = match config.ingest.mode {
            IngestMode::Push => {
                let listener = bind_listener(PUSH_RECEIVER, config.ingest.push_port).await?;
                let receiver = Arc::new(PushReceiver::new(
                    exporters.clone(),
                    config.ingest.push_protocol,
                ));
                listeners.push(BoundListener {
                    component: PUSH_RECEIVER,
                    listener,
                    router: receiver.router(),
                });
                Ingest::Push(receiver)
            }
            IngestMode::Pull => {
                let url = config
                    .ingest
                    .pull_url
                    .clone()
                    .context("pull mode requires a pull URL")?;
                Ingest::Pull(PullReceiver::new(
                    exporters.clone(),
                    url,
                    config.ingest.backoff(),
                ))
            }
        };

        Ok(Self {
            exporters,
            listeners,
            ingest,
        })
    }

    /// Bound address of a component's listener
    pub fn local_addr(&self, component: &str) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|bound| bound.component == component)
            .and_then(|bound| bound.listener.local_addr().ok())
    }

    pub fn exporters(&self) -> &ExporterSet {
        &self.exporters
    }

    /// The push receiver, when running in push mode
    pub fn push_receiver(&self) -> Option<&Arc<PushReceiver>> {
        match &self.ingest {
            Ingest::Push(receiver) => Some(receiver),
            Ingest::Pull(_) => None,
        }
    }

    /// Serve every listener and run the ingestion transport.
    ///
    /// Only returns if a component stops, which is always an error.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut tasks: JoinSet<anyhow::Result<&'static str>> = JoinSet::new();

        for bound in self.listeners {
            let component = bound.component;
            tasks.spawn(async move {
                http::serve(bound.listener, bound.router)
                    .await
                    .with_context(|| format!("serving {}", component))?;
                Ok(component)
            });
        }

        if let Ingest::Pull(receiver) = self.ingest {
            tasks.spawn(async move {
                receiver.run().await;
                Ok("pull receiver")
            });
        }

        match tasks.join_next().await {
            Some(Ok(Ok(component))) => bail!("{} stopped unexpectedly", component),
            Some(Ok(Err(e))) => Err(e),
            Some(Err(e)) => Err(e).context("relay task panicked"),
            None => bail!("nothing to run"),
        }
    }
}

/// Validate, bind and run until a shutdown signal arrives
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    let relay = Relay::bind(&config).await?;

    tokio::select! {
        result = relay.run() => result,
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Installing Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Installing SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
