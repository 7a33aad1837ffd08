//! OSC heart-rate forwarder
//!
//! Sends `heart_rate / 256` as a float to a fixed OSC address whenever the
//! heart rate changes. With an "enabled" address configured it also sends a
//! boolean: `true` on activity, `false` once no heart-rate update has arrived
//! for the debounce interval.

use rosc::{OscMessage, OscPacket, OscType};
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use hds_relay_core::{key_touches, ExportError, Exporter, HealthRecord, MetricKey, SignalConfig};

/// Heart rate that maps to 1.0
pub const HEART_RATE_MAX: f32 = 256.0;

pub fn normalize(heart_rate: i64) -> f32 {
    heart_rate as f32 / HEART_RATE_MAX
}

/// Destination for encoded OSC packets
pub trait PacketSink: Send + Sync {
    fn send(&self, packet: &OscPacket) -> Result<(), ExportError>;
}

/// Fire-and-forget UDP sink
pub struct UdpSink {
    socket: UdpSocket,
}

impl UdpSink {
    pub fn connect(target: &str) -> std::io::Result<Self> {
        let addr = target.to_socket_addrs()?.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no address for {}", target),
            )
        })?;
        let local = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)?;
        socket.connect(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }
}

impl PacketSink for UdpSink {
    fn send(&self, packet: &OscPacket) -> Result<(), ExportError> {
        let bytes = rosc::encoder::encode(packet).map_err(|e| ExportError::Encode(e.to_string()))?;
        self.socket.send(&bytes)?;
        Ok(())
    }
}

fn message(address: &str, arg: OscType) -> OscPacket {
    OscPacket::Message(OscMessage {
        addr: address.to_string(),
        args: vec![arg],
    })
}

/// Exporter forwarding heart rate over OSC
pub struct SignalSender {
    sink: Arc<dyn PacketSink>,
    address: String,
    activity: Option<Arc<Notify>>,
    debounce_task: Option<JoinHandle<()>>,
}

impl SignalSender {
    /// The debounce task for the enabled flag, if configured, runs on `runtime`.
    pub fn new(config: &SignalConfig, sink: Arc<dyn PacketSink>, runtime: &Handle) -> Self {
        tracing::info!(
            addr = %config.address,
            ip = %config.target(),
            enabled_addr = ?config.enabled_address,
            "OSC config"
        );

        let (activity, debounce_task) = match &config.enabled_address {
            Some(enabled_address) => {
                let activity = Arc::new(Notify::new());
                let task = runtime.spawn(debounce_enabled(
                    Arc::clone(&sink),
                    enabled_address.clone(),
                    Arc::clone(&activity),
                    config.debounce(),
                ));
                (Some(activity), Some(task))
            }
            None => (None, None),
        };

        Self {
            sink,
            address: config.address.clone(),
            activity,
            debounce_task,
        }
    }
}

impl Exporter for SignalSender {
    fn name(&self) -> &'static str {
        "osc"
    }

    fn update(&self, record: &HealthRecord, key: &str) -> Result<(), ExportError> {
        if !key_touches(key, MetricKey::HeartRate) {
            return Ok(());
        }
        if let Some(activity) = &self.activity {
            activity.notify_one();
        }
        self.sink.send(&message(
            &self.address,
            OscType::Float(normalize(record.heart_rate)),
        ))
    }
}

impl Drop for SignalSender {
    fn drop(&mut self) {
        if let Some(task) = self.debounce_task.take() {
            task.abort();
        }
    }
}

/// Owns every send on the enabled address so true/false never reorder.
async fn debounce_enabled(
    sink: Arc<dyn PacketSink>,
    address: String,
    activity: Arc<Notify>,
    interval: Duration,
) {
    let send = |enabled: bool| {
        if let Err(e) = sink.send(&message(&address, OscType::Bool(enabled))) {
            tracing::error!(addr = %address, enabled, error = %e, "Sending OSC enabled flag");
        }
    };

    loop {
        activity.notified().await;
        send(true);

        loop {
            tokio::select! {
                _ = activity.notified() => send(true),
                _ = tokio::time::sleep(interval) => {
                    send(false);
                    break;
                }
            }
        }
    }
}
