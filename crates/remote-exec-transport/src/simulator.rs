//! Simulated device speaking the device side of the wire protocol.

use remote_exec_core::{DisplayKind, PeripheralKind};
use remote_exec_pipeline::program::MAGIC;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    loopback::{DeviceLink, LoopbackHub, SendError},
    protocol::ClientMessage,
};

/// A peripheral the device reports on every accepted link.
#[derive(Debug, Clone)]
struct Peripheral {
    port: String,
    kind: PeripheralKind,
    payload: String,
}

/// Device that accepts programs over loopback links and echoes their
/// lifecycle back as status and display messages.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    peripherals: Vec<Peripheral>,
    refuse: Option<String>,
}

impl SimulatedDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a raw reading for `port` after each handshake.
    #[must_use]
    pub fn with_peripheral(
        mut self,
        port: impl Into<String>,
        kind: PeripheralKind,
        payload: impl Into<String>,
    ) -> Self {
        self.peripherals.push(Peripheral {
            port: port.into(),
            kind,
            payload: payload.into(),
        });
        self
    }

    /// Refuse every handshake with `reason`.
    #[must_use]
    pub fn refusing(mut self, reason: impl Into<String>) -> Self {
        self.refuse = Some(reason.into());
        self
    }

    /// Listen on `address` of `hub` and serve each link on its own task.
    pub fn spawn(self, hub: &LoopbackHub, address: impl Into<String>) -> JoinHandle<()> {
        let address = address.into();
        let links = hub.listen(address.clone());
        tokio::spawn(self.serve(address, links))
    }

    async fn serve(self, address: String, mut links: mpsc::UnboundedReceiver<DeviceLink>) {
        while let Some(link) = links.recv().await {
            info!(address = %address, client_id = %link.client_id, "device link opened");
            let device = self.clone();
            tokio::spawn(async move {
                if let Err(e) = device.serve_link(link).await {
                    debug!(error = %e, "device link ended");
                }
            });
        }
    }

    async fn serve_link(&self, mut link: DeviceLink) -> Result<(), SendError> {
        while let Some(message) = link.recv().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    link.display(e.to_string(), DisplayKind::Error)?;
                    continue;
                }
            };
            match &message {
                ClientMessage::Hello { .. } => {
                    if let Some(reason) = &self.refuse {
                        link.refuse(reason.clone())?;
                        return Ok(());
                    }
                    link.accept()?;
                    for p in &self.peripherals {
                        link.monitor(p.port.clone(), p.kind, p.payload.clone())?;
                    }
                }
                ClientMessage::Run { .. } => Self::run(&link, &message)?,
                ClientMessage::Stop => link.status(false)?,
                ClientMessage::Bye => return Ok(()),
            }
        }
        Ok(())
    }

    fn run(link: &DeviceLink, message: &ClientMessage) -> Result<(), SendError> {
        let program = match message.decode_program() {
            Ok(Some(program)) => program,
            Ok(None) => return Ok(()),
            Err(e) => return link.display(e.to_string(), DisplayKind::Error),
        };
        if !program.starts_with(MAGIC) {
            return link.display("Invalid program header", DisplayKind::Error);
        }

        link.status(true)?;
        link.display(
            format!("Program loaded ({} bytes)", program.len()),
            DisplayKind::Output,
        )?;
        link.display("undefined", DisplayKind::Result)?;
        link.status(false)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use remote_exec_core::{
        Transport, TransportError, TransportEvent, TransportFactory, TransportOptions,
    };
    use tokio::sync::broadcast;

    use super::*;

    fn options() -> TransportOptions {
        TransportOptions {
            client_id: "client-1".into(),
            device_id: "dev-1".into(),
            address: "loop://ev3".into(),
        }
    }

    async fn next(events: &mut broadcast::Receiver<TransportEvent>) -> TransportEvent {
        events.recv().await.unwrap()
    }

    #[tokio::test]
    async fn test_runs_program() {
        let hub = LoopbackHub::new();
        SimulatedDevice::new()
            .with_peripheral("outA", PeripheralKind::Motor, "lego-ev3-l-motor 0 0")
            .spawn(&hub, "loop://ev3");

        let client: Arc<dyn Transport> = hub.create(options()).unwrap();
        let mut events = client.events();
        client.connect().await.unwrap();
        assert_eq!(next(&mut events).await, TransportEvent::Connected);
        assert!(matches!(
            next(&mut events).await,
            TransportEvent::Telemetry { ref port, .. } if port == "outA"
        ));

        client.send(Bytes::from_static(b"SVM1rest")).await.unwrap();
        assert_eq!(
            next(&mut events).await,
            TransportEvent::StatusChange { running: true }
        );
        assert_eq!(
            next(&mut events).await,
            TransportEvent::Display {
                message: "Program loaded (8 bytes)".into(),
                kind: DisplayKind::Output,
            }
        );
        assert!(matches!(
            next(&mut events).await,
            TransportEvent::Display {
                kind: DisplayKind::Result,
                ..
            }
        ));
        assert_eq!(
            next(&mut events).await,
            TransportEvent::StatusChange { running: false }
        );
    }

    #[tokio::test]
    async fn test_rejects_bad_header() {
        let hub = LoopbackHub::new();
        SimulatedDevice::new().spawn(&hub, "loop://ev3");

        let client = hub.create(options()).unwrap();
        let mut events = client.events();
        client.connect().await.unwrap();
        assert_eq!(next(&mut events).await, TransportEvent::Connected);

        client.send(Bytes::from_static(b"ELF")).await.unwrap();
        assert!(matches!(
            next(&mut events).await,
            TransportEvent::Display {
                kind: DisplayKind::Error,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_refusing_device() {
        let hub = LoopbackHub::new();
        SimulatedDevice::new().refusing("busy").spawn(&hub, "loop://ev3");

        let client = hub.create(options()).unwrap();
        assert!(matches!(
            client.connect().await,
            Err(TransportError::Handshake(reason)) if reason == "busy"
        ));
    }
}
