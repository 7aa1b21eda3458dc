//! Session manager driving a simulated device over the loopback transport.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use remote_exec_core::{
    ConnectionStatus, Device, DeviceRegistry, Endpoint, Notification, NotificationStore,
    PeripheralKind, RegistryError,
};
use remote_exec_pipeline::{
    Compiler, CompiledProgram, Function, Instruction, LanguageContext, Opcode, SourceFiles,
};
use remote_exec_session::SessionManager;
use remote_exec_transport::{LoopbackHub, SimulatedDevice};

const WS: &str = "playground";

struct OneDevice;

#[async_trait]
impl DeviceRegistry for OneDevice {
    async fn list_devices(&self) -> Result<Vec<Device>, RegistryError> {
        Ok(vec![brick()])
    }

    async fn resolve_endpoint(&self, device: &Device) -> Result<Option<Endpoint>, RegistryError> {
        Ok(Some(Endpoint {
            address: format!("loop://{}", device.id),
            client_id_prefix: "test-".into(),
            device_identifier: device.secret.clone(),
        }))
    }
}

struct Noop;

#[async_trait]
impl Compiler for Noop {
    async fn compile(
        &self,
        _files: &SourceFiles,
        _entrypoint: &str,
        _context: &mut LanguageContext,
    ) -> Option<CompiledProgram> {
        Some(CompiledProgram {
            entry: 0,
            functions: vec![Function {
                instructions: vec![Instruction::new(Opcode::Retu)],
                ..Function::default()
            }],
        })
    }
}

fn brick() -> Device {
    Device::new(1, "Brick", "abc123", "ev3")
}

async fn wait_for(store: &NotificationStore, pred: impl Fn(&Notification) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !store.history().iter().any(&pred) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_connect_run_disconnect() {
    let hub = Arc::new(LoopbackHub::new());
    SimulatedDevice::new()
        .with_peripheral("outA", PeripheralKind::Motor, "lego-ev3-l-motor 90 0")
        .with_peripheral("in1", PeripheralKind::Sensor, "lego-ev3-touch TOUCH 0")
        .spawn(&hub, "loop://1");

    let store = Arc::new(NotificationStore::new());
    let manager = SessionManager::new(OneDevice, Arc::clone(&hub), Arc::new(Noop), store.clone());

    manager.connect(WS, brick()).await;
    let snapshot = manager.snapshot().await.unwrap();
    assert_eq!(snapshot.status, ConnectionStatus::Connected);

    // Both readings arrive after the handshake.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let peripherals = manager.snapshot().await.and_then(|s| s.device.peripherals);
            if peripherals.is_some_and(|p| p.len() == 2) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let files = SourceFiles::from([("/main.js".to_string(), String::new())]);
    manager.run(WS, &files, "/main.js").await;
    wait_for(&store, |n| {
        matches!(n, Notification::EvalResult { value, .. } if value == "undefined")
    })
    .await;

    let history = store.history();
    assert!(history.contains(&Notification::ClearOutput {
        workspace: WS.into()
    }));
    assert!(history.contains(&Notification::Running {
        workspace: WS.into(),
        running: true,
    }));
    assert!(history.iter().any(|n| matches!(
        n,
        Notification::Console { line, .. } if line.starts_with("Program loaded")
    )));

    manager.disconnect().await;
    assert!(manager.snapshot().await.is_none());
}

#[tokio::test]
async fn test_refused_handshake_fails_session() {
    let hub = Arc::new(LoopbackHub::new());
    SimulatedDevice::new()
        .refusing("Device busy")
        .spawn(&hub, "loop://1");

    let store = Arc::new(NotificationStore::new());
    let manager = SessionManager::new(OneDevice, hub, Arc::new(Noop), store);
    manager.connect(WS, brick()).await;

    let snapshot = manager.snapshot().await.unwrap();
    assert_eq!(snapshot.status, ConnectionStatus::Failed);
    assert!(snapshot.error.unwrap().contains("Device busy"));
}

#[tokio::test]
async fn test_missing_device_fails_session() {
    let hub = Arc::new(LoopbackHub::new());
    let store = Arc::new(NotificationStore::new());
    let manager = SessionManager::new(OneDevice, hub, Arc::new(Noop), store);
    manager.connect(WS, brick()).await;

    let snapshot = manager.snapshot().await.unwrap();
    assert_eq!(snapshot.status, ConnectionStatus::Failed);
    assert!(snapshot.error.unwrap().contains("No device at loop://1"));
}
