//! In-process doubles for the session manager's collaborators.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use remote_exec_core::{
    Device, DeviceId, DeviceRegistry, Endpoint, ErrorKind, NotificationStore, RegistryError,
    SessionConfig, SourceError, SourceLocation, Transport, TransportError, TransportEvent,
    TransportFactory, TransportOptions,
};
use remote_exec_pipeline::{
    Compiler, CompiledProgram, Function, Instruction, LanguageContext, Opcode, Operand,
    SourceFiles,
};
use remote_exec_session::SessionManager;
use tokio::sync::{broadcast, oneshot};

pub const PREFIX: &str = "ws-client-";

pub fn ev3(id: DeviceId, title: &str) -> Device {
    Device::new(id, title, format!("secret-{id}"), "ev3")
}

pub fn endpoint(id: DeviceId) -> Endpoint {
    Endpoint {
        address: format!("mqtt://broker/{id}"),
        client_id_prefix: PREFIX.into(),
        device_identifier: format!("dev-{id}"),
    }
}

#[derive(Default)]
pub struct MockRegistry {
    pub devices: Mutex<Vec<Device>>,
    /// Devices without an entry resolve to an endpoint derived from the ID.
    pub endpoints: Mutex<HashMap<DeviceId, Option<Endpoint>>>,
    failures: Mutex<HashMap<DeviceId, String>>,
    resolutions: Mutex<VecDeque<oneshot::Receiver<()>>>,
}

impl MockRegistry {
    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Self::default()
        }
    }

    pub fn set_endpoint(&self, id: DeviceId, endpoint: Option<Endpoint>) {
        self.endpoints.lock().unwrap().insert(id, endpoint);
    }

    /// Make resolving `id` fail with `message`.
    pub fn fail_resolution(&self, id: DeviceId, message: &str) {
        self.failures.lock().unwrap().insert(id, message.to_string());
    }

    /// Park the next resolution until the returned sender fires or drops.
    pub fn hold_resolution(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.resolutions.lock().unwrap().push_back(rx);
        tx
    }
}

#[async_trait]
impl DeviceRegistry for MockRegistry {
    async fn list_devices(&self) -> Result<Vec<Device>, RegistryError> {
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn resolve_endpoint(&self, device: &Device) -> Result<Option<Endpoint>, RegistryError> {
        let gate = self.resolutions.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(message) = self.failures.lock().unwrap().get(&device.id) {
            return Err(RegistryError::Request(message.clone()));
        }
        let endpoints = self.endpoints.lock().unwrap();
        Ok(endpoints
            .get(&device.id)
            .cloned()
            .unwrap_or_else(|| Some(endpoint(device.id))))
    }
}

type Handshake = oneshot::Receiver<Result<(), TransportError>>;

pub struct MockTransport {
    pub options: TransportOptions,
    events: broadcast::Sender<TransportEvent>,
    handshake: Mutex<Option<Handshake>>,
    pub sent: Mutex<Vec<Bytes>>,
    pub stops: AtomicUsize,
    pub disconnects: AtomicUsize,
    /// Sends and stops in the order they reached the transport.
    pub calls: Mutex<Vec<&'static str>>,
}

impl MockTransport {
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let pending = self.handshake.lock().unwrap().take();
        match pending {
            Some(rx) => rx.await.unwrap_or(Err(TransportError::Closed)),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, program: Bytes) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(program);
        self.calls.lock().unwrap().push("send");
        Ok(())
    }

    async fn send_stop(&self) -> Result<(), TransportError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push("stop");
        Ok(())
    }
}

/// Creates mock transports. Handshakes queued with `hold_handshake` are
/// handed to the next transports in order; others complete immediately.
#[derive(Default)]
pub struct MockFactory {
    created: Mutex<Vec<Arc<MockTransport>>>,
    handshakes: Mutex<VecDeque<Handshake>>,
}

impl MockFactory {
    pub fn hold_handshake(&self) -> oneshot::Sender<Result<(), TransportError>> {
        let (tx, rx) = oneshot::channel();
        self.handshakes.lock().unwrap().push_back(rx);
        tx
    }

    pub fn created(&self) -> Vec<Arc<MockTransport>> {
        self.created.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<MockTransport> {
        self.created().last().cloned().unwrap()
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, options: TransportOptions) -> Result<Arc<dyn Transport>, TransportError> {
        let (events, _) = broadcast::channel(64);
        let transport = Arc::new(MockTransport {
            options,
            events,
            handshake: Mutex::new(self.handshakes.lock().unwrap().pop_front()),
            sent: Mutex::default(),
            stops: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            calls: Mutex::default(),
        });
        self.created.lock().unwrap().push(Arc::clone(&transport));
        Ok(transport)
    }
}

/// Treats every non-empty line of the entrypoint as a device primitive
/// call.
pub struct PrimitiveCompiler;

#[async_trait]
impl Compiler for PrimitiveCompiler {
    async fn compile(
        &self,
        files: &SourceFiles,
        entrypoint: &str,
        context: &mut LanguageContext,
    ) -> Option<CompiledProgram> {
        let Some(source) = files.get(entrypoint) else {
            context.push_error(SourceError::new(
                ErrorKind::Syntax,
                format!("Missing entrypoint {entrypoint}"),
                SourceLocation::unknown(),
            ));
            return None;
        };

        let mut instructions = Vec::new();
        for symbol in source.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match context.symbol_index(symbol) {
                Some(index) => instructions.push(Instruction::with_operands(
                    Opcode::Callv,
                    [Operand::Int(i32::try_from(index).unwrap()), Operand::Int(0)],
                )),
                None => context.push_error(SourceError::new(
                    ErrorKind::Type,
                    format!("Name {symbol} not declared."),
                    SourceLocation::unknown(),
                )),
            }
        }
        instructions.push(Instruction::new(Opcode::Retu));

        Some(CompiledProgram {
            entry: 0,
            functions: vec![Function {
                instructions,
                ..Function::default()
            }],
        })
    }
}

pub struct Harness {
    pub manager: Arc<SessionManager<Arc<MockRegistry>, Arc<MockFactory>>>,
    pub registry: Arc<MockRegistry>,
    pub factory: Arc<MockFactory>,
    pub store: Arc<NotificationStore>,
}

impl Harness {
    pub fn new(devices: Vec<Device>) -> Self {
        Self::with_config(devices, SessionConfig::default())
    }

    pub fn with_config(devices: Vec<Device>, config: SessionConfig) -> Self {
        let registry = Arc::new(MockRegistry::with_devices(devices));
        let factory = Arc::new(MockFactory::default());
        let store = Arc::new(NotificationStore::new());
        let manager = SessionManager::with_config(
            Arc::clone(&registry),
            Arc::clone(&factory),
            Arc::new(PrimitiveCompiler),
            store.clone(),
            config,
        );
        Self {
            manager: Arc::new(manager),
            registry,
            factory,
            store,
        }
    }
}

pub fn files(source: &str) -> SourceFiles {
    SourceFiles::from([("/main.js".to_string(), source.to_string())])
}

/// Yield until `done` holds. Panics if it never does.
pub async fn eventually(mut done: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Let spawned tasks run for a while.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

pub const SHORT: Duration = Duration::from_millis(500);
