//! EV3 console demo: a browser workspace driving a simulated EV3 brick.
//!
//! Run with: cargo run -p ev3-console-demo
//!
//! Then open http://localhost:3000 in your browser. Set `EV3_CONSOLE_ADDR`
//! to bind elsewhere.

mod compiler;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use async_trait::async_trait;
use axum::{Router, response::Html, routing::get};
use remote_exec_core::{
    Device, DeviceRegistry, Endpoint, NotificationStore, PeripheralKind, RegistryError,
};
use remote_exec_session::SessionManager;
use remote_exec_transport::{GatewayState, LoopbackHub, SimulatedDevice, create_ws_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::compiler::LineCompiler;

const DEFAULT_ADDR: &str = "127.0.0.1:3000";

/// Fixed device list; every device is served by the loopback hub.
struct StaticRegistry {
    devices: Vec<Device>,
}

impl StaticRegistry {
    fn address(device: &Device) -> String {
        format!("loop://ev3-{}", device.id)
    }
}

#[async_trait]
impl DeviceRegistry for StaticRegistry {
    async fn list_devices(&self) -> Result<Vec<Device>, RegistryError> {
        Ok(self.devices.clone())
    }

    async fn resolve_endpoint(&self, device: &Device) -> Result<Option<Endpoint>, RegistryError> {
        let known = self.devices.iter().any(|d| d.id == device.id);
        Ok(known.then(|| Endpoint {
            address: Self::address(device),
            client_id_prefix: "ev3-console-".into(),
            device_identifier: device.secret.clone(),
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let registry = StaticRegistry {
        devices: vec![Device::new(1, "Simulated EV3", "sim-ev3-1", "ev3")],
    };

    let hub = Arc::new(LoopbackHub::new());
    for device in &registry.devices {
        SimulatedDevice::new()
            .with_peripheral("outA", PeripheralKind::Motor, "lego-ev3-l-motor 0 0")
            .with_peripheral("in1", PeripheralKind::Sensor, "lego-ev3-touch TOUCH 0")
            .with_peripheral("in3", PeripheralKind::Sensor, "lego-ev3-color COL-COLOR 5")
            .spawn(&hub, StaticRegistry::address(device));
    }

    let store = Arc::new(NotificationStore::new());
    let manager = Arc::new(SessionManager::new(
        registry,
        hub,
        Arc::new(LineCompiler),
        store.clone(),
    ));

    let app = Router::new()
        .route("/", get(index_handler))
        .merge(create_ws_router(GatewayState::new(manager, store)));

    let addr: SocketAddr = std::env::var("EV3_CONSOLE_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .context("EV3_CONSOLE_ADDR is not a socket address")?;
    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>EV3 Console</title>
    <style>
        body { margin: 0; padding: 20px; background: #1e1e1e; color: #d4d4d4; font-family: system-ui, sans-serif; }
        textarea { width: 100%; height: 200px; background: #111; color: #d4d4d4; font-family: monospace; }
        pre { background: #111; padding: 10px; min-height: 150px; }
        .status { color: #888; font-size: 14px; margin-bottom: 10px; }
        .connected { color: #4a4; }
        .failed { color: #a44; }
    </style>
</head>
<body>
    <h1>EV3 Console</h1>
    <div class="status" id="status">No session</div>
    <select id="devices"></select>
    <button onclick="connect()">Connect</button>
    <button onclick="send({ type: 'disconnect' })">Disconnect</button>
    <textarea id="source">ev3_speak("hello")
ev3_pause(500)</textarea>
    <button onclick="run()">Run</button>
    <button onclick="send({ type: 'interrupt' })">Stop</button>
    <pre id="output"></pre>
    <pre id="peripherals"></pre>

    <script>
        const WORKSPACE = 'playground';
        const output = document.getElementById('output');
        const status = document.getElementById('status');
        let ws;

        function send(msg) {
            if (ws && ws.readyState === WebSocket.OPEN) {
                ws.send(JSON.stringify(msg));
            }
        }

        function connect() {
            const id = Number(document.getElementById('devices').value);
            send({ type: 'connect', workspace: WORKSPACE, device_id: id });
        }

        function run() {
            const files = { '/main.js': document.getElementById('source').value };
            send({ type: 'run', workspace: WORKSPACE, files, entrypoint: '/main.js' });
        }

        function open() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);
            ws.onopen = () => send({ type: 'fetch_devices' });
            ws.onclose = () => setTimeout(open, 2000);
            ws.onmessage = (event) => {
                const msg = JSON.parse(event.data);
                switch (msg.type) {
                    case 'devices':
                        document.getElementById('devices').innerHTML = msg.devices
                            .map((d) => `<option value="${d.id}">${d.title}</option>`)
                            .join('');
                        break;
                    case 'session': {
                        const s = msg.session;
                        status.textContent = s ? `${s.device.title}: ${s.status}${s.error ? ' (' + s.error + ')' : ''}` : 'No session';
                        status.className = 'status ' + (s ? s.status : '');
                        document.getElementById('peripherals').textContent =
                            s && s.device.peripherals ? JSON.stringify(s.device.peripherals, null, 2) : '';
                        break;
                    }
                    case 'clear_output':
                        output.textContent = '';
                        break;
                    case 'console':
                        output.textContent += msg.line + '\n';
                        break;
                    case 'eval_result':
                        output.textContent += '=> ' + msg.value + '\n';
                        break;
                    case 'eval_errors':
                        for (const e of msg.errors) {
                            output.textContent += `Line ${e.location.start.line}: ${e.message}\n`;
                        }
                        break;
                    case 'error':
                        output.textContent += `[Error: ${msg.message}]\n`;
                        break;
                }
            };
        }

        open();
    </script>
</body>
</html>
"#;
