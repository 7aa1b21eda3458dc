//! Run and interrupt intents.

use std::sync::Arc;

use remote_exec_core::{DeviceRegistry, Notification, TransportFactory};
use remote_exec_pipeline::{SourceFiles, prepare};
use tracing::{debug, info, warn};

use crate::manager::{SessionManager, Shared};

impl<R, F> SessionManager<R, F>
where
    R: DeviceRegistry,
    F: TransportFactory,
{
    /// Compile `files` for the connected device and send the program.
    ///
    /// Without a connected session for `workspace` this only reports the
    /// workspace as not running. Compile errors are reported and nothing is
    /// sent. The program has been handed to the transport when this
    /// returns, so a following `interrupt` reaches the device after it.
    /// Send failures are logged.
    pub async fn run(&self, workspace: &str, files: &SourceFiles, entrypoint: &str) {
        let target = {
            let slot = self.shared.slot.lock().await;
            slot.as_ref()
                .filter(|s| s.workspace == workspace && s.connected_client().is_some())
                .and_then(|s| s.language.as_ref().map(|l| (s.epoch, Arc::clone(l))))
        };
        let Some((epoch, language)) = target else {
            debug!(workspace, "run without a connected session");
            self.shared.notify(Notification::Running {
                workspace: workspace.to_string(),
                running: false,
            });
            return;
        };

        self.shared.notify(Notification::ClearOutput {
            workspace: workspace.to_string(),
        });

        let prepared = {
            let mut context = language.lock().await;
            prepare(self.compiler.as_ref(), &mut context, files, entrypoint).await
        };
        let program = match prepared {
            Ok(program) => program,
            Err(errors) => {
                self.shared.notify(Notification::EvalErrors {
                    workspace: workspace.to_string(),
                    errors,
                });
                return;
            }
        };

        let client = {
            let mut slot = self.shared.slot.lock().await;
            Shared::current(&mut slot, epoch).and_then(|s| s.connected_client())
        };
        let Some(client) = client else {
            debug!(workspace, epoch, "session changed while compiling, dropping program");
            return;
        };

        info!(workspace, epoch, bytes = program.len(), "sending program");
        if let Err(e) = client.send(program).await {
            warn!(workspace, epoch, error = %e, "failed to send program");
        }
    }

    /// Ask the device to stop the running program. No-op unless connected.
    pub async fn interrupt(&self) {
        let client = self
            .shared
            .slot
            .lock()
            .await
            .as_ref()
            .and_then(|s| s.connected_client());
        let Some(client) = client else {
            return;
        };
        if let Err(e) = client.send_stop().await {
            warn!(error = %e, "failed to send stop");
        }
    }
}
