//! Mapping of device display messages to workspace notifications.

use remote_exec_core::{DisplayKind, Notification, SourceError};

/// Translate a display message from the running program.
///
/// `output` becomes a console line, `error` a runtime error at an unknown
/// location, `result` an evaluation result.
#[must_use]
pub fn display_notification(workspace: &str, message: String, kind: DisplayKind) -> Notification {
    let workspace = workspace.to_string();
    match kind {
        DisplayKind::Output => Notification::Console {
            workspace,
            line: message,
        },
        DisplayKind::Error => Notification::EvalErrors {
            workspace,
            errors: vec![SourceError::runtime(message)],
        },
        DisplayKind::Result => Notification::EvalResult {
            workspace,
            value: message,
        },
    }
}

#[cfg(test)]
mod tests {
    use remote_exec_core::{ErrorKind, SourceLocation};

    use super::*;

    #[test]
    fn test_error_becomes_runtime_error() {
        let ws = "playground".to_string();
        let Notification::EvalErrors { errors, .. } =
            display_notification(&ws, "Motor stalled".into(), DisplayKind::Error)
        else {
            panic!("Wrong notification");
        };
        assert_eq!(errors[0].kind, ErrorKind::Runtime);
        assert_eq!(errors[0].message, "Motor stalled");
        assert_eq!(errors[0].location, SourceLocation::unknown());
    }

    #[test]
    fn test_output_and_result() {
        let ws = "playground".to_string();
        assert_eq!(
            display_notification(&ws, "hi".into(), DisplayKind::Output),
            Notification::Console {
                workspace: ws.clone(),
                line: "hi".into()
            }
        );
        assert_eq!(
            display_notification(&ws, "42".into(), DisplayKind::Result),
            Notification::EvalResult {
                workspace: ws,
                value: "42".into()
            }
        );
    }
}
