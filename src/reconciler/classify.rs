use k8s_openapi::api::core::v1::ContainerStatus;

/// What the controller should do about an observed debugger container state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReasonAction {
    /// Normal transient state, keep waiting
    Wait,
    /// Recoverable error, start or continue retrying
    Retry,
    /// Unrecoverable error, fail the session now
    Fail,
    /// The container finished its work
    Succeed,
}

/// Single source of truth for recovery policy. Maps a container status
/// observation to an action and a human-readable message; both the Active
/// and Retrying reconcilers dispatch on the result. Unknown reasons fail
/// closed.
pub fn classify(status: &ContainerStatus) -> (ReasonAction, String) {
    let Some(state) = status.state.as_ref() else {
        return (
            ReasonAction::Wait,
            "Container status is not yet determined.".to_string(),
        );
    };

    if state.running.is_some() {
        return (ReasonAction::Wait, "Session is running.".to_string());
    }

    if let Some(waiting) = state.waiting.as_ref() {
        let reason = waiting.reason.as_deref().unwrap_or("");
        let action = match reason {
            "ContainerCreating" => ReasonAction::Wait,
            "ImagePullBackOff" | "RegistryUnavailable" | "CrashLoopBackOff"
            | "CreateContainerError" | "RunContainerError" | "NetworkPluginNotReady" => {
                ReasonAction::Retry
            }
            "ErrImagePull" | "InvalidImageName" | "CreateContainerConfigError" => {
                ReasonAction::Fail
            }
            _ => {
                return (
                    ReasonAction::Fail,
                    format!("Unknown waiting reason '{reason}'."),
                )
            }
        };
        return (action, format!("Container is waiting. Reason: {reason}"));
    }

    if let Some(terminated) = state.terminated.as_ref() {
        let reason = terminated.reason.as_deref().unwrap_or("");
        let action = match reason {
            "Completed" => ReasonAction::Succeed,
            "Error" | "OOMKilled" | "ContainerCannotRun" | "DeadlineExceeded" => ReasonAction::Fail,
            _ => {
                return (
                    ReasonAction::Fail,
                    format!("Container terminated with unknown reason '{reason}'."),
                )
            }
        };
        return (action, format!("Container terminated. Reason: {reason}"));
    }

    (
        ReasonAction::Wait,
        "Container status is not yet determined.".to_string(),
    )
}
