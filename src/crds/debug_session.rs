use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::date_time::DateTime;

/// DebugSession declares a temporary debugging attachment to a running pod.
/// The controller realizes it by injecting an ephemeral debugger container
/// into the target pod and issuing a one-time token for the attach proxy.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "debugsess.dev",
    version = "v1alpha1",
    kind = "DebugSession",
    plural = "debugsessions",
    singular = "debugsession",
    shortname = "ds",
    namespaced,
    status = "DebugSessionStatus",
    printcolumn = r#"{"name":"TargetPod", "type":"string", "jsonPath":".spec.targetPodName"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DebugSessionSpec {
    /// Name of the pod the debugger attaches to
    #[schemars(length(min = 1))]
    pub target_pod_name: String,

    /// Namespace of the target pod; defaults to the session's own namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,

    /// Container within the target pod whose process namespace the debugger
    /// joins; defaults to the pod's first container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_container_name: Option<String>,

    /// Image run as the debugger; must carry the debugging tools the session
    /// needs (netshoot, gdb, tcpdump, ...)
    #[schemars(length(min = 1))]
    pub debugger_image: String,

    /// Upper bound on the debugger's in-container lifetime, in seconds
    #[serde(default = "default_ttl")]
    pub ttl: i64,

    /// Cap on recovery attempts for recoverable container errors
    #[serde(default = "default_max_retry_count")]
    #[schemars(range(min = 0))]
    pub max_retry_count: i32,

    /// Overrides for the debugger container's privilege configuration,
    /// merged field-wise over a non-privileged default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_security: Option<DebugSecurity>,
}

fn default_ttl() -> i64 {
    300
}

fn default_max_retry_count() -> i32 {
    3
}

/// Per-field security overrides for the debugger container. Unset fields
/// keep the safe default (non-root, unprivileged, read-only rootfs, no
/// capabilities).
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DebugSecurity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_as_group: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_privilege_escalation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_root_filesystem: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<DebugCapabilities>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DebugCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DebugSessionStatus {
    /// Current lifecycle phase; absent until the first reconcile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<SessionPhase>,

    /// Human-readable summary; carries the connection instructions once the
    /// session is ready
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// When the debugger container was injected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime>,

    /// When cleanup finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_time: Option<DateTime>,

    /// Actual name of the injected ephemeral container (`debugger-<UID>`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub debugging_container_name: String,

    /// Gate for the attach proxy; true only while the debugger is Running
    #[serde(default)]
    pub ready_for_attach: bool,

    /// 64-char hex token authorizing exactly one user's attach
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub one_time_token: String,

    /// Number of recovery attempts in the current Retrying streak
    #[serde(default)]
    pub retry_count: i32,

    /// Container name resolved during validation when the spec leaves
    /// targetContainerName unset; the controller records the default here
    /// instead of mutating the spec
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_container_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Pending,
    Injecting,
    Active,
    Retrying,
    Terminating,
    Completed,
    Failed,
}

impl SessionPhase {
    /// Completed and Failed are fixed points; nothing moves a session out of
    /// them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed)
    }

    /// Declared edges of the lifecycle state machine. Staying in the same
    /// phase is always permitted (message-only updates).
    pub fn can_transition_to(&self, next: &SessionPhase) -> bool {
        use SessionPhase::*;
        if self == next {
            return true;
        }
        match self {
            Pending => matches!(next, Injecting | Failed),
            Injecting => matches!(next, Active | Failed),
            Active => matches!(next, Retrying | Terminating | Failed),
            Retrying => matches!(next, Active | Failed),
            Terminating => matches!(next, Completed | Failed),
            Completed | Failed => false,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionPhase::Pending => "Pending",
            SessionPhase::Injecting => "Injecting",
            SessionPhase::Active => "Active",
            SessionPhase::Retrying => "Retrying",
            SessionPhase::Terminating => "Terminating",
            SessionPhase::Completed => "Completed",
            SessionPhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: ConditionStatus,
    pub last_transition_time: Option<DateTime>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl DebugSessionStatus {
    /// Upsert a condition keyed by type. The transition time only moves when
    /// the status value actually changes.
    pub fn set_condition(
        &mut self,
        r#type: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.r#type == r#type) {
            if existing.status != status {
                existing.last_transition_time = Some(DateTime::now());
            }
            existing.status = status;
            existing.reason = Some(reason.to_string());
            existing.message = Some(message.to_string());
        } else {
            self.conditions.push(Condition {
                r#type: r#type.to_string(),
                status,
                last_transition_time: Some(DateTime::now()),
                reason: Some(reason.to_string()),
                message: Some(message.to_string()),
            });
        }
    }
}

impl DebugSession {
    /// Namespace the target pod lives in, falling back to the session's own
    /// namespace.
    pub fn target_namespace(&self) -> String {
        self.spec
            .target_namespace
            .clone()
            .unwrap_or_else(|| self.namespace().unwrap_or_default())
    }

    /// Container the debugger joins: the status-recorded default wins over
    /// the raw spec value.
    pub fn resolved_container_name(&self) -> Option<String> {
        self.status
            .as_ref()
            .and_then(|s| s.target_container_name.clone())
            .or_else(|| self.spec.target_container_name.clone())
    }

    /// Canonical debugger container name, derived from the session UID.
    pub fn debugger_container_name(&self) -> String {
        format!("debugger-{}", self.session_uid())
    }

    /// Immutable UID assigned by the apiserver at admission.
    pub fn session_uid(&self) -> String {
        self.meta().uid.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(uid: &str, ns: &str) -> DebugSession {
        let mut s = DebugSession::new(
            "dbg",
            DebugSessionSpec {
                target_pod_name: "web-1".to_string(),
                target_namespace: None,
                target_container_name: None,
                debugger_image: "busybox".to_string(),
                ttl: 300,
                max_retry_count: 3,
                debug_security: None,
            },
        );
        s.metadata.uid = Some(uid.to_string());
        s.metadata.namespace = Some(ns.to_string());
        s
    }

    #[test]
    fn test_debugger_container_name_tracks_uid() {
        let s = session("abc-123", "app");
        assert_eq!(s.debugger_container_name(), "debugger-abc-123");
    }

    #[test]
    fn test_target_namespace_defaults_to_own_namespace() {
        let mut s = session("u", "app");
        assert_eq!(s.target_namespace(), "app");
        s.spec.target_namespace = Some("other".to_string());
        assert_eq!(s.target_namespace(), "other");
    }

    #[test]
    fn test_resolved_container_prefers_status() {
        let mut s = session("u", "app");
        assert_eq!(s.resolved_container_name(), None);
        s.spec.target_container_name = Some("from-spec".to_string());
        assert_eq!(s.resolved_container_name(), Some("from-spec".to_string()));
        s.status = Some(DebugSessionStatus {
            target_container_name: Some("from-status".to_string()),
            ..Default::default()
        });
        assert_eq!(s.resolved_container_name(), Some("from-status".to_string()));
    }

    #[test]
    fn test_transition_graph_edges() {
        use SessionPhase::*;
        let all = [
            Pending,
            Injecting,
            Active,
            Retrying,
            Terminating,
            Completed,
            Failed,
        ];
        let allowed = [
            (Pending, Injecting),
            (Pending, Failed),
            (Injecting, Active),
            (Injecting, Failed),
            (Active, Retrying),
            (Active, Terminating),
            (Active, Failed),
            (Retrying, Active),
            (Retrying, Failed),
            (Terminating, Completed),
            (Terminating, Failed),
        ];
        for from in &all {
            for to in &all {
                let expect = from == to || allowed.iter().any(|(f, t)| f == from && t == to);
                assert_eq!(
                    from.can_transition_to(to),
                    expect,
                    "{from} -> {to} should be {expect}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_phases_are_fixed_points() {
        use SessionPhase::*;
        for terminal in [Completed, Failed] {
            assert!(terminal.is_terminal());
            for next in [Pending, Injecting, Active, Retrying, Terminating] {
                assert!(!terminal.can_transition_to(&next));
            }
        }
    }

    #[test]
    fn test_set_condition_is_keyed_by_type() {
        let mut status = DebugSessionStatus::default();
        status.set_condition("Available", ConditionStatus::False, "Waiting", "not yet");
        status.set_condition("Progressing", ConditionStatus::True, "Injecting", "working");
        status.set_condition("Available", ConditionStatus::True, "Ready", "go");
        assert_eq!(status.conditions.len(), 2);
        let avail = status
            .conditions
            .iter()
            .find(|c| c.r#type == "Available")
            .unwrap();
        assert_eq!(avail.status, ConditionStatus::True);
        assert_eq!(avail.reason.as_deref(), Some("Ready"));
    }

    #[test]
    fn test_spec_defaults() {
        let spec: DebugSessionSpec = serde_json::from_value(serde_json::json!({
            "targetPodName": "web-1",
            "debuggerImage": "busybox"
        }))
        .unwrap();
        assert_eq!(spec.ttl, 300);
        assert_eq!(spec.max_retry_count, 3);
        assert!(spec.target_namespace.is_none());
    }
}
