use k8s_openapi::api::core::v1::Pod;
use kube::{
    runtime::reflector::{ObjectRef, Store},
    ResourceExt,
};

use crate::crds::DebugSession;

/// Secondary index key tying a session to the pod it targets.
pub fn target_pod_key(session: &DebugSession) -> String {
    format!(
        "{}/{}",
        session.target_namespace(),
        session.spec.target_pod_name
    )
}

/// Fan a pod event out to every session targeting that pod. Scans the
/// controller's reflector store; the store is rebuilt on restart and the
/// target fields are immutable after admission, so it is always current.
pub fn sessions_for_pod(store: &Store<DebugSession>, pod: &Pod) -> Vec<ObjectRef<DebugSession>> {
    let pod_key = format!(
        "{}/{}",
        pod.namespace().unwrap_or_default(),
        pod.name_any()
    );

    store
        .state()
        .into_iter()
        .filter(|session| target_pod_key(session) == pod_key)
        .map(|session| ObjectRef::from_obj(session.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::DebugSessionSpec;

    fn session(ns: &str, target_ns: Option<&str>, pod: &str) -> DebugSession {
        let mut s = DebugSession::new(
            "dbg",
            DebugSessionSpec {
                target_pod_name: pod.to_string(),
                target_namespace: target_ns.map(|s| s.to_string()),
                target_container_name: None,
                debugger_image: "busybox".to_string(),
                ttl: 300,
                max_retry_count: 3,
                debug_security: None,
            },
        );
        s.metadata.namespace = Some(ns.to_string());
        s
    }

    #[test]
    fn test_key_uses_explicit_target_namespace() {
        let s = session("sessions", Some("app"), "web-1");
        assert_eq!(target_pod_key(&s), "app/web-1");
    }

    #[test]
    fn test_key_defaults_to_session_namespace() {
        let s = session("app", None, "web-1");
        assert_eq!(target_pod_key(&s), "app/web-1");
    }
}
