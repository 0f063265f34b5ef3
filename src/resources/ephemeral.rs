use k8s_openapi::api::core::v1::{
    Capabilities, EnvVar, EphemeralContainer, Pod, SecurityContext,
};

use crate::crds::{DebugSecurity, DebugSession};

/// Shell wrapper the debugger runs: exits cleanly on signals, arms the TTL
/// timer in the background, then hands the terminal to an interactive shell.
const DEBUG_SCRIPT: &str = "
trap 'exit 0' EXIT TERM INT
( sleep ${TTL:-300} && exit 0 ) &
exec /bin/sh -i
";

/// Build the ephemeral debugger container for a session.
pub fn build(session: &DebugSession, target_container: &str) -> EphemeralContainer {
    EphemeralContainer {
        name: session.debugger_container_name(),
        image: Some(session.spec.debugger_image.clone()),
        command: Some(vec!["/bin/sh".to_string()]),
        args: Some(vec!["-c".to_string(), DEBUG_SCRIPT.to_string()]),
        stdin: Some(true),
        tty: Some(true),
        env: Some(vec![EnvVar {
            name: "TTL".to_string(),
            value: Some(session.spec.ttl.to_string()),
            ..Default::default()
        }]),
        target_container_name: Some(target_container.to_string()),
        security_context: Some(build_security_context(session.spec.debug_security.as_ref())),
        ..Default::default()
    }
}

/// Safe default: non-root uid/gid 1000, unprivileged, no escalation,
/// read-only rootfs, every capability dropped. Spec overrides are merged
/// field-wise on top.
pub fn build_security_context(overrides: Option<&DebugSecurity>) -> SecurityContext {
    let mut sc = SecurityContext {
        run_as_non_root: Some(true),
        run_as_user: Some(1000),
        run_as_group: Some(1000),
        privileged: Some(false),
        allow_privilege_escalation: Some(false),
        read_only_root_filesystem: Some(true),
        capabilities: Some(Capabilities {
            add: Some(vec![]),
            drop: Some(vec!["ALL".to_string()]),
        }),
        ..Default::default()
    };

    if let Some(sec) = overrides {
        if let Some(v) = sec.run_as_non_root {
            sc.run_as_non_root = Some(v);
        }
        if let Some(v) = sec.run_as_user {
            sc.run_as_user = Some(v);
        }
        if let Some(v) = sec.run_as_group {
            sc.run_as_group = Some(v);
        }
        if let Some(v) = sec.privileged {
            sc.privileged = Some(v);
        }
        if let Some(v) = sec.allow_privilege_escalation {
            sc.allow_privilege_escalation = Some(v);
        }
        if let Some(v) = sec.read_only_root_filesystem {
            sc.read_only_root_filesystem = Some(v);
        }
        if let Some(caps) = sec.capabilities.as_ref() {
            sc.capabilities = Some(Capabilities {
                add: Some(caps.add.clone().unwrap_or_default()),
                drop: Some(caps.drop.clone().unwrap_or_default()),
            });
        }
    }

    sc
}

pub fn is_present(pod: &Pod, container_name: &str) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.ephemeral_containers.as_ref())
        .map(|list| list.iter().any(|ec| ec.name == container_name))
        .unwrap_or(false)
}

/// Remove the debugger entry, leaving every other ephemeral container in
/// place and in order. Returns false when the entry is already gone.
pub fn remove_from(pod: &mut Pod, container_name: &str) -> bool {
    let Some(list) = pod
        .spec
        .as_mut()
        .and_then(|s| s.ephemeral_containers.as_mut())
    else {
        return false;
    };

    let before = list.len();
    list.retain(|ec| ec.name != container_name);
    list.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{DebugCapabilities, DebugSessionSpec};
    use k8s_openapi::api::core::v1::PodSpec;

    fn session() -> DebugSession {
        let mut s = DebugSession::new(
            "dbg",
            DebugSessionSpec {
                target_pod_name: "web-1".to_string(),
                target_namespace: None,
                target_container_name: None,
                debugger_image: "nicolaka/netshoot".to_string(),
                ttl: 600,
                max_retry_count: 3,
                debug_security: None,
            },
        );
        s.metadata.uid = Some("abc-123".to_string());
        s
    }

    fn pod_with_ephemerals(names: &[&str]) -> Pod {
        Pod {
            spec: Some(PodSpec {
                ephemeral_containers: Some(
                    names
                        .iter()
                        .map(|n| EphemeralContainer {
                            name: n.to_string(),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_shapes_the_debugger() {
        let ec = build(&session(), "app");
        assert_eq!(ec.name, "debugger-abc-123");
        assert_eq!(ec.image.as_deref(), Some("nicolaka/netshoot"));
        assert_eq!(ec.stdin, Some(true));
        assert_eq!(ec.tty, Some(true));
        assert_eq!(ec.target_container_name.as_deref(), Some("app"));

        let env = ec.env.unwrap();
        assert_eq!(env[0].name, "TTL");
        assert_eq!(env[0].value.as_deref(), Some("600"));

        let args = ec.args.unwrap();
        assert_eq!(args[0], "-c");
        assert!(args[1].contains("trap 'exit 0' EXIT TERM INT"));
        assert!(args[1].contains("sleep ${TTL:-300}"));
        assert!(args[1].contains("exec /bin/sh -i"));
    }

    #[test]
    fn test_default_security_context() {
        let sc = build_security_context(None);
        assert_eq!(sc.run_as_non_root, Some(true));
        assert_eq!(sc.run_as_user, Some(1000));
        assert_eq!(sc.run_as_group, Some(1000));
        assert_eq!(sc.privileged, Some(false));
        assert_eq!(sc.allow_privilege_escalation, Some(false));
        assert_eq!(sc.read_only_root_filesystem, Some(true));
        let caps = sc.capabilities.unwrap();
        assert_eq!(caps.drop, Some(vec!["ALL".to_string()]));
        assert_eq!(caps.add, Some(vec![]));
    }

    #[test]
    fn test_security_overrides_merge_field_wise() {
        let overrides = DebugSecurity {
            run_as_user: Some(0),
            run_as_non_root: Some(false),
            privileged: Some(true),
            capabilities: Some(DebugCapabilities {
                add: Some(vec!["NET_ADMIN".to_string()]),
                drop: None,
            }),
            ..Default::default()
        };
        let sc = build_security_context(Some(&overrides));
        assert_eq!(sc.run_as_user, Some(0));
        assert_eq!(sc.run_as_non_root, Some(false));
        assert_eq!(sc.privileged, Some(true));
        // Untouched fields keep the defaults.
        assert_eq!(sc.allow_privilege_escalation, Some(false));
        assert_eq!(sc.read_only_root_filesystem, Some(true));
        let caps = sc.capabilities.unwrap();
        assert_eq!(caps.add, Some(vec!["NET_ADMIN".to_string()]));
        assert_eq!(caps.drop, Some(vec![]));
    }

    #[test]
    fn test_remove_preserves_other_entries_in_order() {
        let mut pod = pod_with_ephemerals(&["debugger-other", "debugger-abc-123", "sidecar-dbg"]);
        assert!(remove_from(&mut pod, "debugger-abc-123"));
        let names: Vec<_> = pod
            .spec
            .unwrap()
            .ephemeral_containers
            .unwrap()
            .into_iter()
            .map(|ec| ec.name)
            .collect();
        assert_eq!(names, vec!["debugger-other", "sidecar-dbg"]);
    }

    #[test]
    fn test_remove_missing_entry_reports_false() {
        let mut pod = pod_with_ephemerals(&["debugger-other"]);
        assert!(!remove_from(&mut pod, "debugger-abc-123"));
        let mut empty = Pod::default();
        assert!(!remove_from(&mut empty, "debugger-abc-123"));
    }

    #[test]
    fn test_is_present() {
        let pod = pod_with_ephemerals(&["debugger-abc-123"]);
        assert!(is_present(&pod, "debugger-abc-123"));
        assert!(!is_present(&pod, "debugger-zzz"));
        assert!(!is_present(&Pod::default(), "debugger-abc-123"));
    }
}
