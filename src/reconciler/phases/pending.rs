use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Container, Namespace, Pod};
use kube::{api::Api, runtime::controller::Action, ResourceExt};
use tracing::info;

use crate::{
    crds::{ConditionStatus, DebugSession, SessionPhase},
    error::{Error, Result},
    reconciler::{transition, transition_with, update_status, Context},
};

/// How long to wait for a target pod that exists but is not Running yet.
const POD_NOT_READY_REQUEUE: Duration = Duration::from_secs(30);

pub async fn reconcile(session: Arc<DebugSession>, ctx: Arc<Context>) -> Result<Action> {
    // Freshly admitted sessions carry no phase; stamp Pending first so the
    // rest of the machine has a well-defined starting point.
    if session
        .status
        .as_ref()
        .and_then(|s| s.phase.as_ref())
        .is_none()
    {
        info!("New session {}, initializing to Pending", session.name_any());
        return transition(
            &session,
            &ctx,
            SessionPhase::Pending,
            "DebugSession created.",
        )
        .await;
    }

    match validate_prerequisites(&session, &ctx).await {
        Ok(container_name) => {
            transition_with(
                &session,
                &ctx,
                SessionPhase::Injecting,
                "Prerequisites validated successfully.",
                |status| {
                    status.target_container_name = Some(container_name);
                    status.set_condition(
                        "Progressing",
                        ConditionStatus::True,
                        "PrerequisitesValidated",
                        "Target pod and container verified",
                    );
                },
            )
            .await
        }
        Err(Error::Requeue { reason, after }) => {
            info!(
                "Target pod not ready for {}, requeueing: {}",
                session.name_any(),
                reason
            );
            update_status(&session, &ctx, |status| {
                status.message = reason;
            })
            .await?;
            Ok(Action::requeue(after))
        }
        Err(Error::Validation(message)) => {
            info!(
                "Prerequisite validation failed for {}: {}",
                session.name_any(),
                message
            );
            let detail = message.clone();
            transition_with(&session, &ctx, SessionPhase::Failed, message, |status| {
                status.set_condition(
                    "Degraded",
                    ConditionStatus::True,
                    "ValidationFailed",
                    &detail,
                );
            })
            .await
        }
        Err(e) => Err(e),
    }
}

/// Check every precondition for injecting the debugger. Returns the resolved
/// target container name; transient shortfalls come back as
/// [`Error::Requeue`], terminal ones as [`Error::Validation`].
async fn validate_prerequisites(session: &DebugSession, ctx: &Context) -> Result<String> {
    let target_namespace = session.target_namespace();

    let namespaces: Api<Namespace> = Api::all(ctx.client.clone());
    match namespaces.get(&target_namespace).await {
        Ok(_) => {}
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            return Err(Error::Validation(format!(
                "target namespace '{target_namespace}' not found"
            )));
        }
        Err(e) => return Err(e.into()),
    }

    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &target_namespace);
    let pod = match pods.get(&session.spec.target_pod_name).await {
        Ok(pod) => pod,
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            return Err(Error::Validation(format!(
                "target pod '{}' not found",
                session.spec.target_pod_name
            )));
        }
        Err(e) => return Err(e.into()),
    };

    check_pod_phase(
        pod.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("Unknown"),
    )?;

    let containers = pod
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();
    resolve_container(containers, session.resolved_container_name())
}

/// A pod that already ran to completion can never host the debugger; a pod
/// that has not started yet may still get there.
fn check_pod_phase(pod_phase: &str) -> Result<()> {
    match pod_phase {
        "Running" => Ok(()),
        "Succeeded" | "Failed" => Err(Error::Validation(format!(
            "target pod is not running (current phase: {pod_phase})"
        ))),
        _ => Err(Error::Requeue {
            reason: format!("pod is not running yet (current phase: {pod_phase})"),
            after: POD_NOT_READY_REQUEUE,
        }),
    }
}

fn resolve_container(containers: &[Container], requested: Option<String>) -> Result<String> {
    let container_name = match requested {
        Some(name) => name,
        None => match containers.first() {
            Some(first) => first.name.clone(),
            None => {
                return Err(Error::Validation(
                    "cannot default container name, pod has no containers".to_string(),
                ))
            }
        },
    };

    if !containers.iter().any(|c| c.name == container_name) {
        return Err(Error::Validation(format!(
            "target container '{container_name}' not found in pod"
        )));
    }

    Ok(container_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn containers(names: &[&str]) -> Vec<Container> {
        names
            .iter()
            .map(|n| Container {
                name: n.to_string(),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_pod_phase_gate() {
        assert!(check_pod_phase("Running").is_ok());
        assert!(matches!(
            check_pod_phase("Succeeded"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            check_pod_phase("Failed"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            check_pod_phase("Pending"),
            Err(Error::Requeue { .. })
        ));
        assert!(matches!(
            check_pod_phase("Unknown"),
            Err(Error::Requeue { .. })
        ));
    }

    #[test]
    fn test_resolve_container_defaults_to_first() {
        let list = containers(&["app", "sidecar"]);
        assert_eq!(resolve_container(&list, None).unwrap(), "app");
    }

    #[test]
    fn test_resolve_container_validates_requested_name() {
        let list = containers(&["app", "sidecar"]);
        assert_eq!(
            resolve_container(&list, Some("sidecar".to_string())).unwrap(),
            "sidecar"
        );
        assert!(matches!(
            resolve_container(&list, Some("ghost".to_string())),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_resolve_container_rejects_empty_pod() {
        assert!(matches!(
            resolve_container(&[], None),
            Err(Error::Validation(_))
        ));
    }
}
