use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::{api::Api, runtime::controller::Action, ResourceExt};
use tracing::info;

use crate::{
    crds::{ConditionStatus, DebugSession, SessionPhase},
    error::Result,
    notify,
    reconciler::{
        classify::{classify, ReasonAction},
        transition_with, update_status, Context,
    },
};

/// The kubelet can lag a few seconds between accepting the ephemeral
/// container and publishing its first status.
const STATUS_PENDING_REQUEUE: Duration = Duration::from_secs(5);

pub async fn reconcile(session: Arc<DebugSession>, ctx: Arc<Context>) -> Result<Action> {
    let target_namespace = session.target_namespace();
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &target_namespace);

    let pod = match pods.get(&session.spec.target_pod_name).await {
        Ok(pod) => pod,
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            return transition_with(
                &session,
                &ctx,
                SessionPhase::Failed,
                "Target pod not found.",
                |status| {
                    status.ready_for_attach = false;
                    status.set_condition(
                        "Degraded",
                        ConditionStatus::True,
                        "TargetPodLost",
                        "Target pod not found.",
                    );
                },
            )
            .await;
        }
        Err(e) => return Err(e.into()),
    };

    let debugger_name = session.debugger_container_name();
    let Some(container_status) = pod
        .status
        .as_ref()
        .and_then(|s| s.ephemeral_container_statuses.as_ref())
        .and_then(|list| list.iter().find(|cs| cs.name == debugger_name))
    else {
        info!(
            "Ephemeral container status not found yet for {}, requeueing",
            session.name_any()
        );
        return Ok(Action::requeue(STATUS_PENDING_REQUEUE));
    };

    let running = container_status
        .state
        .as_ref()
        .map(|s| s.running.is_some())
        .unwrap_or(false);
    let ready = session
        .status
        .as_ref()
        .map(|s| s.ready_for_attach)
        .unwrap_or(false);

    // First observation of a running debugger opens the attach gate. The
    // token was minted during Injecting; this write only flips the gate.
    if running && !ready {
        let updated = update_status(&session, &ctx, |status| {
            status.ready_for_attach = true;
            status.set_condition(
                "Available",
                ConditionStatus::True,
                "ReadyForAttach",
                "Debugger container is running",
            );
        })
        .await?;
        ctx.metrics.record_session_ready();
        notify::session_ready(&ctx.config, &updated);
        info!("Session {} is ready for attach", session.name_any());
        return Ok(Action::await_change());
    }

    let (action, message) = classify(container_status);
    match action {
        ReasonAction::Wait => Ok(Action::await_change()),
        ReasonAction::Retry => {
            let detail = message.clone();
            transition_with(&session, &ctx, SessionPhase::Retrying, message, |status| {
                status.ready_for_attach = false;
                status.retry_count = 1;
                status.set_condition("Available", ConditionStatus::False, "Retrying", &detail);
                status.set_condition(
                    "Degraded",
                    ConditionStatus::True,
                    "RecoverableError",
                    &detail,
                );
            })
            .await?;
            // Give the first recovery attempt its slot in the backoff series.
            Ok(Action::requeue(super::retrying::backoff_delay(1)))
        }
        ReasonAction::Fail => {
            let detail = message.clone();
            transition_with(&session, &ctx, SessionPhase::Failed, message, |status| {
                status.ready_for_attach = false;
                status.set_condition("Available", ConditionStatus::False, "Failed", &detail);
                status.set_condition(
                    "Degraded",
                    ConditionStatus::True,
                    "UnrecoverableError",
                    &detail,
                );
            })
            .await
        }
        ReasonAction::Succeed => {
            transition_with(
                &session,
                &ctx,
                SessionPhase::Terminating,
                message,
                |status| {
                    status.ready_for_attach = false;
                    status.set_condition(
                        "Available",
                        ConditionStatus::False,
                        "SessionFinished",
                        "Debugger container completed",
                    );
                },
            )
            .await
        }
    }
}
