use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, PostParams},
    runtime::controller::Action,
    ResourceExt,
};
use tracing::info;

use crate::{
    crds::{ConditionStatus, DebugSession, SessionPhase},
    date_time::DateTime,
    error::Result,
    reconciler::{transition_with, Context},
    resources::ephemeral,
};

pub async fn reconcile(session: Arc<DebugSession>, ctx: Arc<Context>) -> Result<Action> {
    info!(
        "Starting cleanup for Terminating session {}",
        session.name_any()
    );

    let target_namespace = session.target_namespace();
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &target_namespace);

    // Losing the pod mid-cleanup means the debugger entry was never removed;
    // that is a failed cleanup, not a silent success.
    let mut pod = match pods.get(&session.spec.target_pod_name).await {
        Ok(pod) => pod,
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            return fail(
                &session,
                &ctx,
                format!("target pod '{}' not found", session.spec.target_pod_name),
            )
            .await;
        }
        Err(e) => return Err(e.into()),
    };

    let debugger_name = session.debugger_container_name();
    if !ephemeral::remove_from(&mut pod, &debugger_name) {
        return fail(
            &session,
            &ctx,
            format!(
                "debugger container '{}' not found in pod '{}'",
                debugger_name,
                pod.name_any()
            ),
        )
        .await;
    }

    // Conflicts and other transient apiserver errors bubble to the error
    // policy and re-run the cleanup.
    let body = serde_json::to_vec(&pod)?;
    pods.replace_subresource(
        "ephemeralcontainers",
        &session.spec.target_pod_name,
        &PostParams::default(),
        body,
    )
    .await?;

    info!(
        "Removed debugger container '{}' from pod '{}'",
        debugger_name,
        pod.name_any()
    );

    transition_with(
        &session,
        &ctx,
        SessionPhase::Completed,
        "Termination Completed",
        |status| {
            status.termination_time = Some(DateTime::now());
            status.set_condition(
                "Progressing",
                ConditionStatus::False,
                "Terminated",
                "Debugger container removed",
            );
        },
    )
    .await
}

async fn fail(
    session: &DebugSession,
    ctx: &Context,
    message: impl Into<String>,
) -> Result<Action> {
    let message = message.into();
    let detail = message.clone();
    transition_with(session, ctx, SessionPhase::Failed, message, |status| {
        status.set_condition("Degraded", ConditionStatus::True, "CleanupFailed", &detail);
    })
    .await
}
