use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, PostParams},
    runtime::controller::Action,
    ResourceExt,
};
use rand::RngCore;
use tracing::info;

use crate::{
    crds::{ConditionStatus, DebugSession, SessionPhase},
    date_time::DateTime,
    error::Result,
    reconciler::{transition_with, update_status, Context},
    resources::{endpoint, ephemeral},
};

pub async fn reconcile(session: Arc<DebugSession>, ctx: Arc<Context>) -> Result<Action> {
    let target_namespace = session.target_namespace();
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &target_namespace);

    let mut pod = match pods.get(&session.spec.target_pod_name).await {
        Ok(pod) => pod,
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            return fail(&session, &ctx, "Failed to find Target Pod").await;
        }
        Err(e) => return Err(e.into()),
    };

    // The debugger can only inspect the target's processes when the pod
    // shares one process namespace.
    let shares_pid_namespace = pod
        .spec
        .as_ref()
        .and_then(|s| s.share_process_namespace)
        .unwrap_or(false);
    if !shares_pid_namespace {
        return fail(
            &session,
            &ctx,
            "Inject Failed: pod.spec.shareProcessNamespace is false",
        )
        .await;
    }

    let Some(container_name) = session.resolved_container_name().or_else(|| {
        pod.spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .map(|c| c.name.clone())
    }) else {
        return fail(&session, &ctx, "Failed to find Target Container").await;
    };

    // Resolve the externally reachable proxy endpoint up front so a broken
    // proxy Service fails the session before the pod is touched.
    let proxy_endpoint = match endpoint::discover(&ctx.client, &ctx.config).await {
        Ok(ep) => ep,
        Err(e) => {
            return fail(&session, &ctx, format!("Inject Failed: {e}")).await;
        }
    };

    // The token is generated exactly once per session; a re-entry after a
    // write conflict must not rotate it.
    let session = if session
        .status
        .as_ref()
        .map(|s| s.one_time_token.is_empty())
        .unwrap_or(true)
    {
        let token = generate_secure_token(32);
        let updated = update_status(&session, &ctx, |status| {
            status.one_time_token = token;
        })
        .await?;
        Arc::new(updated)
    } else {
        session
    };

    let debugger_name = session.debugger_container_name();
    if !ephemeral::is_present(&pod, &debugger_name) {
        info!("Injecting debugger container into {}", pod.name_any());
        let container = ephemeral::build(&session, &container_name);
        pod.spec
            .as_mut()
            .expect("pod fetched from the apiserver always has a spec")
            .ephemeral_containers
            .get_or_insert_with(Vec::new)
            .push(container);

        let body = serde_json::to_vec(&pod)?;
        if let Err(e) = pods
            .replace_subresource(
                "ephemeralcontainers",
                &session.spec.target_pod_name,
                &PostParams::default(),
                body,
            )
            .await
        {
            return fail(
                &session,
                &ctx,
                format!("Inject Failed: failed to update ephemeral containers: {e}"),
            )
            .await;
        }
    }

    let instructions = endpoint::connection_instructions(&ctx.config, &session, &proxy_endpoint);
    transition_with(
        &session,
        &ctx,
        SessionPhase::Active,
        instructions,
        |status| {
            status.debugging_container_name = debugger_name;
            status.start_time = Some(DateTime::now());
            status.set_condition(
                "Progressing",
                ConditionStatus::True,
                "Injected",
                "Debugger container injected",
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
        status.set_condition("Degraded", ConditionStatus::True, "InjectFailed", &detail);
    })
    .await
}

/// Cryptographically random hex string; 32 bytes yield the 64-char one-time
/// token.
fn generate_secure_token(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
