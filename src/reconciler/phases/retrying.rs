use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::{api::Api, runtime::controller::Action, ResourceExt};
use tracing::info;

use crate::{
    crds::{ConditionStatus, DebugSession, SessionPhase},
    error::Result,
    reconciler::{
        classify::{classify, ReasonAction},
        transition_with, update_status, Context,
    },
};

pub async fn reconcile(session: Arc<DebugSession>, ctx: Arc<Context>) -> Result<Action> {
    let target_namespace = session.target_namespace();
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &target_namespace);

    let pod = match pods.get(&session.spec.target_pod_name).await {
        Ok(pod) => pod,
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            return fail(
                &session,
                &ctx,
                "TargetPodLost",
                "Target pod not found during retry.",
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
        return fail(
            &session,
            &ctx,
            "DebuggerLost",
            "Debugger container disappeared during retry.",
        )
        .await;
    };

    let (action, message) = classify(container_status);
    match action {
        // Running or completed means the problem cleared on its own.
        ReasonAction::Wait | ReasonAction::Succeed => {
            info!(
                "Problem resolved during retry for {}, transitioning to Active: {}",
                session.name_any(),
                message
            );
            transition_with(
                &session,
                &ctx,
                SessionPhase::Active,
                "Session is now active.",
                |status| {
                    status.retry_count = 0;
                    status.set_condition(
                        "Degraded",
                        ConditionStatus::False,
                        "Resolved",
                        &message,
                    );
                },
            )
            .await
        }
        ReasonAction::Fail => {
            info!(
                "Unrecoverable error during retry for {}: {}",
                session.name_any(),
                message
            );
            fail(&session, &ctx, "UnrecoverableError", message).await
        }
        ReasonAction::Retry => handle_retry(&session, &ctx, &message).await,
    }
}

async fn handle_retry(session: &DebugSession, ctx: &Context, message: &str) -> Result<Action> {
    let retry_count = session
        .status
        .as_ref()
        .map(|s| s.retry_count)
        .unwrap_or_default();
    let max_retries = session.spec.max_retry_count;

    if retry_count >= max_retries {
        info!(
            "Max retries ({}) reached for {}, transitioning to Failed",
            max_retries,
            session.name_any()
        );
        return fail(
            session,
            ctx,
            "MaxRetriesExceeded",
            "Failed after max retries.",
        )
        .await;
    }

    let next_count = retry_count + 1;
    let delay = backoff_delay(next_count);
    ctx.metrics.record_retry();

    info!(
        "Problem persists for {}, retry {}/{} in {:?}",
        session.name_any(),
        next_count,
        max_retries,
        delay
    );

    update_status(session, ctx, |status| {
        status.retry_count = next_count;
        status.message = format!("Retrying... ({next_count}/{max_retries}), Reason: {message}");
    })
    .await?;

    Ok(Action::requeue(delay))
}

async fn fail(
    session: &DebugSession,
    ctx: &Context,
    reason: &str,
    message: impl Into<String>,
) -> Result<Action> {
    let message = message.into();
    let detail = message.clone();
    transition_with(session, ctx, SessionPhase::Failed, message, |status| {
        status.set_condition("Degraded", ConditionStatus::True, reason, &detail);
    })
    .await
}

/// Exponential backoff: 5s, 10s, 20s, 40s, capped at one minute.
pub(crate) fn backoff_delay(retry_count: i32) -> Duration {
    let shift = (retry_count.max(1) - 1).min(10) as u32;
    Duration::from_secs((5u64 << shift).min(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_series() {
        assert_eq!(backoff_delay(1), Duration::from_secs(5));
        assert_eq!(backoff_delay(2), Duration::from_secs(10));
        assert_eq!(backoff_delay(3), Duration::from_secs(20));
        assert_eq!(backoff_delay(4), Duration::from_secs(40));
        assert_eq!(backoff_delay(5), Duration::from_secs(60));
        assert_eq!(backoff_delay(9), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_tolerates_degenerate_counts() {
        assert_eq!(backoff_delay(0), Duration::from_secs(5));
        assert_eq!(backoff_delay(-3), Duration::from_secs(5));
        assert_eq!(backoff_delay(i32::MAX), Duration::from_secs(60));
    }
}
