use crate::{
    config::ControllerConfig,
    crds::{DebugSession, DebugSessionStatus, SessionPhase},
    error::{Error, Result},
    telemetry::Metrics,
};
use kube::{
    api::{Api, PostParams},
    client::Client,
    runtime::controller::Action,
    ResourceExt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub mod classify;
pub mod phases;

#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub config: Arc<ControllerConfig>,
    pub metrics: Arc<Metrics>,
}

impl Context {
    pub fn sessions(&self, namespace: &str) -> Api<DebugSession> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[instrument(skip(ctx, session), fields(session_name = %session.name_any()))]
pub async fn reconcile(session: Arc<DebugSession>, ctx: Arc<Context>) -> Result<Action> {
    let name = session.name_any();
    let namespace = session.namespace().unwrap_or_default();
    ctx.metrics.record_reconcile();

    // Re-read so the status writes below carry the latest resource version.
    let api = ctx.sessions(&namespace);
    let session = match api.get(&name).await {
        Ok(s) => Arc::new(s),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            info!("DebugSession {} is gone, nothing to do", name);
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e.into()),
    };

    info!("Reconciling DebugSession {}", name);
    phases::dispatch(session, ctx).await
}

/// Persist a status mutation. The write goes through the status subresource
/// carrying the resource version we reconciled against, so a concurrent
/// writer surfaces as a 409 and the error policy re-runs us against a fresh
/// read.
pub async fn update_status<F>(
    session: &DebugSession,
    ctx: &Context,
    mutate: F,
) -> Result<DebugSession>
where
    F: FnOnce(&mut DebugSessionStatus),
{
    let namespace = session.namespace().unwrap_or_default();
    let api = ctx.sessions(&namespace);

    let mut updated = session.clone();
    let mut status = updated.status.take().unwrap_or_default();
    mutate(&mut status);
    updated.status = Some(status);

    let body = serde_json::to_vec(&updated)?;
    let replaced = api
        .replace_status(&updated.name_any(), &PostParams::default(), body)
        .await?;
    Ok(replaced)
}

/// Move the session into a new phase with a status message.
pub async fn transition(
    session: &DebugSession,
    ctx: &Context,
    phase: SessionPhase,
    message: impl Into<String>,
) -> Result<Action> {
    transition_with(session, ctx, phase, message, |_| {}).await
}

/// Like [`transition`], with an extra status mutation applied in the same
/// write. Edges the lifecycle state machine does not declare are refused,
/// which keeps terminal sessions immutable.
pub async fn transition_with<F>(
    session: &DebugSession,
    ctx: &Context,
    phase: SessionPhase,
    message: impl Into<String>,
    extra: F,
) -> Result<Action>
where
    F: FnOnce(&mut DebugSessionStatus),
{
    let message = message.into();

    if let Some(current) = session.status.as_ref().and_then(|s| s.phase.as_ref()) {
        if !current.can_transition_to(&phase) {
            warn!(
                "Refusing undeclared phase transition {} -> {} for {}",
                current,
                phase,
                session.name_any()
            );
            return Ok(Action::await_change());
        }
    }

    update_status(session, ctx, |status| {
        status.phase = Some(phase.clone());
        status.message = message;
        extra(status);
    })
    .await?;

    info!("DebugSession {} entered phase {}", session.name_any(), phase);
    if phase.is_terminal() {
        Ok(Action::await_change())
    } else {
        Ok(Action::requeue(Duration::from_secs(1)))
    }
}

/// Error handling for reconciliation
pub fn error_policy(_session: Arc<DebugSession>, error: &Error, ctx: Arc<Context>) -> Action {
    error!("Reconciliation error: {:?}", error);
    ctx.metrics.record_error();

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(10))
    } else {
        Action::requeue(Duration::from_secs(300))
    }
}
