//! Per-phase reconcilers. Each module owns the transitions out of one
//! lifecycle phase; [`dispatch`] is the registry selecting the reconciler
//! for a session's current phase. A session without a phase is brand new
//! and bootstraps through Pending.

use std::sync::Arc;

use kube::runtime::controller::Action;

use super::Context;
use crate::{
    crds::{DebugSession, SessionPhase},
    error::Result,
};

pub mod active;
pub mod injecting;
pub mod pending;
pub mod retrying;
pub mod terminal;
pub mod terminating;

pub async fn dispatch(session: Arc<DebugSession>, ctx: Arc<Context>) -> Result<Action> {
    let phase = session.status.as_ref().and_then(|s| s.phase.clone());

    match phase {
        None | Some(SessionPhase::Pending) => pending::reconcile(session, ctx).await,
        Some(SessionPhase::Injecting) => injecting::reconcile(session, ctx).await,
        Some(SessionPhase::Active) => active::reconcile(session, ctx).await,
        Some(SessionPhase::Retrying) => retrying::reconcile(session, ctx).await,
        Some(SessionPhase::Terminating) => terminating::reconcile(session, ctx).await,
        Some(SessionPhase::Completed) => terminal::reconcile_completed(session, ctx).await,
        Some(SessionPhase::Failed) => terminal::reconcile_failed(session, ctx).await,
    }
}
