//! Completed and Failed are fixed points. The only permitted write is
//! settling the final message; once it is in place re-reconciles do nothing.

use std::sync::Arc;

use kube::runtime::controller::Action;

use crate::{
    crds::DebugSession,
    error::Result,
    reconciler::{update_status, Context},
};

const COMPLETED_MESSAGE: &str = "Session Completed.";

pub async fn reconcile_completed(session: Arc<DebugSession>, ctx: Arc<Context>) -> Result<Action> {
    let settled = session
        .status
        .as_ref()
        .map(|s| s.message == COMPLETED_MESSAGE)
        .unwrap_or(false);

    if !settled {
        update_status(&session, &ctx, |status| {
            status.message = COMPLETED_MESSAGE.to_string();
        })
        .await?;
    }

    Ok(Action::await_change())
}

pub async fn reconcile_failed(_session: Arc<DebugSession>, _ctx: Arc<Context>) -> Result<Action> {
    // The failure message written during the transition stays as-is.
    Ok(Action::await_change())
}
