use debugsess_operator::{
    config::ControllerConfig,
    crds::DebugSession,
    index,
    reconciler::{self, Context},
    telemetry::{self, Metrics},
};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    runtime::{controller::Controller, watcher::Config as WatcherConfig},
    Api, Client,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let metrics = Arc::new(Metrics::default());

    info!("Starting DebugSession controller");
    let config = Arc::new(ControllerConfig::from_env()?);
    info!("Configuration loaded");
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let ctx = Arc::new(Context {
        client: client.clone(),
        config,
        metrics,
    });

    let sessions = Api::<DebugSession>::all(client.clone());
    let pods = Api::<Pod>::all(client.clone());

    info!("Starting controller loop");
    let controller = Controller::new(sessions, WatcherConfig::default());
    let store = controller.store();

    controller
        .watches(pods, WatcherConfig::default(), move |pod| {
            index::sessions_for_pod(&store, &pod)
        })
        .shutdown_on_signal()
        .run(reconciler::reconcile, reconciler::error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("Reconciled: {:?}", o),
                Err(e) => tracing::error!("Reconciliation error: {:?}", e),
            }
        })
        .await;

    Ok(())
}
