//! Outbound readiness notifications. Slack and Discord webhooks get their
//! native payload shapes, anything else a plain JSON object. Delivery is
//! fire-and-forget; failures are logged and dropped.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::warn;

use crate::{config::ControllerConfig, crds::DebugSession, date_time::DateTime};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Post the session-ready message when WEBHOOK_URL is configured.
pub fn session_ready(config: &ControllerConfig, session: &DebugSession) {
    let Some(url) = config.webhook_url.clone() else {
        return;
    };

    let status = session.status.clone().unwrap_or_default();
    let payload = build_payload(
        &url,
        &session.target_namespace(),
        &session.spec.target_pod_name,
        &status.debugging_container_name,
        &status.message,
        &DateTime::now().to_rfc3339(),
    );

    tokio::spawn(async move {
        if let Err(err) = post(&url, &payload).await {
            warn!("Failed to deliver webhook notification: {err}");
        }
    });
}

async fn post(url: &str, payload: &Value) -> reqwest::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(WEBHOOK_TIMEOUT)
        .build()?;
    let response = client.post(url).json(payload).send().await?;
    if !response.status().is_success() {
        warn!("Webhook returned non-2xx status: {}", response.status());
    }
    Ok(())
}

fn build_payload(
    webhook_url: &str,
    namespace: &str,
    pod: &str,
    container: &str,
    message: &str,
    timestamp: &str,
) -> Value {
    if webhook_url.contains("hooks.slack.com") {
        json!({
            "text": format!(
                "*Debug session ready*\nNamespace: `{namespace}`\nPod: `{pod}`\nContainer: `{container}`\n\n```{message}```"
            ),
        })
    } else if webhook_url.contains("discord.com/api/webhooks") {
        json!({
            "embeds": [{
                "title": "Debug session ready",
                "description": format!(
                    "**Namespace:** `{namespace}`\n**Pod:** `{pod}`\n**Container:** `{container}`\n\n```\n{message}\n```"
                ),
                "color": 0x00bfff,
                "timestamp": timestamp,
            }],
        })
    } else {
        json!({
            "namespace": namespace,
            "pod": pod,
            "container": container,
            "message": message,
            "timestamp": timestamp,
        })
    }
}
