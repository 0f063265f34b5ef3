use crate::error::{Error, Result};
use std::env;

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    // Connection-instruction rendering
    pub bastion_host: String,
    pub proxy_local_port: String,

    // Attach proxy discovery
    pub proxy_service_name: String,
    pub proxy_service_namespace: String,

    // Notifications
    pub webhook_url: Option<String>,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self> {
        let proxy_local_port =
            env::var("PROXY_LOCAL_PORT").unwrap_or_else(|_| "8080".to_string());
        proxy_local_port
            .parse::<u16>()
            .map_err(|_| Error::ConfigError("Invalid PROXY_LOCAL_PORT".into()))?;

        Ok(Self {
            bastion_host: env::var("BASTION_HOST")
                .unwrap_or_else(|_| "your-user@bastion.example.com".to_string()),
            proxy_local_port,
            proxy_service_name: env::var("PROXY_SERVICE_NAME")
                .unwrap_or_else(|_| "debugsess-proxy-svc".to_string()),
            proxy_service_namespace: env::var("PROXY_SERVICE_NAMESPACE")
                .unwrap_or_else(|_| "debugsess-system".to_string()),
            webhook_url: env::var("WEBHOOK_URL").ok(),
        })
    }
}
