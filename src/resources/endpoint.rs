use k8s_openapi::api::core::v1::{Node, Service};
use kube::{
    api::{Api, ListParams},
    Client,
};

use crate::{
    config::ControllerConfig,
    crds::DebugSession,
    error::{Error, Result},
};

/// Externally reachable address of the attach proxy.
#[derive(Clone, Debug)]
pub struct ProxyEndpoint {
    pub node_ip: String,
    pub node_port: i32,
}

/// Resolve the proxy's external endpoint: the well-known Service's first
/// NodePort plus the first node's address. Best-effort by design; the value
/// only feeds the user-facing connection instructions.
pub async fn discover(client: &Client, config: &ControllerConfig) -> Result<ProxyEndpoint> {
    let services: Api<Service> = Api::namespaced(client.clone(), &config.proxy_service_namespace);
    let svc = services
        .get(&config.proxy_service_name)
        .await
        .map_err(|e| Error::EndpointDiscovery(format!("failed to get service: {e}")))?;

    let node_port = svc
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| ports.first())
        .and_then(|port| port.node_port)
        .ok_or_else(|| Error::EndpointDiscovery("no ports found in service".to_string()))?;

    let nodes: Api<Node> = Api::all(client.clone());
    let node_list = nodes
        .list(&ListParams::default())
        .await
        .map_err(|e| Error::EndpointDiscovery(format!("failed to list nodes: {e}")))?;
    let first_node = node_list
        .items
        .first()
        .ok_or_else(|| Error::EndpointDiscovery("no nodes found in cluster".to_string()))?;

    Ok(ProxyEndpoint {
        node_ip: node_address(first_node).unwrap_or_else(|| "127.0.0.1".to_string()),
        node_port,
    })
}

/// ExternalIP when the node has one, InternalIP otherwise.
fn node_address(node: &Node) -> Option<String> {
    let addresses = node.status.as_ref()?.addresses.as_ref()?;
    addresses
        .iter()
        .find(|a| a.type_ == "ExternalIP")
        .or_else(|| addresses.iter().find(|a| a.type_ == "InternalIP"))
        .map(|a| a.address.clone())
}

/// User instructions for reaching the debug session: an ssh tunnel through
/// the bastion host, then a websocat attach with the one-time token.
pub fn connection_instructions(
    config: &ControllerConfig,
    session: &DebugSession,
    endpoint: &ProxyEndpoint,
) -> String {
    let token = session
        .status
        .as_ref()
        .map(|s| s.one_time_token.as_str())
        .unwrap_or_default();
    let container = session.debugger_container_name();
    let local_port = &config.proxy_local_port;
    let bastion = &config.bastion_host;
    let ns = session.target_namespace();
    let pod = &session.spec.target_pod_name;
    let (node_ip, node_port) = (&endpoint.node_ip, endpoint.node_port);

    format!(
        r#"Session is ready. Open TWO terminals and follow the steps:

--- Terminal 1: Create a secure tunnel ---
1. Run this command and leave it running. It forwards local port {local_port} to the debug proxy via the bastion host.
   ssh -L {local_port}:{node_ip}:{node_port} {bastion}

--- Terminal 2: Connect to the debug session ---
2. Once the tunnel is active, run this command in a new terminal. It uses the one-time token for authorization.
   websocat --no-line --binary --header="Authorization: Bearer {token}" "ws://localhost:{local_port}/attach?ns={ns}&pod={pod}&container={container}""#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{DebugSessionSpec, DebugSessionStatus};
    use k8s_openapi::api::core::v1::{NodeAddress, NodeStatus};

    fn node(addresses: Vec<(&str, &str)>) -> Node {
        Node {
            status: Some(NodeStatus {
                addresses: Some(
                    addresses
                        .into_iter()
                        .map(|(t, a)| NodeAddress {
                            type_: t.to_string(),
                            address: a.to_string(),
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_node_address_prefers_external_ip() {
        let n = node(vec![
            ("InternalIP", "10.0.0.5"),
            ("ExternalIP", "203.0.113.7"),
        ]);
        assert_eq!(node_address(&n).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_node_address_falls_back_to_internal_ip() {
        let n = node(vec![("Hostname", "node-1"), ("InternalIP", "10.0.0.5")]);
        assert_eq!(node_address(&n).as_deref(), Some("10.0.0.5"));
        assert_eq!(node_address(&node(vec![("Hostname", "node-1")])), None);
        assert_eq!(node_address(&Node::default()), None);
    }

    #[test]
    fn test_connection_instructions_carry_everything_needed() {
        let config = ControllerConfig {
            bastion_host: "debug@jump.example.com".to_string(),
            proxy_local_port: "8080".to_string(),
            proxy_service_name: "debugsess-proxy-svc".to_string(),
            proxy_service_namespace: "debugsess-system".to_string(),
            webhook_url: None,
        };
        let mut session = DebugSession::new(
            "dbg",
            DebugSessionSpec {
                target_pod_name: "web-1".to_string(),
                target_namespace: Some("app".to_string()),
                target_container_name: None,
                debugger_image: "busybox".to_string(),
                ttl: 300,
                max_retry_count: 3,
                debug_security: None,
            },
        );
        session.metadata.uid = Some("abc-123".to_string());
        session.status = Some(DebugSessionStatus {
            one_time_token: "deadbeef".to_string(),
            ..Default::default()
        });

        let text = connection_instructions(
            &config,
            &session,
            &ProxyEndpoint {
                node_ip: "203.0.113.7".to_string(),
                node_port: 30080,
            },
        );

        assert!(text.contains("Session is ready"));
        assert!(text.contains("ssh -L 8080:203.0.113.7:30080 debug@jump.example.com"));
        assert!(text.contains("Authorization: Bearer deadbeef"));
        assert!(text.contains("ns=app&pod=web-1&container=debugger-abc-123"));
    }
}
