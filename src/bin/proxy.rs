use clap::Parser;
use debugsess_operator::{
    proxy::{self, ProxyState},
    telemetry,
};
use kube::Client;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "debugsess-proxy")]
#[command(about = "WebSocket attach proxy for DebugSession debuggers")]
struct Args {
    /// Address the proxy listens on
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen_addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let args = Args::parse();

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let app = proxy::router(ProxyState { client });
    let listener = TcpListener::bind(&args.listen_addr).await?;
    info!("Attach proxy listening on {}", args.listen_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
