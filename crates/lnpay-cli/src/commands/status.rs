//! `lnpay status`: query a running node.

use clap::Args;
use serde::Deserialize;

use crate::client::ApiClient;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// API endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    backend: String,
    executor_id: String,
    fee_reserve_enabled: bool,
}

pub async fn run(args: &StatusArgs) -> anyhow::Result<()> {
    let client = ApiClient::new(&args.endpoint);
    let status: StatusResponse = client.get("/v2/status", None).await?;

    println!("Node Status:");
    println!("  Endpoint:     {}", args.endpoint);
    println!("  Version:      {}", status.version);
    println!("  Uptime:       {}s", status.uptime_secs);
    println!("  Backend:      {} ({})", status.backend, status.executor_id);
    println!(
        "  Fee reserve:  {}",
        if status.fee_reserve_enabled { "enabled" } else { "disabled" }
    );

    Ok(())
}
