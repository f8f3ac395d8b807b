//! `lnpay balance`: show a user's available balance.

use clap::Args;
use serde::Deserialize;

use crate::client::ApiClient;

#[derive(Args, Debug)]
pub struct BalanceArgs {
    /// User id.
    #[arg(short, long)]
    pub user: i64,

    /// API endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance: i64,
}

pub async fn run(args: &BalanceArgs) -> anyhow::Result<()> {
    let client = ApiClient::new(&args.endpoint);
    let resp: BalanceResponse = client.get("/v2/balance", Some(args.user)).await?;
    println!("{} sat", resp.balance);
    Ok(())
}
