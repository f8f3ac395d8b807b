//! `lnpay credit`: add funds to a user's ledger.

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;

#[derive(Args, Debug)]
pub struct CreditArgs {
    /// User id to credit.
    #[arg(short, long)]
    pub user: i64,

    /// Amount in satoshis.
    #[arg(short, long)]
    pub amount: u64,

    /// API endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    pub endpoint: String,
}

#[derive(Serialize)]
struct CreditRequest {
    user_id: i64,
    amount: u64,
}

#[derive(Deserialize)]
struct CreditResponse {
    user_id: i64,
    balance: i64,
}

pub async fn run(args: &CreditArgs) -> anyhow::Result<()> {
    let client = ApiClient::new(&args.endpoint);
    let body = CreditRequest {
        user_id: args.user,
        amount: args.amount,
    };
    let resp: CreditResponse = client.post("/v2/admin/credits", None, Some(&body)).await?;
    println!("Credited {} sat to user {}", args.amount, resp.user_id);
    println!("  Balance:  {} sat", resp.balance);
    Ok(())
}
