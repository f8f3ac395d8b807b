//! `lnpay stale`: list reservations awaiting reconciliation.

use clap::Args;
use lnpay_core::OutgoingPayment;

use crate::client::ApiClient;

#[derive(Args, Debug)]
pub struct StaleArgs {
    /// API endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    pub endpoint: String,
}

pub async fn run(args: &StaleArgs) -> anyhow::Result<()> {
    let client = ApiClient::new(&args.endpoint);
    let stale: Vec<OutgoingPayment> = client
        .get("/v2/admin/reservations/stale", None)
        .await?;

    if stale.is_empty() {
        println!("No stale reservations.");
        return Ok(());
    }

    println!("{} stale reservation(s):", stale.len());
    for payment in &stale {
        println!(
            "  {}  user={}  amount={}  created={}  reason={}",
            payment.id,
            payment.user_id,
            payment.amount,
            payment.created_at.to_rfc3339(),
            payment.reconcile_reason.as_deref().unwrap_or("age")
        );
    }
    Ok(())
}
