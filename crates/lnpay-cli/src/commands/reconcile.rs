//! `lnpay reconcile`: resolve one reservation against the network.

use clap::Args;

use crate::client::ApiClient;

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Payment id of the reservation.
    pub id: String,

    /// API endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    pub endpoint: String,
}

pub async fn run(args: &ReconcileArgs) -> anyhow::Result<()> {
    let client = ApiClient::new(&args.endpoint);
    let path = format!("/v2/admin/reservations/{}/reconcile", args.id);
    let outcome: serde_json::Value = client.post::<(), _>(&path, None, None).await?;

    match outcome["outcome"].as_str() {
        Some("settled") => println!("{} settled (fee {} sat)", args.id, outcome["fee"]),
        Some("failed") => println!(
            "{} failed: {}",
            args.id,
            outcome["message"].as_str().unwrap_or("")
        ),
        _ => println!("{} still pending on the network; left reserved", args.id),
    }
    Ok(())
}
