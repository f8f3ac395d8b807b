//! `lnpay void`: remove a reservation the network never saw.

use clap::Args;

use crate::client::ApiClient;

#[derive(Args, Debug)]
pub struct VoidArgs {
    /// Payment id of the reservation.
    pub id: String,

    /// API endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    pub endpoint: String,
}

pub async fn run(args: &VoidArgs) -> anyhow::Result<()> {
    let client = ApiClient::new(&args.endpoint);
    let path = format!("/v2/admin/reservations/{}/void", args.id);
    let _: serde_json::Value = client.post::<(), _>(&path, None, None).await?;
    println!("Voided reservation {}", args.id);
    Ok(())
}
