//! `lnpay pay`: pay a BOLT11 invoice.

use clap::Args;
use lnpay_core::{AmountInput, PayInvoiceRequest, PayInvoiceResponse};

use crate::client::ApiClient;

#[derive(Args, Debug)]
pub struct PayArgs {
    /// BOLT11 payment request.
    #[arg(short, long)]
    pub invoice: String,

    /// Amount in satoshis, for amountless invoices.
    #[arg(short, long)]
    pub amount: Option<i64>,

    /// Paying user id.
    #[arg(short, long)]
    pub user: i64,

    /// API endpoint of the node.
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    pub endpoint: String,
}

pub async fn run(args: &PayArgs) -> anyhow::Result<()> {
    let client = ApiClient::new(&args.endpoint);
    let body = PayInvoiceRequest {
        invoice: args.invoice.clone(),
        amount: args.amount.map(AmountInput::from),
    };

    println!("Paying invoice...");
    let paid: PayInvoiceResponse = client
        .post("/v2/payments/bolt11", Some(args.user), Some(&body))
        .await?;

    println!("Payment settled!");
    println!("  Amount:       {} sat", paid.amount);
    println!("  Fee:          {} sat", paid.fee);
    if let Some(destination) = &paid.destination {
        println!("  Destination:  {}", destination);
    }
    if let Some(description) = &paid.description {
        println!("  Description:  {}", description);
    }
    println!("  Payment hash: {}", paid.payment_hash);
    println!("  Preimage:     {}", paid.payment_preimage);

    Ok(())
}
