//! lnpay CLI: pay invoices and administer a running lnpay node.
//!
//! Subcommands: init, status, pay, balance, credit, stale, reconcile, void.

mod client;
mod commands;

use clap::{Parser, Subcommand};

/// lnpay: custodial Lightning payments.
#[derive(Parser, Debug)]
#[command(name = "lnpay", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default lnpay.toml.
    Init(commands::init::InitArgs),
    /// Query the status of a running node.
    Status(commands::status::StatusArgs),
    /// Pay a BOLT11 invoice.
    Pay(commands::pay::PayArgs),
    /// Show a user's available balance.
    Balance(commands::balance::BalanceArgs),
    /// Credit a user's ledger (admin).
    Credit(commands::credit::CreditArgs),
    /// List stale or flagged reservations (admin).
    Stale(commands::stale::StaleArgs),
    /// Reconcile one reservation against the network (admin).
    Reconcile(commands::reconcile::ReconcileArgs),
    /// Void a reservation the network never saw (admin).
    Void(commands::void::VoidArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Status(args) => commands::status::run(args).await,
        Commands::Pay(args) => commands::pay::run(args).await,
        Commands::Balance(args) => commands::balance::run(args).await,
        Commands::Credit(args) => commands::credit::run(args).await,
        Commands::Stale(args) => commands::stale::run(args).await,
        Commands::Reconcile(args) => commands::reconcile::run(args).await,
        Commands::Void(args) => commands::void::run(args).await,
    }
}
