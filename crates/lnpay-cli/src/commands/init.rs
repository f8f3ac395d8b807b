//! `lnpay init`: write a default node configuration.

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to current directory).
    #[arg(default_value = ".")]
    pub dir: PathBuf,
}

const DEFAULT_CONFIG: &str = r#"# lnpay node configuration

[api]
listen_addr = "127.0.0.1"
port = 3000

[storage]
data_dir = "./data"

[logging]
level = "info"
format = "text"

[fee_reserve]
enabled = true
min_fee = 10
proportional_threshold = 1000
proportional_bps = 100
surcharge = 1

[engine]
execution_timeout_ms = 60000
stale_reservation_secs = 600
reconcile_interval_secs = 60

[network]
backend = "internal"
# identity_pubkey = "02..."

# [network.lnd]
# url = "https://127.0.0.1:8080"
# macaroon_hex = "..."
# tls_skip_verify = false
"#;

pub fn run(args: &InitArgs) -> anyhow::Result<()> {
    let config_path = args.dir.join("lnpay.toml");

    if config_path.exists() {
        anyhow::bail!("configuration file already exists at {}", config_path.display());
    }

    std::fs::create_dir_all(&args.dir)?;
    std::fs::write(&config_path, DEFAULT_CONFIG)?;
    println!("Initialized lnpay node at {}", config_path.display());
    println!("Edit lnpay.toml to choose a Lightning backend.");
    println!("Run 'lnpay-node --config {}' to start the node.", config_path.display());

    std::fs::create_dir_all(args.dir.join("data"))?;

    Ok(())
}
