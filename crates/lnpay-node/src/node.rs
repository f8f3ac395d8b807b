//! The lnpay node orchestrator.
//!
//! Wires the persistent ledger, the Lightning backend, the settlement
//! engine and the reconciler together, then runs the HTTP API and the
//! periodic reconciliation task in the background.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use lnpay_settlement::adapters::{InternalNetwork, LndClient};
use lnpay_settlement::{
    Collaborators, DefaultFeeReserve, InvoiceDecoder, PaymentExecutor, Reconciler,
    SettlementEngine, TracingReporter,
};

use crate::config::{Backend, LnpayConfig};
use crate::state::NodeState;
use crate::storage::RocksLedger;

/// Network half of the collaborators, as selected by configuration.
struct LightningBackend {
    decoder: Arc<dyn InvoiceDecoder>,
    executor: Arc<dyn PaymentExecutor>,
    identity_pubkey: Option<String>,
}

/// The lnpay node.
pub struct LnpayNode {
    /// Node configuration.
    config: LnpayConfig,
    /// Shared state accessible from HTTP handlers (set by `start`).
    node_state: Option<Arc<NodeState>>,
    /// Flipped to `true` to stop background tasks.
    shutdown_tx: watch::Sender<bool>,
    api_task: Option<JoinHandle<()>>,
    reconcile_task: Option<JoinHandle<()>>,
    /// Address the API actually bound to.
    api_addr: Option<std::net::SocketAddr>,
}

impl LnpayNode {
    /// Create a new node with the given config.
    pub fn new(config: LnpayConfig) -> Result<Self> {
        config.validate()?;
        let (shutdown_tx, _) = watch::channel(false);
        tracing::info!(backend = %config.network.backend, "lnpay node created");
        Ok(Self {
            config,
            node_state: None,
            shutdown_tx,
            api_task: None,
            reconcile_task: None,
            api_addr: None,
        })
    }

    /// Open storage, connect the backend, and start the API and reconciler.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("starting lnpay node");

        let ledger = Arc::new(RocksLedger::open(&self.config.storage.data_dir)?);
        tracing::info!(path = %self.config.storage.data_dir.display(), "storage initialized");

        let backend = self.connect_backend().await?;

        let mut fee_reserve = DefaultFeeReserve::new(self.config.fee_reserve.clone());
        if let Some(pubkey) = backend.identity_pubkey {
            tracing::info!(identity_pubkey = %pubkey, "own node exempt from fee reserve");
            fee_reserve = fee_reserve.with_own_pubkey(pubkey);
        }

        let parts = Collaborators {
            decoder: backend.decoder,
            fee_reserve: Arc::new(fee_reserve),
            balances: ledger.clone(),
            store: ledger.clone(),
            executor: backend.executor.clone(),
            reporter: Arc::new(TracingReporter),
        };
        let engine = Arc::new(SettlementEngine::new(
            parts,
            self.config.engine.clone(),
            self.config.fee_reserve.enabled,
        ));
        let reconciler = Arc::new(Reconciler::new(
            ledger.clone(),
            backend.executor,
            self.config.engine.stale_after(),
        ));

        let node_state = Arc::new(NodeState::new(
            engine,
            reconciler.clone(),
            ledger,
            self.config.network.backend,
        ));

        // Reconciliation loop
        let interval = self.config.engine.reconcile_interval();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.reconcile_task = Some(tokio::spawn(async move {
            reconciler.run_periodic(interval, shutdown_rx).await;
            tracing::info!("reconciliation task exited");
        }));

        // HTTP API
        let listener = tokio::net::TcpListener::bind(self.config.api_addr()).await?;
        self.api_addr = Some(listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let api_state = node_state.clone();
        self.api_task = Some(tokio::spawn(async move {
            let shutdown = async move {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };
            if let Err(e) = crate::api::serve(listener, api_state, shutdown).await {
                tracing::error!(error = %e, "HTTP API server error");
            }
        }));

        self.node_state = Some(node_state);
        Ok(())
    }

    /// Run until the API server stops.
    pub async fn run(&mut self) -> Result<()> {
        let api_task = self
            .api_task
            .take()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        api_task.await?;
        tracing::info!("API server exited");
        Ok(())
    }

    /// Gracefully shut down the node.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down lnpay node");
        self.shutdown_tx.send_replace(true);

        for task in [self.api_task.take(), self.reconcile_task.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }

        // Dropping the last state handle closes the database.
        self.node_state = None;
        tracing::info!("lnpay node shut down");
        Ok(())
    }

    /// Address the HTTP API is listening on, once started.
    pub fn api_addr(&self) -> Option<std::net::SocketAddr> {
        self.api_addr
    }

    pub fn state(&self) -> Option<&Arc<NodeState>> {
        self.node_state.as_ref()
    }

    async fn connect_backend(&self) -> Result<LightningBackend> {
        let configured_pubkey = self.config.network.identity_pubkey.clone();
        match self.config.network.backend {
            Backend::Internal => {
                let pubkey = configured_pubkey.unwrap_or_else(|| "internal".to_string());
                let network = Arc::new(InternalNetwork::new(pubkey.clone()));
                Ok(LightningBackend {
                    decoder: network.clone(),
                    executor: network,
                    identity_pubkey: Some(pubkey),
                })
            }
            Backend::Lnd => {
                let lnd_config = self
                    .config
                    .network
                    .lnd
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("missing [network.lnd] section"))?;
                let client = Arc::new(LndClient::new(lnd_config)?);
                let identity_pubkey = match configured_pubkey {
                    Some(pubkey) => Some(pubkey),
                    None => match client.identity_pubkey().await {
                        Ok(pubkey) => Some(pubkey),
                        Err(e) => {
                            tracing::warn!(error = %e, "could not fetch identity pubkey from lnd");
                            None
                        }
                    },
                };
                tracing::info!(url = %lnd_config.url, "connected to lnd");
                Ok(LightningBackend {
                    decoder: client.clone(),
                    executor: client,
                    identity_pubkey,
                })
            }
        }
    }
}
