//! RocksDB-backed reservation ledger.
//!
//! Records are stored as JSON under their payment id. Two index column
//! families keep balance reads and reconciliation sweeps off full scans:
//! `user_payments` (user id ++ payment id) and `reserved` (payment id).

use async_trait::async_trait;
use lnpay_core::{OutgoingPayment, PaymentId, UserId};
use lnpay_settlement::{BalanceOracle, LedgerError, PaymentStore};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Mutex;

/// Column family names for different data types.
const CF_PAYMENTS: &str = "payments";
const CF_USER_PAYMENTS: &str = "user_payments";
const CF_RESERVED: &str = "reserved";
const CF_CREDITS: &str = "credits";

/// Persistent reservation ledger for the lnpay node.
pub struct RocksLedger {
    db: DB,
    /// Serializes read-modify-write sequences.
    write_lock: Mutex<()>,
}

impl RocksLedger {
    /// Open or create a RocksDB database at the given path with column families.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_USER_PAYMENTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_RESERVED, Options::default()),
            ColumnFamilyDescriptor::new(CF_CREDITS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Total credited to `user_id`.
    pub fn credited(&self, user_id: UserId) -> Result<u64, LedgerError> {
        let cf = self.cf(CF_CREDITS)?;
        let value = self
            .db
            .get_cf(&cf, user_key(user_id))
            .map_err(storage_error)?;
        value.map(|bytes| decode_u64(&bytes)).transpose().map(|v| v.unwrap_or(0))
    }

    /// All records owned by `user_id`.
    pub fn payments_for(&self, user_id: UserId) -> Result<Vec<OutgoingPayment>, LedgerError> {
        let cf = self.cf(CF_USER_PAYMENTS)?;
        let prefix = user_key(user_id);
        let mut payments = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(storage_error)?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id = payment_id_from_key(&key[prefix.len()..])?;
            if let Some(payment) = self.load(id)? {
                payments.push(payment);
            }
        }
        Ok(payments)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, LedgerError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::Storage(format!("column family '{}' not found", name)))
    }

    fn load(&self, payment_id: PaymentId) -> Result<Option<OutgoingPayment>, LedgerError> {
        let cf = self.cf(CF_PAYMENTS)?;
        let value = self
            .db
            .get_cf(&cf, payment_id.as_uuid().as_bytes())
            .map_err(storage_error)?;
        value
            .map(|bytes| {
                serde_json::from_slice(&bytes)
                    .map_err(|e| LedgerError::Storage(format!("corrupt payment {}: {}", payment_id, e)))
            })
            .transpose()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, LedgerError> {
        self.write_lock
            .lock()
            .map_err(|_| LedgerError::Storage("ledger write lock poisoned".into()))
    }
}

#[async_trait]
impl BalanceOracle for RocksLedger {
    async fn balance(&self, user_id: UserId) -> Result<i64, LedgerError> {
        let debits: u128 = self
            .payments_for(user_id)?
            .iter()
            .map(|p| p.balance_debit() as u128)
            .sum();
        let balance = self.credited(user_id)? as i128 - debits as i128;
        i64::try_from(balance)
            .map_err(|_| LedgerError::Storage(format!("balance out of range for user {}", user_id)))
    }
}

#[async_trait]
impl PaymentStore for RocksLedger {
    async fn create(&self, payment: &OutgoingPayment) -> Result<(), LedgerError> {
        let _guard = self.lock()?;
        if self.load(payment.id)?.is_some() {
            return Err(LedgerError::AlreadyExists(payment.id));
        }

        let id = payment.id.as_uuid().as_bytes().to_vec();
        let mut batch = WriteBatch::default();
        batch.put_cf(&self.cf(CF_PAYMENTS)?, &id, encode(payment)?);
        batch.put_cf(
            &self.cf(CF_USER_PAYMENTS)?,
            user_payment_key(payment.user_id, payment.id),
            b"",
        );
        if payment.state.is_reserved() {
            batch.put_cf(&self.cf(CF_RESERVED)?, &id, b"");
        }
        self.db.write(batch).map_err(storage_error)?;
        tracing::debug!(payment_id = %payment.id, user_id = %payment.user_id, "outgoing payment stored");
        Ok(())
    }

    async fn delete(&self, payment_id: PaymentId) -> Result<(), LedgerError> {
        let _guard = self.lock()?;
        let existing = self
            .load(payment_id)?
            .ok_or(LedgerError::NotFound(payment_id))?;
        if !existing.state.is_reserved() {
            return Err(LedgerError::InvalidStateTransition(format!(
                "cannot delete payment in state {}",
                existing.state
            )));
        }

        let id = payment_id.as_uuid().as_bytes().to_vec();
        let mut batch = WriteBatch::default();
        batch.delete_cf(&self.cf(CF_PAYMENTS)?, &id);
        batch.delete_cf(
            &self.cf(CF_USER_PAYMENTS)?,
            user_payment_key(existing.user_id, payment_id),
        );
        batch.delete_cf(&self.cf(CF_RESERVED)?, &id);
        self.db.write(batch).map_err(storage_error)?;
        tracing::debug!(payment_id = %payment_id, "reservation removed");
        Ok(())
    }

    async fn update(&self, payment: &OutgoingPayment) -> Result<(), LedgerError> {
        let _guard = self.lock()?;
        let existing = self
            .load(payment.id)?
            .ok_or(LedgerError::NotFound(payment.id))?;
        if existing.state.is_final() {
            return Err(LedgerError::InvalidStateTransition(format!(
                "payment {} is already {}",
                payment.id, existing.state
            )));
        }

        let id = payment.id.as_uuid().as_bytes().to_vec();
        let mut batch = WriteBatch::default();
        batch.put_cf(&self.cf(CF_PAYMENTS)?, &id, encode(payment)?);
        if !payment.state.is_reserved() {
            batch.delete_cf(&self.cf(CF_RESERVED)?, &id);
        }
        self.db.write(batch).map_err(storage_error)?;
        Ok(())
    }

    async fn get(&self, payment_id: PaymentId) -> Result<Option<OutgoingPayment>, LedgerError> {
        self.load(payment_id)
    }

    async fn reserved(&self) -> Result<Vec<OutgoingPayment>, LedgerError> {
        let cf = self.cf(CF_RESERVED)?;
        let mut reserved = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(storage_error)?;
            if let Some(payment) = self.load(payment_id_from_key(&key)?)? {
                reserved.push(payment);
            }
        }
        reserved.sort_by_key(|p| p.created_at);
        Ok(reserved)
    }

    async fn credit(&self, user_id: UserId, amount: u64) -> Result<(), LedgerError> {
        let _guard = self.lock()?;
        let updated = self
            .credited(user_id)?
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Storage(format!("credit overflow for user {}", user_id)))?;
        let cf = self.cf(CF_CREDITS)?;
        self.db
            .put_cf(&cf, user_key(user_id), updated.to_be_bytes())
            .map_err(storage_error)?;
        tracing::info!(user_id = %user_id, amount, "ledger credited");
        Ok(())
    }
}

fn storage_error(e: rocksdb::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn encode(payment: &OutgoingPayment) -> Result<Vec<u8>, LedgerError> {
    serde_json::to_vec(payment)
        .map_err(|e| LedgerError::Storage(format!("encoding payment {}: {}", payment.id, e)))
}

fn user_key(user_id: UserId) -> [u8; 8] {
    user_id.0.to_be_bytes()
}

fn user_payment_key(user_id: UserId, payment_id: PaymentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(&user_key(user_id));
    key.extend_from_slice(payment_id.as_uuid().as_bytes());
    key
}

fn payment_id_from_key(bytes: &[u8]) -> Result<PaymentId, LedgerError> {
    uuid::Uuid::from_slice(bytes)
        .map(PaymentId)
        .map_err(|e| LedgerError::Storage(format!("corrupt index key: {}", e)))
}

fn decode_u64(bytes: &[u8]) -> Result<u64, LedgerError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LedgerError::Storage("corrupt credit value".into()))?;
    Ok(u64::from_be_bytes(raw))
}
