use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

const LIGHTNING_SCHEME: &str = "lightning:";

/// A payment request string in canonical form: trimmed, without a
/// `lightning:` scheme, lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentRequest(String);

impl PaymentRequest {
    /// Normalize a raw payment request as submitted by a client.
    pub fn normalize(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        let without_scheme = match trimmed.get(..LIGHTNING_SCHEME.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(LIGHTNING_SCHEME) => {
                &trimmed[LIGHTNING_SCHEME.len()..]
            }
            _ => trimmed,
        };
        let normalized = without_scheme.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(CoreError::InvalidPaymentRequest(
                "payment request is empty".into(),
            ));
        }
        Ok(Self(normalized))
    }

    /// Get the normalized string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structured form of a decoded payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDescriptor {
    /// Destination node identity (hex pubkey).
    pub destination: String,
    /// Requested amount in satoshis; 0 means the payer chooses.
    pub num_satoshis: u64,
    /// Free-form description (memo).
    pub description: String,
    /// Hash of a long description, if the invoice commits to one.
    pub description_hash: String,
    /// Payment hash identifying the payment on the network.
    pub payment_hash: String,
}

impl PaymentDescriptor {
    /// Whether the invoice leaves the amount to the payer.
    pub fn is_amountless(&self) -> bool {
        self.num_satoshis == 0
    }
}

/// Caller-supplied amount as it arrives on the wire.
///
/// Clients send integers, integral floats, or decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Int(i64),
    Float(f64),
    Text(String),
}

impl AmountInput {
    /// Parse to a whole number of satoshis.
    pub fn parse(&self) -> Result<i64, CoreError> {
        match self {
            Self::Int(value) => Ok(*value),
            Self::Float(value) => {
                if !value.is_finite() || value.fract() != 0.0 {
                    return Err(CoreError::InvalidAmount(format!(
                        "amount must be a whole number, got {}",
                        value
                    )));
                }
                if *value < i64::MIN as f64 || *value > i64::MAX as f64 {
                    return Err(CoreError::InvalidAmount(format!(
                        "amount out of range: {}",
                        value
                    )));
                }
                Ok(*value as i64)
            }
            Self::Text(text) => text.trim().parse::<i64>().map_err(|_| {
                CoreError::InvalidAmount(format!("amount is not an integer: {:?}", text))
            }),
        }
    }
}

impl From<i64> for AmountInput {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Resolve the amount to pay for a decoded invoice.
///
/// An invoice carrying its own amount wins over the caller's. An amountless
/// invoice requires a strictly positive caller amount. A caller amount that
/// is present must always parse and must not be negative.
pub fn resolve_amount(
    descriptor: &PaymentDescriptor,
    input: Option<&AmountInput>,
) -> Result<u64, CoreError> {
    let requested = input.map(AmountInput::parse).transpose()?;
    if let Some(value) = requested {
        if value < 0 {
            return Err(CoreError::InvalidAmount(format!(
                "amount must not be negative, got {}",
                value
            )));
        }
    }

    if !descriptor.is_amountless() {
        return Ok(descriptor.num_satoshis);
    }

    match requested {
        Some(value) if value > 0 => Ok(value as u64),
        Some(value) => Err(CoreError::InvalidAmount(format!(
            "amountless invoice requires a positive amount, got {}",
            value
        ))),
        None => Err(CoreError::MissingField("amount".into())),
    }
}
