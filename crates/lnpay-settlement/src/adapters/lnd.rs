use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lnpay_core::{PaymentDescriptor, PaymentRequest, SettlementResult};
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, ExecutorError};
use crate::traits::{InvoiceDecoder, PaymentExecutor};
use crate::types::{PaymentLookup, ResolvedPayment};

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// gRPC codes that say nothing about whether LND acted on the call:
/// CANCELLED, DEADLINE_EXCEEDED, UNAVAILABLE.
const AMBIGUOUS_GRPC_CODES: [i32; 3] = [1, 4, 14];

/// Connection settings for an LND node's REST interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LndConfig {
    /// Base URL, e.g. `https://127.0.0.1:8080`.
    pub url: String,
    /// Hex-encoded admin macaroon.
    pub macaroon_hex: String,
    /// Accept self-signed TLS certificates.
    #[serde(default)]
    pub tls_skip_verify: bool,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// LND REST client acting as invoice decoder and payment executor.
pub struct LndClient {
    base_url: String,
    macaroon_hex: String,
    http: reqwest::Client,
}

impl LndClient {
    pub fn new(config: &LndConfig) -> Result<Self, ExecutorError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.tls_skip_verify)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExecutorError::Unavailable(format!("building http client: {}", e)))?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            macaroon_hex: config.macaroon_hex.clone(),
            http,
        })
    }

    /// Identity pubkey of the connected node.
    pub async fn identity_pubkey(&self) -> Result<String, ExecutorError> {
        let info: GetInfoResponse = self.get_json("/v1/getinfo").await?;
        Ok(info.identity_pubkey)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ExecutorError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header(MACAROON_HEADER, &self.macaroon_hex)
            .send()
            .await
            .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;
        Self::read_json(resp).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ExecutorError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .bytes()
                .await
                .map_err(|e| ExecutorError::Unavailable(format!("HTTP {}: {}", status, e)))?;
            return Err(classify_error(status, &body));
        }
        resp.json::<T>()
            .await
            .map_err(|e| ExecutorError::Unavailable(format!("malformed response: {}", e)))
    }
}

#[async_trait]
impl InvoiceDecoder for LndClient {
    async fn decode(
        &self,
        payment_request: &PaymentRequest,
    ) -> Result<PaymentDescriptor, DecodeError> {
        let path = format!("/v1/payreq/{}", payment_request.as_str());
        let pay_req: PayReqResponse = self.get_json(&path).await.map_err(|e| match e {
            ExecutorError::PaymentFailed(message) => DecodeError::Invalid(message),
            ExecutorError::Unavailable(message) => DecodeError::Unavailable(message),
        })?;
        pay_req.into_descriptor()
    }
}

#[async_trait]
impl PaymentExecutor for LndClient {
    async fn pay(&self, payment: &ResolvedPayment) -> Result<SettlementResult, ExecutorError> {
        let body = SendRequest::for_payment(payment);
        let resp = self
            .http
            .post(format!("{}/v1/channels/transactions", self.base_url))
            .header(MACAROON_HEADER, &self.macaroon_hex)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;
        let send: SendResponse = Self::read_json(resp).await?;
        send.into_result()
    }

    async fn lookup(&self, payment_hash: &str) -> Result<PaymentLookup, ExecutorError> {
        let listing: ListPaymentsResponse = self
            .get_json("/v1/payments?include_incomplete=true&reversed=true")
            .await?;
        Ok(listing.lookup(payment_hash))
    }

    fn executor_id(&self) -> &str {
        "lnd"
    }
}

// --- Wire types (grpc-gateway renders int64 as strings) ---

#[derive(Deserialize)]
struct LndErrorBody {
    #[serde(default)]
    code: Option<i32>,
    #[serde(default)]
    message: String,
}

/// Map a non-2xx answer to an executor error.
///
/// Only an error LND itself rendered, with a message and a gRPC code that
/// means the call was refused, counts as a definitive failure. Proxy
/// timeouts, bare status lines and ambiguous codes leave the outcome unknown.
fn classify_error(status: reqwest::StatusCode, body: &[u8]) -> ExecutorError {
    let gateway = matches!(status.as_u16(), 502..=504);
    match serde_json::from_slice::<LndErrorBody>(body) {
        Ok(LndErrorBody {
            code: Some(code),
            message,
        }) if !gateway && !message.is_empty() && !AMBIGUOUS_GRPC_CODES.contains(&code) => {
            ExecutorError::PaymentFailed(message)
        }
        Ok(LndErrorBody { message, .. }) if !message.is_empty() => {
            ExecutorError::Unavailable(format!("HTTP {}: {}", status, message))
        }
        _ => ExecutorError::Unavailable(format!("HTTP {}", status)),
    }
}

#[derive(Deserialize)]
struct GetInfoResponse {
    identity_pubkey: String,
}

#[derive(Debug, Deserialize)]
struct PayReqResponse {
    destination: String,
    payment_hash: String,
    #[serde(default)]
    num_satoshis: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    description_hash: String,
}

impl PayReqResponse {
    fn into_descriptor(self) -> Result<PaymentDescriptor, DecodeError> {
        Ok(PaymentDescriptor {
            destination: self.destination,
            num_satoshis: parse_sats(&self.num_satoshis)
                .map_err(|e| DecodeError::Invalid(format!("num_satoshis: {}", e)))?,
            description: self.description,
            description_hash: self.description_hash,
            payment_hash: self.payment_hash,
        })
    }
}

#[derive(Debug, Serialize)]
struct FeeLimit {
    fixed: String,
}

#[derive(Debug, Serialize)]
struct SendRequest {
    payment_request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    amt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fee_limit: Option<FeeLimit>,
}

impl SendRequest {
    fn for_payment(payment: &ResolvedPayment) -> Self {
        Self {
            payment_request: payment.payment_request.to_string(),
            // LND rejects an explicit amount for invoices that carry one.
            amt: payment
                .descriptor
                .is_amountless()
                .then(|| payment.amount.to_string()),
            fee_limit: payment.fee_limit.map(|limit| FeeLimit {
                fixed: limit.to_string(),
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Route {
    #[serde(default)]
    total_amt: String,
    #[serde(default)]
    total_fees: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    payment_error: String,
    #[serde(default)]
    payment_preimage: String,
    #[serde(default)]
    payment_hash: String,
    #[serde(default)]
    payment_route: Option<Route>,
}

impl SendResponse {
    fn into_result(self) -> Result<SettlementResult, ExecutorError> {
        if !self.payment_error.is_empty() {
            return Err(ExecutorError::PaymentFailed(self.payment_error));
        }
        let route = self
            .payment_route
            .ok_or_else(|| ExecutorError::Unavailable("settled payment without route".into()))?;
        let total_amt = parse_sats(&route.total_amt).map_err(ExecutorError::Unavailable)?;
        let fee = parse_sats(&route.total_fees).map_err(ExecutorError::Unavailable)?;
        Ok(SettlementResult {
            // total_amt includes the fees paid along the route
            amount: total_amt.saturating_sub(fee),
            fee,
            preimage: base64_to_hex(&self.payment_preimage)?,
            payment_hash: base64_to_hex(&self.payment_hash)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListedPayment {
    payment_hash: String,
    #[serde(default)]
    value_sat: String,
    #[serde(default)]
    fee_sat: String,
    #[serde(default)]
    payment_preimage: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    failure_reason: String,
}

#[derive(Debug, Default, Deserialize)]
struct ListPaymentsResponse {
    #[serde(default)]
    payments: Vec<ListedPayment>,
}

impl ListPaymentsResponse {
    fn lookup(&self, payment_hash: &str) -> PaymentLookup {
        let Some(found) = self
            .payments
            .iter()
            .find(|p| p.payment_hash.eq_ignore_ascii_case(payment_hash))
        else {
            return PaymentLookup::Unknown;
        };

        match found.status.as_str() {
            "SUCCEEDED" => {
                match (parse_sats(&found.value_sat), parse_sats(&found.fee_sat)) {
                    (Ok(amount), Ok(fee)) => PaymentLookup::Succeeded(SettlementResult {
                        amount,
                        fee,
                        preimage: found.payment_preimage.clone(),
                        payment_hash: found.payment_hash.clone(),
                    }),
                    _ => PaymentLookup::Unknown,
                }
            }
            "FAILED" => PaymentLookup::Failed(if found.failure_reason.is_empty() {
                "payment failed".to_string()
            } else {
                found.failure_reason.clone()
            }),
            "IN_FLIGHT" | "INITIATED" => PaymentLookup::InFlight,
            _ => PaymentLookup::Unknown,
        }
    }
}

fn parse_sats(value: &str) -> Result<u64, String> {
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse::<u64>()
        .map_err(|_| format!("not a satoshi amount: {:?}", value))
}

fn base64_to_hex(value: &str) -> Result<String, ExecutorError> {
    BASE64
        .decode(value)
        .map(hex::encode)
        .map_err(|e| ExecutorError::Unavailable(format!("bad base64 in response: {}", e)))
}
