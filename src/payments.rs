// =============================================================================
// PAYMENTS MODULE
// =============================================================================
// The payment collaborator: Paystack transaction initialize/verify over HTTP,
// and verification of signed webhook deliveries.
//
// Paystack signs each webhook body with HMAC-SHA512 keyed by the account's
// secret key and sends the hex digest in `x-paystack-signature`.
// =============================================================================

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use thiserror::Error;

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Gateway status string for a completed charge
pub const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Error)]
pub enum PaymentError {
    /// Network failure talking to the gateway
    #[error("Payment gateway unreachable: {0}")]
    RequestFailed(String),

    /// Gateway answered with an error status
    #[error("Payment gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected payment gateway response: {0}")]
    ResponseParseFailed(String),

    #[error("Invalid transaction reference: {0:?}")]
    InvalidReference(String),
}

/// Gateway references are short tokens of letters, digits and `-_.=`.
/// Anything else, including pure dot segments, never names a transaction.
pub fn is_valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference.len() <= 100
        && !reference.chars().all(|c| c == '.')
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '='))
}

// =============================================================================
// GATEWAY TYPES
// =============================================================================

/// A started transaction the customer completes in the gateway's checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub reference: String,
    pub access_code: String,
    pub authorization_url: String,
}

/// Outcome of verifying a transaction reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub reference: String,
    /// Gateway status: "success"; anything else is a failure
    pub status: String,
    /// Minor currency units actually charged
    pub amount: u64,
    /// ISO currency code of `amount`
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl TransactionStatus {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    pub fn is_in(&self, currency: &str) -> bool {
        self.currency.eq_ignore_ascii_case(currency)
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a transaction for `amount` minor units charged to `email`.
    async fn initialize(&self, amount: u64, email: &str) -> Result<PaymentSession, PaymentError>;

    /// Look up the final status of a transaction.
    async fn verify(&self, reference: &str) -> Result<TransactionStatus, PaymentError>;
}

// =============================================================================
// PAYSTACK CLIENT
// =============================================================================

/// Paystack wraps every payload as `{ status, message, data }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct Customer {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    reference: String,
    status: String,
    amount: u64,
    currency: String,
    customer: Option<Customer>,
}

#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl PaystackClient {
    pub fn new(secret_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            secret_key: secret_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `{base}/transaction/verify/{reference}` with the reference as one
    /// escaped path segment.
    fn verify_url(&self, reference: &str) -> Result<Url, PaymentError> {
        if !is_valid_reference(reference) {
            return Err(PaymentError::InvalidReference(reference.to_string()));
        }
        let mut url = Url::parse(&format!("{}/transaction/verify", self.base_url))
            .map_err(|e| PaymentError::RequestFailed(format!("bad gateway base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| PaymentError::RequestFailed("gateway base url cannot hold a path".to_string()))?
            .push(reference);
        Ok(url)
    }

    async fn read_envelope<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }

        let envelope = response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| PaymentError::ResponseParseFailed(e.to_string()))?;

        if !envelope.status {
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                message: envelope.message,
            });
        }
        envelope
            .data
            .ok_or_else(|| PaymentError::ResponseParseFailed("missing data".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(&self, amount: u64, email: &str) -> Result<PaymentSession, PaymentError> {
        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&InitializeBody { email, amount })
            .send()
            .await
            .map_err(|e| PaymentError::RequestFailed(e.to_string()))?;

        let data: InitializeData = Self::read_envelope(response).await?;
        Ok(PaymentSession {
            reference: data.reference,
            access_code: data.access_code,
            authorization_url: data.authorization_url,
        })
    }

    async fn verify(&self, reference: &str) -> Result<TransactionStatus, PaymentError> {
        let response = self
            .client
            .get(self.verify_url(reference)?)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| PaymentError::RequestFailed(e.to_string()))?;

        let data: VerifyData = Self::read_envelope(response).await?;
        Ok(TransactionStatus {
            reference: data.reference,
            status: data.status,
            amount: data.amount,
            currency: data.currency,
            email: data.customer.and_then(|customer| customer.email),
        })
    }
}

// =============================================================================
// WEBHOOKS
// =============================================================================

/// `true` if `signature_hex` is the HMAC-SHA512 of `body` under `secret`.
/// The comparison is constant-time.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha512>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Hex HMAC-SHA512 of `body`, as the gateway would send it.
#[cfg(test)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Event name for a completed charge
pub const CHARGE_SUCCESS: &str = "charge.success";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub reference: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub customer: Option<WebhookCustomer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookCustomer {
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn signature_round_trip() {
        let body = br#"{"event":"charge.success","data":{"reference":"T1"}}"#;
        let signature = sign("sk_test_secret", body);
        assert_eq!(signature.len(), 128);
        assert!(verify_signature("sk_test_secret", body, &signature));
    }

    #[test]
    fn tampered_body_or_wrong_secret_fails() {
        let body = br#"{"event":"charge.success","data":{"reference":"T1"}}"#;
        let signature = sign("sk_test_secret", body);
        assert!(!verify_signature("sk_test_other", body, &signature));
        assert!(!verify_signature(
            "sk_test_secret",
            br#"{"event":"charge.success","data":{"reference":"T2"}}"#,
            &signature
        ));
        assert!(!verify_signature("sk_test_secret", body, "not-hex"));
        assert!(!verify_signature("sk_test_secret", body, ""));
    }

    #[test]
    fn webhook_event_parses_charge_success() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "event": "charge.success",
            "data": {
                "reference": "T123",
                "status": "success",
                "amount": 30000,
                "customer": { "email": "guest@example.com" },
                "extra": "ignored"
            }
        }))
        .unwrap();
        assert_eq!(event.event, CHARGE_SUCCESS);
        assert_eq!(event.data.amount, 30_000);
        assert_eq!(
            event.data.customer.and_then(|c| c.email).as_deref(),
            Some("guest@example.com")
        );
    }

    #[tokio::test]
    async fn initialize_posts_amount_and_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .and(header("authorization", "Bearer sk_test_secret"))
            .and(body_json(json!({ "email": "guest@example.com", "amount": 30000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc",
                    "access_code": "abc",
                    "reference": "T123"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = PaystackClient::new("sk_test_secret", server.uri());
        let session = client.initialize(30_000, "guest@example.com").await.unwrap();
        assert_eq!(session.reference, "T123");
        assert_eq!(session.access_code, "abc");
    }

    #[tokio::test]
    async fn verify_reports_status_and_amount() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/T123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "reference": "T123",
                    "status": "abandoned",
                    "amount": 30000,
                    "currency": "NGN",
                    "customer": { "email": "guest@example.com" }
                }
            })))
            .mount(&server)
            .await;

        let client = PaystackClient::new("sk_test_secret", format!("{}/", server.uri()));
        let status = client.verify("T123").await.unwrap();
        assert!(!status.is_success());
        assert_eq!(status.amount, 30_000);
        assert!(status.is_in("ngn"));
        assert_eq!(status.email.as_deref(), Some("guest@example.com"));
    }

    #[test]
    fn references_are_plain_tokens() {
        assert!(is_valid_reference("T-ok"));
        assert!(is_valid_reference("7PVGX8MEk85tgeEpVDtD.v2=="));
        for bad in ["", ".", "..", "./T-ok", "x/../T-ok", "../verify/T-ok", "T ok", "T%2Fok", "T?x=1"] {
            assert!(!is_valid_reference(bad), "{bad:?} accepted");
        }
    }

    #[tokio::test]
    async fn path_like_references_never_reach_the_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = PaystackClient::new("sk_test_secret", server.uri());
        for reference in ["./T-ok", "x/../T-ok", "../verify/T-ok"] {
            let err = client.verify(reference).await.unwrap_err();
            assert!(matches!(err, PaymentError::InvalidReference(_)));
        }
    }

    #[test]
    fn reference_is_a_single_path_segment() {
        let client = PaystackClient::new("sk_test_secret", "https://api.paystack.co/");
        let url = client.verify_url("T-ok.2").unwrap();
        assert_eq!(url.as_str(), "https://api.paystack.co/transaction/verify/T-ok.2");
    }

    #[tokio::test]
    async fn gateway_errors_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/missing"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": false,
                "message": "Transaction reference not found"
            })))
            .mount(&server)
            .await;

        let client = PaystackClient::new("sk_test_secret", server.uri());
        let err = client.verify("missing").await.unwrap_err();
        assert!(matches!(err, PaymentError::Rejected { status: 400, .. }));
    }
}
