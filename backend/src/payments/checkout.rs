use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, RefundReceipt, TransferReceipt};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Form-encoded client for the provider's REST API.
#[derive(Clone)]
pub struct HostedCheckoutClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    message: Option<String>,
}

impl HostedCheckoutClient {
    pub fn new(api_base: &str, secret_key: &str) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn post_form<T: DeserializeOwned>(&self, path: &str, form: &[(String, String)]) -> Result<T, GatewayError> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ProviderErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or_else(|| format!("Payment provider returned HTTP {}", status.as_u16()));
        log::error!("Payment provider error {}: {}", status, message);
        Err(GatewayError::Provider {
            status: status.as_u16(),
            message,
        })
    }
}

fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("line_items[0][price_data][currency]".to_string(), request.currency.clone()),
        ("line_items[0][price_data][unit_amount]".to_string(), request.amount_minor.to_string()),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            request.product_name.clone(),
        ),
    ];
    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_string(), email.clone()));
    }
    let mut keys: Vec<_> = request.metadata.keys().collect();
    keys.sort();
    for key in keys {
        form.push((format!("metadata[{key}]"), request.metadata[key].clone()));
    }
    form
}

#[async_trait]
impl PaymentGateway for HostedCheckoutClient {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        log::info!(
            "Creating checkout session for {} {}",
            request.amount_minor,
            request.currency
        );
        self.post_form("/v1/checkout/sessions", &checkout_form(request)).await
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        self.get(&format!("/v1/checkout/sessions/{session_id}")).await
    }

    async fn create_refund(&self, payment_intent: &str, amount_minor: i64) -> Result<RefundReceipt, GatewayError> {
        let form = [
            ("payment_intent".to_string(), payment_intent.to_string()),
            ("amount".to_string(), amount_minor.to_string()),
        ];
        self.post_form("/v1/refunds", &form).await
    }

    async fn create_transfer(
        &self,
        destination: &str,
        amount_minor: i64,
        currency: &str,
        transfer_group: &str,
    ) -> Result<TransferReceipt, GatewayError> {
        let form = [
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("destination".to_string(), destination.to_string()),
            ("transfer_group".to_string(), transfer_group.to_string()),
        ];
        self.post_form("/v1/transfers", &form).await
    }

    async fn reverse_transfer(&self, transfer_id: &str, amount_minor: i64) -> Result<TransferReceipt, GatewayError> {
        let form = [("amount".to_string(), amount_minor.to_string())];
        self.post_form(&format!("/v1/transfers/{transfer_id}/reversals"), &form)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn client(server: &MockServer) -> HostedCheckoutClient {
        HostedCheckoutClient::new(&server.base_url(), "sk_test_123").expect("client")
    }

    fn checkout_request() -> CheckoutRequest {
        CheckoutRequest {
            amount_minor: 31_500,
            currency: "usd".to_string(),
            product_name: "Loft in Lisbon".to_string(),
            success_url: "http://localhost/ok".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
            customer_email: None,
            metadata: HashMap::from([("payment_id".to_string(), "p-1".to_string())]),
        }
    }

    #[test]
    fn checkout_form_carries_amount_and_metadata() {
        let form = checkout_form(&checkout_request());
        assert!(form.contains(&("line_items[0][price_data][unit_amount]".to_string(), "31500".to_string())));
        assert!(form.contains(&("metadata[payment_id]".to_string(), "p-1".to_string())));
        assert!(form.contains(&("mode".to_string(), "payment".to_string())));
    }

    #[tokio::test]
    async fn creates_checkout_session() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/checkout/sessions")
                .header("authorization", "Bearer sk_test_123");
            then.status(200).json_body(json!({
                "id": "cs_test_1",
                "url": "https://checkout.example/cs_test_1",
                "status": "open",
                "payment_status": "unpaid"
            }));
        });

        let session = client(&server)
            .create_checkout_session(&checkout_request())
            .await
            .unwrap();

        assert_eq!(session.id, "cs_test_1");
        assert_eq!(session.url.as_deref(), Some("https://checkout.example/cs_test_1"));
        assert!(!session.is_paid());
        mock.assert();
    }

    #[tokio::test]
    async fn retrieves_paid_session() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v1/checkout/sessions/cs_test_1");
            then.status(200).json_body(json!({
                "id": "cs_test_1",
                "status": "complete",
                "payment_status": "paid",
                "payment_intent": "pi_1",
                "amount_total": 31500,
                "metadata": { "payment_id": "p-1" }
            }));
        });

        let session = client(&server).retrieve_checkout_session("cs_test_1").await.unwrap();

        assert!(session.is_paid());
        assert_eq!(session.payment_intent.as_deref(), Some("pi_1"));
        assert_eq!(session.metadata.get("payment_id").map(String::as_str), Some("p-1"));
        mock.assert();
    }

    #[tokio::test]
    async fn provider_error_message_is_passed_through() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/refunds");
            then.status(400).json_body(json!({
                "error": { "message": "Charge ch_1 has already been refunded." }
            }));
        });

        let err = client(&server).create_refund("pi_1", 1000).await.unwrap_err();

        match err {
            GatewayError::Provider { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Charge ch_1 has already been refunded.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        mock.assert();
    }

    #[tokio::test]
    async fn non_json_error_reports_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/transfers/tr_1/reversals");
            then.status(503).body("upstream down");
        });

        let err = client(&server).reverse_transfer("tr_1", 500).await.unwrap_err();

        assert_eq!(err.to_string(), "Payment provider returned HTTP 503");
    }

    #[tokio::test]
    async fn creates_transfer() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/transfers");
            then.status(200).json_body(json!({ "id": "tr_9", "amount": 27000 }));
        });

        let receipt = client(&server)
            .create_transfer("acct_host", 27_000, "usd", "booking-1")
            .await
            .unwrap();

        assert_eq!(receipt.id, "tr_9");
        assert_eq!(receipt.amount, 27_000);
        mock.assert();
    }
}
