//! In-process gateway for workflow tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, RefundReceipt, TransferReceipt};

#[derive(Default)]
pub struct FakeGateway {
    pub sessions: Mutex<HashMap<String, CheckoutSession>>,
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
    pub refunds: Mutex<Vec<(String, i64)>>,
    pub transfers: Mutex<Vec<(String, i64)>>,
    pub reversals: Mutex<Vec<(String, i64)>>,
    pub fail_refunds: Mutex<Option<String>>,
    pub fail_reversals: Mutex<bool>,
}

impl FakeGateway {
    pub fn mark_paid(&self, session_id: &str) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(session_id) {
            session.status = Some("complete".to_string());
            session.payment_status = "paid".to_string();
            session.payment_intent = Some(format!("pi_{session_id}"));
        }
    }

    pub fn mark_expired(&self, session_id: &str) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(session_id) {
            session.status = Some("expired".to_string());
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let mut sessions = self.sessions.lock().unwrap();
        let id = format!("cs_test_{}", sessions.len() + 1);
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.test/{id}")),
            status: Some("open".to_string()),
            payment_status: "unpaid".to_string(),
            payment_intent: None,
            amount_total: Some(request.amount_minor),
            metadata: request.metadata.clone(),
        };
        sessions.insert(id, session.clone());
        self.checkouts.lock().unwrap().push(request.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| GatewayError::Provider {
                status: 404,
                message: format!("No such checkout.session: '{session_id}'"),
            })
    }

    async fn create_refund(&self, payment_intent: &str, amount_minor: i64) -> Result<RefundReceipt, GatewayError> {
        if let Some(message) = self.fail_refunds.lock().unwrap().clone() {
            return Err(GatewayError::Provider { status: 400, message });
        }
        let mut refunds = self.refunds.lock().unwrap();
        refunds.push((payment_intent.to_string(), amount_minor));
        Ok(RefundReceipt {
            id: format!("re_{}", refunds.len()),
            amount: amount_minor,
            status: "succeeded".to_string(),
        })
    }

    async fn create_transfer(
        &self,
        destination: &str,
        amount_minor: i64,
        _currency: &str,
        _transfer_group: &str,
    ) -> Result<TransferReceipt, GatewayError> {
        let mut transfers = self.transfers.lock().unwrap();
        transfers.push((destination.to_string(), amount_minor));
        Ok(TransferReceipt {
            id: format!("tr_{}", transfers.len()),
            amount: amount_minor,
        })
    }

    async fn reverse_transfer(&self, transfer_id: &str, amount_minor: i64) -> Result<TransferReceipt, GatewayError> {
        if *self.fail_reversals.lock().unwrap() {
            return Err(GatewayError::Provider {
                status: 400,
                message: "Transfer has already been fully reversed.".to_string(),
            });
        }
        let mut reversals = self.reversals.lock().unwrap();
        reversals.push((transfer_id.to_string(), amount_minor));
        Ok(TransferReceipt {
            id: format!("trr_{}", reversals.len()),
            amount: amount_minor,
        })
    }
}
