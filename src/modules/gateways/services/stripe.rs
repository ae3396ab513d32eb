use super::gateway_trait::{
    CreateOrderRequest, GatewayClient, GatewayKind, GatewayOrder, GatewayRefund, WebhookEvent,
    WebhookEventKind,
};
use crate::core::{AppError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Stripe gateway client
///
/// Orders map to PaymentIntents; webhook verification follows the
/// constructed-event scheme: the `Stripe-Signature` header carries
/// `t=<timestamp>,v1=<hex sig>` and the signature is HMAC-SHA256 over
/// `"{t}.{raw body}"` with the endpoint's webhook secret.
pub struct StripeClient {
    client: ClientWithMiddleware,
    secret_key: String,
    webhook_secret: String,
    base_url: String,
    timeout: Duration,
}

impl StripeClient {
    pub fn new(
        secret_key: String,
        webhook_secret: String,
        base_url: Option<String>,
        timeout_ms: u64,
    ) -> Self {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
            .build_with_max_retries(3);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            secret_key,
            webhook_secret,
            base_url: base_url.unwrap_or_else(|| "https://api.stripe.com".to_string()),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn verify_hmac_hex(secret: &str, message: &[u8], signature_hex: &str) -> bool {
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(message);
        mac.verify_slice(&signature).is_ok()
    }

    /// Split `t=..,v1=..` into (timestamp, signature)
    fn parse_signature_header(header: &str) -> Option<(&str, &str)> {
        let mut timestamp = None;
        let mut v1 = None;
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => v1 = Some(value),
                _ => {}
            }
        }
        timestamp.zip(v1)
    }

    /// Verify a signed event payload and return the raw body for parsing
    fn construct_event(&self, raw_body: &[u8], signature_header: &str) -> Result<()> {
        let Some((timestamp, signature)) = Self::parse_signature_header(signature_header) else {
            return Err(AppError::signature_mismatch(
                "Malformed Stripe-Signature header",
            ));
        };

        let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + raw_body.len());
        signed_payload.extend_from_slice(timestamp.as_bytes());
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(raw_body);

        if Self::verify_hmac_hex(&self.webhook_secret, &signed_payload, signature) {
            Ok(())
        } else {
            Err(AppError::signature_mismatch(
                "Stripe webhook signature mismatch",
            ))
        }
    }
}

#[async_trait]
impl GatewayClient for StripeClient {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder> {
        let url = format!("{}/v1/payment_intents", self.base_url);

        let amount = request.amount_minor.to_string();
        let currency = request.currency.to_string().to_lowercase();
        let params = [
            ("amount", amount.as_str()),
            ("currency", currency.as_str()),
            ("description", request.receipt.as_str()),
            ("metadata[user_id]", request.user_id.as_str()),
            ("metadata[ride_id]", request.ride_id.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .timeout(self.timeout)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Stripe intent request failed: {}", e)))?;

        let status_code = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read Stripe response: {}", e)))?;

        if !status_code.is_success() {
            return Err(AppError::gateway(format!(
                "Stripe API error - HTTP {} ({})",
                status_code.as_u16(),
                response_body
            )));
        }

        let intent: StripeIntentResponse = serde_json::from_str(&response_body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Stripe intent: {}", e)))?;

        Ok(GatewayOrder {
            order_ref: intent.id,
            amount_minor: intent.amount,
            currency: request.currency,
        })
    }

    fn verify_payment_signature(
        &self,
        order_ref: &str,
        gateway_txn_id: &str,
        signature: &str,
    ) -> Result<()> {
        // Client verification reuses the constructed-event scheme over the
        // order/transaction pair, signed with the webhook secret
        let message = format!("{}|{}", order_ref, gateway_txn_id);
        if Self::verify_hmac_hex(&self.webhook_secret, message.as_bytes(), signature) {
            Ok(())
        } else {
            Err(AppError::signature_mismatch(format!(
                "Stripe payment signature mismatch for intent {}",
                order_ref
            )))
        }
    }

    fn parse_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookEvent> {
        // Raw bytes are verified before any parsing
        self.construct_event(raw_body, signature)?;

        let raw: serde_json::Value = serde_json::from_slice(raw_body)?;
        let event_type = raw["type"].as_str().unwrap_or_default().to_string();
        let object = &raw["data"]["object"];

        let event = match event_type.as_str() {
            "payment_intent.succeeded" | "payment_intent.payment_failed" => WebhookEvent {
                kind: if event_type == "payment_intent.succeeded" {
                    WebhookEventKind::Captured
                } else {
                    WebhookEventKind::Failed
                },
                order_ref: object["id"].as_str().map(String::from),
                gateway_txn_id: object["latest_charge"]
                    .as_str()
                    .or_else(|| object["id"].as_str())
                    .map(String::from),
                refund_id: None,
                amount_minor: object["amount"].as_i64(),
                raw,
            },
            "charge.refunded" => WebhookEvent {
                kind: WebhookEventKind::RefundProcessed,
                order_ref: object["payment_intent"].as_str().map(String::from),
                gateway_txn_id: object["id"].as_str().map(String::from),
                refund_id: object["refunds"]["data"][0]["id"].as_str().map(String::from),
                amount_minor: object["amount_refunded"].as_i64(),
                raw,
            },
            _ => WebhookEvent {
                kind: WebhookEventKind::Unhandled,
                order_ref: None,
                gateway_txn_id: None,
                refund_id: None,
                amount_minor: None,
                raw,
            },
        };

        Ok(event)
    }

    async fn refund(
        &self,
        gateway_txn_id: &str,
        amount_minor: i64,
        reason: &str,
    ) -> Result<GatewayRefund> {
        let url = format!("{}/v1/refunds", self.base_url);

        let amount = amount_minor.to_string();
        let params = [
            ("charge", gateway_txn_id),
            ("amount", amount.as_str()),
            ("metadata[reason]", reason),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .timeout(self.timeout)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Stripe refund request failed: {}", e)))?;

        let status_code = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read Stripe response: {}", e)))?;

        if !status_code.is_success() {
            return Err(AppError::gateway(format!(
                "Stripe refund error - HTTP {} ({})",
                status_code.as_u16(),
                response_body
            )));
        }

        let refund: StripeRefundResponse = serde_json::from_str(&response_body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Stripe refund: {}", e)))?;

        Ok(GatewayRefund {
            refund_id: refund.id,
            status: refund.status,
        })
    }
}

// Stripe API response structures

#[derive(Debug, Deserialize)]
struct StripeIntentResponse {
    id: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct StripeRefundResponse {
    id: String,
    status: String,
}
