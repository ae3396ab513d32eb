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
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Razorpay gateway client
///
/// Order API and webhook signature scheme per
/// https://razorpay.com/docs/api/orders and /docs/webhooks
pub struct RazorpayClient {
    client: ClientWithMiddleware,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
    base_url: String,
    timeout: Duration,
}

impl RazorpayClient {
    pub fn new(
        key_id: String,
        key_secret: String,
        webhook_secret: String,
        base_url: Option<String>,
        timeout_ms: u64,
    ) -> Self {
        // Transient order-creation failures are retried with short backoff;
        // the webhook retry loop stays the gateway's responsibility.
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
            .build_with_max_retries(3);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            key_id,
            key_secret,
            webhook_secret,
            base_url: base_url.unwrap_or_else(|| "https://api.razorpay.com".to_string()),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Constant-time HMAC-SHA256 check of `message` against a hex signature
    fn verify_hmac_hex(secret: &str, message: &[u8], signature_hex: &str) -> bool {
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(message);
        mac.verify_slice(&signature).is_ok()
    }
}

#[async_trait]
impl GatewayClient for RazorpayClient {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder> {
        let url = format!("{}/v1/orders", self.base_url);

        let body = json!({
            "amount": request.amount_minor,
            "currency": request.currency.to_string(),
            "receipt": request.receipt,
            "payment_capture": 1,
            "notes": {
                "user_id": request.user_id,
                "ride_id": request.ride_id,
            }
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Razorpay order request failed: {}", e)))?;

        let status_code = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read Razorpay response: {}", e)))?;

        if !status_code.is_success() {
            return Err(AppError::gateway(format!(
                "Razorpay API error - HTTP {} ({})",
                status_code.as_u16(),
                response_body
            )));
        }

        let order: RazorpayOrderResponse = serde_json::from_str(&response_body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Razorpay order: {}", e)))?;

        Ok(GatewayOrder {
            order_ref: order.id,
            amount_minor: order.amount,
            currency: request.currency,
        })
    }

    fn verify_payment_signature(
        &self,
        order_ref: &str,
        gateway_txn_id: &str,
        signature: &str,
    ) -> Result<()> {
        // Razorpay client verification signs "order_id|payment_id" with the
        // key secret
        let message = format!("{}|{}", order_ref, gateway_txn_id);
        if Self::verify_hmac_hex(&self.key_secret, message.as_bytes(), signature) {
            Ok(())
        } else {
            Err(AppError::signature_mismatch(format!(
                "Razorpay payment signature mismatch for order {}",
                order_ref
            )))
        }
    }

    fn parse_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookEvent> {
        // Signature covers the raw bytes; nothing is parsed before this check
        if !Self::verify_hmac_hex(&self.webhook_secret, raw_body, signature) {
            return Err(AppError::signature_mismatch(
                "Razorpay webhook signature mismatch",
            ));
        }

        let raw: serde_json::Value = serde_json::from_slice(raw_body)?;
        let event_name = raw["event"].as_str().unwrap_or_default().to_string();

        let event = match event_name.as_str() {
            "payment.captured" | "payment.failed" => {
                let entity = &raw["payload"]["payment"]["entity"];
                WebhookEvent {
                    kind: if event_name == "payment.captured" {
                        WebhookEventKind::Captured
                    } else {
                        WebhookEventKind::Failed
                    },
                    order_ref: entity["order_id"].as_str().map(String::from),
                    gateway_txn_id: entity["id"].as_str().map(String::from),
                    refund_id: None,
                    amount_minor: entity["amount"].as_i64(),
                    raw,
                }
            }
            "refund.processed" => {
                let entity = &raw["payload"]["refund"]["entity"];
                WebhookEvent {
                    kind: WebhookEventKind::RefundProcessed,
                    order_ref: None,
                    gateway_txn_id: entity["payment_id"].as_str().map(String::from),
                    refund_id: entity["id"].as_str().map(String::from),
                    amount_minor: entity["amount"].as_i64(),
                    raw,
                }
            }
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
        let url = format!("{}/v1/payments/{}/refund", self.base_url, gateway_txn_id);

        let body = json!({
            "amount": amount_minor,
            "notes": { "reason": reason }
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Razorpay refund request failed: {}", e)))?;

        let status_code = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read Razorpay response: {}", e)))?;

        if !status_code.is_success() {
            return Err(AppError::gateway(format!(
                "Razorpay refund error - HTTP {} ({})",
                status_code.as_u16(),
                response_body
            )));
        }

        let refund: RazorpayRefundResponse = serde_json::from_str(&response_body)
            .map_err(|e| AppError::gateway(format!("Failed to parse Razorpay refund: {}", e)))?;

        Ok(GatewayRefund {
            refund_id: refund.id,
            status: refund.status,
        })
    }
}

// Razorpay API response structures

#[derive(Debug, Deserialize)]
struct RazorpayOrderResponse {
    id: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct RazorpayRefundResponse {
    id: String,
    status: String,
}
