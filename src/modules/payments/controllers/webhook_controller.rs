use super::super::services::{WebhookOutcome, WebhookReconciler};
use crate::core::error::AppError;
use crate::modules::gateways::GatewayKind;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

fn signature_header(kind: GatewayKind) -> &'static str {
    match kind {
        GatewayKind::Razorpay => "X-Razorpay-Signature",
        GatewayKind::Stripe => "Stripe-Signature",
    }
}

/// Receive a gateway webhook
/// POST /webhooks/{gateway}
///
/// The body is taken as raw bytes so the signature is verified over exactly
/// what the gateway signed, before any JSON parsing.
pub async fn process_webhook(
    reconciler: web::Data<Arc<WebhookReconciler>>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let kind: GatewayKind = path
        .into_inner()
        .parse()
        .map_err(AppError::validation)?;

    let signature = req
        .headers()
        .get(signature_header(kind))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::signature_mismatch(format!("Missing {} header", signature_header(kind)))
        })?;

    let outcome = reconciler.handle(kind, &body, signature).await?;

    info!(gateway = %kind, outcome = ?outcome, "Webhook acknowledged");

    let status = match outcome {
        WebhookOutcome::Processed => "processed",
        WebhookOutcome::Duplicate => "duplicate",
        WebhookOutcome::Ignored => "ignored",
    };
    Ok(HttpResponse::Ok().json(json!({ "status": status })))
}

/// Configure webhook routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhooks").route("/{gateway}", web::post().to(process_webhook)));
}
