use super::super::models::PaymentMethod;
use super::super::services::{OrderService, RefundService, VerificationService};
use crate::core::error::AppError;
use crate::modules::gateways::GatewayKind;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

/// Authentication happens upstream; the gateway proxy injects the
/// authenticated user id in this header.
const USER_HEADER: &str = "X-User-Id";

fn caller_id(req: &HttpRequest) -> Result<String, AppError> {
    req.headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::unauthorized(format!("Missing {} header", USER_HEADER)))
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub ride_id: String,
    pub amount_minor: i64,
    pub method: PaymentMethod,
    pub gateway: GatewayKind,
}

/// Open a payment order for a ride
/// POST /payments/orders
pub async fn create_order(
    service: web::Data<Arc<OrderService>>,
    req: HttpRequest,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let caller = caller_id(&req)?;
    let payment = service
        .create_order(
            &caller,
            &body.ride_id,
            body.amount_minor,
            body.method,
            body.gateway,
        )
        .await?;

    Ok(HttpResponse::Created().json(payment))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub order_ref: String,
    pub gateway_txn_id: String,
    pub signature: String,
}

/// Verify a client-submitted payment signature
/// POST /payments/verify
pub async fn verify_payment(
    service: web::Data<Arc<VerificationService>>,
    req: HttpRequest,
    body: web::Json<VerifyRequest>,
) -> Result<HttpResponse, AppError> {
    let caller = caller_id(&req)?;
    let payment = service
        .verify(&caller, &body.order_ref, &body.gateway_txn_id, &body.signature)
        .await?;

    Ok(HttpResponse::Ok().json(payment))
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// Omitted for a full refund of the remaining amount
    pub amount_minor: Option<i64>,
    pub reason: String,
}

/// Refund a completed payment, fully or partially
/// POST /payments/{id}/refund
pub async fn refund_payment(
    service: web::Data<Arc<RefundService>>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<RefundRequest>,
) -> Result<HttpResponse, AppError> {
    let caller = caller_id(&req)?;
    let payment_id = path.into_inner();
    let payment = service
        .refund(&caller, &payment_id, body.amount_minor, &body.reason)
        .await?;

    Ok(HttpResponse::Ok().json(payment))
}

/// Configure payment routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .route("/orders", web::post().to(create_order))
            .route("/verify", web::post().to(verify_payment))
            .route("/{id}/refund", web::post().to(refund_payment)),
    );
}
