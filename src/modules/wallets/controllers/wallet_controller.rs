use super::super::services::WalletService;
use crate::core::error::AppError;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Current balance for a wallet
/// GET /wallets/{owner_id}/balance
pub async fn get_balance(
    service: web::Data<Arc<WalletService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let owner_id = path.into_inner();
    let balance_minor = service.balance(&owner_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "owner_id": owner_id,
        "balance_minor": balance_minor,
    })))
}

/// Ledger entries for a wallet, newest first
/// GET /wallets/{owner_id}/transactions
pub async fn list_transactions(
    service: web::Data<Arc<WalletService>>,
    path: web::Path<String>,
    query: web::Query<TransactionsQuery>,
) -> Result<HttpResponse, AppError> {
    let owner_id = path.into_inner();
    let limit = query.limit.unwrap_or(50).min(200);
    let offset = query.offset.unwrap_or(0);
    let entries = service.entries(&owner_id, limit, offset).await?;

    Ok(HttpResponse::Ok().json(entries))
}

/// Configure wallet routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/wallets")
            .route("/{owner_id}/balance", web::get().to(get_balance))
            .route("/{owner_id}/transactions", web::get().to(list_transactions)),
    );
}
