use actix_web::{web, App, HttpResponse, HttpServer};
use ridepay::config::Config;
use ridepay::core::events::{LogNotifier, Notifier};
use ridepay::modules::gateways::{GatewayRegistry, RazorpayClient, StripeClient};
use ridepay::modules::payments::controllers::{payment_controller, webhook_controller};
use ridepay::modules::payments::repositories::MySqlPaymentStore;
use ridepay::modules::payments::services::{
    EarningsCalculator, OrderService, RefundService, SettlementService, VerificationService,
    WebhookReconciler,
};
use ridepay::modules::rides::repositories::MySqlRideStore;
use ridepay::modules::wallets::controllers::wallet_controller;
use ridepay::modules::wallets::repositories::MySqlWalletStore;
use ridepay::modules::wallets::services::WalletService;
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ridepay=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Configuration validation failed");

    tracing::info!("Starting RidePay settlement core");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Server binding to: {}", config.server.bind_address());

    let db_pool = config
        .database
        .create_pool()
        .await
        .expect("Failed to create database pool");

    tracing::info!(
        "Database pool initialized ({} connections)",
        config.database.pool_size
    );

    // Stores
    let payment_store = Arc::new(MySqlPaymentStore::new(db_pool.clone()));
    let wallet_store = Arc::new(MySqlWalletStore::new(db_pool.clone()));
    let ride_store = Arc::new(MySqlRideStore::new(db_pool.clone()));

    // Gateway clients
    let mut registry = GatewayRegistry::new();
    registry.register(Arc::new(RazorpayClient::new(
        config.razorpay.key_id.clone(),
        config.razorpay.key_secret.clone(),
        config.razorpay.webhook_secret.clone(),
        Some(config.razorpay.base_url.clone()),
        config.razorpay.timeout_ms,
    )));
    registry.register(Arc::new(StripeClient::new(
        config.stripe.key_secret.clone(),
        config.stripe.webhook_secret.clone(),
        Some(config.stripe.base_url.clone()),
        config.stripe.timeout_ms,
    )));
    let registry = Arc::new(registry);

    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    // Services
    let calculator = EarningsCalculator::new(config.app.commission_rate)
        .expect("Invalid commission rate");
    let pending_freshness =
        chrono::Duration::seconds(config.app.pending_order_freshness_secs as i64);
    let reconciliation_grace =
        chrono::Duration::seconds(config.app.reconciliation_grace_secs as i64);

    let settlement = Arc::new(SettlementService::new(
        payment_store.clone(),
        wallet_store.clone(),
        ride_store.clone(),
        notifier.clone(),
        calculator,
        reconciliation_grace,
    ));
    let orders = Arc::new(OrderService::new(
        payment_store.clone(),
        ride_store.clone(),
        registry.clone(),
        pending_freshness,
    ));
    let verification = Arc::new(VerificationService::new(
        payment_store.clone(),
        registry.clone(),
        settlement.clone(),
        notifier.clone(),
    ));
    let refunds = Arc::new(RefundService::new(
        payment_store.clone(),
        wallet_store.clone(),
        ride_store.clone(),
        registry.clone(),
        notifier.clone(),
    ));
    let reconciler = Arc::new(WebhookReconciler::new(
        payment_store.clone(),
        registry.clone(),
        settlement.clone(),
        refunds.clone(),
        notifier.clone(),
    ));
    let wallets = Arc::new(WalletService::new(wallet_store.clone()));

    // Background recovery for completed payments whose side effects never
    // landed
    tokio::spawn(
        settlement
            .clone()
            .start_reconciliation_loop(Duration::from_secs(60)),
    );

    let bind_address = config.server.bind_address();
    let workers = config.server.workers;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(orders.clone()))
            .app_data(web::Data::new(verification.clone()))
            .app_data(web::Data::new(refunds.clone()))
            .app_data(web::Data::new(reconciler.clone()))
            .app_data(web::Data::new(wallets.clone()))
            .service(
                web::scope("/api")
                    .configure(payment_controller::configure)
                    .configure(webhook_controller::configure)
                    .configure(wallet_controller::configure),
            )
            .route("/health", web::get().to(health_check))
    })
    .workers(workers)
    .bind(&bind_address)?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "ridepay"
    }))
}
