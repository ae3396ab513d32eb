pub mod gateway_trait;
pub mod razorpay;
pub mod registry;
pub mod stripe;

pub use gateway_trait::{
    CreateOrderRequest, GatewayClient, GatewayKind, GatewayOrder, GatewayRefund, WebhookEvent,
    WebhookEventKind,
};
pub use razorpay::RazorpayClient;
pub use registry::GatewayRegistry;
pub use stripe::StripeClient;
