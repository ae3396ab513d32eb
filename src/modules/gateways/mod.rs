pub mod services;

pub use services::{
    CreateOrderRequest, GatewayClient, GatewayKind, GatewayOrder, GatewayRefund, GatewayRegistry,
    RazorpayClient, StripeClient, WebhookEvent, WebhookEventKind,
};
