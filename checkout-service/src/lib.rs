pub mod app;
pub mod config;
pub mod error;
pub mod gateway;
pub mod initiator;
pub mod midtrans;
pub mod order;
pub mod payment_handlers;
pub mod reconciler;
pub mod status;
pub mod store;
pub mod webhook;

pub use app::{build_router, AppState};
pub use config::{CheckoutConfig, GatewayMode, MidtransConfig};
pub use error::{CheckoutError, CheckoutResult};
pub use gateway::{GatewayError, PaymentGateway};
pub use midtrans::MidtransClient;
pub use status::PaymentStatus;
pub use store::{InMemoryPaymentStatusStore, PaymentStatusStore, PgPaymentStatusStore};
