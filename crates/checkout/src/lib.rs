//! Order commit and payment settlement.
//!
//! This crate provides the write path of checkout:
//! - [`InventoryLedger`]: compare-and-swap stock reservation with bounded,
//!   jittered retry
//! - [`OrderBuilder`]: request validation and per-line reservation
//! - [`CommitOrchestrator`]: the all-or-nothing commit around the builder,
//!   followed by cart cleanup
//! - [`SettlementLoop`]: gateway polling that moves paid orders to
//!   `awaiting_review`
//! - [`ReviewService`]: review submission and order closing
//!
//! If any line of a commit fails, the store transaction is rolled back and
//! the cart is left as it was.

pub mod builder;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod orchestrator;
pub mod payment;
pub mod query;
pub mod retry;
pub mod review;
pub mod settlement;
pub mod views;

pub use builder::{BuiltOrder, LineRequest, OrderBuilder, OrderDraft};
pub use error::{CommitError, ReservationError, ResultCode, SettlementError, TransitionError};
pub use gateway::{GatewayError, PaymentGateway, ScriptedGateway, TradeQuery, TradeState};
pub use ledger::{InventoryLedger, Reservation};
pub use orchestrator::CommitOrchestrator;
pub use payment::PaymentService;
pub use query::OrderQueries;
pub use retry::RetryPolicy;
pub use review::ReviewService;
pub use settlement::{SettlementConfig, SettlementLoop, SettlementOutcome};
pub use views::{CheckoutPreview, OrderDetail, OrderLineView, PreviewLine};
