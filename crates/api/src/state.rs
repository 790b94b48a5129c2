//! Shared application state.

use std::sync::Arc;

use cart::{CartService, CartStore};
use checkout::{
    CommitOrchestrator, InventoryLedger, OrderBuilder, OrderQueries, PaymentGateway,
    PaymentService, ReviewService, SettlementLoop,
};
use store::OrderStore;

use crate::config::Config;
use crate::shutdown::Shutdown;

/// Cart store chosen at startup.
pub type DynCartStore = Arc<dyn CartStore>;
/// Payment gateway chosen at startup.
pub type DynGateway = Arc<dyn PaymentGateway>;

/// Services accessible from all handlers.
///
/// Every collaborator is constructed once at startup and injected here.
pub struct AppState<S: OrderStore> {
    pub cart: CartService<DynCartStore, S>,
    pub orchestrator: CommitOrchestrator<S, DynCartStore>,
    pub payments: PaymentService<S, DynGateway>,
    pub settlement: SettlementLoop<S, DynGateway>,
    pub reviews: ReviewService<S>,
    pub queries: OrderQueries<S>,
    pub shutdown: Shutdown,
}

impl<S: OrderStore + Clone> AppState<S> {
    pub fn new(
        config: &Config,
        store: S,
        carts: DynCartStore,
        gateway: DynGateway,
        shutdown: Shutdown,
    ) -> Self {
        let builder = OrderBuilder::new(
            InventoryLedger::new(config.retry_policy()),
            config.shipping_policy(),
        );

        Self {
            cart: CartService::new(carts.clone(), store.clone()),
            orchestrator: CommitOrchestrator::new(store.clone(), carts, builder),
            payments: PaymentService::new(store.clone(), gateway.clone()),
            settlement: SettlementLoop::new(store.clone(), gateway, config.settlement_config()),
            reviews: ReviewService::new(store.clone()),
            queries: OrderQueries::new(store),
            shutdown,
        }
    }
}
