// Storefront services
pub mod addresses;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod pricing;
pub mod reconciliation;

use std::sync::Arc;

use crate::{
    auth::AuthService, config::AppConfig, db::DbPool, errors::ServiceError, events::EventSender,
    gateway::GatewayClient,
};

use addresses::AddressService;
use cart::CartService;
use catalog::CatalogService;
use orders::OrderService;
use reconciliation::ReconciliationService;

/// Container holding every service instance, built once at startup and shared
/// through application state.
#[derive(Clone)]
pub struct AppServices {
    pub auth: AuthService,
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub addresses: Arc<AddressService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: Arc<EventSender>,
    ) -> Result<Self, ServiceError> {
        let gateway = Arc::new(GatewayClient::from_config(config)?);
        Ok(Self::with_gateway(db_pool, config, event_sender, gateway))
    }

    /// Build with an injected gateway client, for tests pointing at a mock
    /// gateway server.
    pub fn with_gateway(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: Arc<EventSender>,
        gateway: Arc<GatewayClient>,
    ) -> Self {
        Self {
            auth: AuthService::new(&config.jwt_secret, config.jwt_expiration as i64),
            catalog: Arc::new(CatalogService::new(db_pool.clone(), event_sender.clone())),
            cart: Arc::new(CartService::new(db_pool.clone(), event_sender.clone())),
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                event_sender.clone(),
                gateway.clone(),
                config.currency.clone(),
            )),
            reconciliation: Arc::new(ReconciliationService::new(
                db_pool.clone(),
                event_sender.clone(),
                gateway,
            )),
            addresses: Arc::new(AddressService::new(db_pool, event_sender)),
        }
    }
}
