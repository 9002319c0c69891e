//! Application state shared across handlers.

use std::sync::Arc;

use tower_sessions::Session;

use crate::catalog::CatalogClient;
use crate::config::StorefrontConfig;
use crate::db::Stores;
use crate::services::auth::AuthService;
use crate::services::cart::CartService;
use crate::services::checkout::CheckoutService;
use crate::services::payments::{PaymentGateway, PaymentService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the stores, the payment gateway and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    catalog: CatalogClient,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `stores` - User, cart and payment stores
    /// * `gateway` - Payment processor client
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let catalog = CatalogClient::new(&config.catalog);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                stores,
                gateway,
                catalog,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the stores.
    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    /// Get a reference to the product catalogue client.
    #[must_use]
    pub fn catalog(&self) -> &CatalogClient {
        &self.inner.catalog
    }

    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self.inner.stores.users.as_ref())
    }

    #[must_use]
    pub fn carts(&self) -> CartService<'_> {
        CartService::new(self.inner.stores.carts.as_ref())
    }

    #[must_use]
    pub fn payments(&self) -> PaymentService<'_> {
        PaymentService::new(
            self.inner.gateway.as_ref(),
            self.inner.stores.payments.as_ref(),
            self.inner.config.payments.currency,
        )
    }

    /// Checkout operations for one session.
    #[must_use]
    pub fn checkout<'a>(&'a self, session: &'a Session) -> CheckoutService<'a> {
        CheckoutService::new(
            session,
            self.carts(),
            self.payments(),
            self.inner.config.checkout.cod_delay,
        )
    }
}
