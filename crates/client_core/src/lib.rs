use std::{sync::Arc, time::Duration};

use shared::{domain::CustomerDetails, protocol::CatalogProduct};
use storage::CartStore;
use tokio::sync::{watch, Mutex};

pub mod cart;
pub mod catalog;
pub mod credentials;
pub mod submit;
pub mod view;

pub use cart::{parse_quantity, CartAction, CartModel, QuantityInputError};
pub use catalog::{CatalogClient, CatalogError};
pub use credentials::{CredentialSource, EnvCredential, NoCredential, StaticCredential};
pub use submit::{
    OrderSubmitter, SubmissionReceipt, SubmitError, SubmitPolicy, DEFAULT_REQUEST_TIMEOUT,
};
pub use view::{Binding, CartView, Control, RenderedCart, RenderedRow};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_base: String,
    pub submit_policy: SubmitPolicy,
    pub request_timeout: Duration,
}

impl ClientOptions {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            submit_policy: SubmitPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// The storefront's cart session: one cart, one view over it, and the
/// collaborators that read the catalog and submit orders.
///
/// Every mutation and every submission outcome is followed by a full
/// re-render, published to subscribers.
pub struct CartClient {
    cart: Arc<Mutex<CartModel>>,
    view: Mutex<CartView>,
    renders: watch::Sender<RenderedCart>,
    submitter: OrderSubmitter,
    catalog: CatalogClient,
}

impl CartClient {
    pub async fn open(store: Arc<dyn CartStore>, options: ClientOptions) -> Self {
        let cart = CartModel::load(store).await;
        let mut view = CartView::new();
        let (renders, _) = watch::channel(view.render(&cart));

        Self {
            cart: Arc::new(Mutex::new(cart)),
            view: Mutex::new(view),
            renders,
            submitter: OrderSubmitter::new(options.api_base.clone(), options.submit_policy)
                .with_timeout(options.request_timeout),
            catalog: CatalogClient::new(options.api_base).with_timeout(options.request_timeout),
        }
    }

    pub fn cart(&self) -> Arc<Mutex<CartModel>> {
        self.cart.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RenderedCart> {
        self.renders.subscribe()
    }

    pub fn latest(&self) -> RenderedCart {
        self.renders.borrow().clone()
    }

    pub async fn refresh(&self) -> RenderedCart {
        let cart = self.cart.lock().await;
        let mut view = self.view.lock().await;
        self.publish(&mut view, &cart)
    }

    pub async fn add(&self, product_name: &str, unit_price: u64) -> RenderedCart {
        let mut cart = self.cart.lock().await;
        cart.add_or_increment(product_name, unit_price).await;
        let mut view = self.view.lock().await;
        self.publish(&mut view, &cart)
    }

    pub async fn add_product(&self, product: &CatalogProduct) -> RenderedCart {
        self.add(&product.nombre, product.precio).await
    }

    /// Runs the control behind `binding`. Stale bindings change nothing but
    /// still trigger a re-render.
    pub async fn dispatch(&self, binding: Binding, input: &str) -> RenderedCart {
        let mut cart = self.cart.lock().await;
        let mut view = self.view.lock().await;
        view.dispatch(&mut cart, binding, input).await;
        self.publish(&mut view, &cart)
    }

    pub async fn clear(&self) -> RenderedCart {
        let mut cart = self.cart.lock().await;
        cart.clear().await;
        let mut view = self.view.lock().await;
        self.publish(&mut view, &cart)
    }

    pub async fn submit(
        &self,
        customer: &CustomerDetails,
        credentials: &dyn CredentialSource,
    ) -> Result<SubmissionReceipt, SubmitError> {
        let credential = credentials.credential();
        let result = self
            .submitter
            .submit(&self.cart, customer, credential.as_deref())
            .await;
        self.refresh().await;
        result
    }

    pub async fn catalog(&self) -> Vec<CatalogProduct> {
        self.catalog.load_or_empty().await
    }

    fn publish(&self, view: &mut CartView, cart: &CartModel) -> RenderedCart {
        let rendered = view.render(cart);
        self.renders.send_replace(rendered.clone());
        rendered
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
