use std::sync::Arc;

use shared::{
    domain::{cart_total, LineItem},
    protocol::CatalogProduct,
};
use storage::CartStore;
use thiserror::Error;
use tracing::debug;

/// Quantity typed into a row's input that cannot be used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityInputError {
    #[error("quantity input '{input}' is not a number")]
    NotANumber { input: String },
    #[error("quantity input '{input}' is below the minimum of 1")]
    BelowMinimum { input: String },
}

/// Parses quantity input the way a browser's `parseInt` reads a form field:
/// leading whitespace, an optional sign and the leading run of digits.
/// Values beyond `u32::MAX` saturate.
pub fn parse_quantity(input: &str) -> Result<u32, QuantityInputError> {
    let trimmed = input.trim_start();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digit_count = unsigned.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digit_count == 0 {
        return Err(QuantityInputError::NotANumber {
            input: input.to_string(),
        });
    }

    let digits = &unsigned[..digit_count];
    let value = digits.parse::<u32>().unwrap_or(u32::MAX);
    if negative || value == 0 {
        return Err(QuantityInputError::BelowMinimum {
            input: input.to_string(),
        });
    }
    Ok(value)
}

/// `parse_quantity`, clamped: anything unusable becomes 1.
pub fn quantity_or_minimum(input: &str) -> u32 {
    parse_quantity(input).unwrap_or_else(|error| {
        debug!(%error, "clamping quantity input to 1");
        1
    })
}

/// A mutation requested by a rendered control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartAction {
    Increment { index: usize },
    Decrement { index: usize },
    SetQuantity { index: usize, input: String },
}

/// The session's cart. Every mutation writes the full snapshot through to the
/// store before returning.
pub struct CartModel {
    items: Vec<LineItem>,
    store: Arc<dyn CartStore>,
}

impl CartModel {
    pub async fn load(store: Arc<dyn CartStore>) -> Self {
        let items = store.load().await;
        debug!(item_count = items.len(), "cart loaded from store");
        Self { items, store }
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> Vec<LineItem> {
        self.items.clone()
    }

    pub fn total(&self) -> u64 {
        cart_total(&self.items)
    }

    /// Adds one unit of a product. A product already in the cart keeps the
    /// price it was first added with.
    pub async fn add_or_increment(&mut self, product_name: &str, unit_price: u64) {
        match self
            .items
            .iter_mut()
            .find(|item| item.product_name == product_name)
        {
            Some(item) => {
                item.quantity = item.quantity.saturating_add(1);
                debug!(product = %product_name, quantity = item.quantity, "cart item incremented");
            }
            None => {
                self.items.push(LineItem::new(product_name, unit_price));
                debug!(product = %product_name, unit_price, "cart item added");
            }
        }
        self.persist().await;
    }

    pub async fn add_product(&mut self, product: &CatalogProduct) {
        self.add_or_increment(&product.nombre, product.precio).await;
    }

    /// Returns `false` and leaves the cart alone when `index` is out of range.
    pub async fn increment(&mut self, index: usize) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            debug!(index, len = self.items.len(), "ignoring increment for missing row");
            return false;
        };
        item.quantity = item.quantity.saturating_add(1);
        self.persist().await;
        true
    }

    /// Decrements the quantity, removing the row instead of reaching zero.
    pub async fn decrement(&mut self, index: usize) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            debug!(index, len = self.items.len(), "ignoring decrement for missing row");
            return false;
        };
        if item.quantity > 1 {
            item.quantity -= 1;
        } else {
            let removed = self.items.remove(index);
            debug!(product = %removed.product_name, "cart item removed");
        }
        self.persist().await;
        true
    }

    pub async fn set_quantity(&mut self, index: usize, input: &str) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            debug!(index, len = self.items.len(), "ignoring quantity change for missing row");
            return false;
        };
        item.quantity = quantity_or_minimum(input);
        self.persist().await;
        true
    }

    pub async fn clear(&mut self) {
        self.items.clear();
        self.persist().await;
    }

    pub async fn apply(&mut self, action: CartAction) -> bool {
        match action {
            CartAction::Increment { index } => self.increment(index).await,
            CartAction::Decrement { index } => self.decrement(index).await,
            CartAction::SetQuantity { index, input } => self.set_quantity(index, &input).await,
        }
    }

    async fn persist(&self) {
        self.store.save(&self.items).await;
    }
}
