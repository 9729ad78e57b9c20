use serde::{Deserialize, Serialize};

/// One product entry in the cart.
///
/// Serialized field names match the persisted snapshot layout
/// (`{"producto", "precio", "cantidad"}`), which is also the layout the order
/// endpoint receives inside `itemsJson`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "producto")]
    pub product_name: String,
    #[serde(rename = "precio")]
    pub unit_price: u64,
    #[serde(rename = "cantidad")]
    pub quantity: u32,
}

impl LineItem {
    pub fn new(product_name: impl Into<String>, unit_price: u64) -> Self {
        Self {
            product_name: product_name.into(),
            unit_price,
            quantity: 1,
        }
    }

    pub fn line_total(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}

pub fn cart_total(items: &[LineItem]) -> u64 {
    items
        .iter()
        .fold(0u64, |acc, item| acc.saturating_add(item.line_total()))
}

/// Restores the cart invariants on a sequence read from outside the model.
///
/// Zero-quantity entries are dropped. Repeated product names collapse into the
/// first occurrence: its price is kept and the quantities are summed.
pub fn normalize_items(items: Vec<LineItem>) -> Vec<LineItem> {
    let mut normalized: Vec<LineItem> = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity == 0 {
            continue;
        }
        match normalized
            .iter_mut()
            .find(|existing| existing.product_name == item.product_name)
        {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
            }
            None => normalized.push(item),
        }
    }
    normalized
}

/// Customer fields collected by the order form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub customer_name: String,
    pub phone: String,
    pub address: String,
}

impl CustomerDetails {
    pub fn new(
        customer_name: impl Into<String>,
        phone: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            customer_name: customer_name.into(),
            phone: phone.into(),
            address: address.into(),
        }
    }
}
