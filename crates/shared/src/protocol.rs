use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{cart_total, CustomerDetails, LineItem};

/// Body of `POST /pedidos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub nombre_cliente: String,
    pub telefono: String,
    pub direccion: String,
    /// The cart snapshot, stringified with the persisted item layout.
    pub items_json: String,
    pub total: u64,
}

impl OrderRequest {
    /// Builds the request from a cart snapshot. The total is computed here
    /// from the same snapshot that is serialized into `itemsJson`.
    pub fn from_snapshot(
        customer: &CustomerDetails,
        items: &[LineItem],
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            nombre_cliente: customer.customer_name.clone(),
            telefono: customer.phone.clone(),
            direccion: customer.address.clone(),
            items_json: serde_json::to_string(items)?,
            total: cart_total(items),
        })
    }

    pub fn items(&self) -> Result<Vec<LineItem>, serde_json::Error> {
        serde_json::from_str(&self.items_json)
    }
}

/// A product as listed by `GET /productos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub nombre: String,
    pub precio: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imagen_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
}

/// Uniform response envelope used by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

/// The catalog endpoint answers either with a bare array or wrapped in the
/// response envelope, depending on the backend route serving it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CatalogPayload {
    Bare(Vec<CatalogProduct>),
    Envelope(ApiResponse<Vec<CatalogProduct>>),
}

impl CatalogPayload {
    pub fn into_products(self) -> Vec<CatalogProduct> {
        match self {
            Self::Bare(products) => products,
            Self::Envelope(envelope) => envelope.data.unwrap_or_default(),
        }
    }
}
