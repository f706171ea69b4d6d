use std::fmt::Display;

use serde::{Deserialize, Serialize};
use storefront_common::Cents;
use storefront_engine::{
    db_types::{CartItem, FulfillmentStatus, LineItem, OrderId, PaymentMethod, VariantChoice},
    order_objects::NextAction,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

//----------------------------------------      Checkout      --------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub address_id: String,
    pub items: Vec<LineItem>,
    pub payment_method: PaymentMethod,
    /// Optional consistency hint in minor units; rejected if it diverges from the computed total by more than one
    /// unit.
    #[serde(default)]
    pub client_estimated_amount: Option<Cents>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: OrderId,
    pub amount: Cents,
    pub next_action: NextAction,
}

//----------------------------------------      Payments      --------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct CreateIntentRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIntentResponse {
    pub intent_id: String,
    pub client_secret: String,
}

/// The buyer's browser reporting what the provider SDK told it. Treated strictly as a hint.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentResultRequest {
    pub intent_id: String,
}

//----------------------------------------     Fulfillment    --------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub new_status: FulfillmentStatus,
}

//----------------------------------------        Carts       --------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct CartUpdateRequest {
    pub items: Vec<CartItem>,
}

//----------------------------------------       Catalog      --------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct NewProductRequest {
    pub name: String,
    pub description: String,
    pub list_price: Cents,
    pub offer_price: Cents,
    #[serde(default)]
    pub stock: i64,
    pub category: String,
    #[serde(default)]
    pub variants: Vec<VariantChoice>,
}

//----------------------------------------      Webhooks      --------------------------------------------------------
/// The provider's webhook envelope. Only the fields the reconciler needs are modelled; everything else in the
/// payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    /// The provider's event id (useful in logs; dedup is keyed on intent + outcome).
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: WebhookIntent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookIntent {
    /// The payment intent id — the order's external payment reference.
    pub id: String,
    #[serde(default)]
    pub metadata: WebhookMetadata,
    #[serde(default)]
    pub last_payment_error: Option<WebhookPaymentError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookMetadata {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub buyer_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPaymentError {
    #[serde(default)]
    pub message: Option<String>,
}
