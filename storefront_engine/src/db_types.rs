use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use storefront_common::Cents;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn random() -> Self {
        Self(format!("ord-{:016x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------       ProductId       -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn random() -> Self {
        Self(format!("prd-{:016x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     PaymentMethod     -------------------------------------------------------
/// How the buyer settles the order. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Payment is collected by the courier when the order is delivered.
    CashOnDelivery,
    /// Payment is collected up front through the hosted payment provider.
    OnlinePayment,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::CashOnDelivery => write!(f, "CashOnDelivery"),
            PaymentMethod::OnlinePayment => write!(f, "OnlinePayment"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CashOnDelivery" => Ok(Self::CashOnDelivery),
            "OnlinePayment" => Ok(Self::OnlinePayment),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

impl From<String> for PaymentMethod {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            log::error!("Invalid payment method: {value}. But this conversion cannot fail. Defaulting to CashOnDelivery");
            PaymentMethod::CashOnDelivery
        })
    }
}

//--------------------------------------     PaymentStatus     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// No settled payment has been recorded for the order.
    Pending,
    /// The payment has been collected in full.
    Paid,
    /// The payment attempt failed.
    Failed,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Paid => write!(f, "Paid"),
            PaymentStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            log::error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to Pending");
            PaymentStatus::Pending
        })
    }
}

//--------------------------------------   FulfillmentStatus   -------------------------------------------------------
/// Where the order sits in its lifecycle. Orders only ever move between these states through
/// [`crate::lifecycle::plan_transition`] applied by the store's conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum FulfillmentStatus {
    /// The order has been assembled but not committed to either payment or fulfillment.
    Draft,
    /// An online order waiting for the payment provider to report an outcome.
    AwaitingPayment,
    /// The order is committed. Cash orders enter here directly; online orders on payment confirmation.
    Placed,
    /// The seller is preparing the order.
    Processing,
    /// The order has been handed to the courier.
    Shipped,
    /// The order has reached the buyer. Terminal.
    Delivered,
    /// The order has been cancelled by the buyer or the seller. Terminal.
    Cancelled,
    /// The payment attempt failed. Terminal for payment purposes unless the buyer retries.
    PaymentFailed,
}

impl FulfillmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FulfillmentStatus::Delivered | FulfillmentStatus::Cancelled)
    }

    /// Position in the forward fulfillment chain, if this state is part of it.
    pub fn progress_rank(&self) -> Option<u8> {
        match self {
            FulfillmentStatus::Placed => Some(0),
            FulfillmentStatus::Processing => Some(1),
            FulfillmentStatus::Shipped => Some(2),
            FulfillmentStatus::Delivered => Some(3),
            _ => None,
        }
    }
}

impl Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FulfillmentStatus::Draft => "Draft",
            FulfillmentStatus::AwaitingPayment => "AwaitingPayment",
            FulfillmentStatus::Placed => "Placed",
            FulfillmentStatus::Processing => "Processing",
            FulfillmentStatus::Shipped => "Shipped",
            FulfillmentStatus::Delivered => "Delivered",
            FulfillmentStatus::Cancelled => "Cancelled",
            FulfillmentStatus::PaymentFailed => "PaymentFailed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FulfillmentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Draft" => Ok(Self::Draft),
            "AwaitingPayment" => Ok(Self::AwaitingPayment),
            "Placed" => Ok(Self::Placed),
            "Processing" => Ok(Self::Processing),
            "Shipped" => Ok(Self::Shipped),
            "Delivered" => Ok(Self::Delivered),
            "Cancelled" => Ok(Self::Cancelled),
            "PaymentFailed" => Ok(Self::PaymentFailed),
            s => Err(ConversionError(format!("Invalid fulfillment status: {s}"))),
        }
    }
}

impl From<String> for FulfillmentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            log::error!("Invalid fulfillment status: {value}. But this conversion cannot fail. Defaulting to Draft");
            FulfillmentStatus::Draft
        })
    }
}

//--------------------------------------     VariantChoice     -------------------------------------------------------
/// A selected product variant, e.g. a colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantChoice {
    pub name: String,
    pub value: String,
}

//--------------------------------------       LineItem        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_variant: Option<VariantChoice>,
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: String,
    /// Immutable once the order leaves `Draft`.
    pub line_items: Vec<LineItem>,
    /// Total charge in minor units, computed server-side at checkout.
    pub amount: Cents,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    /// Opaque reference assigned by the payment provider. Set once, never overwritten with a conflicting value.
    pub payment_ref: Option<String>,
    pub address_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlite")]
impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for Order {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let items_json: String = row.try_get("line_items")?;
        let line_items = serde_json::from_str(&items_json)
            .map_err(|e| sqlx::Error::ColumnDecode { index: "line_items".into(), source: Box::new(e) })?;
        Ok(Self {
            id: row.try_get("id")?,
            buyer_id: row.try_get("buyer_id")?,
            line_items,
            amount: row.try_get("amount")?,
            payment_method: row.try_get::<String, _>("payment_method")?.into(),
            payment_status: row.try_get::<String, _>("payment_status")?.into(),
            fulfillment_status: row.try_get::<String, _>("fulfillment_status")?.into(),
            payment_ref: row.try_get("payment_ref")?,
            address_id: row.try_get("address_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub buyer_id: String,
    pub line_items: Vec<LineItem>,
    pub amount: Cents,
    pub payment_method: PaymentMethod,
    pub fulfillment_status: FulfillmentStatus,
    pub address_id: String,
}

impl NewOrder {
    pub fn new(
        buyer_id: String,
        address_id: String,
        line_items: Vec<LineItem>,
        amount: Cents,
        payment_method: PaymentMethod,
    ) -> Self {
        // Cash orders are committed immediately; online orders wait on the provider.
        let fulfillment_status = match payment_method {
            PaymentMethod::CashOnDelivery => FulfillmentStatus::Placed,
            PaymentMethod::OnlinePayment => FulfillmentStatus::AwaitingPayment,
        };
        Self { id: OrderId::random(), buyer_id, line_items, amount, payment_method, fulfillment_status, address_id }
    }
}

//--------------------------------------        Product        -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: String,
    pub name: String,
    pub description: String,
    pub list_price: Cents,
    /// The price actually charged at checkout.
    pub offer_price: Cents,
    pub stock: i64,
    pub category: String,
    pub variants: Vec<VariantChoice>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlite")]
impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for Product {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let variants_json: String = row.try_get("variants")?;
        let variants = serde_json::from_str(&variants_json)
            .map_err(|e| sqlx::Error::ColumnDecode { index: "variants".into(), source: Box::new(e) })?;
        Ok(Self {
            id: row.try_get("id")?,
            seller_id: row.try_get("seller_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            list_price: row.try_get("list_price")?,
            offer_price: row.try_get("offer_price")?,
            stock: row.try_get("stock")?,
            category: row.try_get("category")?,
            variants,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub seller_id: String,
    pub name: String,
    pub description: String,
    pub list_price: Cents,
    pub offer_price: Cents,
    pub stock: i64,
    pub category: String,
    pub variants: Vec<VariantChoice>,
}

//--------------------------------------        Address        -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlite", derive(sqlx::FromRow))]
pub struct Address {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub phone: String,
    pub postal_code: String,
    pub area: String,
    pub city: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAddress {
    pub full_name: String,
    pub phone: String,
    pub postal_code: String,
    pub area: String,
    pub city: String,
    pub region: String,
}

//--------------------------------------         Cart          -------------------------------------------------------
/// A buyer's cart entry. Quantity zero is allowed and simply means "kept in the cart but not ordered".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_variant: Option<VariantChoice>,
}

/// Cart contents keyed by line-item key (product id plus optional variant, see [`crate::helpers::cart_key`]).
pub type CartItems = BTreeMap<String, CartItem>;

//--------------------------------------  Idempotency records  -------------------------------------------------------
/// The stored outcome of an externally-triggered operation. `result` is `None` while the first attempt is still in
/// flight (or died before recording its outcome).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "sqlite", derive(sqlx::FromRow))]
pub struct OperationRecord {
    pub op_key: String,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The answer from [`crate::traits::StorefrontDatabase::begin_operation`].
#[derive(Debug, Clone)]
pub enum OperationTicket {
    /// The key has never been seen; the caller holds the slot and must complete it.
    New,
    /// The key was recorded before; `result` is the stored outcome, if the first attempt got far enough to record
    /// one.
    Replayed { result: Option<String> },
}

impl OperationTicket {
    pub fn is_new(&self) -> bool {
        matches!(self, OperationTicket::New)
    }
}
