//! Records stored and returned by the engine backends.
use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use duka_common::{Money, KES_CURRENCY_CODE};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// A fresh order number of the form `DK-1A2B3C4D`.
    pub fn random() -> Self {
        let n: u32 = rand::thread_rng().gen();
        Self(format!("DK-{n:08X}"))
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

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------          Sku          ---------------------------------------------------------
/// Stock keeping unit: the product identifier used by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Sku(pub String);

impl Sku {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Sku {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Sku {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for Sku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------     WarehouseCode     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct WarehouseCode(pub String);

impl WarehouseCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WarehouseCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WarehouseCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for WarehouseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------       Warehouse       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: i64,
    pub code: WarehouseCode,
    pub name: String,
    /// Higher priority warehouses are drawn from first
    pub priority: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub code: WarehouseCode,
    pub name: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl NewWarehouse {
    pub fn new<C: Into<WarehouseCode>>(code: C, name: &str, priority: i64) -> Self {
        Self { code: code.into(), name: name.to_string(), priority, is_active: true }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

//--------------------------------------      StockRecord      ---------------------------------------------------------
/// On-hand, reserved and damaged units of one product in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StockRecord {
    pub id: i64,
    pub warehouse: WarehouseCode,
    pub sku: Sku,
    pub quantity: i64,
    pub reserved: i64,
    pub damaged: i64,
    pub reorder_point: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved - self.damaged
    }

    /// `0 <= reserved + damaged <= quantity`
    pub fn is_consistent(&self) -> bool {
        self.reserved >= 0 && self.damaged >= 0 && self.reserved + self.damaged <= self.quantity
    }

    pub fn needs_reorder(&self) -> bool {
        self.available() <= self.reorder_point
    }
}

/// A stock record joined with its warehouse's selection attributes.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WarehouseStock {
    pub warehouse: WarehouseCode,
    pub priority: i64,
    pub is_active: bool,
    pub sku: Sku,
    pub quantity: i64,
    pub reserved: i64,
    pub damaged: i64,
}

impl WarehouseStock {
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved - self.damaged
    }
}

//--------------------------------------     MovementCause     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MovementCause {
    /// Stock received from a supplier
    Purchase,
    /// Stock left the warehouse without a reservation
    Sale,
    /// Goods returned by a customer
    Return,
    /// Manual count correction
    Adjustment,
    /// Moved between warehouses
    Transfer,
    /// Units marked as (or cleared from) damaged. On-hand quantity is unchanged.
    Damaged,
    /// Damaged units removed from stock
    WriteOff,
    ReservationFulfilled,
    ReservationReleased,
}

impl MovementCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Sale => "sale",
            Self::Return => "return",
            Self::Adjustment => "adjustment",
            Self::Transfer => "transfer",
            Self::Damaged => "damaged",
            Self::WriteOff => "write_off",
            Self::ReservationFulfilled => "reservation_fulfilled",
            Self::ReservationReleased => "reservation_released",
        }
    }

    /// Causes that may be applied through a manual stock adjustment.
    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Purchase | Self::Return | Self::Adjustment | Self::Damaged | Self::WriteOff)
    }
}

impl Display for MovementCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementCause {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(Self::Purchase),
            "sale" => Ok(Self::Sale),
            "return" => Ok(Self::Return),
            "adjustment" => Ok(Self::Adjustment),
            "transfer" => Ok(Self::Transfer),
            "damaged" => Ok(Self::Damaged),
            "write_off" => Ok(Self::WriteOff),
            "reservation_fulfilled" => Ok(Self::ReservationFulfilled),
            "reservation_released" => Ok(Self::ReservationReleased),
            s => Err(ConversionError::new("movement cause", s)),
        }
    }
}

//--------------------------------------     StockMovement     ---------------------------------------------------------
/// Immutable audit entry. `delta` is always `quantity_after - quantity_before`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: i64,
    pub warehouse: WarehouseCode,
    pub sku: Sku,
    pub cause: MovementCause,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub delta: i64,
    pub reserved_after: i64,
    pub damaged_after: i64,
    pub order_id: Option<OrderId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub warehouse: WarehouseCode,
    pub sku: Sku,
    pub delta: i64,
    pub cause: MovementCause,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StockAdjustment {
    pub fn new<W: Into<WarehouseCode>, S: Into<Sku>>(warehouse: W, sku: S, delta: i64, cause: MovementCause) -> Self {
        Self { warehouse: warehouse.into(), sku: sku.into(), delta, cause, notes: None }
    }

    /// Convenience constructor for receiving stock from a supplier.
    pub fn receipt<W: Into<WarehouseCode>, S: Into<Sku>>(warehouse: W, sku: S, quantity: i64) -> Self {
        Self::new(warehouse, sku, quantity, MovementCause::Purchase)
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockTransfer {
    pub from: WarehouseCode,
    pub to: WarehouseCode,
    pub sku: Sku,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

//--------------------------------------  Allocation & Reservation  ----------------------------------------------------
/// A planned draw of `quantity` units of `sku` from `warehouse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub warehouse: WarehouseCode,
    pub sku: Sku,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Reserved,
    Released,
    Fulfilled,
}

/// Stock held for an order in one warehouse. Release and fulfilment only touch the ledger while the reservation is
/// still `Reserved`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub order_id: OrderId,
    pub sku: Sku,
    pub warehouse: WarehouseCode,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// Created at checkout, awaiting payment
    Pending,
    /// Paid in full
    Confirmed,
    /// Being picked and packed
    Processing,
    /// Handed to the carrier. Stock has left the warehouse.
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
    /// Paused, e.g. after a carrier exception. Resumes to the status it interrupted.
    OnHold,
}

impl OrderStatusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::OnHold => "on_hold",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }

    /// The transition table, excluding transitions out of `OnHold`, which depend on the interrupted status.
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        match (self, next) {
            (Pending, Confirmed) | (Pending, Cancelled) => true,
            (Confirmed, Processing) | (Confirmed, Cancelled) => true,
            (Processing, Shipped) | (Processing, Cancelled) => true,
            (Shipped, Delivered) => true,
            (Delivered, Refunded) => true,
            (from, OnHold) => matches!(from, Pending | Confirmed | Processing | Shipped),
            _ => false,
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            "on_hold" => Ok(Self::OnHold),
            s => Err(ConversionError::new("order status", s)),
        }
    }
}

//--------------------------------------   PaymentStatusType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatusType {
    Pending,
    Authorized,
    Paid,
    PartiallyPaid,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Paid => "paid",
            Self::PartiallyPaid => "partially_paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn accepts_payment(&self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyPaid | Self::Failed)
    }
}

impl Display for PaymentStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatusType,
    /// The status an `OnHold` order returns to
    pub previous_status: Option<OrderStatusType>,
    pub total_price: Money,
    pub currency: String,
    /// Receipt of the payment that settled the order
    pub payment_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub sku: Sku,
    pub quantity: i64,
    /// Price per unit at the time of checkout
    pub unit_price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub sku: Sku,
    pub quantity: i64,
    pub unit_price: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub customer_id: String,
    pub items: Vec<NewOrderItem>,
    /// Tax, shipping and similar charges, computed by the caller's pricing policy
    #[serde(default)]
    pub extra_charges: Money,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub billing_address: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_currency() -> String {
    KES_CURRENCY_CODE.to_string()
}

impl NewOrder {
    pub fn new(order_id: OrderId, customer_id: &str) -> Self {
        Self {
            order_id,
            customer_id: customer_id.to_string(),
            items: Vec::new(),
            extra_charges: Money::default(),
            currency: KES_CURRENCY_CODE.to_string(),
            shipping_address: None,
            billing_address: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_item<S: Into<Sku>>(mut self, sku: S, quantity: i64, unit_price: Money) -> Self {
        self.items.push(NewOrderItem { sku: sku.into(), quantity, unit_price });
        self
    }

    pub fn with_extra_charges(mut self, charges: Money) -> Self {
        self.extra_charges = charges;
        self
    }

    pub fn total_price(&self) -> Money {
        self.items.iter().map(|i| i.unit_price * i.quantity).sum::<Money>() + self.extra_charges
    }

    /// Total quantity per product, so that repeated lines for the same SKU are reserved together.
    pub fn quantities_by_sku(&self) -> BTreeMap<Sku, i64> {
        self.items.iter().fold(BTreeMap::new(), |mut acc, item| {
            *acc.entry(item.sku.clone()).or_insert(0) += item.quantity;
            acc
        })
    }
}

//--------------------------------------  OrderStatusHistory   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub id: i64,
    pub order_id: OrderId,
    /// `None` for the entry written when the order is created
    pub old_status: Option<OrderStatusType>,
    pub new_status: OrderStatusType,
    pub actor: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A compare-and-swap status update: only applied if the order is still in `from`.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub previous_status: Option<OrderStatusType>,
    pub actor: String,
    pub notes: Option<String>,
}

/// An applied [`StatusChange`], with the reservations it closed.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub order: Order,
    pub released: Vec<Reservation>,
    /// Fulfilled reservations, with the stock record as it stood afterwards
    pub fulfilled: Vec<(Reservation, StockRecord)>,
}

//--------------------------------------   TransactionStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Reversed => "reversed",
        }
    }

    /// Still waiting for an outcome
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Timeout)
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//--------------------------------------  PaymentTransaction   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub order_id: OrderId,
    /// The provider's request identifier. Set once, when the provider accepts the request.
    pub correlation_id: Option<String>,
    pub merchant_request_id: Option<String>,
    /// Phone number (or other payer handle) the request was sent to
    pub payer_reference: String,
    pub amount: Money,
    pub status: TransactionStatus,
    pub result_code: Option<i64>,
    pub result_desc: Option<String>,
    pub receipt_number: Option<String>,
    pub retry_count: i64,
    /// The attempt this one retries
    pub parent_id: Option<i64>,
    pub sweep_attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentTransaction {
    pub order_id: OrderId,
    pub payer_reference: String,
    pub amount: Money,
    pub retry_count: i64,
    pub parent_id: Option<i64>,
}

/// The terminal state a transaction moves to when it leaves `processing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub status: TransactionStatus,
    pub result_code: Option<i64>,
    pub result_desc: Option<String>,
    pub receipt_number: Option<String>,
}

//--------------------------------------     PaymentEvent      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success,
    Failed,
    Cancelled,
    Timeout,
    /// The provider has no result yet
    Pending,
}

impl PaymentOutcome {
    /// The transaction status this outcome settles to, or `None` if it settles nothing.
    pub fn settles_as(&self) -> Option<TransactionStatus> {
        match self {
            Self::Success => Some(TransactionStatus::Completed),
            Self::Failed => Some(TransactionStatus::Failed),
            Self::Cancelled => Some(TransactionStatus::Cancelled),
            Self::Timeout => Some(TransactionStatus::Timeout),
            Self::Pending => None,
        }
    }
}

/// Where an observation of a payment outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CallbackSource {
    /// Pushed by the provider
    Callback,
    /// Result of a status query
    Poll,
    /// Provider timeout notification
    TimeoutNotice,
    /// Synthesised by the reconciler when it gives up on a transaction
    Reconciler,
}

/// A provider-neutral payment outcome, as parsed from a callback or a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub correlation_id: Option<String>,
    pub outcome: PaymentOutcome,
    pub result_code: Option<i64>,
    pub result_desc: Option<String>,
    pub receipt_number: Option<String>,
    pub amount: Option<Money>,
    pub source: CallbackSource,
    /// The payload exactly as received
    pub raw_payload: String,
}

impl PaymentEvent {
    pub fn new(correlation_id: &str, outcome: PaymentOutcome, source: CallbackSource, raw_payload: String) -> Self {
        Self {
            correlation_id: Some(correlation_id.to_string()),
            outcome,
            result_code: None,
            result_desc: None,
            receipt_number: None,
            amount: None,
            source,
            raw_payload,
        }
    }

    pub fn with_result(mut self, code: i64, desc: &str) -> Self {
        self.result_code = Some(code);
        self.result_desc = Some(desc.to_string());
        self
    }

    pub fn with_receipt(mut self, receipt: &str) -> Self {
        self.receipt_number = Some(receipt.to_string());
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn settlement(&self) -> Option<Settlement> {
        self.outcome.settles_as().map(|status| Settlement {
            status,
            result_code: self.result_code,
            result_desc: self.result_desc.clone(),
            receipt_number: self.receipt_number.clone(),
        })
    }
}

//--------------------------------------      CallbackLog      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// Logged, processing not finished
    Received,
    Applied,
    AlreadyProcessed,
    /// The provider reported no result yet
    Pending,
    /// No transaction has this correlation id
    Unmatched,
    Malformed,
    Error,
}

impl CallbackOutcome {
    /// A redelivery of a payload whose entry is in one of these states has nothing left to do.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Applied | Self::AlreadyProcessed | Self::Pending | Self::Malformed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CallbackEntry {
    pub id: i64,
    pub correlation_id: Option<String>,
    pub result_code: Option<i64>,
    pub payload_hash: String,
    pub raw_payload: String,
    pub source: CallbackSource,
    pub outcome: CallbackOutcome,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCallbackEntry {
    pub correlation_id: Option<String>,
    pub result_code: Option<i64>,
    pub payload_hash: String,
    pub raw_payload: String,
    pub source: CallbackSource,
}

#[derive(Debug, Clone)]
pub enum InsertCallbackResult {
    Inserted(CallbackEntry),
    /// The same `(correlation id, result code, payload hash)` was logged before
    Existing(CallbackEntry),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transition_table() {
        use OrderStatusType::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(Confirmed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Shipped.can_transition_to(OnHold));
        assert!(!Delivered.can_transition_to(OnHold));
        assert!(Delivered.can_transition_to(Refunded));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Refunded.can_transition_to(Delivered));
        assert!(!OnHold.can_transition_to(OnHold));
    }

    #[test]
    fn stock_record_availability() {
        let record = StockRecord {
            id: 1,
            warehouse: "NBO-01".into(),
            sku: "TEA-500G".into(),
            quantity: 10,
            reserved: 4,
            damaged: 1,
            reorder_point: 5,
            updated_at: Utc::now(),
        };
        assert_eq!(record.available(), 5);
        assert!(record.is_consistent());
        assert!(record.needs_reorder());
    }

    #[test]
    fn order_totals() {
        let order = NewOrder::new(OrderId::random(), "cust-1")
            .with_item("TEA-500G", 2, Money::from(45_000))
            .with_item("MUG-01", 1, Money::from(80_000))
            .with_item("TEA-500G", 1, Money::from(45_000))
            .with_extra_charges(Money::from(20_000));
        assert_eq!(order.total_price(), Money::from(235_000));
        let quantities = order.quantities_by_sku();
        assert_eq!(quantities.len(), 2);
        assert_eq!(quantities[&Sku::from("TEA-500G")], 3);
        assert!(order.order_id.as_str().starts_with("DK-"));
        assert_eq!(order.order_id.as_str().len(), 11);
    }

    #[test]
    fn outcomes_settle_transactions() {
        assert_eq!(PaymentOutcome::Success.settles_as(), Some(TransactionStatus::Completed));
        assert_eq!(PaymentOutcome::Timeout.settles_as(), Some(TransactionStatus::Timeout));
        assert_eq!(PaymentOutcome::Pending.settles_as(), None);
        let event = PaymentEvent::new("ws_CO_1", PaymentOutcome::Pending, CallbackSource::Poll, "{}".into());
        assert!(event.settlement().is_none());
    }
}
