use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use formadesk_auth::Owned;
use formadesk_core::{
    Aggregate, AggregateRoot, DomainError, OrderId, PaymentLinkId, ProductId, UserId,
    closed_status,
};
use formadesk_dossiers::Product;
use formadesk_events::Event;

/// Order status lifecycle.
///
/// PENDING → PAID | FAILED | CANCELLED, FAILED → PAID (retry) | CANCELLED,
/// PAID → REFUNDED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    Cancelled,
}

closed_status!(OrderStatus, "order status" {
    Pending => "PENDING",
    Paid => "PAID",
    Failed => "FAILED",
    Refunded => "REFUNDED",
    Cancelled => "CANCELLED",
});

/// Checkout outcome reported for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Paid,
    Failed,
}

closed_status!(PaymentOutcome, "payment outcome" {
    Paid => "PAID",
    Failed => "FAILED",
});

impl PaymentOutcome {
    /// The command that records this outcome on `order_id`.
    pub fn command(
        self,
        order_id: OrderId,
        provider_reference: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> OrderCommand {
        match self {
            PaymentOutcome::Paid => OrderCommand::MarkPaid(MarkOrderPaid {
                order_id,
                provider_reference,
                occurred_at,
            }),
            PaymentOutcome::Failed => OrderCommand::MarkFailed(MarkOrderFailed {
                order_id,
                provider_reference,
                occurred_at,
            }),
        }
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: Option<UserId>,
    product_id: Option<ProductId>,
    /// Minor currency units, copied from the product at placement.
    amount: u64,
    currency: String,
    status: OrderStatus,
    provider_reference: Option<String>,
    payment_link_id: Option<PaymentLinkId>,
    placed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            user_id: None,
            product_id: None,
            amount: 0,
            currency: String::new(),
            status: OrderStatus::Pending,
            provider_reference: None,
            payment_link_id: None,
            placed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn provider_reference(&self) -> Option<&str> {
        self.provider_reference.as_deref()
    }

    pub fn payment_link_id(&self) -> Option<&PaymentLinkId> {
        self.payment_link_id.as_ref()
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Owned for Order {
    fn owner_id(&self) -> Option<UserId> {
        self.user_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub product: Product,
    pub payment_link_id: Option<PaymentLinkId>,
    pub occurred_at: DateTime<Utc>,
}

/// Checkout outcome reported by the payment provider: success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOrderPaid {
    pub order_id: OrderId,
    pub provider_reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Checkout outcome reported by the payment provider: failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOrderFailed {
    pub order_id: OrderId,
    pub provider_reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundOrder {
    pub order_id: OrderId,
    pub actor_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    Place(PlaceOrder),
    MarkPaid(MarkOrderPaid),
    MarkFailed(MarkOrderFailed),
    Cancel(CancelOrder),
    Refund(RefundOrder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub amount: u64,
    pub currency: String,
    pub payment_link_id: Option<PaymentLinkId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaid {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub from: OrderStatus,
    pub provider_reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaymentFailed {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub provider_reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRefunded {
    pub order_id: OrderId,
    pub actor_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    Placed(OrderPlaced),
    Paid(OrderPaid),
    PaymentFailed(OrderPaymentFailed),
    Cancelled(OrderCancelled),
    Refunded(OrderRefunded),
}

impl OrderEvent {
    pub fn to_status(&self) -> OrderStatus {
        match self {
            OrderEvent::Placed(_) => OrderStatus::Pending,
            OrderEvent::Paid(_) => OrderStatus::Paid,
            OrderEvent::PaymentFailed(_) => OrderStatus::Failed,
            OrderEvent::Cancelled(_) => OrderStatus::Cancelled,
            OrderEvent::Refunded(_) => OrderStatus::Refunded,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "order.placed",
            OrderEvent::Paid(_) => "order.paid",
            OrderEvent::PaymentFailed(_) => "order.payment_failed",
            OrderEvent::Cancelled(_) => "order.cancelled",
            OrderEvent::Refunded(_) => "order.refunded",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Placed(e) => e.occurred_at,
            OrderEvent::Paid(e) => e.occurred_at,
            OrderEvent::PaymentFailed(e) => e.occurred_at,
            OrderEvent::Cancelled(e) => e.occurred_at,
            OrderEvent::Refunded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Placed(e) => {
                self.id = e.order_id;
                self.user_id = Some(e.user_id);
                self.product_id = Some(e.product_id);
                self.amount = e.amount;
                self.currency = e.currency.clone();
                self.payment_link_id = e.payment_link_id.clone();
                self.placed_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::Paid(e) => {
                if e.provider_reference.is_some() {
                    self.provider_reference = e.provider_reference.clone();
                }
            }
            OrderEvent::PaymentFailed(e) => {
                if e.provider_reference.is_some() {
                    self.provider_reference = e.provider_reference.clone();
                }
            }
            OrderEvent::Cancelled(_) | OrderEvent::Refunded(_) => {}
        }

        self.status = event.to_status();
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Place(cmd) => self.handle_place(cmd),
            OrderCommand::MarkPaid(cmd) => self.handle_mark_paid(cmd),
            OrderCommand::MarkFailed(cmd) => self.handle_mark_failed(cmd),
            OrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
            OrderCommand::Refund(cmd) => self.handle_refund(cmd),
        }
    }
}

fn clean_reference(reference: &Option<String>) -> Option<String> {
    reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

impl Order {
    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn placed_by(&self) -> Result<UserId, DomainError> {
        match (self.created, self.user_id) {
            (true, Some(user_id)) => Ok(user_id),
            _ => Err(DomainError::not_found()),
        }
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        self.ensure_order_id(cmd.order_id)?;

        Ok(vec![OrderEvent::Placed(OrderPlaced {
            order_id: cmd.order_id,
            user_id: cmd.user_id,
            product_id: cmd.product.id,
            amount: cmd.product.price,
            currency: cmd.product.currency.clone(),
            payment_link_id: cmd.payment_link_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(&self, cmd: &MarkOrderPaid) -> Result<Vec<OrderEvent>, DomainError> {
        let user_id = self.placed_by()?;
        self.ensure_order_id(cmd.order_id)?;

        match self.status {
            OrderStatus::Pending | OrderStatus::Failed => {}
            other => return Err(DomainError::illegal_transition("order", other, "mark paid")),
        }

        Ok(vec![OrderEvent::Paid(OrderPaid {
            order_id: cmd.order_id,
            user_id,
            from: self.status,
            provider_reference: clean_reference(&cmd.provider_reference),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_failed(&self, cmd: &MarkOrderFailed) -> Result<Vec<OrderEvent>, DomainError> {
        let user_id = self.placed_by()?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != OrderStatus::Pending {
            return Err(DomainError::illegal_transition("order", self.status, "mark failed"));
        }

        Ok(vec![OrderEvent::PaymentFailed(OrderPaymentFailed {
            order_id: cmd.order_id,
            user_id,
            provider_reference: clean_reference(&cmd.provider_reference),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.placed_by()?;
        self.ensure_order_id(cmd.order_id)?;

        match self.status {
            OrderStatus::Pending | OrderStatus::Failed => {}
            other => return Err(DomainError::illegal_transition("order", other, "cancel")),
        }

        Ok(vec![OrderEvent::Cancelled(OrderCancelled {
            order_id: cmd.order_id,
            from: self.status,
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_refund(&self, cmd: &RefundOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.placed_by()?;
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("refund reason is required"));
        }
        self.ensure_order_id(cmd.order_id)?;

        if self.status != OrderStatus::Paid {
            return Err(DomainError::illegal_transition("order", self.status, "refund"));
        }

        Ok(vec![OrderEvent::Refunded(OrderRefunded {
            order_id: cmd.order_id,
            actor_id: cmd.actor_id,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn product() -> Product {
        Product::new(ProductId::new(), "LLC Formation", "llc_formation", 49_900, "usd", vec![])
            .unwrap()
    }

    fn placed() -> Order {
        let id = OrderId::new();
        let mut order = Order::empty(id);
        order
            .execute(&OrderCommand::Place(PlaceOrder {
                order_id: id,
                user_id: UserId::new(),
                product: product(),
                payment_link_id: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        order
    }

    fn paid(order: &Order) -> OrderCommand {
        OrderCommand::MarkPaid(MarkOrderPaid {
            order_id: order.id_typed(),
            provider_reference: Some(" ch_123 ".to_string()),
            occurred_at: Utc::now(),
        })
    }

    fn failed(order: &Order) -> OrderCommand {
        OrderCommand::MarkFailed(MarkOrderFailed {
            order_id: order.id_typed(),
            provider_reference: None,
            occurred_at: Utc::now(),
        })
    }

    fn cancel(order: &Order) -> OrderCommand {
        OrderCommand::Cancel(CancelOrder {
            order_id: order.id_typed(),
            actor_id: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn refund(order: &Order, reason: &str) -> OrderCommand {
        OrderCommand::Refund(RefundOrder {
            order_id: order.id_typed(),
            actor_id: UserId::new(),
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn place_copies_price_from_product() {
        let order = placed();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.amount(), 49_900);
        assert_eq!(order.currency(), "USD");
        assert_eq!(order.owner_id(), order.user_id());
    }

    #[test]
    fn failed_order_can_be_retried_to_paid() {
        let mut order = placed();
        order.execute(&failed(&order)).unwrap();
        assert_eq!(order.status(), OrderStatus::Failed);

        let events = order.execute(&paid(&order)).unwrap();
        let OrderEvent::Paid(e) = &events[0] else {
            panic!("expected Paid event");
        };
        assert_eq!(e.from, OrderStatus::Failed);
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(order.provider_reference(), Some("ch_123"));
    }

    #[test]
    fn paid_order_cannot_fail_or_cancel() {
        let mut order = placed();
        order.execute(&paid(&order)).unwrap();

        assert!(matches!(
            order.handle(&failed(&order)).unwrap_err(),
            DomainError::IllegalTransition { .. }
        ));
        assert!(matches!(
            order.handle(&cancel(&order)).unwrap_err(),
            DomainError::IllegalTransition { .. }
        ));
    }

    #[test]
    fn refund_only_from_paid_and_needs_reason() {
        let mut order = placed();
        assert!(matches!(
            order.handle(&refund(&order, "duplicate")).unwrap_err(),
            DomainError::IllegalTransition { .. }
        ));

        order.execute(&paid(&order)).unwrap();
        assert!(order.handle(&refund(&order, " ")).unwrap_err().is_validation());

        order.execute(&refund(&order, "duplicate")).unwrap();
        assert_eq!(order.status(), OrderStatus::Refunded);
    }

    #[test]
    fn cancelled_order_is_final() {
        let mut order = placed();
        order.execute(&cancel(&order)).unwrap();
        assert!(order.handle(&paid(&order)).is_err());
        assert!(order.handle(&cancel(&order)).is_err());
    }

    #[test]
    fn payment_outcome_parses_and_maps_to_command() {
        let order = placed();
        let outcome: PaymentOutcome = "paid".parse().unwrap();
        assert!(matches!(
            outcome.command(order.id_typed(), None, Utc::now()),
            OrderCommand::MarkPaid(_)
        ));
        assert!("REFUNDED".parse::<PaymentOutcome>().is_err());
    }

    #[test]
    fn commands_on_missing_order_are_not_found() {
        let order = Order::empty(OrderId::new());
        assert_eq!(order.handle(&paid(&order)).unwrap_err(), DomainError::NotFound);
    }

    proptest! {
        /// Whatever outcome sequence the provider reports, a refunded or
        /// cancelled order never leaves that state.
        #[test]
        fn terminal_statuses_stick(ops in prop::collection::vec(0u8..4, 0..16)) {
            let mut order = placed();
            let mut terminal = None;
            for op in ops {
                let cmd = match op {
                    0 => paid(&order),
                    1 => failed(&order),
                    2 => cancel(&order),
                    _ => refund(&order, "customer request"),
                };
                let _ = order.execute(&cmd);
                if let Some(status) = terminal {
                    prop_assert_eq!(order.status(), status);
                }
                if matches!(order.status(), OrderStatus::Refunded | OrderStatus::Cancelled) {
                    terminal = Some(order.status());
                }
            }
        }
    }
}
