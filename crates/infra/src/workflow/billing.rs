use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use formadesk_auth::{
    Caller, Profile, ProfileCommand, RecordPaymentFailed, RecordPaymentSucceeded, RoleRequirement,
    require_ownership, require_role,
};
use formadesk_billing::{
    CancelOrder, CreatePaymentLink, ExpirePaymentLink, Order, OrderCommand, OrderStatus,
    PaymentLink, PaymentLinkCommand, PaymentLinkStatus, PaymentOutcome, PlaceOrder, RefundOrder,
    UsePaymentLink, bulk_expire,
};
use formadesk_core::{Aggregate, DomainError, OrderId, PaymentLinkId, ProductId, UserId};
use formadesk_dossiers::Product;
use formadesk_events::{AuditEvent, EntityType};

use super::{Workflow, WorkflowError};

/// Result of a bulk-expire request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkExpireOutcome {
    pub expired: Vec<PaymentLinkId>,
    /// Requested ids that named no link at all.
    pub unknown: Vec<String>,
}

impl BulkExpireOutcome {
    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }
}

/// Result of consuming a payment link.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub link: PaymentLink,
    pub order: Order,
}

/// Result of recording a checkout outcome.
#[derive(Debug, Clone)]
pub struct PaymentRecorded {
    pub order: Order,
    /// The owner's profile after the follow-up transition, if it exists.
    pub profile: Option<Profile>,
}

impl Workflow {
    /// Admin: create a one-time checkout link for a prospect.
    pub async fn create_payment_link(
        &self,
        caller: &Caller,
        product_id: ProductId,
        email: &str,
        expires_in_hours: i64,
    ) -> Result<PaymentLink, WorkflowError> {
        require_role(caller, RoleRequirement::AdminOnly)?;
        let ttl = Duration::try_hours(expires_in_hours)
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or_else(|| DomainError::validation("expires_in_hours must be a positive number of hours"))?;
        self.load_product(product_id).await?;

        let now = Utc::now();
        let link_id = PaymentLinkId::new();
        let cmd = PaymentLinkCommand::Create(CreatePaymentLink {
            link_id: link_id.clone(),
            product_id,
            email: email.to_string(),
            expires_at: now + ttl,
            actor_id: caller.user_id(),
            occurred_at: now,
        });
        let out = self
            .dispatcher
            .dispatch(
                self.stores.payment_links.as_ref(),
                link_id.clone(),
                Some(caller.user_id()),
                cmd,
                PaymentLink::empty,
            )
            .await?;

        info!(link_id = %link_id, product_id = %product_id, "payment link created");
        Ok(out.aggregate)
    }

    /// Admin: every link. Overdue links are recorded as EXPIRED on the way out.
    pub async fn list_payment_links(&self, caller: &Caller) -> Result<Vec<PaymentLink>, WorkflowError> {
        require_role(caller, RoleRequirement::AdminOnly)?;
        let now = Utc::now();
        let mut links = self.stores.payment_links.list().await?;
        for link in links.iter_mut() {
            if link.is_overdue(now) {
                *link = self.expire_at_deadline(link.id_typed().clone(), now).await?;
            }
        }
        Ok(links)
    }

    /// Admin: expire every ACTIVE link among `link_ids`.
    ///
    /// USED and EXPIRED links are left alone and unknown ids are skipped, so
    /// repeating the call changes nothing.
    pub async fn bulk_expire_links(
        &self,
        caller: &Caller,
        link_ids: &[String],
    ) -> Result<BulkExpireOutcome, WorkflowError> {
        require_role(caller, RoleRequirement::AdminOnly)?;
        if link_ids.is_empty() {
            return Err(DomainError::validation("link_ids cannot be empty").into());
        }
        let mut links: Vec<PaymentLink> = Vec::with_capacity(link_ids.len());
        let mut unknown = Vec::new();
        for raw in link_ids {
            let Ok(id) = raw.parse::<PaymentLinkId>() else {
                unknown.push(raw.clone());
                continue;
            };
            if links.iter().any(|l| *l.id_typed() == id) {
                continue;
            }
            match self.stores.payment_links.get(&id).await? {
                Some(link) if link.is_created() => links.push(link),
                _ => unknown.push(raw.clone()),
            }
        }

        let now = Utc::now();
        let expired_events = bulk_expire(links.iter_mut(), caller.user_id(), now);

        let mut expired = Vec::with_capacity(expired_events.len());
        let mut records = Vec::with_capacity(expired_events.len());
        for (id, event) in &expired_events {
            records.push(AuditEvent::from_event(
                EntityType::PaymentLink,
                id,
                Some(caller.user_id()),
                event,
                Some(PaymentLinkStatus::Active.to_string()),
                Some(PaymentLinkStatus::Expired.to_string()),
            ));
            expired.push(id.clone());
        }

        for link in links.into_iter().filter(|l| expired.contains(l.id_typed())) {
            self.stores
                .payment_links
                .upsert(link.id_typed().clone(), link)
                .await?;
        }
        self.dispatcher.audit().append(&records).await?;

        info!(
            requested = link_ids.len(),
            expired = expired.len(),
            unknown = unknown.len(),
            actor_id = %caller.user_id(),
            "payment links bulk-expired"
        );
        Ok(BulkExpireOutcome { expired, unknown })
    }

    /// Consume a payment link: places an order for the caller, then marks
    /// the link USED by that order.
    ///
    /// An overdue link is recorded as EXPIRED and refused. If the link cannot
    /// be marked USED after the order exists, the order is cancelled again.
    pub async fn checkout_payment_link(
        &self,
        caller: &Caller,
        link_id: &str,
    ) -> Result<CheckoutOutcome, WorkflowError> {
        let link_id: PaymentLinkId = link_id.parse()?;
        let link = self
            .stores
            .payment_links
            .get(&link_id)
            .await?
            .filter(|l| l.is_created())
            .ok_or(DomainError::NotFound)?;

        let now = Utc::now();
        if link.is_overdue(now) {
            self.expire_at_deadline(link_id, now).await?;
            return Err(DomainError::invariant("payment link expired").into());
        }

        let order_id = OrderId::new();
        let use_link = PaymentLinkCommand::Use(UsePaymentLink {
            link_id: link_id.clone(),
            order_id,
            actor_id: caller.user_id(),
            now,
        });
        link.handle(&use_link)?;

        let product_id = link.product_id().ok_or(DomainError::NotFound)?;
        let product = self.load_product(product_id).await?;
        let order = self
            .place(caller, order_id, product, Some(link_id.clone()))
            .await?;

        let link = match self
            .dispatcher
            .dispatch(
                self.stores.payment_links.as_ref(),
                link_id.clone(),
                Some(caller.user_id()),
                use_link,
                PaymentLink::empty,
            )
            .await
        {
            Ok(out) => out.aggregate,
            Err(err) => {
                self.withdraw_order(caller, order_id).await;
                return Err(err);
            }
        };

        info!(link_id = %link_id, order_id = %order_id, "payment link used");
        Ok(CheckoutOutcome { link, order })
    }

    /// Place an order for the caller.
    pub async fn place_order(
        &self,
        caller: &Caller,
        product_id: ProductId,
    ) -> Result<Order, WorkflowError> {
        let product = self.load_product(product_id).await?;
        self.place(caller, OrderId::new(), product, None).await
    }

    /// CLIENT: own orders. Staff: all orders.
    pub async fn list_orders(&self, caller: &Caller) -> Result<Vec<Order>, WorkflowError> {
        let orders = self.stores.orders.list().await?;
        if caller.is_staff() {
            return Ok(orders);
        }
        Ok(orders
            .into_iter()
            .filter(|o| o.user_id() == Some(caller.user_id()))
            .collect())
    }

    pub async fn get_order(&self, caller: &Caller, order_id: OrderId) -> Result<Order, WorkflowError> {
        let order = self.load_order(order_id).await?;
        require_ownership(caller, &order)?;
        Ok(order)
    }

    /// Admin: record the provider's checkout outcome.
    ///
    /// PAID activates the owner's profile; FAILED suspends it.
    pub async fn record_payment(
        &self,
        caller: &Caller,
        order_id: OrderId,
        outcome: &str,
        provider_reference: Option<String>,
    ) -> Result<PaymentRecorded, WorkflowError> {
        require_role(caller, RoleRequirement::AdminOnly)?;
        let outcome: PaymentOutcome = outcome.parse()?;

        let now = Utc::now();
        let order = self
            .dispatcher
            .dispatch(
                self.stores.orders.as_ref(),
                order_id,
                Some(caller.user_id()),
                outcome.command(order_id, provider_reference, now),
                Order::empty,
            )
            .await?
            .aggregate;

        let user_id = order.user_id().ok_or(DomainError::NotFound)?;
        let profile = self.apply_payment_to_profile(caller, user_id, order_id, outcome).await?;

        info!(order_id = %order_id, outcome = %outcome, user_id = %user_id, "payment outcome recorded");
        Ok(PaymentRecorded { order, profile })
    }

    /// Owner or staff: cancel an unpaid order.
    pub async fn cancel_order(&self, caller: &Caller, order_id: OrderId) -> Result<Order, WorkflowError> {
        self.get_order(caller, order_id).await?;

        let cmd = OrderCommand::Cancel(CancelOrder {
            order_id,
            actor_id: caller.user_id(),
            occurred_at: Utc::now(),
        });
        let out = self
            .dispatcher
            .dispatch(self.stores.orders.as_ref(), order_id, Some(caller.user_id()), cmd, Order::empty)
            .await?;
        Ok(out.aggregate)
    }

    /// Admin: refund a paid order.
    pub async fn refund_order(
        &self,
        caller: &Caller,
        order_id: OrderId,
        reason: &str,
    ) -> Result<Order, WorkflowError> {
        require_role(caller, RoleRequirement::AdminOnly)?;

        let cmd = OrderCommand::Refund(RefundOrder {
            order_id,
            actor_id: caller.user_id(),
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        let out = self
            .dispatcher
            .dispatch(self.stores.orders.as_ref(), order_id, Some(caller.user_id()), cmd, Order::empty)
            .await?;

        if out.aggregate.status() == OrderStatus::Refunded {
            info!(order_id = %order_id, actor_id = %caller.user_id(), "order refunded");
        }
        Ok(out.aggregate)
    }

    async fn place(
        &self,
        caller: &Caller,
        order_id: OrderId,
        product: Product,
        payment_link_id: Option<PaymentLinkId>,
    ) -> Result<Order, WorkflowError> {
        let cmd = OrderCommand::Place(PlaceOrder {
            order_id,
            user_id: caller.user_id(),
            product,
            payment_link_id,
            occurred_at: Utc::now(),
        });
        let out = self
            .dispatcher
            .dispatch(self.stores.orders.as_ref(), order_id, Some(caller.user_id()), cmd, Order::empty)
            .await?;

        info!(order_id = %order_id, user_id = %caller.user_id(), "order placed");
        Ok(out.aggregate)
    }

    /// Record the natural expiry of an overdue link. There is no actor.
    async fn expire_at_deadline(
        &self,
        link_id: PaymentLinkId,
        now: DateTime<Utc>,
    ) -> Result<PaymentLink, WorkflowError> {
        let cmd = PaymentLinkCommand::Expire(ExpirePaymentLink {
            link_id: link_id.clone(),
            actor_id: None,
            now,
        });
        let out = self
            .dispatcher
            .dispatch(self.stores.payment_links.as_ref(), link_id.clone(), None, cmd, PaymentLink::empty)
            .await?;

        info!(link_id = %link_id, "payment link expired at its deadline");
        Ok(out.aggregate)
    }

    /// Cancel an order whose payment link could not be consumed.
    async fn withdraw_order(&self, caller: &Caller, order_id: OrderId) {
        let cmd = OrderCommand::Cancel(CancelOrder {
            order_id,
            actor_id: caller.user_id(),
            occurred_at: Utc::now(),
        });
        if let Err(err) = self
            .dispatcher
            .dispatch(self.stores.orders.as_ref(), order_id, Some(caller.user_id()), cmd, Order::empty)
            .await
        {
            warn!(order_id = %order_id, error = %err, "could not withdraw order after failed checkout");
        }
    }

    async fn apply_payment_to_profile(
        &self,
        caller: &Caller,
        user_id: UserId,
        order_id: OrderId,
        outcome: PaymentOutcome,
    ) -> Result<Option<Profile>, WorkflowError> {
        let exists = self
            .stores
            .profiles
            .get(&user_id)
            .await?
            .is_some_and(|p| p.created);
        if !exists {
            warn!(user_id = %user_id, order_id = %order_id, "order owner has no profile; status unchanged");
            return Ok(None);
        }

        let occurred_at = Utc::now();
        let cmd = match outcome {
            PaymentOutcome::Paid => ProfileCommand::RecordPaymentSucceeded(RecordPaymentSucceeded {
                user_id,
                order_id,
                occurred_at,
            }),
            PaymentOutcome::Failed => ProfileCommand::RecordPaymentFailed(RecordPaymentFailed {
                user_id,
                order_id,
                occurred_at,
            }),
        };
        let out = self
            .dispatcher
            .dispatch(
                self.stores.profiles.as_ref(),
                user_id,
                Some(caller.user_id()),
                cmd,
                Profile::empty,
            )
            .await?;
        Ok(Some(out.aggregate))
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order, WorkflowError> {
        self.stores
            .orders
            .get(&order_id)
            .await?
            .filter(|o| o.is_created())
            .ok_or_else(|| DomainError::not_found().into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use formadesk_auth::{AuthzError, ProfileStatus, Role};
    use proptest::prelude::*;

    use super::*;
    use crate::store::{EntityStore, StoreError};
    use crate::workflow::Stores;
    use crate::workflow::testing::Harness;

    struct OfflineOrders;

    #[async_trait]
    impl EntityStore<OrderId, Order> for OfflineOrders {
        async fn get(&self, _key: &OrderId) -> Result<Option<Order>, StoreError> {
            Ok(None)
        }

        async fn upsert(&self, _key: OrderId, _value: Order) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("orders offline".to_string()))
        }

        async fn list(&self) -> Result<Vec<Order>, StoreError> {
            Ok(Vec::new())
        }
    }

    /// A link created two hours ago that lapsed an hour ago.
    async fn overdue_link(h: &Harness, product: ProductId, admin: &Caller, raw: &str) -> PaymentLinkId {
        let now = Utc::now();
        let id: PaymentLinkId = raw.parse().unwrap();
        let mut link = PaymentLink::empty(id.clone());
        link.execute(&PaymentLinkCommand::Create(CreatePaymentLink {
            link_id: id.clone(),
            product_id: product,
            email: "late@example.com".to_string(),
            expires_at: now - Duration::hours(1),
            actor_id: admin.user_id(),
            occurred_at: now - Duration::hours(2),
        }))
        .unwrap();
        h.workflow
            .stores()
            .payment_links
            .upsert(id.clone(), link)
            .await
            .unwrap();
        id
    }

    async fn product(h: &Harness) -> ProductId {
        let caller = h.user(Role::Agent, ProfileStatus::Active).await;
        h.workflow.list_products(&caller).await.unwrap()[0].id
    }

    #[tokio::test]
    async fn paid_order_activates_pending_profile() {
        let h = Harness::new().await;
        let product = product(&h).await;
        let admin = h.user(Role::Admin, ProfileStatus::Active).await;
        let client = h.user(Role::Client, ProfileStatus::Pending).await;

        let order = h.workflow.place_order(&client, product).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);

        let recorded = h
            .workflow
            .record_payment(&admin, order.id_typed(), "PAID", Some("ch_1".to_string()))
            .await
            .unwrap();
        assert_eq!(recorded.order.status(), OrderStatus::Paid);
        assert_eq!(recorded.profile.unwrap().status, ProfileStatus::Active);
    }

    #[tokio::test]
    async fn failed_payment_suspends_profile() {
        let h = Harness::new().await;
        let product = product(&h).await;
        let admin = h.user(Role::Admin, ProfileStatus::Active).await;
        let client = h.user(Role::Client, ProfileStatus::Active).await;

        let order = h.workflow.place_order(&client, product).await.unwrap();
        let recorded = h
            .workflow
            .record_payment(&admin, order.id_typed(), "failed", None)
            .await
            .unwrap();
        assert_eq!(recorded.order.status(), OrderStatus::Failed);
        assert_eq!(recorded.profile.unwrap().status, ProfileStatus::Suspended);
    }

    #[tokio::test]
    async fn bulk_expire_counts_only_active_links() {
        let h = Harness::new().await;
        let product = product(&h).await;
        let admin = h.user(Role::Admin, ProfileStatus::Active).await;

        let a = h.workflow.create_payment_link(&admin, product, "a@example.com", 24).await.unwrap();
        let b = h.workflow.create_payment_link(&admin, product, "b@example.com", 24).await.unwrap();
        h.workflow
            .bulk_expire_links(&admin, &[b.id_typed().to_string()])
            .await
            .unwrap();

        let ids = vec![a.id_typed().to_string(), b.id_typed().to_string(), "no such link!".to_string()];
        let outcome = h.workflow.bulk_expire_links(&admin, &ids).await.unwrap();
        assert_eq!(outcome.expired_count(), 1);
        assert_eq!(outcome.unknown.len(), 1);

        let again = h.workflow.bulk_expire_links(&admin, &ids).await.unwrap();
        assert_eq!(again.expired_count(), 0);

        let trail = h.workflow.audit_trail(&admin, "payment_link", a.id_typed().as_str()).await.unwrap();
        assert_eq!(trail.last().unwrap().to_status.as_deref(), Some("EXPIRED"));
    }

    #[tokio::test]
    async fn bulk_expire_requires_admin_and_ids() {
        let h = Harness::new().await;
        let agent = h.user(Role::Agent, ProfileStatus::Active).await;
        let admin = h.user(Role::Admin, ProfileStatus::Active).await;

        let err = h.workflow.bulk_expire_links(&agent, &["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Authz(AuthzError::Forbidden { .. })));

        let err = h.workflow.bulk_expire_links(&admin, &[]).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn checkout_uses_link_once() {
        let h = Harness::new().await;
        let product = product(&h).await;
        let admin = h.user(Role::Admin, ProfileStatus::Active).await;
        let prospect = h.user(Role::Client, ProfileStatus::Pending).await;

        let link = h.workflow.create_payment_link(&admin, product, "p@example.com", 1).await.unwrap();
        let out = h
            .workflow
            .checkout_payment_link(&prospect, link.id_typed().as_str())
            .await
            .unwrap();
        assert_eq!(out.link.status(), PaymentLinkStatus::Used);
        assert_eq!(out.link.used_by_order(), Some(out.order.id_typed()));
        assert_eq!(out.order.payment_link_id(), Some(link.id_typed()));

        let err = h
            .workflow
            .checkout_payment_link(&prospect, link.id_typed().as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::IllegalTransition { .. })));
    }

    #[tokio::test]
    async fn overdue_link_is_expired_on_checkout() {
        let h = Harness::new().await;
        let product = product(&h).await;
        let admin = h.user(Role::Admin, ProfileStatus::Active).await;
        let prospect = h.user(Role::Client, ProfileStatus::Pending).await;
        let id = overdue_link(&h, product, &admin, "late").await;

        let err = h.workflow.checkout_payment_link(&prospect, "late").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::InvariantViolation(_))));

        let stored = h.workflow.stores().payment_links.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status(), PaymentLinkStatus::Expired);
        assert!(h.workflow.list_orders(&prospect).await.unwrap().is_empty());

        let trail = h.workflow.audit_trail(&admin, "payment_link", "late").await.unwrap();
        let last = trail.last().unwrap();
        assert_eq!(last.action, "payment_link.expired");
        assert_eq!(last.to_status.as_deref(), Some("EXPIRED"));
        assert_eq!(last.actor_id, None);

        let err = h.workflow.checkout_payment_link(&prospect, "late").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::IllegalTransition { .. })));
    }

    #[tokio::test]
    async fn listing_records_overdue_links_as_expired() {
        let h = Harness::new().await;
        let product = product(&h).await;
        let admin = h.user(Role::Admin, ProfileStatus::Active).await;
        overdue_link(&h, product, &admin, "late").await;
        let fresh = h.workflow.create_payment_link(&admin, product, "f@example.com", 24).await.unwrap();

        let links = h.workflow.list_payment_links(&admin).await.unwrap();
        let status_of = |raw: &str| {
            links
                .iter()
                .find(|l| l.id_typed().as_str() == raw)
                .map(|l| l.status())
        };
        assert_eq!(status_of("late"), Some(PaymentLinkStatus::Expired));
        assert_eq!(status_of(fresh.id_typed().as_str()), Some(PaymentLinkStatus::Active));

        let trail = h.workflow.audit_trail(&admin, "payment_link", "late").await.unwrap();
        assert_eq!(trail.len(), 1);
        h.workflow.list_payment_links(&admin).await.unwrap();
        let trail = h.workflow.audit_trail(&admin, "payment_link", "late").await.unwrap();
        assert_eq!(trail.len(), 1);
    }

    #[tokio::test]
    async fn failed_order_write_leaves_link_active() {
        let mut stores = Stores::in_memory();
        stores.orders = Arc::new(OfflineOrders);
        let h = Harness::with_stores(stores).await;
        let product = product(&h).await;
        let admin = h.user(Role::Admin, ProfileStatus::Active).await;
        let prospect = h.user(Role::Client, ProfileStatus::Pending).await;

        let link = h.workflow.create_payment_link(&admin, product, "p@example.com", 24).await.unwrap();
        let err = h
            .workflow
            .checkout_payment_link(&prospect, link.id_typed().as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Store(StoreError::Unavailable(_))));

        let stored = h
            .workflow
            .stores()
            .payment_links
            .get(link.id_typed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), PaymentLinkStatus::Active);
        assert_eq!(stored.used_by_order(), None);
    }

    #[tokio::test]
    async fn clients_cannot_see_foreign_orders() {
        let h = Harness::new().await;
        let product = product(&h).await;
        let alice = h.user(Role::Client, ProfileStatus::Active).await;
        let bob = h.user(Role::Client, ProfileStatus::Active).await;

        let order = h.workflow.place_order(&alice, product).await.unwrap();
        assert!(h.workflow.get_order(&bob, order.id_typed()).await.is_err());
        assert!(h.workflow.cancel_order(&bob, order.id_typed()).await.is_err());
        assert_eq!(h.workflow.list_orders(&bob).await.unwrap().len(), 0);

        let cancelled = h.workflow.cancel_order(&alice, order.id_typed()).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    }

    proptest! {
        #[test]
        fn non_positive_ttl_is_refused(hours in i64::MIN..=0) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let h = Harness::new().await;
                let product = product(&h).await;
                let admin = h.user(Role::Admin, ProfileStatus::Active).await;
                let err = h
                    .workflow
                    .create_payment_link(&admin, product, "p@example.com", hours)
                    .await
                    .unwrap_err();
                assert!(matches!(err, WorkflowError::Domain(DomainError::Validation(_))));
            });
        }
    }
}
