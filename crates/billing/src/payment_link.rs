use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use formadesk_core::{
    Aggregate, AggregateRoot, DomainError, OrderId, PaymentLinkId, ProductId, UserId,
    closed_status,
};
use formadesk_events::Event;

/// Payment link lifecycle: ACTIVE → USED | EXPIRED. Both outcomes are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentLinkStatus {
    Active,
    Used,
    Expired,
}

closed_status!(PaymentLinkStatus, "payment link status" {
    Active => "ACTIVE",
    Used => "USED",
    Expired => "EXPIRED",
});

/// Aggregate root: PaymentLink (a one-time checkout token for one product).
///
/// Expiry is never applied by a timer. A link past `expires_at` is overdue:
/// it stays ACTIVE in storage until an admin expires it or the next read
/// (checkout, listing) records the natural expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    id: PaymentLinkId,
    product_id: Option<ProductId>,
    email: String,
    created_by: Option<UserId>,
    expires_at: Option<DateTime<Utc>>,
    status: PaymentLinkStatus,
    used_by_order: Option<OrderId>,
    version: u64,
    created: bool,
}

impl PaymentLink {
    pub fn empty(id: PaymentLinkId) -> Self {
        Self {
            id,
            product_id: None,
            email: String::new(),
            created_by: None,
            expires_at: None,
            status: PaymentLinkStatus::Active,
            used_by_order: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> &PaymentLinkId {
        &self.id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn status(&self) -> PaymentLinkStatus {
        self.status
    }

    pub fn used_by_order(&self) -> Option<OrderId> {
        self.used_by_order
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// ACTIVE but past its deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.created && self.status == PaymentLinkStatus::Active && self.is_past_expiry(now)
    }
}

impl AggregateRoot for PaymentLink {
    type Id = PaymentLinkId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentLink {
    pub link_id: PaymentLinkId,
    pub product_id: ProductId,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsePaymentLink {
    pub link_id: PaymentLinkId,
    pub order_id: OrderId,
    pub actor_id: UserId,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirePaymentLink {
    pub link_id: PaymentLinkId,
    /// `None` when the deadline passed on its own.
    pub actor_id: Option<UserId>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentLinkCommand {
    Create(CreatePaymentLink),
    Use(UsePaymentLink),
    Expire(ExpirePaymentLink),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLinkCreated {
    pub link_id: PaymentLinkId,
    pub product_id: ProductId,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLinkUsed {
    pub link_id: PaymentLinkId,
    pub order_id: OrderId,
    pub used_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLinkExpired {
    pub link_id: PaymentLinkId,
    pub actor_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentLinkEvent {
    Created(PaymentLinkCreated),
    Used(PaymentLinkUsed),
    Expired(PaymentLinkExpired),
}

impl PaymentLinkEvent {
    pub fn to_status(&self) -> PaymentLinkStatus {
        match self {
            PaymentLinkEvent::Created(_) => PaymentLinkStatus::Active,
            PaymentLinkEvent::Used(_) => PaymentLinkStatus::Used,
            PaymentLinkEvent::Expired(_) => PaymentLinkStatus::Expired,
        }
    }
}

impl Event for PaymentLinkEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentLinkEvent::Created(_) => "payment_link.created",
            PaymentLinkEvent::Used(_) => "payment_link.used",
            PaymentLinkEvent::Expired(_) => "payment_link.expired",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentLinkEvent::Created(e) => e.occurred_at,
            PaymentLinkEvent::Used(e) => e.occurred_at,
            PaymentLinkEvent::Expired(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PaymentLink {
    type Command = PaymentLinkCommand;
    type Event = PaymentLinkEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentLinkEvent::Created(e) => {
                self.id = e.link_id.clone();
                self.product_id = Some(e.product_id);
                self.email = e.email.clone();
                self.created_by = Some(e.created_by);
                self.expires_at = Some(e.expires_at);
                self.created = true;
            }
            PaymentLinkEvent::Used(e) => {
                self.used_by_order = Some(e.order_id);
            }
            PaymentLinkEvent::Expired(_) => {}
        }

        self.status = event.to_status();
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentLinkCommand::Create(cmd) => self.handle_create(cmd),
            PaymentLinkCommand::Use(cmd) => self.handle_use(cmd),
            PaymentLinkCommand::Expire(cmd) => self.handle_expire(cmd),
        }
    }
}

impl PaymentLink {
    fn ensure_link_id(&self, link_id: &PaymentLinkId) -> Result<(), DomainError> {
        if self.id != *link_id {
            return Err(DomainError::invariant("link_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePaymentLink) -> Result<Vec<PaymentLinkEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payment link already exists"));
        }
        self.ensure_link_id(&cmd.link_id)?;

        let email = cmd.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("a valid email is required"));
        }
        if cmd.expires_at <= cmd.occurred_at {
            return Err(DomainError::validation("expires_at must be in the future"));
        }

        Ok(vec![PaymentLinkEvent::Created(PaymentLinkCreated {
            link_id: cmd.link_id.clone(),
            product_id: cmd.product_id,
            email,
            expires_at: cmd.expires_at,
            created_by: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_use(&self, cmd: &UsePaymentLink) -> Result<Vec<PaymentLinkEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_link_id(&cmd.link_id)?;

        if self.status != PaymentLinkStatus::Active {
            return Err(DomainError::illegal_transition("payment link", self.status, "use"));
        }
        if self.is_past_expiry(cmd.now) {
            return Err(DomainError::invariant("payment link expired"));
        }

        Ok(vec![PaymentLinkEvent::Used(PaymentLinkUsed {
            link_id: cmd.link_id.clone(),
            order_id: cmd.order_id,
            used_by: cmd.actor_id,
            occurred_at: cmd.now,
        })])
    }

    fn handle_expire(&self, cmd: &ExpirePaymentLink) -> Result<Vec<PaymentLinkEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_link_id(&cmd.link_id)?;

        if self.status != PaymentLinkStatus::Active {
            return Err(DomainError::illegal_transition("payment link", self.status, "expire"));
        }

        Ok(vec![PaymentLinkEvent::Expired(PaymentLinkExpired {
            link_id: cmd.link_id.clone(),
            actor_id: cmd.actor_id,
            occurred_at: cmd.now,
        })])
    }
}

/// Expire every ACTIVE link in `links`; USED and EXPIRED links are left untouched.
///
/// Returns the emitted events per link, in input order. Running it twice over
/// the same links emits nothing the second time.
pub fn bulk_expire<'a>(
    links: impl IntoIterator<Item = &'a mut PaymentLink>,
    actor_id: UserId,
    now: DateTime<Utc>,
) -> Vec<(PaymentLinkId, PaymentLinkEvent)> {
    let mut expired = Vec::new();

    for link in links {
        if !link.is_created() || link.status() != PaymentLinkStatus::Active {
            continue;
        }

        let cmd = PaymentLinkCommand::Expire(ExpirePaymentLink {
            link_id: link.id_typed().clone(),
            actor_id: Some(actor_id),
            now,
        });
        if let Ok(events) = link.execute(&cmd) {
            let id = link.id_typed().clone();
            expired.extend(events.into_iter().map(|e| (id.clone(), e)));
        }
    }

    expired
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use proptest::prelude::*;

    use super::*;

    fn link_at(id: &str, now: DateTime<Utc>) -> PaymentLink {
        let id: PaymentLinkId = id.parse().unwrap();
        let mut link = PaymentLink::empty(id.clone());
        link.execute(&PaymentLinkCommand::Create(CreatePaymentLink {
            link_id: id,
            product_id: ProductId::new(),
            email: "Prospect@Example.com".to_string(),
            expires_at: now + Duration::hours(24),
            actor_id: UserId::new(),
            occurred_at: now,
        }))
        .unwrap();
        link
    }

    fn use_link(link: &mut PaymentLink, now: DateTime<Utc>) -> Result<Vec<PaymentLinkEvent>, DomainError> {
        let cmd = PaymentLinkCommand::Use(UsePaymentLink {
            link_id: link.id_typed().clone(),
            order_id: OrderId::new(),
            actor_id: UserId::new(),
            now,
        });
        link.execute(&cmd)
    }

    fn expire(link: &mut PaymentLink, now: DateTime<Utc>) -> Result<Vec<PaymentLinkEvent>, DomainError> {
        let cmd = PaymentLinkCommand::Expire(ExpirePaymentLink {
            link_id: link.id_typed().clone(),
            actor_id: Some(UserId::new()),
            now,
        });
        link.execute(&cmd)
    }

    #[test]
    fn create_normalizes_email_and_requires_future_expiry() {
        let now = Utc::now();
        let link = link_at("a", now);
        assert_eq!(link.email(), "prospect@example.com");
        assert_eq!(link.status(), PaymentLinkStatus::Active);

        let id: PaymentLinkId = "b".parse().unwrap();
        let err = PaymentLink::empty(id.clone())
            .handle(&PaymentLinkCommand::Create(CreatePaymentLink {
                link_id: id,
                product_id: ProductId::new(),
                email: "x@example.com".to_string(),
                expires_at: now,
                actor_id: UserId::new(),
                occurred_at: now,
            }))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn use_marks_link_used_once() {
        let now = Utc::now();
        let mut link = link_at("a", now);
        use_link(&mut link, now + Duration::hours(1)).unwrap();
        assert_eq!(link.status(), PaymentLinkStatus::Used);
        assert!(link.used_by_order().is_some());

        let err = use_link(&mut link, now + Duration::hours(2)).unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
    }

    #[test]
    fn using_a_link_past_expiry_is_refused() {
        let now = Utc::now();
        let mut link = link_at("a", now);
        let later = now + Duration::hours(25);
        assert!(link.is_past_expiry(later));
        assert_eq!(
            use_link(&mut link, later).unwrap_err(),
            DomainError::invariant("payment link expired")
        );
        assert_eq!(link.status(), PaymentLinkStatus::Active);
        assert!(link.is_overdue(later));
    }

    #[test]
    fn deadline_expiry_has_no_actor() {
        let now = Utc::now();
        let mut link = link_at("a", now);
        let later = now + Duration::hours(25);

        let events = link
            .execute(&PaymentLinkCommand::Expire(ExpirePaymentLink {
                link_id: link.id_typed().clone(),
                actor_id: None,
                now: later,
            }))
            .unwrap();
        assert!(matches!(&events[0], PaymentLinkEvent::Expired(e) if e.actor_id.is_none()));
        assert_eq!(link.status(), PaymentLinkStatus::Expired);
        assert!(!link.is_overdue(later));
    }

    #[test]
    fn bulk_expire_counts_only_active_links() {
        let now = Utc::now();
        let mut a = link_at("a", now);
        let mut b = link_at("b", now);
        expire(&mut b, now).unwrap();

        let events = bulk_expire([&mut a, &mut b], UserId::new(), now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0.as_str(), "a");
        assert_eq!(a.status(), PaymentLinkStatus::Expired);
        assert_eq!(b.status(), PaymentLinkStatus::Expired);
    }

    #[test]
    fn used_links_survive_bulk_expire() {
        let now = Utc::now();
        let mut a = link_at("a", now);
        use_link(&mut a, now).unwrap();
        assert!(bulk_expire([&mut a], UserId::new(), now).is_empty());
        assert_eq!(a.status(), PaymentLinkStatus::Used);
    }

    proptest! {
        #[test]
        fn bulk_expire_is_idempotent(statuses in prop::collection::vec(0u8..3, 0..10)) {
            let now = Utc::now();
            let mut links: Vec<PaymentLink> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let mut link = link_at(&format!("link-{i}"), now);
                    match s {
                        1 => { use_link(&mut link, now).unwrap(); }
                        2 => { expire(&mut link, now).unwrap(); }
                        _ => {}
                    }
                    link
                })
                .collect();
            let active = statuses.iter().filter(|s| **s == 0).count();

            let first = bulk_expire(links.iter_mut(), UserId::new(), now);
            prop_assert_eq!(first.len(), active);
            let second = bulk_expire(links.iter_mut(), UserId::new(), now);
            prop_assert!(second.is_empty());
            prop_assert!(links.iter().all(|l| l.status() != PaymentLinkStatus::Active));
        }
    }
}
