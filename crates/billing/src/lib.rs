//! Orders and one-time payment links (pure domain logic, no IO).

pub mod order;
pub mod payment_link;

pub use order::{
    CancelOrder, MarkOrderFailed, MarkOrderPaid, Order, OrderCancelled, OrderCommand, OrderEvent,
    OrderPaid, OrderPaymentFailed, OrderPlaced, OrderRefunded, OrderStatus, PaymentOutcome,
    PlaceOrder, RefundOrder,
};
pub use payment_link::{
    CreatePaymentLink, ExpirePaymentLink, PaymentLink, PaymentLinkCommand, PaymentLinkCreated,
    PaymentLinkEvent, PaymentLinkExpired, PaymentLinkStatus, PaymentLinkUsed, UsePaymentLink,
    bulk_expire,
};
