//! Purchasing domain module (purchase orders and their B2B mirrors, event-sourced).
//!
//! This crate contains the order lifecycle, approval routing, cart composition
//! and receiving reconciliation, implemented purely as deterministic domain
//! logic (no IO, no storage).

pub mod approval;
pub mod b2b;
pub mod cart;
pub mod counterparty;
pub mod history;
pub mod line;
pub mod order;
pub mod receiving;
pub mod request;

pub use approval::{Actor, ApprovalRouter, OrderMode, Role};
pub use b2b::{
    B2BRequest, B2BRequestCommand, B2BRequestEvent, B2BRequestId, B2BRequestRecord,
    CompleteRequest, CourierDetails, ProcessRequest, ReceiveRequest, RecordKind, RejectRequest,
    RequestCompleted, RequestProcessed, RequestReceived, RequestRejected, RequestShipped,
    SellerStatus, ShipRequest, WireItem,
};
pub use cart::{Advisory, Cart, CartLine, CartReview, LocalStock, OrderDraft, RiskAdvisory};
pub use counterparty::{BusinessRef, SupplierRef};
pub use history::{HistoryAction, HistoryLog, HistoryLogEntry};
pub use line::OrderLine;
pub use order::{
    B2BLink, GoodsReceived, PoStatus, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderCreated,
    PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderStatusChanged, PurchaseOrderSubmitted,
    ReceiveGoods, SaveDraft, SubmitOrder, TransitionOrder,
};
pub use receiving::{
    BilledLine, DiscrepancyReason, PaymentMethod, PaymentStatus, ReceivingOutcome,
    ReceivingSession, ReceivingStep, Settlement, SettlementSelection, billable_quantity,
};
pub use request::{
    ConvertRequest, DismissRequest, PurchaseRequest, PurchaseRequestCommand, PurchaseRequestEvent,
    PurchaseRequestId, RequestConverted, RequestDismissed, RequestStatus, RequestSubmitted,
    SubmitRequest,
};
