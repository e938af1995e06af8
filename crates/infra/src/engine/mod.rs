//! The procurement engine: the one entry point a UI or API layer talks to.
//!
//! It composes the command dispatcher (event store + bus), the budget
//! ledger, the approval router and the injected collaborator services, and
//! coordinates the buyer's purchase order with the seller's mirrored request.
//! The two sides never share a commit; they are reconciled through the
//! original PO id and converge eventually.
//!
//! ```text
//! cart ─review─▶ submit ─▶ [pending_approval ─approve─▶] ordered ─▶ budget commit
//!                                                          │
//!                               network-verified supplier ─┴─▶ seller inbox (B2B-<po>)
//!                                                                 │ process / ship
//!                                     buyer PO shipped ◀──────────┘
//!                                            │ receiving session
//!                                            ▼
//!                           received ─▶ stock + journal + notify
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use procureflow_core::{Aggregate, AggregateId, BusinessId, DomainError};
use procureflow_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use procureflow_purchasing::{
    ApprovalRouter, B2BRequest, B2BRequestCommand, B2BRequestEvent, B2BRequestId, PoStatus,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId,
};

use crate::budget_ledger::BudgetLedger;
use crate::command_dispatcher::{self, CommandDispatcher};
use crate::config::EngineConfig;
use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use crate::in_flight::InFlightGuard;
use crate::projections::{
    InboxEntry, PurchaseOrderReadModel, PurchaseOrdersProjection, SellerInboxProjection,
    purchase_orders, seller_inbox,
};
use crate::read_model::InMemoryBusinessStore;
use crate::services::{
    Catalog, InMemoryCatalog, InMemoryPartnerDirectory, Notification, NotificationKind, Notifier,
    PartnerDirectory, TracingNotifier,
};
use crate::workers::{ProjectionWorker, WorkerHandle};

mod cart;
mod directory;
pub mod error;
mod orders;
mod receiving;
mod requests;
mod seller;
pub mod status;

pub use directory::{NewItem, NewPartner};
pub use error::{EngineError, EngineResult};
pub use orders::SubmitOutcome;
pub use status::{OrderStatusChanged, StatusChange};

pub(crate) const ORDER_TYPE: &str = purchase_orders::AGGREGATE_TYPE;
pub(crate) const REQUEST_TYPE: &str = seller_inbox::AGGREGATE_TYPE;
pub(crate) const PURCHASE_REQUEST_TYPE: &str = "purchasing.request";
pub(crate) const PARTNER_TYPE: &str = "partners.partner";
pub(crate) const STOCK_TYPE: &str = "inventory.item";
pub(crate) const LEDGER_TYPE: &str = "accounting.ledger";

pub type SharedStore = Arc<InMemoryEventStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// Engine wired entirely in memory.
pub type InMemoryEngine = ProcurementEngine<SharedStore, SharedBus>;

type OrderRows = Arc<InMemoryBusinessStore<PurchaseOrderId, PurchaseOrderReadModel>>;
type InboxRows = Arc<InMemoryBusinessStore<B2BRequestId, InboxEntry>>;

/// Collaborators injected into the engine.
#[derive(Clone)]
pub struct EngineServices {
    pub catalog: Arc<dyn Catalog>,
    pub directory: Arc<dyn PartnerDirectory>,
    pub notifier: Arc<dyn Notifier>,
}

impl EngineServices {
    pub fn in_memory() -> Self {
        Self {
            catalog: Arc::new(InMemoryCatalog::new()),
            directory: Arc::new(InMemoryPartnerDirectory::new()),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

impl core::fmt::Debug for EngineServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EngineServices").finish_non_exhaustive()
    }
}

pub struct ProcurementEngine<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    budget: BudgetLedger<S, B>,
    router: ApprovalRouter,
    config: EngineConfig,
    catalog: Arc<dyn Catalog>,
    directory: Arc<dyn PartnerDirectory>,
    notifier: Arc<dyn Notifier>,
    orders: PurchaseOrdersProjection<OrderRows>,
    inbox: Arc<SellerInboxProjection<InboxRows>>,
    status_bus: InMemoryEventBus<OrderStatusChanged>,
    in_flight: InFlightGuard,
    _inbox_worker: WorkerHandle,
}

impl<S, B> core::fmt::Debug for ProcurementEngine<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcurementEngine")
            .field("config", &self.config)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl ProcurementEngine<SharedStore, SharedBus> {
    pub fn in_memory(config: EngineConfig) -> EngineResult<InMemoryEngine> {
        Self::in_memory_with(config, EngineServices::in_memory())
    }

    pub fn in_memory_with(config: EngineConfig, services: EngineServices) -> EngineResult<InMemoryEngine> {
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        ));
        Self::new(dispatcher, services, config)
    }
}

impl<S, B> ProcurementEngine<S, B>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    /// Wire the engine. Spawns the seller-inbox projection worker, which
    /// stops when the engine is dropped.
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        services: EngineServices,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let inbox: Arc<SellerInboxProjection<InboxRows>> =
            Arc::new(SellerInboxProjection::new(Arc::new(InMemoryBusinessStore::new())));
        let worker_inbox = Arc::clone(&inbox);
        let inbox_worker = ProjectionWorker::spawn(
            "seller-inbox-projection",
            dispatcher.bus(),
            None,
            move |envelope: EventEnvelope<JsonValue>| worker_inbox.apply_envelope(&envelope),
        )
        .map_err(|e| EngineError::Infrastructure(format!("failed to spawn inbox worker: {e}")))?;

        let budget = BudgetLedger::new(
            Arc::clone(&dispatcher),
            config.budget_policy(),
            config.commit_retry_limit,
        );

        Ok(Self {
            router: ApprovalRouter::new(config.approval_limit),
            budget,
            dispatcher,
            config,
            catalog: services.catalog,
            directory: services.directory,
            notifier: services.notifier,
            orders: PurchaseOrdersProjection::new(Arc::new(InMemoryBusinessStore::new())),
            inbox,
            status_bus: InMemoryEventBus::new(),
            in_flight: InFlightGuard::new(),
            _inbox_worker: inbox_worker,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn budget(&self) -> &BudgetLedger<S, B> {
        &self.budget
    }

    pub fn router(&self) -> &ApprovalRouter {
        &self.router
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> &InFlightGuard {
        &self.in_flight
    }

    /// Live feed of buyer and seller status changes.
    pub fn subscribe_status_changes(&self) -> Subscription<OrderStatusChanged> {
        self.status_bus.subscribe()
    }

    /// Read-only copy of an order, for printing and export.
    pub fn order_snapshot(&self, business_id: BusinessId, order_id: &PurchaseOrderId) -> EngineResult<PurchaseOrder> {
        self.load_order(business_id, order_id)
    }

    /// Buyer's order list, newest first.
    pub fn list_orders(&self, business_id: BusinessId) -> Vec<PurchaseOrderReadModel> {
        self.orders.list(business_id)
    }

    pub fn list_orders_by_status(&self, business_id: BusinessId, status: PoStatus) -> Vec<PurchaseOrderReadModel> {
        self.orders.list_by_status(business_id, status)
    }

    /// Seller's inbox, oldest first. Fed asynchronously; a request just
    /// transmitted may not be listed yet.
    pub fn seller_inbox(&self, business_id: BusinessId) -> Vec<InboxEntry> {
        self.inbox.list(business_id)
    }

    pub fn pending_requests(&self, business_id: BusinessId) -> Vec<InboxEntry> {
        self.inbox.pending(business_id)
    }

    /// Read-only copy of a seller request.
    pub fn request_snapshot(&self, business_id: BusinessId, request_id: &B2BRequestId) -> EngineResult<B2BRequest> {
        self.load_request(business_id, request_id)
    }

    pub(crate) fn load_order(&self, business_id: BusinessId, order_id: &PurchaseOrderId) -> EngineResult<PurchaseOrder> {
        let order = self
            .dispatcher
            .load(business_id, order_id.0.clone(), |_, id| PurchaseOrder::empty(PurchaseOrderId(id)))?;
        if !order.is_created() {
            return Err(EngineError::not_found(format!("purchase order {order_id}")));
        }
        Ok(order)
    }

    pub(crate) fn load_request(&self, business_id: BusinessId, request_id: &B2BRequestId) -> EngineResult<B2BRequest> {
        let request = self
            .dispatcher
            .load(business_id, request_id.0.clone(), |_, id| B2BRequest::empty(B2BRequestId(id)))?;
        if !request.is_created() {
            return Err(EngineError::not_found(format!("request {request_id}")));
        }
        Ok(request)
    }

    /// Dispatch a command and decode what was committed. An empty result
    /// means the command was an idempotent repeat.
    pub(crate) fn run<A>(
        &self,
        business_id: BusinessId,
        aggregate_id: &AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(BusinessId, AggregateId) -> A,
    ) -> EngineResult<Vec<A::Event>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: procureflow_events::Event + Serialize + DeserializeOwned,
    {
        let committed: Vec<StoredEvent> = self
            .dispatcher
            .dispatch::<A>(business_id, aggregate_id.clone(), aggregate_type, command, make_aggregate)
            .map_err(|e| EngineError::from(e).or_not_found(aggregate_id))?;

        if aggregate_type == ORDER_TYPE {
            for stored in &committed {
                if let Err(err) = self.orders.apply_envelope(&stored.to_envelope()) {
                    warn!(%business_id, aggregate_id = %aggregate_id, error = %err, "order list projection failed");
                }
            }
        }

        Ok(command_dispatcher::decode_committed(&committed)?)
    }

    /// Run an order command, publish its status changes and return the
    /// resulting order with what was committed.
    pub(crate) fn execute_order(
        &self,
        business_id: BusinessId,
        order_id: &PurchaseOrderId,
        command: PurchaseOrderCommand,
    ) -> EngineResult<(PurchaseOrder, Vec<PurchaseOrderEvent>)> {
        let events = self
            .run::<PurchaseOrder>(business_id, &order_id.0, ORDER_TYPE, command, |_, id| {
                PurchaseOrder::empty(PurchaseOrderId(id))
            })
            .map_err(|e| e.or_not_found(format!("purchase order {order_id}")))?;
        self.publish_status(OrderStatusChanged::from_order_events(&events));
        Ok((self.load_order(business_id, order_id)?, events))
    }

    pub(crate) fn execute_request(
        &self,
        business_id: BusinessId,
        request_id: &B2BRequestId,
        command: B2BRequestCommand,
    ) -> EngineResult<(B2BRequest, Vec<B2BRequestEvent>)> {
        let events = self
            .run::<B2BRequest>(business_id, &request_id.0, REQUEST_TYPE, command, |_, id| {
                B2BRequest::empty(B2BRequestId(id))
            })
            .map_err(|e| e.or_not_found(format!("request {request_id}")))?;
        self.publish_status(OrderStatusChanged::from_request_events(&events));
        Ok((self.load_request(business_id, request_id)?, events))
    }

    pub(crate) fn notify(
        &self,
        sender: BusinessId,
        recipient: impl ToString,
        kind: NotificationKind,
        document_id: &AggregateId,
    ) {
        self.notifier.notify(Notification {
            sender,
            recipient: recipient.to_string(),
            kind,
            document_id: document_id.clone(),
        });
    }

    fn publish_status(&self, changes: Vec<OrderStatusChanged>) {
        for change in changes {
            debug!(
                business_id = %change.business_id,
                document_id = %change.document_id,
                change = ?change.change,
                "status changed"
            );
            if let Err(err) = self.status_bus.publish(change) {
                warn!(error = ?err, "status change could not be published");
            }
        }
    }
}
