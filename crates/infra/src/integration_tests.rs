//! End-to-end scenarios through the procurement engine.
//!
//! Buyer and seller are two businesses on one in-memory engine, which is
//! how a shared deployment sees them: every write is scoped to its own
//! business and the two sides meet only through the mirrored request.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use rust_decimal::Decimal;

    use procureflow_budget::AdvisoryLevel;
    use procureflow_core::{AggregateId, BusinessId, OutletId, UserId};
    use procureflow_inventory::StockItemId;
    use procureflow_partners::{LinkedBusiness, PerformanceScore};
    use procureflow_purchasing::{
        Actor, Advisory, B2BRequestId, BusinessRef, Cart, DiscrepancyReason, OrderDraft, OrderLine,
        PaymentStatus, PoStatus, PurchaseOrderId, RequestStatus, Role, SellerStatus,
        SettlementSelection, SupplierRef,
    };

    use crate::engine::{EngineError, EngineServices, InMemoryEngine, NewItem, NewPartner, StatusChange};
    use crate::services::{NotificationKind, PartnerFilter, RecordingNotifier};
    use crate::{EngineConfig, ProcurementEngine};

    struct World {
        engine: InMemoryEngine,
        notifier: Arc<RecordingNotifier>,
        buyer: BusinessRef,
        seller: BusinessRef,
    }

    fn world() -> World {
        world_with(EngineConfig::default())
    }

    fn world_with(config: EngineConfig) -> World {
        procureflow_observability::init_for_tests();
        let notifier = Arc::new(RecordingNotifier::new());
        let services = EngineServices::in_memory().with_notifier(notifier.clone());
        let engine = ProcurementEngine::in_memory_with(config, services).unwrap();
        World {
            engine,
            notifier,
            buyer: BusinessRef::new(BusinessId::new(), OutletId::new(), "Kopi Senja"),
            seller: BusinessRef::new(BusinessId::new(), OutletId::new(), "Sumber Susu Wholesale"),
        }
    }

    fn d(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn po(id: &str) -> PurchaseOrderId {
        PurchaseOrderId(AggregateId::from(id))
    }

    fn staff() -> Actor {
        Actor::new(UserId::new(), "Dewi", Role::Staff)
    }

    fn manager() -> Actor {
        Actor::new(UserId::new(), "Budi", Role::Manager)
    }

    fn milk(quantity: i64, cost: i64) -> OrderLine {
        OrderLine::new("ING-MILK", "Fresh Milk", "l", d(quantity), d(cost), "Dairy")
    }

    fn sugar(quantity: i64, cost: i64) -> OrderLine {
        OrderLine::new("ING-SUGAR", "Palm Sugar", "kg", d(quantity), d(cost), "Dry Goods")
    }

    fn manual_supplier(w: &World, name: &str, score: u8) -> SupplierRef {
        let row = w
            .engine
            .register_partner(
                w.buyer.business_id,
                NewPartner::new(name, "Dairy").with_score(PerformanceScore::new(score).unwrap()),
            )
            .unwrap();
        w.engine.supplier(w.buyer.business_id, &row.partner_id).unwrap()
    }

    fn network_supplier(w: &World) -> SupplierRef {
        let link = LinkedBusiness {
            business_id: w.seller.business_id,
            outlet_id: w.seller.outlet_id,
        };
        let row = w
            .engine
            .register_partner(w.buyer.business_id, NewPartner::new("Sumber Susu", "Dairy").with_link(link))
            .unwrap();
        w.engine
            .verify_partner_link(w.buyer.business_id, &row.partner_id, link)
            .unwrap();
        w.engine.supplier(w.buyer.business_id, &row.partner_id).unwrap()
    }

    /// Submit and ship a manual order, ready for receiving.
    fn shipped_manual_order(w: &World, id: &str, lines: Vec<OrderLine>) -> PurchaseOrderId {
        let supplier = manual_supplier(w, "Toko Pak Harun", 85);
        let order_id = po(id);
        let draft = OrderDraft::new(supplier, lines).with_order_id(order_id.clone());
        w.engine.submit(&w.buyer, draft, &manager()).unwrap().ensure_ordered().unwrap();
        w.engine
            .mark_shipped(w.buyer.business_id, &order_id, &staff(), None)
            .unwrap();
        order_id
    }

    fn eventually(mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        check()
    }

    #[test]
    fn order_walks_the_full_lifecycle() {
        let w = world();
        let supplier = manual_supplier(&w, "Toko Pak Harun", 85);
        let order_id = po("PO-1");
        let draft = OrderDraft::new(supplier, vec![milk(6_000, 1_000)]).with_order_id(order_id.clone());

        let order = w.engine.save_draft(&w.buyer, draft.clone(), &staff()).unwrap();
        assert_eq!(order.status(), PoStatus::Draft);

        let err = w
            .engine
            .transition(&w.buyer, &order_id, PoStatus::Shipped, &staff(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        // 6,000,000 from staff is above the approval limit.
        let outcome = w.engine.submit(&w.buyer, draft, &staff()).unwrap();
        assert!(outcome.approval_required);
        assert_eq!(outcome.order.status(), PoStatus::PendingApproval);

        let order = w
            .engine
            .transition(&w.buyer, &order_id, PoStatus::Ordered, &manager(), None)
            .unwrap();
        assert_eq!(order.status(), PoStatus::Ordered);

        let order = w
            .engine
            .transition(&w.buyer, &order_id, PoStatus::Shipped, &staff(), None)
            .unwrap();
        assert_eq!(order.status(), PoStatus::Shipped);

        let mut session = w.engine.start_receiving(w.buyer.business_id, &order_id).unwrap();
        session.confirm_physical_check().unwrap();
        session.select_settlement(&SettlementSelection::cash()).unwrap();
        let order = w
            .engine
            .complete_receiving(w.buyer.business_id, session, &staff(), None)
            .unwrap();

        assert_eq!(order.status(), PoStatus::Received);
        assert_eq!(order.total_bill(), Some(d(6_000_000)));
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        // created, submitted, approved, shipped, received
        assert_eq!(order.history().len(), 5);
        assert!(!order.status().can_transition_to(PoStatus::Cancelled));
    }

    #[test]
    fn network_order_is_mirrored_and_followed_by_the_buyer() {
        let w = world();
        let supplier = network_supplier(&w);
        let order_id = po("PO-1");
        let draft = OrderDraft::new(supplier, vec![milk(20, 18_000)]).with_order_id(order_id.clone());

        let outcome = w.engine.submit(&w.buyer, draft, &staff()).unwrap();
        let request_id = B2BRequestId(AggregateId::from("B2B-PO-1"));
        assert_eq!(outcome.b2b_request_id, Some(request_id.clone()));
        assert!(outcome.order.is_b2b());

        let request = w.engine.request_snapshot(w.seller.business_id, &request_id).unwrap();
        assert_eq!(request.status(), SellerStatus::Pending);
        assert_eq!(request.original_po_id(), Some(&order_id));
        assert_eq!(w.notifier.sent_of_kind(NotificationKind::OrderSent).len(), 1);

        // Retransmitting a placed order does not mirror it twice.
        w.engine.retransmit(&w.buyer, &order_id).unwrap();
        assert_eq!(w.notifier.sent_of_kind(NotificationKind::OrderSent).len(), 1);

        let err = w
            .engine
            .mark_shipped(w.buyer.business_id, &order_id, &staff(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let packer = Actor::new(UserId::new(), "Rina", Role::Staff);
        w.engine
            .process_request(w.seller.business_id, &request_id, &packer, None)
            .unwrap();
        let request = w
            .engine
            .ship_request(w.seller.business_id, &request_id, &packer, None)
            .unwrap();
        assert_eq!(request.status(), SellerStatus::Shipped);

        let order = w.engine.order_snapshot(w.buyer.business_id, &order_id).unwrap();
        assert_eq!(order.status(), PoStatus::Shipped);

        // Completion on the seller's books leaves the buyer's order alone.
        w.engine
            .complete_request(w.seller.business_id, &request_id, &packer)
            .unwrap();
        let order = w.engine.order_snapshot(w.buyer.business_id, &order_id).unwrap();
        assert_eq!(order.status(), PoStatus::Shipped);

        let mut session = w.engine.start_receiving(w.buyer.business_id, &order_id).unwrap();
        session.confirm_physical_check().unwrap();
        session.select_settlement(&SettlementSelection::transfer("BCA-001")).unwrap();
        let order = w
            .engine
            .complete_receiving(w.buyer.business_id, session, &staff(), None)
            .unwrap();
        assert_eq!(order.status(), PoStatus::Received);

        let received = w.notifier.sent_of_kind(NotificationKind::GoodsReceived);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].recipient, w.seller.business_id.to_string());
    }

    #[test]
    fn seller_rejection_reaches_the_buyer_order() {
        let w = world();
        let supplier = network_supplier(&w);
        let order_id = po("PO-7");
        let draft = OrderDraft::new(supplier, vec![milk(5, 18_000)]).with_order_id(order_id.clone());
        w.engine.submit(&w.buyer, draft, &staff()).unwrap();

        let request_id = B2BRequestId::for_order(&order_id);
        w.engine
            .reject_request(w.seller.business_id, &request_id, &staff(), Some("out of stock".to_string()))
            .unwrap();

        let order = w.engine.order_snapshot(w.buyer.business_id, &order_id).unwrap();
        assert_eq!(order.status(), PoStatus::Rejected);
        let rejected = w.notifier.sent_of_kind(NotificationKind::RequestRejected);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].recipient, w.buyer.business_id.to_string());
    }

    #[test]
    fn seller_rejection_gives_the_spend_back() {
        let w = world();
        let business = w.buyer.business_id;
        w.engine.budget().configure(business, "Dairy", d(1_000_000), "2026-10").unwrap();
        w.engine.budget().commit(business, "Dairy", d(100_000), "PO-0").unwrap();
        let supplier = network_supplier(&w);
        let order_id = po("PO-1");
        let draft = OrderDraft::new(supplier, vec![milk(10, 1_000)]).with_order_id(order_id.clone());
        w.engine.submit(&w.buyer, draft, &manager()).unwrap().ensure_ordered().unwrap();

        let spent = || w.engine.budget().envelope(business, "Dairy").unwrap().unwrap().spent();
        assert_eq!(spent(), d(110_000));

        let request_id = B2BRequestId::for_order(&order_id);
        w.engine
            .reject_request(w.seller.business_id, &request_id, &staff(), Some("out of stock".to_string()))
            .unwrap();
        let order = w.engine.order_snapshot(business, &order_id).unwrap();
        assert_eq!(order.status(), PoStatus::Rejected);
        assert_eq!(spent(), d(100_000));

        // A late commit under the same order id does not bring it back.
        w.engine.budget().commit(business, "Dairy", d(10_000), "PO-1").unwrap();
        assert_eq!(spent(), d(100_000));
    }

    #[test]
    fn saved_draft_walks_the_graph_through_transition() {
        let w = world();
        let supplier = manual_supplier(&w, "Toko Pak Harun", 85);
        let order_id = po("PO-1");
        let draft = OrderDraft::new(supplier.clone(), vec![milk(10, 1_000)]).with_order_id(order_id.clone());
        w.engine.save_draft(&w.buyer, draft, &staff()).unwrap();

        // Below the approval limit, but parked on request.
        let order = w
            .engine
            .transition(&w.buyer, &order_id, PoStatus::PendingApproval, &staff(), None)
            .unwrap();
        assert_eq!(order.status(), PoStatus::PendingApproval);
        assert!(w.notifier.sent_of_kind(NotificationKind::ManualDispatch).is_empty());

        let order = w
            .engine
            .transition(&w.buyer, &order_id, PoStatus::Ordered, &manager(), None)
            .unwrap();
        assert_eq!(order.status(), PoStatus::Ordered);
        assert_eq!(w.notifier.sent_of_kind(NotificationKind::ManualDispatch).len(), 1);

        let order = w
            .engine
            .transition(&w.buyer, &order_id, PoStatus::Shipped, &staff(), None)
            .unwrap();
        assert_eq!(order.status(), PoStatus::Shipped);

        let mut session = w.engine.start_receiving(w.buyer.business_id, &order_id).unwrap();
        session.confirm_physical_check().unwrap();
        session.select_settlement(&SettlementSelection::cash()).unwrap();
        let order = w
            .engine
            .complete_receiving(w.buyer.business_id, session, &staff(), None)
            .unwrap();
        assert_eq!(order.status(), PoStatus::Received);

        // A large draft cannot skip approval by asking for `ordered`.
        let big = po("PO-2");
        let draft = OrderDraft::new(supplier, vec![milk(6_000, 1_000)]).with_order_id(big.clone());
        w.engine.save_draft(&w.buyer, draft, &staff()).unwrap();
        let err = w
            .engine
            .transition(&w.buyer, &big, PoStatus::Ordered, &staff(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::ApprovalRequired { .. }));
        let order = w.engine.order_snapshot(w.buyer.business_id, &big).unwrap();
        assert_eq!(order.status(), PoStatus::Draft);

        let order = w
            .engine
            .transition(&w.buyer, &big, PoStatus::Ordered, &manager(), None)
            .unwrap();
        assert_eq!(order.status(), PoStatus::Ordered);
    }

    #[test]
    fn unpriceable_lines_are_a_validation_error() {
        let w = world();
        let supplier = manual_supplier(&w, "Toko Pak Harun", 85);
        let line = OrderLine::new("ING-MILK", "Fresh Milk", "l", Decimal::MAX, d(2), "Dairy");
        let draft = OrderDraft::new(supplier, vec![line]).with_order_id(po("PO-1"));

        let err = w.engine.submit(&w.buyer, draft, &manager()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("Fresh Milk")));
        assert!(w.engine.order_snapshot(w.buyer.business_id, &po("PO-1")).is_err());
    }

    #[test]
    fn order_stays_placed_when_the_budget_commit_fails() {
        let w = world();
        let business = w.buyer.business_id;
        w.engine.budget().configure(business, "Dairy", d(1_000_000), "2026-10").unwrap();
        w.engine.budget().commit(business, "Dairy", Decimal::MAX, "PO-0").unwrap();
        let supplier = manual_supplier(&w, "Toko Pak Harun", 85);
        let order_id = po("PO-1");
        let draft = OrderDraft::new(supplier, vec![milk(10, 1_000)]).with_order_id(order_id.clone());

        let outcome = w.engine.submit(&w.buyer, draft, &manager()).unwrap();
        assert!(outcome.transmission_pending);
        assert_eq!(outcome.order.status(), PoStatus::Ordered);
        assert!(w.notifier.sent_of_kind(NotificationKind::ManualDispatch).is_empty());

        let order = w.engine.order_snapshot(business, &order_id).unwrap();
        assert_eq!(order.status(), PoStatus::Ordered);
        assert!(matches!(
            w.engine.retransmit(&w.buyer, &order_id),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn large_staff_orders_wait_for_a_manager() {
        let w = world();
        let supplier = manual_supplier(&w, "Toko Pak Harun", 85);

        let draft = OrderDraft::new(supplier.clone(), vec![milk(6_000, 1_000)]).with_order_id(po("PO-1"));
        let outcome = w.engine.submit(&w.buyer, draft, &staff()).unwrap();
        let err = outcome.ensure_ordered().unwrap_err();
        assert!(matches!(err, EngineError::ApprovalRequired { .. }));

        let err = w.engine.approve(&w.buyer, &po("PO-1"), &staff()).unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));

        let err = w
            .engine
            .reject(w.buyer.business_id, &po("PO-1"), &manager(), "  ")
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let order = w
            .engine
            .reject(w.buyer.business_id, &po("PO-1"), &manager(), "too expensive this month")
            .unwrap();
        assert_eq!(order.status(), PoStatus::Cancelled);

        let err = w.engine.approve(&w.buyer, &po("PO-1"), &manager()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        // The same total from a manager is placed directly.
        let draft = OrderDraft::new(supplier, vec![milk(6_000, 1_000)]).with_order_id(po("PO-2"));
        let outcome = w.engine.submit(&w.buyer, draft, &manager()).unwrap();
        assert!(!outcome.approval_required);
        assert_eq!(outcome.order.status(), PoStatus::Ordered);
        assert!(w.notifier.sent_of_kind(NotificationKind::ManualDispatch).len() == 1);
    }

    #[test]
    fn budget_advisories_are_returned_without_blocking() {
        let w = world();
        let business = w.buyer.business_id;
        w.engine.budget().configure(business, "Dairy", d(1_000_000), "2026-10").unwrap();
        w.engine.budget().commit(business, "Dairy", d(850_000), "PO-0").unwrap();
        let supplier = manual_supplier(&w, "Toko Pak Harun", 85);

        let mut cart = Cart::new();
        cart.add(supplier.clone(), milk(100, 1_000)).unwrap();
        let review = w.engine.review_cart(business, &cart).unwrap();
        assert_eq!(review.budget.len(), 1);
        assert_eq!(review.budget[0].projected_percent, Some(d(95)));
        assert_eq!(review.budget[0].level, Some(AdvisoryLevel::Warning));

        let mut cart = Cart::new();
        cart.add(supplier.clone(), milk(200, 1_000)).unwrap();
        let review = w.engine.review_cart(business, &cart).unwrap();
        assert_eq!(review.budget[0].projected_percent, Some(d(105)));
        assert_eq!(review.budget[0].level, Some(AdvisoryLevel::Overbudget));

        let draft = OrderDraft::new(supplier, vec![milk(200, 1_000)]);
        let outcome = w.engine.submit(&w.buyer, draft, &manager()).unwrap();
        assert_eq!(outcome.order.status(), PoStatus::Ordered);
        assert!(outcome.advisories.iter().any(|a| matches!(
            a,
            Advisory::Budget(assessment) if assessment.level == Some(AdvisoryLevel::Overbudget)
        )));

        let envelope = w.engine.budget().envelope(business, "Dairy").unwrap().unwrap();
        assert_eq!(envelope.spent(), d(1_050_000));
    }

    #[test]
    fn enforced_budget_turns_overspend_into_an_error() {
        let w = world_with(EngineConfig {
            enforce_budget: true,
            ..EngineConfig::default()
        });
        let business = w.buyer.business_id;
        w.engine.budget().configure(business, "Dairy", d(100_000), "2026-10").unwrap();
        let supplier = manual_supplier(&w, "Toko Pak Harun", 85);

        let draft = OrderDraft::new(supplier, vec![milk(200, 1_000)]).with_order_id(po("PO-1"));
        let err = w.engine.submit(&w.buyer, draft, &manager()).unwrap_err();
        assert!(matches!(err, EngineError::BudgetExceeded { .. }));
        assert!(matches!(
            w.engine.order_snapshot(business, &po("PO-1")),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_submissions_both_land_in_the_budget() {
        let w = world();
        let business = w.buyer.business_id;
        w.engine.budget().configure(business, "Dairy", d(1_000_000), "2026-10").unwrap();
        w.engine.budget().commit(business, "Dairy", d(500_000), "PO-0").unwrap();
        let supplier = manual_supplier(&w, "Toko Pak Harun", 85);

        let outcomes: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = ["PO-A", "PO-B"]
                .into_iter()
                .map(|id| {
                    let draft = OrderDraft::new(supplier.clone(), vec![milk(300, 1_000)]).with_order_id(po(id));
                    let (engine, buyer) = (&w.engine, &w.buyer);
                    s.spawn(move || engine.submit(buyer, draft, &manager()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for outcome in outcomes {
            assert_eq!(outcome.unwrap().order.status(), PoStatus::Ordered);
        }
        let envelope = w.engine.budget().envelope(business, "Dairy").unwrap().unwrap();
        assert_eq!(envelope.spent(), d(1_100_000));
    }

    #[test]
    fn second_mutation_of_a_busy_order_fails_fast() {
        let w = world();
        let supplier = manual_supplier(&w, "Toko Pak Harun", 85);
        let order_id = po("PO-1");
        let draft = OrderDraft::new(supplier, vec![milk(10, 1_000)]).with_order_id(order_id.clone());
        w.engine.save_draft(&w.buyer, draft, &staff()).unwrap();

        let ticket = w.engine.in_flight().try_acquire(w.buyer.business_id, &order_id.0).unwrap();
        let err = w
            .engine
            .cancel(w.buyer.business_id, &order_id, &staff(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::ConcurrencyConflict(_)));
        drop(ticket);

        let order = w
            .engine
            .cancel(w.buyer.business_id, &order_id, &staff(), None)
            .unwrap();
        assert_eq!(order.status(), PoStatus::Cancelled);
    }

    #[test]
    fn receiving_with_shortage_bills_what_arrived() {
        let w = world();
        let order_id = shipped_manual_order(&w, "PO-3", vec![milk(10, 1_000), sugar(4, 2_500)]);

        let mut session = w.engine.start_receiving(w.buyer.business_id, &order_id).unwrap();
        session.record("ING-MILK", d(8), None).unwrap();
        assert!(session.confirm_physical_check().is_err());
        session
            .record("ING-MILK", d(8), Some(DiscrepancyReason::Missing))
            .unwrap();

        // Settlement cannot be skipped.
        let unsettled = session.clone();
        let err = w
            .engine
            .complete_receiving(w.buyer.business_id, unsettled, &staff(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::IncompleteReceiving(_)));

        session.confirm_physical_check().unwrap();
        session.select_settlement(&SettlementSelection::tempo(30)).unwrap();
        let order = w
            .engine
            .complete_receiving(w.buyer.business_id, session, &staff(), Some("two cartons short".to_string()))
            .unwrap();

        assert_eq!(order.total_bill(), Some(d(18_000)));
        assert_eq!(order.payment_status(), PaymentStatus::Unpaid);
        assert!(order.due_date().is_some());

        let milk_id = StockItemId(AggregateId::from("ING-MILK"));
        let sugar_id = StockItemId(AggregateId::from("ING-SUGAR"));
        assert_eq!(w.engine.stock_on_hand(w.buyer.business_id, &milk_id).unwrap(), d(8));
        assert_eq!(w.engine.stock_on_hand(w.buyer.business_id, &sugar_id).unwrap(), d(4));
        assert!(w.engine.receipt_posted(w.buyer.business_id, &order_id).unwrap());
    }

    #[test]
    fn manual_orders_are_handed_to_a_person() {
        let w = world();
        let supplier = manual_supplier(&w, "Toko Pak Harun", 85);
        let partner_id = supplier.partner_id.clone();
        let draft = OrderDraft::new(supplier, vec![milk(10, 1_000)]).with_order_id(po("PO-1"));
        let outcome = w.engine.submit(&w.buyer, draft, &staff()).unwrap();

        assert!(outcome.b2b_request_id.is_none());
        let sent = w.notifier.sent_of_kind(NotificationKind::ManualDispatch);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, partner_id.to_string());
        assert_eq!(sent[0].sender, w.buyer.business_id);
        assert!(w.notifier.sent_of_kind(NotificationKind::OrderSent).is_empty());
    }

    #[test]
    fn status_changes_are_published() {
        let w = world();
        let subscription = w.engine.subscribe_status_changes();
        let supplier = network_supplier(&w);
        let draft = OrderDraft::new(supplier, vec![milk(10, 1_000)]).with_order_id(po("PO-1"));
        w.engine.submit(&w.buyer, draft, &manager()).unwrap();

        let changes = subscription.drain();
        assert!(changes.iter().any(|c| c.business_id == w.buyer.business_id
            && c.change
                == StatusChange::Buyer {
                    from: None,
                    to: PoStatus::Ordered
                }));
        assert!(changes.iter().any(|c| c.business_id == w.seller.business_id
            && c.original_po_id == AggregateId::from("PO-1")
            && matches!(c.change, StatusChange::Seller { to: SellerStatus::Pending, .. })));
    }

    #[test]
    fn seller_inbox_lists_incoming_requests() {
        let w = world();
        let supplier = network_supplier(&w);
        let draft = OrderDraft::new(supplier, vec![milk(10, 18_000), sugar(2, 2_500)]).with_order_id(po("PO-9"));
        w.engine.submit(&w.buyer, draft, &staff()).unwrap();

        assert!(eventually(|| w.engine.pending_requests(w.seller.business_id).len() == 1));
        let inbox = w.engine.seller_inbox(w.seller.business_id);
        assert_eq!(inbox[0].original_po_id, po("PO-9"));
        assert_eq!(inbox[0].source.business_id, w.buyer.business_id);
        assert_eq!(inbox[0].total_amount, d(185_000));
        assert!(w.engine.seller_inbox(w.buyer.business_id).is_empty());
    }

    #[test]
    fn cart_review_flags_risky_suppliers_and_local_stock() {
        let w = world();
        let business = w.buyer.business_id;
        let milk_id = StockItemId(AggregateId::from("ING-MILK"));
        w.engine
            .register_item(business, NewItem::new("Fresh Milk", "l", "Dairy").with_id(milk_id.clone()))
            .unwrap();
        w.engine.adjust_stock(business, &milk_id, d(5), "stock take").unwrap();
        let shaky = manual_supplier(&w, "Warung Baru", 40);

        let mut cart = Cart::new();
        cart.add(shaky, milk(10, 1_000)).unwrap();
        let review = w.engine.review_cart(business, &cart).unwrap();

        assert_eq!(review.total, d(10_000));
        assert_eq!(review.risks.len(), 1);
        assert_eq!(review.risks[0].supplier_name, "Warung Baru");
        assert_eq!(review.local_stock.len(), 1);
        assert_eq!(review.local_stock[0].on_hand, d(5));

        let err = w.engine.review_cart(business, &Cart::new()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn purchase_request_converts_into_one_draft_per_supplier() {
        let w = world();
        let business = w.buyer.business_id;
        let dairy = manual_supplier(&w, "Toko Pak Harun", 85);
        let grocer = manual_supplier(&w, "Grosir Makmur", 70);

        let mut cart = Cart::new();
        cart.add(dairy, milk(10_000, 1_000)).unwrap();
        cart.add(grocer, sugar(20, 2_500)).unwrap();
        let request = w.engine.submit_request(business, &cart, &staff(), None).unwrap();
        assert_eq!(request.status(), RequestStatus::Open);

        let drafts = w.engine.convert_request(business, request.id_typed(), &manager()).unwrap();
        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|d| d.order_id.is_some()));

        let request = w.engine.purchase_request(business, request.id_typed()).unwrap();
        assert_eq!(request.status(), RequestStatus::Converted);
        let err = w
            .engine
            .dismiss_request(business, request.id_typed(), &manager(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        let placed = w
            .engine
            .submit(&w.buyer, drafts[1].clone(), &manager())
            .unwrap()
            .ensure_ordered()
            .unwrap();
        assert_eq!(Some(placed.id_typed()), drafts[1].order_id.as_ref());
    }

    #[test]
    fn suspended_partners_cannot_be_ordered_from() {
        let w = world();
        let business = w.buyer.business_id;
        network_supplier(&w);
        let manual = manual_supplier(&w, "Toko Pak Harun", 85);

        let verified = w.engine.list_partners(
            business,
            &PartnerFilter {
                verified_only: true,
                ..PartnerFilter::default()
            },
        );
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].name, "Sumber Susu");

        w.engine
            .suspend_partner(business, &manual.partner_id, Some("late twice".to_string()))
            .unwrap();
        let err = w.engine.supplier(business, &manual.partner_id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(w.engine.list_partners(business, &PartnerFilter::default()).len(), 1);
    }
}
