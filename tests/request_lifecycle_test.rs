mod common;

use assert_matches::assert_matches;
use common::TestContext;
use kitchen_logistics::{
    auth::{Actor, Role},
    common::PageRequest,
    entities::request::RequestStatus,
    errors::ServiceError,
    events::{Event, EventSender},
    services::requests::{ItemApproval, NewRequest, NewRequestItem, RequestFilter, RequestService},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

#[tokio::test]
async fn request_round_trip_moves_stock_from_center_to_branch() {
    let mut ctx = TestContext::new().await;
    ctx.stock_center(ctx.rice.id, dec!(100)).await;

    let created = ctx.create_request(&[(ctx.rice.id, dec!(20))]).await;
    assert_eq!(created.request.status, RequestStatus::Pending);
    assert_eq!(created.request.branch_id, ctx.branch.id);
    assert!(created.request.code.starts_with("REQ-"));
    assert_eq!(created.items.len(), 1);
    assert_eq!(created.items[0].qty_approved, None);

    let item_id = created.items[0].id;
    let approved = ctx
        .services()
        .requests
        .approve(
            &ctx.central,
            created.request.id,
            vec![ItemApproval {
                item_id,
                qty_approved: dec!(10),
            }],
        )
        .await
        .expect("approve");
    assert_eq!(approved.request.status, RequestStatus::Approved);
    assert_eq!(approved.request.processed_by_id, Some(ctx.central.id));
    assert!(approved.request.processed_at.is_some());
    assert_eq!(approved.items[0].qty_approved, Some(dec!(10)));

    let shipped = ctx
        .services()
        .requests
        .ship(&ctx.central, created.request.id)
        .await
        .expect("ship");
    assert_eq!(shipped.request.status, RequestStatus::Shipped);
    assert_eq!(ctx.stock_qty(ctx.rice.id, ctx.center.id).await, Some(dec!(90)));
    assert_eq!(ctx.stock_qty(ctx.rice.id, ctx.branch.id).await, None);

    let received = ctx
        .services()
        .requests
        .receive(&ctx.branch_admin, created.request.id)
        .await
        .expect("receive");
    assert_eq!(received.request.status, RequestStatus::Received);
    assert_eq!(ctx.stock_qty(ctx.rice.id, ctx.branch.id).await, Some(dec!(10)));
    assert_eq!(ctx.stock_qty(ctx.rice.id, ctx.center.id).await, Some(dec!(90)));

    for action in ["CREATE_REQUEST", "APPROVE_REQUEST", "SHIP_REQUEST", "RECEIVE_REQUEST"] {
        let entries = ctx.activity(action).await;
        assert_eq!(entries.len(), 1, "{action}");
        assert_eq!(entries[0].details["code"], created.request.code.as_str());
    }
    let ship_log = &ctx.activity("SHIP_REQUEST").await[0];
    assert_eq!(ship_log.details["summary"][0]["material"], "Beras");
    assert_eq!(ship_log.details["summary"][0]["unit"], "kg");

    let events = ctx.drain_events();
    assert_matches!(
        events.as_slice(),
        [Event::RequestApproved { code: a, .. }, Event::RequestShipped { code: s, .. }]
            if a == &created.request.code && s == &created.request.code
    );
}

#[tokio::test]
async fn items_left_out_of_approval_are_granted_in_full() {
    let ctx = TestContext::new().await;
    let created = ctx
        .create_request(&[(ctx.rice.id, dec!(20)), (ctx.oil.id, dec!(4.5))])
        .await;
    let rice_item = created
        .items
        .iter()
        .find(|i| i.material_id == ctx.rice.id)
        .expect("rice item")
        .id;

    let approved = ctx
        .services()
        .requests
        .approve(
            &ctx.central,
            created.request.id,
            vec![ItemApproval {
                item_id: rice_item,
                qty_approved: dec!(15),
            }],
        )
        .await
        .expect("approve");

    for item in &approved.items {
        let expected = if item.material_id == ctx.rice.id {
            dec!(15)
        } else {
            dec!(4.5)
        };
        assert_eq!(item.qty_approved, Some(expected));
        assert_eq!(item.effective_qty(), expected);
    }
}

#[tokio::test]
async fn approval_rejects_items_from_other_requests() {
    let ctx = TestContext::new().await;
    let created = ctx.create_request(&[(ctx.rice.id, dec!(5))]).await;

    let err = ctx
        .services()
        .requests
        .approve(
            &ctx.central,
            created.request.id,
            vec![ItemApproval {
                item_id: Uuid::new_v4(),
                qty_approved: dec!(1),
            }],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));

    let request = ctx
        .services()
        .requests
        .find_one(&ctx.central, created.request.id)
        .await
        .unwrap();
    assert_eq!(request.request.status, RequestStatus::Pending);
    assert_eq!(request.items[0].qty_approved, None);
}

#[tokio::test]
async fn shipping_more_than_center_holds_changes_nothing() {
    let ctx = TestContext::new().await;
    ctx.stock_center(ctx.rice.id, dec!(5)).await;
    ctx.stock_center(ctx.oil.id, dec!(50)).await;

    let created = ctx
        .create_request(&[(ctx.oil.id, dec!(10)), (ctx.rice.id, dec!(20))])
        .await;
    ctx.services()
        .requests
        .approve(&ctx.central, created.request.id, vec![])
        .await
        .expect("approve");

    let err = ctx
        .services()
        .requests
        .ship(&ctx.central, created.request.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(msg) if msg.contains("Beras"));

    let request = ctx
        .services()
        .requests
        .find_one(&ctx.central, created.request.id)
        .await
        .unwrap();
    assert_eq!(request.request.status, RequestStatus::Approved);
    assert_eq!(ctx.stock_qty(ctx.rice.id, ctx.center.id).await, Some(dec!(5)));
    assert_eq!(ctx.stock_qty(ctx.oil.id, ctx.center.id).await, Some(dec!(50)));
    assert!(ctx.activity("SHIP_REQUEST").await.is_empty());
}

#[tokio::test]
async fn out_of_order_transitions_are_refused() {
    let ctx = TestContext::new().await;
    ctx.stock_center(ctx.rice.id, dec!(100)).await;
    let requests = &ctx.services().requests;

    let pending = ctx.create_request(&[(ctx.rice.id, dec!(1))]).await;
    assert_matches!(
        requests.ship(&ctx.central, pending.request.id).await,
        Err(ServiceError::InvalidTransition(msg)) if msg.contains("PENDING")
    );
    assert_matches!(
        requests.receive(&ctx.branch_admin, pending.request.id).await,
        Err(ServiceError::InvalidTransition(_))
    );

    requests
        .reject(&ctx.central, pending.request.id, "duplicate")
        .await
        .expect("reject");
    assert_matches!(
        requests.approve(&ctx.central, pending.request.id, vec![]).await,
        Err(ServiceError::InvalidTransition(msg)) if msg.contains("REJECTED")
    );

    let approved = ctx.create_request(&[(ctx.rice.id, dec!(1))]).await;
    requests
        .approve(&ctx.central, approved.request.id, vec![])
        .await
        .expect("approve");
    assert_matches!(
        requests.reject(&ctx.central, approved.request.id, "too late").await,
        Err(ServiceError::InvalidTransition(_))
    );
    assert_matches!(
        requests.approve(&ctx.central, approved.request.id, vec![]).await,
        Err(ServiceError::InvalidTransition(_))
    );
}

#[tokio::test]
async fn concurrent_shipments_of_one_request_succeed_once() {
    let ctx = TestContext::new().await;
    ctx.stock_center(ctx.rice.id, dec!(100)).await;
    let created = ctx.create_request(&[(ctx.rice.id, dec!(30))]).await;
    ctx.services()
        .requests
        .approve(&ctx.central, created.request.id, vec![])
        .await
        .expect("approve");

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let service = ctx.services().requests.clone();
        let actor = ctx.central.clone();
        let id = created.request.id;
        tasks.push(tokio::spawn(async move { service.ship(&actor, id).await }));
    }

    let mut shipped = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.expect("join") {
            Ok(_) => shipped += 1,
            Err(ServiceError::InvalidTransition(_)) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((shipped, refused), (1, 1));
    assert_eq!(ctx.stock_qty(ctx.rice.id, ctx.center.id).await, Some(dec!(70)));
    assert_eq!(ctx.activity("SHIP_REQUEST").await.len(), 1);
}

#[tokio::test]
async fn rejection_reason_is_appended_to_notes() {
    let mut ctx = TestContext::new().await;
    let created = ctx.create_request(&[(ctx.rice.id, dec!(3))]).await;

    let rejected = ctx
        .services()
        .requests
        .reject(&ctx.central, created.request.id, "  budget exhausted ")
        .await
        .expect("reject");

    assert_eq!(rejected.request.status, RequestStatus::Rejected);
    assert_eq!(
        rejected.request.notes.as_deref(),
        Some("for next week's menu | REJECTED REASON: budget exhausted")
    );
    assert_eq!(rejected.request.processed_by_id, Some(ctx.central.id));

    let log = &ctx.activity("REJECT_REQUEST").await[0];
    assert_eq!(log.details["reason"], "budget exhausted");

    assert_matches!(
        ctx.drain_events().as_slice(),
        [Event::RequestRejected { reason, branch_id, .. }]
            if reason == "budget exhausted" && *branch_id == ctx.branch.id
    );
}

#[tokio::test]
async fn rejection_without_reason_is_invalid() {
    let ctx = TestContext::new().await;
    let created = ctx.create_request(&[(ctx.rice.id, dec!(3))]).await;
    assert_matches!(
        ctx.services()
            .requests
            .reject(&ctx.central, created.request.id, "   ")
            .await,
        Err(ServiceError::InvalidInput(_))
    );
}

#[tokio::test]
async fn create_validates_actor_and_items() {
    let ctx = TestContext::new().await;
    let requests = &ctx.services().requests;
    let item = |material_id, qty| NewRequestItem { material_id, qty };

    assert_matches!(
        requests
            .create(&ctx.branch_admin, NewRequest { items: vec![], notes: None })
            .await,
        Err(ServiceError::InvalidInput(_))
    );
    assert_matches!(
        requests
            .create(
                &ctx.branch_admin,
                NewRequest {
                    items: vec![item(ctx.rice.id, Decimal::ZERO)],
                    notes: None
                }
            )
            .await,
        Err(ServiceError::InvalidInput(_))
    );
    assert_matches!(
        requests
            .create(
                &ctx.branch_admin,
                NewRequest {
                    items: vec![item(Uuid::new_v4(), dec!(1))],
                    notes: None
                }
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        requests
            .create(
                &ctx.central,
                NewRequest {
                    items: vec![item(ctx.rice.id, dec!(1))],
                    notes: None
                }
            )
            .await,
        Err(ServiceError::Forbidden(_))
    );

    let courier = Actor::new(Uuid::new_v4(), Role::Courier, Some(ctx.branch.id));
    assert_matches!(
        requests
            .create(
                &courier,
                NewRequest {
                    items: vec![item(ctx.rice.id, dec!(1))],
                    notes: None
                }
            )
            .await,
        Err(ServiceError::Forbidden(_))
    );

    ctx.services()
        .directory
        .set_branch_active(&ctx.central, ctx.branch.id, false)
        .await
        .expect("deactivate");
    assert_matches!(
        requests
            .create(
                &ctx.branch_admin,
                NewRequest {
                    items: vec![item(ctx.rice.id, dec!(1))],
                    notes: None
                }
            )
            .await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn request_codes_are_sequential() {
    let ctx = TestContext::new().await;
    let first = ctx.create_request(&[(ctx.rice.id, dec!(1))]).await;
    let second = ctx.create_request(&[(ctx.rice.id, dec!(1))]).await;

    let number = |code: &str| code.rsplit('-').next().unwrap().parse::<i64>().unwrap();
    assert_eq!(number(&first.request.code), 1);
    assert_eq!(number(&second.request.code), 2);
    assert_eq!(first.request.code.len(), "REQ-YYYYMMDD-0001".len());
}

#[tokio::test]
async fn branch_admins_only_touch_their_own_requests() {
    let ctx = TestContext::new().await;
    ctx.stock_center(ctx.rice.id, dec!(10)).await;
    let other_branch = ctx.add_branch("Dapur Bogor").await;
    let other_admin = ctx
        .add_branch_admin(other_branch.id, "Budi", "budi@dapur.test")
        .await;

    let created = ctx.create_request(&[(ctx.rice.id, dec!(2))]).await;
    let requests = &ctx.services().requests;
    requests
        .approve(&ctx.central, created.request.id, vec![])
        .await
        .unwrap();
    requests.ship(&ctx.central, created.request.id).await.unwrap();

    assert_matches!(
        requests.receive(&other_admin, created.request.id).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        requests.find_one(&other_admin, created.request.id).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        requests.approve(&ctx.branch_admin, created.request.id, vec![]).await,
        Err(ServiceError::Forbidden(_))
    );

    let listed = requests
        .find_all(
            &other_admin,
            RequestFilter {
                branch_id: Some(ctx.branch.id),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(listed.meta.total, 0);
}

#[tokio::test]
async fn request_list_filters_and_paginates() {
    let ctx = TestContext::new().await;
    for _ in 0..3 {
        ctx.create_request(&[(ctx.rice.id, dec!(1))]).await;
    }
    let rejected = ctx.create_request(&[(ctx.oil.id, dec!(1))]).await;
    ctx.services()
        .requests
        .reject(&ctx.central, rejected.request.id, "not needed")
        .await
        .unwrap();

    let requests = &ctx.services().requests;
    let page = requests
        .find_all(&ctx.central, RequestFilter::default(), PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(page.meta.total, 4);
    assert_eq!(page.meta.last_page, 2);
    assert!(page.meta.has_next_page);
    assert_eq!(page.data.len(), 2);
    assert!(page.data[0].request.request_date >= page.data[1].request.request_date);
    assert!(page.data.iter().all(|r| r.items.len() == 1));

    let pending = requests
        .find_all(
            &ctx.central,
            RequestFilter {
                status: Some(RequestStatus::Pending),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(pending.meta.total, 3);

    let today = chrono::Utc::now().date_naive();
    let in_range = requests
        .find_all(
            &ctx.branch_admin,
            RequestFilter {
                start_date: Some(today),
                end_date: Some(today),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(in_range.meta.total, 4);

    let tomorrow = today.succ_opt().unwrap();
    let future = requests
        .find_all(
            &ctx.central,
            RequestFilter {
                start_date: Some(tomorrow),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(future.meta.total, 0);
}

#[tokio::test]
async fn approval_returns_while_the_event_channel_is_full() {
    let ctx = TestContext::new().await;
    let created = ctx.create_request(&[(ctx.rice.id, dec!(4))]).await;

    // The worker is stalled: one queued event, nobody draining.
    let (tx, mut rx) = mpsc::channel(1);
    let backlog = Event::RequestShipped {
        request_id: Uuid::new_v4(),
        code: "REQ-20250101-0001".into(),
        branch_id: ctx.branch.id,
    };
    tx.try_send(backlog.clone()).unwrap();
    let requests = RequestService::new(ctx.state.db.clone(), EventSender::new(tx));

    let approved = tokio::time::timeout(
        Duration::from_secs(2),
        requests.approve(&ctx.central, created.request.id, vec![]),
    )
    .await
    .expect("approval must not wait for channel capacity")
    .expect("approve");
    assert_eq!(approved.request.status, RequestStatus::Approved);

    assert_eq!(rx.recv().await, Some(backlog));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unaddressable_pages_are_rejected() {
    let ctx = TestContext::new().await;
    ctx.create_request(&[(ctx.rice.id, dec!(1))]).await;

    assert_matches!(
        ctx.services()
            .requests
            .find_all(&ctx.central, RequestFilter::default(), PageRequest::new(u64::MAX, 100))
            .await,
        Err(ServiceError::InvalidInput(_))
    );

    let far = ctx
        .services()
        .requests
        .find_all(&ctx.central, RequestFilter::default(), PageRequest::new(1_000, 100))
        .await
        .unwrap();
    assert!(far.data.is_empty());
    assert_eq!(far.meta.total, 1);
}
