//! Integration tests for receipt intake, collection and payment receipt.

mod common;

use common::{create_receipt, d, line, spawn_pos, unpaid_receipt};
use laundry_service::domain::ProposedPayment;
use laundry_service::models::{
    Actor, CreateReceipt, OrderLine, OrderStatus, PaymentMethod, PaymentStatus, TransactionType,
};
use service_core::error::AppError;
use uuid::Uuid;

fn line_with_total<'a>(lines: &'a [OrderLine], total: &str) -> &'a OrderLine {
    lines
        .iter()
        .find(|l| l.total_amount == d(total))
        .expect("line with total")
}

fn pay(amount: &str, method: PaymentMethod) -> ProposedPayment {
    ProposedPayment {
        amount: d(amount),
        method,
    }
}

#[tokio::test]
async fn create_receipt_groups_lines_under_one_number() {
    let Some(t) = spawn_pos().await else { return };

    let created = unpaid_receipt(&t).await;

    assert!(created.receipt.receipt_number.starts_with("TST-"));
    assert_eq!(created.receipt.lines.len(), 2);
    assert_eq!(created.receipt.receipt_total, d("3000"));
    assert_eq!(created.receipt.balance_due, d("3000"));
    assert_eq!(created.receipt.payment_status, PaymentStatus::NotPaid);
    assert_eq!(created.receipt.branch_id, Some(t.branch_id));
    assert!(created.transaction.is_none(), "nothing paid, no ledger entry");
    assert!(created
        .receipt
        .lines
        .iter()
        .all(|l| l.status == OrderStatus::Pending));
}

#[tokio::test]
async fn create_receipt_with_money_writes_one_payment_entry() {
    let Some(t) = spawn_pos().await else { return };

    let created = create_receipt(
        &t,
        PaymentMethod::Cash,
        vec![
            line("1000", "1000", PaymentStatus::PaidFull),
            line("2000", "500", PaymentStatus::Advance),
        ],
    )
    .await;

    let tx = created.transaction.expect("ledger entry");
    assert_eq!(tx.parsed_type(), Some(TransactionType::Payment));
    assert_eq!(tx.amount, d("1500"));
    assert_eq!(created.receipt.receipt_paid, d("1500"));
    assert_eq!(created.receipt.payment_status, PaymentStatus::Advance);
}

#[tokio::test]
async fn create_receipt_rejects_inconsistent_lines() {
    let Some(t) = spawn_pos().await else { return };

    let result = t
        .pos
        .create_receipt(
            &t.staff(),
            CreateReceipt {
                customer_id: Uuid::new_v4(),
                payment_method: PaymentMethod::Cash,
                lines: vec![
                    line("1000", "0", PaymentStatus::NotPaid),
                    line("2000", "1500", PaymentStatus::PaidFull),
                ],
            },
        )
        .await;

    match result {
        Err(AppError::BadRequest(e)) => {
            let message = e.to_string();
            assert!(message.starts_with("Line 2:"), "{}", message);
            assert!(message.contains("paid_full_matches_total"), "{}", message);
        }
        other => panic!("expected BadRequest, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn create_receipt_needs_a_concrete_branch() {
    let Some(t) = spawn_pos().await else { return };

    let result = t
        .pos
        .create_receipt(
            &Actor::admin("root", None),
            CreateReceipt {
                customer_id: Uuid::new_v4(),
                payment_method: PaymentMethod::Cash,
                lines: vec![line("1000", "0", PaymentStatus::NotPaid)],
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::BranchScope(_))));
}

#[tokio::test]
async fn collect_with_full_balance_settles_every_line() {
    let Some(t) = spawn_pos().await else { return };
    let created = unpaid_receipt(&t).await;
    let number = created.receipt.receipt_number.clone();

    let outcome = t
        .pos
        .collect(
            &t.staff(),
            &number,
            Some(pay("3000", PaymentMethod::MobileMoney)),
        )
        .await
        .unwrap();

    assert!(outcome.receipt.collected);
    assert_eq!(outcome.receipt.payment_status, PaymentStatus::PaidFull);
    assert_eq!(outcome.receipt.balance_due, d("0"));
    for l in &outcome.receipt.lines {
        assert_eq!(l.paid_amount, l.total_amount);
        assert_eq!(l.status, OrderStatus::Collected);
        assert_eq!(l.payment_method, PaymentMethod::MobileMoney);
        assert!(l.collected_date.is_some());
    }

    let tx = outcome.transaction.expect("ledger entry");
    assert_eq!(tx.parsed_type(), Some(TransactionType::PaymentReceived));
    assert_eq!(tx.amount, d("3000"));

    assert_eq!(outcome.loyalty_points, Some(30));
    assert!(outcome.notification_sent);
    assert_eq!(t.notifier.send_count(), 1);

    let first = line_with_total(&outcome.receipt.lines, "1000");
    let trail = t
        .pos
        .order_audit_trail(&t.staff(), first.order_id)
        .await
        .unwrap();
    let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["created", "collected"]);
    let collected = &trail[1];
    assert_eq!(collected.old_paid_amount, Some(d("0")));
    assert_eq!(collected.new_paid_amount, Some(d("1000")));
    assert!(collected
        .notes
        .as_deref()
        .unwrap_or_default()
        .contains(&tx.transaction_id.to_string()));
}

#[tokio::test]
async fn partial_collection_spreads_the_payment_proportionally() {
    let Some(t) = spawn_pos().await else { return };
    let created = unpaid_receipt(&t).await;

    let outcome = t
        .pos
        .collect(
            &t.staff(),
            &created.receipt.receipt_number,
            Some(pay("1500", PaymentMethod::Cash)),
        )
        .await
        .unwrap();

    assert!(outcome.receipt.collected);
    assert_eq!(outcome.receipt.payment_status, PaymentStatus::Advance);
    assert_eq!(outcome.receipt.receipt_paid, d("1500"));
    assert_eq!(outcome.receipt.balance_due, d("1500"));
    assert_eq!(
        line_with_total(&outcome.receipt.lines, "1000").paid_amount,
        d("500")
    );
    assert_eq!(
        line_with_total(&outcome.receipt.lines, "2000").paid_amount,
        d("1000")
    );
    assert_eq!(outcome.loyalty_points, None, "only full payment earns points");
}

#[tokio::test]
async fn collect_without_payment_requires_a_settled_receipt() {
    let Some(t) = spawn_pos().await else { return };
    let created = unpaid_receipt(&t).await;
    let number = created.receipt.receipt_number.clone();

    let result = t.pos.collect(&t.staff(), &number, None).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let settled = create_receipt(
        &t,
        PaymentMethod::Cash,
        vec![line("800", "800", PaymentStatus::PaidFull)],
    )
    .await;
    let outcome = t
        .pos
        .collect(&t.staff(), &settled.receipt.receipt_number, None)
        .await
        .unwrap();
    assert!(outcome.receipt.collected);
    assert!(outcome.transaction.is_none());
}

#[tokio::test]
async fn overpayment_is_a_conflict_and_writes_nothing() {
    let Some(t) = spawn_pos().await else { return };
    let created = unpaid_receipt(&t).await;
    let number = created.receipt.receipt_number.clone();

    let result = t
        .pos
        .collect(&t.staff(), &number, Some(pay("3500", PaymentMethod::Cash)))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let receipt = t.pos.get_receipt(&t.staff(), &number).await.unwrap();
    assert!(!receipt.collected);
    assert_eq!(receipt.receipt_paid, d("0"));
}

#[tokio::test]
async fn second_collection_is_a_conflict() {
    let Some(t) = spawn_pos().await else { return };
    let created = unpaid_receipt(&t).await;
    let number = created.receipt.receipt_number.clone();

    t.pos
        .collect(&t.staff(), &number, Some(pay("3000", PaymentMethod::Cash)))
        .await
        .unwrap();
    let again = t.pos.collect(&t.staff(), &number, None).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn receive_payment_settles_without_collecting() {
    let Some(t) = spawn_pos().await else { return };
    let created = unpaid_receipt(&t).await;
    let number = created.receipt.receipt_number.clone();

    let outcome = t
        .pos
        .receive_payment(&t.staff(), &number, pay("3000", PaymentMethod::Card))
        .await
        .unwrap();

    assert_eq!(outcome.receipt.payment_status, PaymentStatus::PaidFull);
    assert!(!outcome.receipt.collected);
    assert!(outcome
        .receipt
        .lines
        .iter()
        .all(|l| l.status == OrderStatus::Pending));
    assert_eq!(outcome.transaction.map(|tx| tx.amount), Some(d("3000")));

    // Nothing left to pay: a second attempt conflicts, collection works.
    let again = t
        .pos
        .receive_payment(&t.staff(), &number, pay("3000", PaymentMethod::Card))
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let collected = t.pos.collect(&t.staff(), &number, None).await.unwrap();
    assert!(collected.receipt.collected);
    assert!(collected.transaction.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simultaneous_payments_settle_the_receipt_once() {
    let Some(t) = spawn_pos().await else { return };
    let created = unpaid_receipt(&t).await;
    let number = created.receipt.receipt_number.clone();
    let order_ids: Vec<Uuid> = created.receipt.lines.iter().map(|l| l.order_id).collect();

    let actor = t.staff();
    let (first, second) = tokio::join!(
        t.pos
            .receive_payment(&actor, &number, pay("3000", PaymentMethod::Cash)),
        t.pos
            .receive_payment(&actor, &number, pay("3000", PaymentMethod::Cash)),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(AppError::Conflict(_))))
            .count(),
        1
    );

    let received = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM transactions WHERE order_id = ANY($1) AND transaction_type = $2",
    )
    .bind(&order_ids)
    .bind(TransactionType::PaymentReceived.as_str())
    .fetch_one(t.db.pool())
    .await
    .unwrap();
    assert_eq!(received, 1);

    let receipt = t.pos.get_receipt(&t.staff(), &number).await.unwrap();
    assert_eq!(receipt.receipt_paid, d("3000"));
    assert_eq!(line_with_total(&receipt.lines, "1000").paid_amount, d("1000"));
    assert_eq!(line_with_total(&receipt.lines, "2000").paid_amount, d("2000"));
}

#[tokio::test]
async fn receive_payment_must_cover_the_balance() {
    let Some(t) = spawn_pos().await else { return };
    let created = unpaid_receipt(&t).await;

    let short = t
        .pos
        .receive_payment(
            &t.staff(),
            &created.receipt.receipt_number,
            pay("2999", PaymentMethod::Cash),
        )
        .await;
    assert!(matches!(short, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn matching_payment_inside_the_window_is_rejected_as_duplicate() {
    let Some(t) = spawn_pos().await else { return };
    let created = unpaid_receipt(&t).await;
    let number = created.receipt.receipt_number.clone();

    // A payment for the same lines and amount recorded moments ago, e.g. by
    // a second till that raced this one.
    for l in &created.receipt.lines {
        sqlx::query(
            r#"
            INSERT INTO transactions (transaction_id, order_id, transaction_type, amount, payment_method, branch_id, created_by)
            VALUES ($1, $2, 'payment_received', $3, 'cash', $4, 'other-till')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(l.order_id)
        .bind(d("3000"))
        .bind(t.branch_id)
        .execute(t.db.pool())
        .await
        .unwrap();
    }

    let result = t
        .pos
        .receive_payment(&t.staff(), &number, pay("3000", PaymentMethod::Cash))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let receipt = t.pos.get_receipt(&t.staff(), &number).await.unwrap();
    assert_eq!(receipt.receipt_paid, d("0"), "rejected payment wrote nothing");
}

#[tokio::test]
async fn status_moves_forward_and_notifies_when_ready() {
    let Some(t) = spawn_pos().await else { return };
    let created = unpaid_receipt(&t).await;
    let order_id = created.receipt.lines[0].order_id;

    let processing = t
        .pos
        .update_order_status(&t.staff(), order_id, OrderStatus::Processing)
        .await
        .unwrap();
    assert_eq!(processing.previous, OrderStatus::Pending);
    assert!(!processing.notification_sent);

    let ready = t
        .pos
        .update_order_status(&t.staff(), order_id, OrderStatus::Ready)
        .await
        .unwrap();
    assert_eq!(ready.line.status, OrderStatus::Ready);
    assert!(ready.line.ready_date.is_some());
    assert!(ready.notification_sent);
    assert!(!ready.adopted);

    let backwards = t
        .pos
        .update_order_status(&t.staff(), order_id, OrderStatus::Processing)
        .await;
    assert!(matches!(backwards, Err(AppError::Conflict(_))));

    let to_collected = t
        .pos
        .update_order_status(&t.staff(), order_id, OrderStatus::Collected)
        .await;
    assert!(matches!(to_collected, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn failed_notification_does_not_undo_collection() {
    let Some(t) = common::spawn_pos_with(
        true,
        std::sync::Arc::new(laundry_service::services::AllFeaturesEnabled),
    )
    .await
    else {
        return;
    };
    let created = unpaid_receipt(&t).await;

    let outcome = t
        .pos
        .collect(
            &t.staff(),
            &created.receipt.receipt_number,
            Some(pay("3000", PaymentMethod::Cash)),
        )
        .await
        .unwrap();

    assert!(!outcome.notification_sent);
    assert!(outcome.receipt.collected);
}

#[tokio::test]
async fn integrity_audit_is_clean_after_normal_flow() {
    let Some(t) = spawn_pos().await else { return };
    let created = unpaid_receipt(&t).await;
    t.pos
        .collect(
            &t.staff(),
            &created.receipt.receipt_number,
            Some(pay("1200", PaymentMethod::Cash)),
        )
        .await
        .unwrap();

    let warnings = t.pos.audit_integrity(&t.staff(), None).await.unwrap();
    assert!(
        warnings
            .iter()
            .all(|w| w.receipt_number != created.receipt.receipt_number),
        "{:?}",
        warnings
    );
}
