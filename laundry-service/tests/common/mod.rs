//! Common test utilities for laundry-service integration tests.
//!
//! Tests run against the Postgres at `TEST_DATABASE_URL`. When it is unset
//! [`spawn_pos`] returns `None` and the calling test returns early.

#![allow(dead_code)]

use laundry_service::domain::{BusinessCalendar, ReceiptNumberGenerator};
use laundry_service::models::{
    Actor, CreateReceipt, NewOrderLine, PaymentMethod, PaymentStatus,
};
use laundry_service::services::{
    AllFeaturesEnabled, BranchFeatures, CreatedReceipt, Database, MockNotifier, Notifier,
    PointsAwarder, PosService,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,laundry_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub struct TestPos {
    pub pos: PosService,
    pub db: Arc<Database>,
    pub notifier: Arc<MockNotifier>,
    /// Fresh branch per test, so tests never share a cash day.
    pub branch_id: Uuid,
}

impl TestPos {
    pub fn staff(&self) -> Actor {
        Actor::staff("clerk", self.branch_id)
    }

    pub fn manager(&self) -> Actor {
        let mut actor = Actor::staff("manager", self.branch_id);
        actor.role = laundry_service::models::Role::Manager;
        actor
    }
}

pub async fn spawn_pos() -> Option<TestPos> {
    spawn_pos_with(false, Arc::new(AllFeaturesEnabled)).await
}

/// Build the facade with a mock notifier (optionally failing) and the given
/// feature switches.
pub async fn spawn_pos_with(
    notifier_fails: bool,
    features: Arc<dyn BranchFeatures>,
) -> Option<TestPos> {
    init_tracing();

    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set - skipping database test");
        return None;
    };

    let db = Database::new(&database_url, 2, 1)
        .await
        .expect("Failed to connect to test database");
    db.run_migrations()
        .await
        .expect("Failed to run migrations");
    let db = Arc::new(db);

    let notifier = Arc::new(MockNotifier::new(notifier_fails));
    let loyalty = Arc::new(PointsAwarder::new(db.pool().clone(), Decimal::ONE_HUNDRED));

    let pos = PosService::new(
        db.clone(),
        notifier.clone() as Arc<dyn Notifier>,
        loyalty,
        features,
        BusinessCalendar::utc(),
        ReceiptNumberGenerator::new("TST"),
    );

    Some(TestPos {
        pos,
        db,
        notifier,
        branch_id: Uuid::new_v4(),
    })
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn line(total: &str, paid: &str, status: PaymentStatus) -> NewOrderLine {
    NewOrderLine {
        description: "Wash & fold".to_string(),
        total_amount: d(total),
        paid_amount: d(paid),
        payment_status: status,
    }
}

/// Create a receipt as staff of the test branch.
pub async fn create_receipt(
    t: &TestPos,
    method: PaymentMethod,
    lines: Vec<NewOrderLine>,
) -> CreatedReceipt {
    t.pos
        .create_receipt(
            &t.staff(),
            CreateReceipt {
                customer_id: Uuid::new_v4(),
                payment_method: method,
                lines,
            },
        )
        .await
        .expect("Failed to create receipt")
}

/// A two-line receipt (1000 + 2000) with nothing paid.
pub async fn unpaid_receipt(t: &TestPos) -> CreatedReceipt {
    create_receipt(
        t,
        PaymentMethod::Cash,
        vec![
            line("1000", "0", PaymentStatus::NotPaid),
            line("2000", "0", PaymentStatus::NotPaid),
        ],
    )
    .await
}
