//! Services module for laundry-service.

pub mod database;
pub mod features;
pub mod loyalty;
pub mod metrics;
pub mod notifier;
pub mod pos;

pub use database::{Database, PaymentOutcome, StatusChange};
pub use features::{AllFeaturesEnabled, BranchFeatures, DisabledFeatures, Feature};
pub use loyalty::{LoyaltyAwarder, PointsAwarder};
pub use metrics::{
    get_metrics, init_metrics, record_duplicate_payment, record_error, record_payment,
    record_reconciliation, record_side_effect_failure,
};
pub use notifier::{HttpNotifier, MockNotifier, NoopNotifier, Notifier, NotifyError};
pub use pos::{CollectOutcome, CreatedReceipt, PosService, ReceiveOutcome, StatusUpdate};
