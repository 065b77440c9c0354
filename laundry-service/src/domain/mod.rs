//! Pure business rules. Nothing here touches the database.

pub mod branch;
pub mod cash;
pub mod duplicate;
pub mod integrity;
pub mod money;
pub mod receipt;
pub mod receipt_number;
pub mod validator;

pub use branch::BranchScope;
pub use cash::{BusinessCalendar, CashInputs, CashPosition};
pub use duplicate::DuplicateWindow;
pub use integrity::IntegrityWarning;
pub use receipt::{PaymentPlan, ProposedPayment, Receipt, ReceiptSummary};
pub use receipt_number::ReceiptNumberGenerator;
