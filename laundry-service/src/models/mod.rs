//! Domain models for laundry-service.

mod actor;
mod audit;
mod cash;
mod order;
mod transaction;

pub use actor::{Actor, Role};
pub use audit::{AuditAction, NewAuditEntry, PaymentAuditEntry};
pub use cash::{
    BankDeposit, DailyCashReport, DailyCashSummary, Expense, ManualAdjustments, NewBankDeposit,
    NewExpense, PaymentSource, ReconcileOutcome, SummaryState,
};
pub use order::{
    CreateReceipt, NewOrderLine, OrderLine, OrderRow, OrderStatus, PaymentMethod, PaymentStatus,
};
pub use transaction::{NewTransaction, Transaction, TransactionType};
