//! Point-of-sale operations.
//!
//! Every operation resolves the actor's branch scope, checks the branch
//! feature switch, runs the database work, and only after commit dispatches
//! the best-effort side effects (loyalty, notifications).

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::database::{Database, PaymentOutcome};
use super::features::{BranchFeatures, Feature};
use super::loyalty::LoyaltyAwarder;
use super::metrics::{
    record_error, record_payment, record_reconciliation, record_side_effect_failure,
};
use super::notifier::Notifier;
use crate::domain::receipt::validate_new_receipt;
use crate::domain::{
    BranchScope, BusinessCalendar, DuplicateWindow, IntegrityWarning, ProposedPayment,
    ReceiptNumberGenerator, ReceiptSummary,
};
use crate::models::{
    Actor, BankDeposit, CreateReceipt, DailyCashReport, DailyCashSummary, Expense,
    ManualAdjustments, NewBankDeposit, NewExpense, OrderLine, OrderStatus, PaymentAuditEntry,
    ReconcileOutcome, Transaction,
};

#[derive(Debug, Clone, Serialize)]
pub struct CreatedReceipt {
    pub receipt: ReceiptSummary,
    pub transaction: Option<Transaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectOutcome {
    pub receipt: ReceiptSummary,
    pub transaction: Option<Transaction>,
    /// Points granted, `None` when no award was due or the award failed.
    pub loyalty_points: Option<i64>,
    pub notification_sent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiveOutcome {
    pub receipt: ReceiptSummary,
    pub transaction: Option<Transaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub line: OrderLine,
    pub previous: OrderStatus,
    pub adopted: bool,
    /// Only a move to `ready` sends a notification.
    pub notification_sent: bool,
}

fn track<T>(operation: &str, result: Result<T, AppError>) -> Result<T, AppError> {
    if let Err(e) = &result {
        record_error(e.kind());
        warn!(operation, error = %e, "Operation failed");
    }
    result
}

fn require_positive(field: &str, amount: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must be greater than zero (got {})",
            field,
            amount
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct PosService {
    db: Arc<Database>,
    notifier: Arc<dyn Notifier>,
    loyalty: Arc<dyn LoyaltyAwarder>,
    features: Arc<dyn BranchFeatures>,
    calendar: BusinessCalendar,
    receipt_numbers: ReceiptNumberGenerator,
    duplicate_window: DuplicateWindow,
}

impl PosService {
    pub fn new(
        db: Arc<Database>,
        notifier: Arc<dyn Notifier>,
        loyalty: Arc<dyn LoyaltyAwarder>,
        features: Arc<dyn BranchFeatures>,
        calendar: BusinessCalendar,
        receipt_numbers: ReceiptNumberGenerator,
    ) -> Self {
        Self {
            db,
            notifier,
            loyalty,
            features,
            calendar,
            receipt_numbers,
            duplicate_window: DuplicateWindow::default(),
        }
    }

    /// Scope plus feature check, shared by every entry point. An unpinned
    /// elevated actor only passes the global switches here; writes against a
    /// stored row are checked again on that row's branch.
    fn authorize(&self, actor: &Actor, feature: Feature) -> Result<BranchScope, AppError> {
        let scope = BranchScope::resolve(actor)?;
        self.features.require(scope.filter(), feature)?;
        Ok(scope)
    }

    fn day_or_today(&self, day: Option<NaiveDate>) -> NaiveDate {
        day.unwrap_or_else(|| self.calendar.day_of(Utc::now()))
    }

    // =========================================================================
    // Receipts
    // =========================================================================

    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn create_receipt(
        &self,
        actor: &Actor,
        request: CreateReceipt,
    ) -> Result<CreatedReceipt, AppError> {
        let result: Result<_, AppError> = async {
            request.validate()?;
            let scope = self.authorize(actor, Feature::CreateReceipt)?;
            let branch_id = scope.require_branch()?;
            let paid_total = validate_new_receipt(&request)?;

            let (receipt, transaction) = self
                .db
                .create_receipt(
                    branch_id,
                    &actor.user_id,
                    &request,
                    paid_total,
                    &self.receipt_numbers,
                    self.calendar.day_of(Utc::now()),
                )
                .await?;

            Ok(CreatedReceipt {
                receipt: receipt.summary(),
                transaction,
            })
        }
        .await;

        record_payment("create", if result.is_ok() { "success" } else { "error" });
        track("create_receipt", result)
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get_receipt(
        &self,
        actor: &Actor,
        receipt_number: &str,
    ) -> Result<ReceiptSummary, AppError> {
        let result: Result<_, AppError> = async {
            let scope = BranchScope::resolve(actor)?;
            Ok(self.db.get_receipt(&scope, receipt_number).await?.summary())
        }
        .await;
        track("get_receipt", result)
    }

    /// Collect every line of a receipt, optionally taking a payment first.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn collect(
        &self,
        actor: &Actor,
        receipt_number: &str,
        payment: Option<ProposedPayment>,
    ) -> Result<CollectOutcome, AppError> {
        let result: Result<_, AppError> = async {
            let scope = self.authorize(actor, Feature::Collect)?;
            self.db
                .apply_payment(
                    &scope,
                    receipt_number,
                    &actor.user_id,
                    &self.duplicate_window,
                    |receipt| {
                        self.features.require(receipt.branch_id(), Feature::Collect)?;
                        receipt.plan_collect(payment)
                    },
                )
                .await
        }
        .await;

        record_payment("collect", if result.is_ok() { "success" } else { "error" });
        let PaymentOutcome {
            plan,
            receipt,
            transaction,
        } = track("collect", result)?;

        let loyalty_points = if plan.awards_loyalty() {
            match self
                .loyalty
                .award(plan.customer_id, plan.anchor_order_id, plan.receipt_total)
                .await
            {
                Ok(points) => Some(points),
                Err(e) => {
                    record_side_effect_failure("loyalty");
                    warn!(error = %e, receipt_number = %receipt_number, "Loyalty award failed");
                    None
                }
            }
        } else {
            None
        };

        let notification_sent = match self.notifier.send_collection_notification(&receipt).await {
            Ok(()) => true,
            Err(e) => {
                record_side_effect_failure("collection_notification");
                warn!(error = %e, receipt_number = %receipt_number, "Collection notification not sent");
                false
            }
        };

        info!(
            receipt_number = %receipt_number,
            payment_status = %receipt.payment_status,
            "Receipt collected"
        );

        Ok(CollectOutcome {
            receipt,
            transaction,
            loyalty_points,
            notification_sent,
        })
    }

    /// Settle the full balance of a receipt without collecting it.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn receive_payment(
        &self,
        actor: &Actor,
        receipt_number: &str,
        payment: ProposedPayment,
    ) -> Result<ReceiveOutcome, AppError> {
        let result: Result<_, AppError> = async {
            let scope = self.authorize(actor, Feature::ReceivePayment)?;
            self.db
                .apply_payment(
                    &scope,
                    receipt_number,
                    &actor.user_id,
                    &self.duplicate_window,
                    |receipt| {
                        self.features
                            .require(receipt.branch_id(), Feature::ReceivePayment)?;
                        receipt.plan_receive_payment(payment)
                    },
                )
                .await
        }
        .await;

        record_payment(
            "receive_payment",
            if result.is_ok() { "success" } else { "error" },
        );
        let outcome = track("receive_payment", result)?;

        Ok(ReceiveOutcome {
            receipt: outcome.receipt,
            transaction: outcome.transaction,
        })
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn update_order_status(
        &self,
        actor: &Actor,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<StatusUpdate, AppError> {
        let result: Result<_, AppError> = async {
            let scope = self.authorize(actor, Feature::UpdateStatus)?;
            self.db
                .update_order_status(&scope, order_id, status, &actor.user_id, |branch_id| {
                    self.features.require(branch_id, Feature::UpdateStatus)
                })
                .await
        }
        .await;
        let change = track("update_order_status", result)?;

        let notification_sent = if change.line.status == OrderStatus::Ready {
            match self.notifier.send_ready_notification(&change.line).await {
                Ok(()) => true,
                Err(e) => {
                    record_side_effect_failure("ready_notification");
                    warn!(error = %e, order_id = %order_id, "Ready notification not sent");
                    false
                }
            }
        } else {
            false
        };

        Ok(StatusUpdate {
            line: change.line,
            previous: change.previous,
            adopted: change.adopted,
            notification_sent,
        })
    }

    // =========================================================================
    // Audit
    // =========================================================================

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn order_audit_trail(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<Vec<PaymentAuditEntry>, AppError> {
        let result: Result<_, AppError> = async {
            let scope = BranchScope::resolve(actor)?;
            self.db.order_audit_trail(&scope, order_id).await
        }
        .await;
        track("order_audit_trail", result)
    }

    /// Ledger versus line figures for receipts ordered on one business day.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn audit_integrity(
        &self,
        actor: &Actor,
        day: Option<NaiveDate>,
    ) -> Result<Vec<IntegrityWarning>, AppError> {
        let result: Result<_, AppError> = async {
            let scope = BranchScope::resolve(actor)?;
            let (from, to) = self.calendar.day_range(self.day_or_today(day))?;
            self.db.audit_integrity(&scope, from, to).await
        }
        .await;
        track("audit_integrity", result)
    }

    // =========================================================================
    // Daily cash
    // =========================================================================

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn daily_cash_report(
        &self,
        actor: &Actor,
        day: Option<NaiveDate>,
    ) -> Result<DailyCashReport, AppError> {
        let result: Result<_, AppError> = async {
            let scope = self.authorize(actor, Feature::CashSummary)?;
            let branch_id = scope.require_branch()?;
            self.db
                .daily_cash_report(&self.calendar, branch_id, self.day_or_today(day))
                .await
        }
        .await;
        track("daily_cash_report", result)
    }

    #[instrument(skip(self, actor, adjustments), fields(user_id = %actor.user_id))]
    pub async fn save_daily_summary(
        &self,
        actor: &Actor,
        day: Option<NaiveDate>,
        adjustments: ManualAdjustments,
    ) -> Result<DailyCashSummary, AppError> {
        let result: Result<_, AppError> = async {
            adjustments.validate()?;
            let scope = self.authorize(actor, Feature::CashSummary)?;
            let branch_id = scope.require_branch()?;
            self.db
                .save_daily_summary(
                    &self.calendar,
                    branch_id,
                    self.day_or_today(day),
                    &adjustments,
                    &actor.user_id,
                )
                .await
        }
        .await;

        record_reconciliation("save", if result.is_ok() { "success" } else { "error" });
        track("save_daily_summary", result)
    }

    /// Reconcile a branch-day and send the closing report. The report is
    /// best-effort: `report_sent = false` does not undo the reconciliation.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn reconcile_day(
        &self,
        actor: &Actor,
        day: Option<NaiveDate>,
    ) -> Result<ReconcileOutcome, AppError> {
        let result: Result<_, AppError> = async {
            let scope = self.authorize(actor, Feature::Reconcile)?;
            let branch_id = scope.require_branch()?;
            self.db
                .reconcile_day(
                    &self.calendar,
                    branch_id,
                    self.day_or_today(day),
                    &actor.user_id,
                )
                .await
        }
        .await;

        record_reconciliation("reconcile", if result.is_ok() { "success" } else { "error" });
        let summary = track("reconcile_day", result)?;

        let report_sent = match self.notifier.send_daily_closing_report(&summary).await {
            Ok(()) => true,
            Err(e) => {
                record_side_effect_failure("daily_closing_report");
                warn!(
                    error = %e,
                    branch_id = %summary.branch_id,
                    summary_date = %summary.summary_date,
                    "Daily closing report not sent"
                );
                false
            }
        };

        Ok(ReconcileOutcome {
            summary,
            report_sent,
        })
    }

    #[instrument(skip(self, actor, expense), fields(user_id = %actor.user_id))]
    pub async fn record_expense(
        &self,
        actor: &Actor,
        expense: NewExpense,
    ) -> Result<Expense, AppError> {
        let result: Result<_, AppError> = async {
            expense.validate()?;
            require_positive("amount", expense.amount)?;
            let scope = self.authorize(actor, Feature::Expenses)?;
            let branch_id = scope.require_branch()?;
            self.db
                .record_expense(branch_id, &expense, &actor.user_id)
                .await
        }
        .await;
        track("record_expense", result)
    }

    #[instrument(skip(self, actor, deposit), fields(user_id = %actor.user_id))]
    pub async fn record_bank_deposit(
        &self,
        actor: &Actor,
        deposit: NewBankDeposit,
    ) -> Result<BankDeposit, AppError> {
        let result: Result<_, AppError> = async {
            deposit.validate()?;
            require_positive("amount", deposit.amount)?;
            let scope = self.authorize(actor, Feature::BankDeposits)?;
            let branch_id = scope.require_branch()?;
            self.db
                .record_bank_deposit(branch_id, &deposit, &actor.user_id)
                .await
        }
        .await;
        track("record_bank_deposit", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert!(require_positive("amount", Decimal::ONE).is_ok());
        assert!(matches!(
            require_positive("amount", Decimal::ZERO),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            require_positive("amount", Decimal::NEGATIVE_ONE),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn track_passes_results_through() {
        assert_eq!(track("op", Ok::<_, AppError>(7)).unwrap(), 7);
        assert!(track::<()>("op", Err(AppError::Conflict(anyhow::anyhow!("x")))).is_err());
    }
}
