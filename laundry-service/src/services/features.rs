//! Per-branch feature switches, checked before any core operation runs.

use service_core::error::AppError;
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    CreateReceipt,
    Collect,
    ReceivePayment,
    UpdateStatus,
    CashSummary,
    Reconcile,
    Expenses,
    BankDeposits,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateReceipt => "laundry.receipt:create",
            Self::Collect => "laundry.receipt:collect",
            Self::ReceivePayment => "laundry.payment:receive",
            Self::UpdateStatus => "laundry.order:status",
            Self::CashSummary => "laundry.cash:summary",
            Self::Reconcile => "laundry.cash:reconcile",
            Self::Expenses => "laundry.cash:expense",
            Self::BankDeposits => "laundry.cash:deposit",
        }
    }

    const ALL: [Feature; 8] = [
        Self::CreateReceipt,
        Self::Collect,
        Self::ReceivePayment,
        Self::UpdateStatus,
        Self::CashSummary,
        Self::Reconcile,
        Self::Expenses,
        Self::BankDeposits,
    ];
}

impl FromStr for Feature {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("Unknown feature '{}'", s)))
    }
}

pub trait BranchFeatures: Send + Sync {
    /// `branch_id` is `None` when no branch is known: an unpinned elevated
    /// actor before a row is loaded, or a legacy line.
    fn is_enabled(&self, branch_id: Option<Uuid>, feature: Feature) -> bool;

    fn require(&self, branch_id: Option<Uuid>, feature: Feature) -> Result<(), AppError> {
        if self.is_enabled(branch_id, feature) {
            return Ok(());
        }
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Feature {} is disabled for this branch",
            feature.as_str()
        )))
    }
}

pub struct AllFeaturesEnabled;

impl BranchFeatures for AllFeaturesEnabled {
    fn is_enabled(&self, _branch_id: Option<Uuid>, _feature: Feature) -> bool {
        true
    }
}

/// Switches parsed from `DISABLED_BRANCH_FEATURES`: comma-separated
/// `<branch uuid>=<feature>` pairs, with `*` standing for every branch.
#[derive(Debug, Default)]
pub struct DisabledFeatures {
    everywhere: HashSet<Feature>,
    per_branch: HashSet<(Uuid, Feature)>,
}

impl DisabledFeatures {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        let mut disabled = Self::default();

        for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (branch, feature) = pair.split_once('=').ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "Expected <branch>=<feature>, got '{}'",
                    pair
                ))
            })?;
            let feature: Feature = feature.trim().parse()?;

            match branch.trim() {
                "*" => {
                    disabled.everywhere.insert(feature);
                }
                id => {
                    let branch_id = Uuid::parse_str(id).map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("Invalid branch id '{}': {}", id, e))
                    })?;
                    disabled.per_branch.insert((branch_id, feature));
                }
            }
        }

        Ok(disabled)
    }
}

impl BranchFeatures for DisabledFeatures {
    fn is_enabled(&self, branch_id: Option<Uuid>, feature: Feature) -> bool {
        if self.everywhere.contains(&feature) {
            return false;
        }
        match branch_id {
            Some(id) => !self.per_branch.contains(&(id, feature)),
            None => true,
        }
    }
}
