use domain::value_objects::{
    enums::subscription_statuses::SubscriptionStatus,
    subscription_lifecycle::{LifecycleAction, LifecycleViolation},
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AccountingError {
    #[error("plan {0} not found")]
    PlanNotFound(Uuid),
    #[error("subscription {0} not found")]
    SubscriptionNotFound(Uuid),
    #[error("cannot {action} a subscription that is {from}")]
    InvalidStateTransition {
        from: SubscriptionStatus,
        action: LifecycleAction,
    },
    #[error("session quota exhausted ({used}/{total})")]
    QuotaExhausted { used: i32, total: i32 },
    #[error("no consumed session to restore")]
    NothingToRestore,
    #[error("upgrade credit mismatch: supplied {supplied_minor}, computed {computed_minor}")]
    CreditMismatch {
        supplied_minor: i64,
        computed_minor: i64,
    },
    #[error("payment {0} is already recorded with a different subscription or amount")]
    PaymentIdConflict(Uuid),
    #[error("{0} was modified concurrently, retry the operation")]
    ConcurrencyConflict(Uuid),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    PersistenceFailure(#[from] anyhow::Error),
}

impl From<LifecycleViolation> for AccountingError {
    fn from(value: LifecycleViolation) -> Self {
        match value {
            LifecycleViolation::InvalidTransition { from, action } => {
                AccountingError::InvalidStateTransition { from, action }
            }
            LifecycleViolation::QuotaExhausted { used, total } => {
                AccountingError::QuotaExhausted { used, total }
            }
            LifecycleViolation::NothingToRestore => AccountingError::NothingToRestore,
        }
    }
}

pub type AccountingResult<T> = std::result::Result<T, AccountingError>;
