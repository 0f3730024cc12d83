//! Guarded transitions for a member subscription.
//!
//! Status is never inferred from counters at call sites: every status change
//! goes through one of the functions here.
//!
//! - `active -> expired` only through quota exhaustion ([`consume_session`])
//! - `expired -> active` only when a restore takes a full quota back below the limit
//! - `active <-> paused` only through [`SubscriptionStatus::pause`] / [`SubscriptionStatus::resume`]
//! - `active | paused -> cancelled` through [`SubscriptionStatus::cancel`]

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::enums::subscription_statuses::SubscriptionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Pause,
    Resume,
    Cancel,
    Upgrade,
    ConsumeSession,
}

impl Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = match self {
            LifecycleAction::Pause => "pause",
            LifecycleAction::Resume => "resume",
            LifecycleAction::Cancel => "cancel",
            LifecycleAction::Upgrade => "upgrade",
            LifecycleAction::ConsumeSession => "consume a session of",
        };
        f.write_str(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleViolation {
    #[error("cannot {action} a subscription that is {from}")]
    InvalidTransition {
        from: SubscriptionStatus,
        action: LifecycleAction,
    },
    #[error("session quota exhausted ({used}/{total})")]
    QuotaExhausted { used: i32, total: i32 },
    #[error("no consumed session to restore")]
    NothingToRestore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionQuota {
    pub used: i32,
    pub total: i32,
}

impl SessionQuota {
    pub fn remaining(&self) -> i32 {
        (self.total - self.used).max(0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.total
    }
}

/// Counter and status to write back after a session is consumed or restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaChange {
    pub used_sessions: i32,
    pub status: SubscriptionStatus,
}

impl SubscriptionStatus {
    pub fn pause(self) -> Result<Self, LifecycleViolation> {
        match self {
            SubscriptionStatus::Active => Ok(SubscriptionStatus::Paused),
            from => Err(LifecycleViolation::InvalidTransition {
                from,
                action: LifecycleAction::Pause,
            }),
        }
    }

    pub fn resume(self) -> Result<Self, LifecycleViolation> {
        match self {
            SubscriptionStatus::Paused => Ok(SubscriptionStatus::Active),
            from => Err(LifecycleViolation::InvalidTransition {
                from,
                action: LifecycleAction::Resume,
            }),
        }
    }

    pub fn cancel(self) -> Result<Self, LifecycleViolation> {
        self.cancel_as(LifecycleAction::Cancel)
    }

    /// Cancellation of a predecessor when a member upgrades.
    pub fn supersede(self) -> Result<Self, LifecycleViolation> {
        self.cancel_as(LifecycleAction::Upgrade)
    }

    fn cancel_as(self, action: LifecycleAction) -> Result<Self, LifecycleViolation> {
        match self {
            SubscriptionStatus::Active | SubscriptionStatus::Paused => {
                Ok(SubscriptionStatus::Cancelled)
            }
            from => Err(LifecycleViolation::InvalidTransition { from, action }),
        }
    }
}

/// Status a freshly created subscription starts in, given its retroactive usage.
pub fn initial_status(quota: SessionQuota) -> SubscriptionStatus {
    if quota.total > 0 && quota.is_exhausted() {
        SubscriptionStatus::Expired
    } else {
        SubscriptionStatus::Active
    }
}

pub fn consume_session(
    status: SubscriptionStatus,
    quota: SessionQuota,
) -> Result<QuotaChange, LifecycleViolation> {
    match status {
        SubscriptionStatus::Active => {}
        SubscriptionStatus::Expired if quota.is_exhausted() => {
            return Err(LifecycleViolation::QuotaExhausted {
                used: quota.used,
                total: quota.total,
            });
        }
        from => {
            return Err(LifecycleViolation::InvalidTransition {
                from,
                action: LifecycleAction::ConsumeSession,
            });
        }
    }

    if quota.is_exhausted() {
        return Err(LifecycleViolation::QuotaExhausted {
            used: quota.used,
            total: quota.total,
        });
    }

    let used_sessions = quota.used + 1;
    let status = if used_sessions == quota.total {
        SubscriptionStatus::Expired
    } else {
        SubscriptionStatus::Active
    };

    Ok(QuotaChange {
        used_sessions,
        status,
    })
}

pub fn restore_session(
    status: SubscriptionStatus,
    quota: SessionQuota,
) -> Result<QuotaChange, LifecycleViolation> {
    if quota.used <= 0 {
        return Err(LifecycleViolation::NothingToRestore);
    }

    // Only a quota-driven expiry is undone; other statuses stay as they are.
    let status = if status == SubscriptionStatus::Expired && quota.used == quota.total {
        SubscriptionStatus::Active
    } else {
        status
    };

    Ok(QuotaChange {
        used_sessions: quota.used - 1,
        status,
    })
}
