use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use domain::{
    entities::payments::InsertPaymentEntity,
    repositories::{payments::PaymentRepository, subscriptions::SubscriptionRepository},
    value_objects::{
        enums::{payment_methods::PaymentMethod, payment_statuses::PaymentStatus},
        payments::{PaymentModel, PaymentReceipt},
        subscriptions::{SubscriptionBalance, SubscriptionModel},
    },
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::load_subscription;
use crate::{
    errors::{AccountingError, AccountingResult},
    interfaces::clock::{Clock, today},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentInput {
    /// Client-chosen id. Retrying with the same id records the payment once.
    #[serde(default)]
    pub payment_id: Option<Uuid>,
    pub subscription_id: Uuid,
    /// Resolved from the subscription when absent.
    #[serde(default)]
    pub member_id: Option<Uuid>,
    pub amount_minor: i64,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(skip)]
    pub processed_by: Option<Uuid>,
}

/// A completed payment before it gets an id and a creation timestamp.
#[derive(Debug, Clone)]
pub(crate) struct PaymentDraft {
    pub subscription_id: Uuid,
    pub member_id: Uuid,
    pub amount_minor: i64,
    pub payment_method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<Uuid>,
}

impl PaymentDraft {
    pub(crate) fn completed(self, payment_id: Uuid, created_at: DateTime<Utc>) -> InsertPaymentEntity {
        InsertPaymentEntity {
            id: payment_id,
            subscription_id: self.subscription_id,
            member_id: self.member_id,
            amount_minor: self.amount_minor,
            payment_method: self.payment_method.to_string(),
            payment_status: PaymentStatus::Completed.to_string(),
            payment_date: self.payment_date,
            reference: self.reference,
            notes: self.notes,
            processed_by: self.processed_by,
            created_at,
        }
    }
}

/// Appends payments and keeps `paid_amount_minor` equal to the sum of the
/// subscription's completed payments. The paid amount is always recomputed in
/// full, never incremented.
pub struct PaymentRecorderUseCase<S, Pay, C>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    C: Clock + 'static,
{
    subscription_repo: Arc<S>,
    payment_repo: Arc<Pay>,
    clock: Arc<C>,
}

impl<S, Pay, C> PaymentRecorderUseCase<S, Pay, C>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    C: Clock + 'static,
{
    pub fn new(subscription_repo: Arc<S>, payment_repo: Arc<Pay>, clock: Arc<C>) -> Self {
        Self {
            subscription_repo,
            payment_repo,
            clock,
        }
    }

    pub async fn record(&self, input: RecordPaymentInput) -> AccountingResult<PaymentReceipt> {
        let subscription_id = input.subscription_id;
        info!(
            %subscription_id,
            amount_minor = input.amount_minor,
            payment_method = %input.payment_method,
            "payment_recorder: record payment requested"
        );

        if input.amount_minor <= 0 {
            let err = AccountingError::InvalidInput("payment amount must be positive".to_string());
            warn!(
                %subscription_id,
                amount_minor = input.amount_minor,
                "payment_recorder: non-positive amount rejected"
            );
            return Err(err);
        }

        let subscription = load_subscription(self.subscription_repo.as_ref(), subscription_id).await?;
        let member_id = match input.member_id {
            Some(member_id) if member_id != subscription.member_id => {
                warn!(
                    %subscription_id,
                    %member_id,
                    owner_id = %subscription.member_id,
                    "payment_recorder: payment member does not own the subscription"
                );
                return Err(AccountingError::InvalidInput(
                    "payment member does not own the subscription".to_string(),
                ));
            }
            Some(member_id) => member_id,
            None => subscription.member_id,
        };

        if subscription
            .paid_amount_minor
            .checked_add(input.amount_minor)
            .is_none()
        {
            warn!(
                %subscription_id,
                amount_minor = input.amount_minor,
                paid_amount_minor = subscription.paid_amount_minor,
                "payment_recorder: amount would overflow the paid amount"
            );
            return Err(AccountingError::InvalidInput(
                "payment amount would overflow the paid amount".to_string(),
            ));
        }

        let now = self.clock.now();
        let payment = PaymentDraft {
            subscription_id,
            member_id,
            amount_minor: input.amount_minor,
            payment_method: input.payment_method,
            payment_date: input.payment_date.unwrap_or_else(|| today(self.clock.as_ref())),
            reference: input.reference,
            notes: input.notes,
            processed_by: input.processed_by,
        }
        .completed(input.payment_id.unwrap_or_else(Uuid::new_v4), now);
        let payment_id = payment.id;

        let recorded = self
            .payment_repo
            .record_and_reconcile(payment)
            .await
            .map_err(|err| {
                error!(
                    %subscription_id,
                    %payment_id,
                    db_error = ?err,
                    "payment_recorder: failed to record payment"
                );
                AccountingError::PersistenceFailure(err)
            })?
            .ok_or(AccountingError::SubscriptionNotFound(subscription_id))?;

        // A reused id only counts as a retry when it carries the same payment.
        if recorded.payment.subscription_id != subscription_id
            || recorded.payment.amount_minor != input.amount_minor
        {
            warn!(
                %subscription_id,
                %payment_id,
                stored_subscription_id = %recorded.payment.subscription_id,
                stored_amount_minor = recorded.payment.amount_minor,
                "payment_recorder: payment id reused for a different payment"
            );
            return Err(AccountingError::PaymentIdConflict(payment_id));
        }

        let balance = SubscriptionBalance::of(&recorded.subscription);
        info!(
            %subscription_id,
            %payment_id,
            paid_amount_minor = balance.paid_amount_minor,
            outstanding_minor = balance.outstanding_minor,
            "payment_recorder: payment recorded and subscription reconciled"
        );

        Ok(PaymentReceipt {
            payment: PaymentModel::from(recorded.payment),
            balance,
        })
    }

    /// Re-derives the paid amount from the payments table without recording anything.
    pub async fn reconcile(&self, subscription_id: Uuid) -> AccountingResult<SubscriptionModel> {
        let subscription = self
            .payment_repo
            .reconcile(subscription_id)
            .await
            .map_err(|err| {
                error!(
                    %subscription_id,
                    db_error = ?err,
                    "payment_recorder: failed to reconcile paid amount"
                );
                AccountingError::PersistenceFailure(err)
            })?
            .ok_or(AccountingError::SubscriptionNotFound(subscription_id))?;

        info!(
            %subscription_id,
            paid_amount_minor = subscription.paid_amount_minor,
            "payment_recorder: paid amount reconciled"
        );

        let status = subscription.lifecycle_status()?;
        Ok(SubscriptionModel::new(subscription, status))
    }

    pub async fn list_payments(&self, subscription_id: Uuid) -> AccountingResult<Vec<PaymentModel>> {
        load_subscription(self.subscription_repo.as_ref(), subscription_id).await?;

        let payments = self
            .payment_repo
            .list_by_subscription(subscription_id)
            .await
            .map_err(|err| {
                error!(
                    %subscription_id,
                    db_error = ?err,
                    "payment_recorder: failed to list payments"
                );
                AccountingError::PersistenceFailure(err)
            })?;

        Ok(payments.into_iter().map(PaymentModel::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        interfaces::clock::MockClock,
        usecases::test_support::{fixed_clock, fixed_now, sample_subscription},
    };
    use domain::{
        entities::payments::{PaymentEntity, RecordedPayment},
        repositories::{
            payments::MockPaymentRepository, subscriptions::MockSubscriptionRepository,
        },
    };
    use mockall::predicate::{eq, function};

    type Recorder = PaymentRecorderUseCase<MockSubscriptionRepository, MockPaymentRepository, MockClock>;

    fn recorder(
        subscription_repo: MockSubscriptionRepository,
        payment_repo: MockPaymentRepository,
    ) -> Recorder {
        PaymentRecorderUseCase::new(
            Arc::new(subscription_repo),
            Arc::new(payment_repo),
            Arc::new(fixed_clock()),
        )
    }

    fn input(subscription_id: Uuid, amount_minor: i64) -> RecordPaymentInput {
        RecordPaymentInput {
            payment_id: None,
            subscription_id,
            member_id: None,
            amount_minor,
            payment_method: PaymentMethod::Card,
            payment_date: None,
            reference: Some("POS-1".to_string()),
            notes: None,
            processed_by: None,
        }
    }

    #[tokio::test]
    async fn records_a_completed_payment_for_the_subscription_owner() {
        let subscription = sample_subscription();
        let subscription_id = subscription.id;
        let member_id = subscription.member_id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .with(eq(subscription_id))
            .returning(move |_| Ok(Some(loaded.clone())));

        let mut payment_repo = MockPaymentRepository::new();
        payment_repo
            .expect_record_and_reconcile()
            .with(function(move |payment: &InsertPaymentEntity| {
                payment.member_id == member_id
                    && payment.amount_minor == 4_000
                    && payment.payment_status == "completed"
                    && payment.payment_date == fixed_now().date_naive()
            }))
            .times(1)
            .returning(move |payment| {
                let mut reconciled = subscription.clone();
                reconciled.paid_amount_minor = payment.amount_minor;
                Ok(Some(RecordedPayment {
                    payment: PaymentEntity::from(payment),
                    subscription: reconciled,
                }))
            });

        let receipt = recorder(subscription_repo, payment_repo)
            .record(input(subscription_id, 4_000))
            .await
            .unwrap();

        assert_eq!(receipt.payment.amount_minor, 4_000);
        assert_eq!(receipt.payment.payment_status, Some(PaymentStatus::Completed));
        assert_eq!(receipt.balance.paid_amount_minor, 4_000);
        assert_eq!(receipt.balance.outstanding_minor, 6_000);
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts_before_touching_the_store() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo.expect_find_by_id().never();
        let mut payment_repo = MockPaymentRepository::new();
        payment_repo.expect_record_and_reconcile().never();

        let err = recorder(subscription_repo, payment_repo)
            .record(input(Uuid::new_v4(), 0))
            .await
            .unwrap_err();

        assert!(matches!(err, AccountingError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rejects_a_member_that_does_not_own_the_subscription() {
        let subscription = sample_subscription();
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(subscription.clone())));
        let mut payment_repo = MockPaymentRepository::new();
        payment_repo.expect_record_and_reconcile().never();

        let mut request = input(subscription_id, 1_000);
        request.member_id = Some(Uuid::new_v4());

        let err = recorder(subscription_repo, payment_repo)
            .record(request)
            .await
            .unwrap_err();

        assert!(matches!(err, AccountingError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn store_failures_surface_as_persistence_failures() {
        let subscription = sample_subscription();
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(subscription.clone())));
        let mut payment_repo = MockPaymentRepository::new();
        payment_repo
            .expect_record_and_reconcile()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let err = recorder(subscription_repo, payment_repo)
            .record(input(subscription_id, 1_000))
            .await
            .unwrap_err();

        assert!(matches!(err, AccountingError::PersistenceFailure(_)));
    }

    #[tokio::test]
    async fn rejects_amounts_that_would_overflow_the_paid_amount() {
        let mut subscription = sample_subscription();
        subscription.paid_amount_minor = i64::MAX / 2 + 1;
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(subscription.clone())));
        let mut payment_repo = MockPaymentRepository::new();
        payment_repo.expect_record_and_reconcile().never();

        let err = recorder(subscription_repo, payment_repo)
            .record(input(subscription_id, i64::MAX / 2 + 1))
            .await
            .unwrap_err();

        assert!(matches!(err, AccountingError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn reused_payment_id_for_another_subscription_is_a_conflict() {
        let subscription = sample_subscription();
        let subscription_id = subscription.id;
        let other_subscription_id = Uuid::new_v4();
        let payment_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        let loaded = subscription.clone();
        subscription_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));

        let mut payment_repo = MockPaymentRepository::new();
        payment_repo
            .expect_record_and_reconcile()
            .times(1)
            .returning(move |payment| {
                let mut stored = PaymentEntity::from(payment);
                stored.subscription_id = other_subscription_id;
                stored.amount_minor = 1_000;
                Ok(Some(RecordedPayment {
                    payment: stored,
                    subscription: subscription.clone(),
                }))
            });

        let mut request = input(subscription_id, 2_000);
        request.payment_id = Some(payment_id);

        let err = recorder(subscription_repo, payment_repo)
            .record(request)
            .await
            .unwrap_err();

        assert!(matches!(err, AccountingError::PaymentIdConflict(id) if id == payment_id));
    }
}
