use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::{
    payments::{InsertPaymentEntity, PaymentEntity, RecordedPayment},
    subscriptions::SubscriptionEntity,
};

#[automock]
#[async_trait]
pub trait PaymentRepository {
    /// Inserts the payment and recomputes the owning subscription's paid
    /// amount from all of its completed payments, in one transaction.
    /// `Ok(None)` if the subscription does not exist. A payment id that is
    /// already stored is not inserted again; the stored row is returned.
    async fn record_and_reconcile(
        &self,
        payment: InsertPaymentEntity,
    ) -> Result<Option<RecordedPayment>>;

    /// Recomputes the paid amount without inserting anything.
    async fn reconcile(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    async fn list_by_subscription(&self, subscription_id: Uuid) -> Result<Vec<PaymentEntity>>;
}
