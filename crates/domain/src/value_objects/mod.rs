pub mod enums;
pub mod money;
pub mod payments;
pub mod subscription_lifecycle;
pub mod subscriptions;
