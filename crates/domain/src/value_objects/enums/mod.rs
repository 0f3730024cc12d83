pub mod payment_methods;
pub mod payment_statuses;
pub mod session_statuses;
pub mod session_types;
pub mod subscription_statuses;
