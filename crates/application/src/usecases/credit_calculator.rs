use domain::{
    entities::subscriptions::SubscriptionEntity,
    value_objects::{money::div_round_half_up, subscriptions::UpgradeCreditModel},
};

/// Value of the unused sessions of `subscription`, in minor units.
///
/// Priced from the purchase snapshot, never from the live catalog:
/// `remaining * total_amount / total_sessions`, rounded half up to the minor
/// unit in a single step so that no intermediate per-session rounding leaks in.
pub fn calculate_upgrade_credit(subscription: &SubscriptionEntity) -> i64 {
    let remaining = subscription.quota().remaining();
    if remaining <= 0 || subscription.total_sessions <= 0 {
        return 0;
    }

    div_round_half_up(
        i128::from(remaining) * i128::from(subscription.total_amount_minor),
        i128::from(subscription.total_sessions),
    )
    .unwrap_or_default()
    .max(0)
}

pub fn upgrade_credit_breakdown(subscription: &SubscriptionEntity) -> UpgradeCreditModel {
    let price_per_session_minor = if subscription.total_sessions > 0 {
        div_round_half_up(
            i128::from(subscription.total_amount_minor),
            i128::from(subscription.total_sessions),
        )
        .unwrap_or_default()
    } else {
        0
    };

    UpgradeCreditModel {
        subscription_id: subscription.id,
        remaining_sessions: subscription.quota().remaining(),
        price_per_session_minor,
        credit_minor: calculate_upgrade_credit(subscription),
    }
}
