//! Amounts are integer minor units (cents). Division is the only place where
//! rounding happens, and it always rounds half away from zero.

/// Divides `numerator` by `denominator`, rounding half away from zero.
///
/// Returns `None` when `denominator` is zero or the result does not fit in `i64`.
pub fn div_round_half_up(numerator: i128, denominator: i128) -> Option<i64> {
    if denominator == 0 {
        return None;
    }

    let (numerator, denominator) = if denominator < 0 {
        (-numerator, -denominator)
    } else {
        (numerator, denominator)
    };

    let quotient = numerator / denominator;
    let remainder = numerator % denominator;

    let rounded = if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    };

    i64::try_from(rounded).ok()
}

/// Sums amounts, or `None` when the total does not fit in `i64`.
pub fn checked_sum<I>(amounts: I) -> Option<i64>
where
    I: IntoIterator<Item = i64>,
{
    amounts
        .into_iter()
        .try_fold(0_i64, |total, amount| total.checked_add(amount))
}

/// Renders minor units as a two-decimal amount, e.g. `6000` -> `"60.00"`.
pub fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
