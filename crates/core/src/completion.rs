//! Post-work payment flow branch selection.
//!
//! When a `work:completed` event lands, the client must route the user
//! into exactly one confirmation flow before the review screen. The
//! branch is decided by the payment method carried on the event (or on
//! the booking, when the event omits it).

use serde::{Deserialize, Serialize};

/// Which confirmation flow follows work completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionFlow {
    /// Cash on hand: confirm "payment done" first, then review.
    CashConfirmation,
    /// Online payment: show the payment-options selection, then review.
    PaymentOptions,
    /// Method unknown: go straight to review.
    DirectReview,
}

/// Select the completion flow for a payment method value.
pub fn completion_flow(payment_method: Option<&str>) -> CompletionFlow {
    match payment_method.map(str::trim) {
        Some(m) if m.eq_ignore_ascii_case("cash") => CompletionFlow::CashConfirmation,
        Some(m) if m.eq_ignore_ascii_case("online") => CompletionFlow::PaymentOptions,
        _ => CompletionFlow::DirectReview,
    }
}
