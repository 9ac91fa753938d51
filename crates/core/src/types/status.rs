//! Status enums for billing entities.

use serde::{Deserialize, Serialize};

/// Local subscription status.
///
/// The `Paid` state is what drives the owning store's `is_paid` visibility
/// projection. `Cancelled` is terminal: the transition table rejects every
/// move out of it, so a late or replayed provider event cannot resurrect a
/// cancelled subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    #[default]
    Pending,
    Paid,
    Cancelled,
}

impl SubscriptionStatus {
    /// Whether this status makes the owning store visible as paid.
    #[must_use]
    pub const fn grants_visibility(self) -> bool {
        matches!(self, Self::Paid)
    }

    /// Guarded state-transition table.
    ///
    /// `Pending ⇄ Paid` (payment failure/success cycles), anything may move
    /// to `Cancelled`, and self-transitions are allowed so that repeated
    /// deliveries of the same event stay idempotent.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Cancelled, Self::Cancelled) => true,
            (Self::Cancelled, _) => false,
            _ => true,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paid => write!(f, "paid"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid subscription status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_display_from_str_round_trip() {
        for status in [
            SubscriptionStatus::Pending,
            SubscriptionStatus::Paid,
            SubscriptionStatus::Cancelled,
        ] {
            let parsed = SubscriptionStatus::from_str(&status.to_string()).expect("parses");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!(SubscriptionStatus::from_str("active").is_err());
        assert!(SubscriptionStatus::from_str("PAID").is_err());
    }

    #[test]
    fn test_visibility_projection() {
        assert!(SubscriptionStatus::Paid.grants_visibility());
        assert!(!SubscriptionStatus::Pending.grants_visibility());
        assert!(!SubscriptionStatus::Cancelled.grants_visibility());
    }

    #[test]
    fn test_payment_cycle_transitions_allowed() {
        assert!(SubscriptionStatus::Pending.can_transition_to(SubscriptionStatus::Paid));
        assert!(SubscriptionStatus::Paid.can_transition_to(SubscriptionStatus::Pending));
        assert!(SubscriptionStatus::Paid.can_transition_to(SubscriptionStatus::Cancelled));
        assert!(SubscriptionStatus::Pending.can_transition_to(SubscriptionStatus::Cancelled));
    }

    #[test]
    fn test_cancelled_is_terminal() {
        assert!(!SubscriptionStatus::Cancelled.can_transition_to(SubscriptionStatus::Paid));
        assert!(!SubscriptionStatus::Cancelled.can_transition_to(SubscriptionStatus::Pending));
        // Re-delivery of a cancellation event is still a valid no-op.
        assert!(SubscriptionStatus::Cancelled.can_transition_to(SubscriptionStatus::Cancelled));
    }

    #[test]
    fn test_self_transitions_allowed() {
        for status in [SubscriptionStatus::Pending, SubscriptionStatus::Paid] {
            assert!(status.can_transition_to(status));
        }
    }
}
