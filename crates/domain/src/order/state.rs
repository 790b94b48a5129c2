//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Unpaid ──► AwaitingReview ──► Completed
///    │
///    └──► Closed
/// ```
///
/// Status only ever moves forward. `Completed` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order committed, payment not yet confirmed.
    #[default]
    Unpaid,

    /// Gateway confirmed payment, waiting for the buyer's review.
    AwaitingReview,

    /// Buyer submitted a review (terminal state).
    Completed,

    /// Order was cancelled or timed out before payment (terminal state).
    Closed,
}

impl OrderStatus {
    /// Returns true if payment has been confirmed for an order in this state.
    pub fn is_paid(&self) -> bool {
        matches!(self, OrderStatus::AwaitingReview | OrderStatus::Completed)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Closed)
    }

    /// Returns true if `self -> next` is a legal forward transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Unpaid, OrderStatus::AwaitingReview)
                | (OrderStatus::Unpaid, OrderStatus::Closed)
                | (OrderStatus::AwaitingReview, OrderStatus::Completed)
        )
    }

    /// Returns the status name as stored in the relational store.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Unpaid => "unpaid",
            OrderStatus::AwaitingReview => "awaiting_review",
            OrderStatus::Completed => "completed",
            OrderStatus::Closed => "closed",
        }
    }

    /// Parses a stored status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(OrderStatus::Unpaid),
            "awaiting_review" => Some(OrderStatus::AwaitingReview),
            "completed" => Some(OrderStatus::Completed),
            "closed" => Some(OrderStatus::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 4] = [
        OrderStatus::Unpaid,
        OrderStatus::AwaitingReview,
        OrderStatus::Completed,
        OrderStatus::Closed,
    ];

    #[test]
    fn test_default_status_is_unpaid() {
        assert_eq!(OrderStatus::default(), OrderStatus::Unpaid);
    }

    #[test]
    fn test_transitions_never_move_backward() {
        assert!(OrderStatus::Unpaid.can_transition_to(OrderStatus::AwaitingReview));
        assert!(OrderStatus::Unpaid.can_transition_to(OrderStatus::Closed));
        assert!(OrderStatus::AwaitingReview.can_transition_to(OrderStatus::Completed));

        assert!(!OrderStatus::AwaitingReview.can_transition_to(OrderStatus::Unpaid));
        assert!(!OrderStatus::AwaitingReview.can_transition_to(OrderStatus::Closed));
        assert!(!OrderStatus::Unpaid.can_transition_to(OrderStatus::Completed));
        for status in ALL {
            assert!(!OrderStatus::Completed.can_transition_to(status));
            assert!(!OrderStatus::Closed.can_transition_to(status));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Unpaid.is_terminal());
        assert!(!OrderStatus::AwaitingReview.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Closed.is_terminal());
    }

    #[test]
    fn test_stored_names_roundtrip() {
        for status in ALL {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("shipped"), None);
    }

    #[test]
    fn test_serialization_uses_snake_case() {
        let json = serde_json::to_string(&OrderStatus::AwaitingReview).unwrap();
        assert_eq!(json, "\"awaiting_review\"");
    }
}
