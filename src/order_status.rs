use std::fmt;

use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "accepted_processed")]
    AcceptedProcessed,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer,
    Admin,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Order is {from} and can no longer be cancelled")]
    NotCancellable { from: OrderStatus },
    #[error("Cannot move order from {from} to {to}")]
    Invalid { from: OrderStatus, to: OrderStatus },
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::AcceptedProcessed,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Rejected,
    ];

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::AcceptedProcessed => "Accepted & Processed",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::AcceptedProcessed)
    }

    /// Moving into this status returns the reserved stock.
    pub fn restocks(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Rejected)
    }

    pub fn can_transition(self, to: OrderStatus, actor: Actor) -> bool {
        use OrderStatus::*;
        match (actor, self, to) {
            (_, from, Cancelled) => from.is_cancellable(),
            (Actor::Customer, _, _) => false,
            (Actor::Admin, Pending, AcceptedProcessed) => true,
            (Actor::Admin, AcceptedProcessed, Delivered) => true,
            (Actor::Admin, Delivered, Completed) => true,
            (Actor::Admin, from, Rejected) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn transition(self, to: OrderStatus, actor: Actor) -> Result<OrderStatus, TransitionError> {
        if self.can_transition(to, actor) {
            return Ok(to);
        }
        if to == OrderStatus::Cancelled {
            Err(TransitionError::NotCancellable { from: self })
        } else {
            Err(TransitionError::Invalid { from: self, to })
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn admin_walks_the_happy_path() {
        let status = Pending
            .transition(AcceptedProcessed, Actor::Admin)
            .and_then(|s| s.transition(Delivered, Actor::Admin))
            .and_then(|s| s.transition(Completed, Actor::Admin));
        assert_eq!(status, Ok(Completed));
    }

    #[test]
    fn customer_may_only_cancel_early() {
        assert_eq!(Pending.transition(Cancelled, Actor::Customer), Ok(Cancelled));
        assert_eq!(
            AcceptedProcessed.transition(Cancelled, Actor::Customer),
            Ok(Cancelled)
        );
        for from in [Delivered, Completed, Cancelled, Rejected] {
            assert_eq!(
                from.transition(Cancelled, Actor::Customer),
                Err(TransitionError::NotCancellable { from })
            );
        }
        assert!(!Pending.can_transition(AcceptedProcessed, Actor::Customer));
        assert!(!Pending.can_transition(Rejected, Actor::Customer));
    }

    #[test]
    fn rejection_from_any_open_state() {
        for from in [Pending, AcceptedProcessed, Delivered] {
            assert!(from.can_transition(Rejected, Actor::Admin));
        }
        for from in [Completed, Cancelled, Rejected] {
            assert!(!from.can_transition(Rejected, Actor::Admin));
        }
    }

    #[test]
    fn no_skipping_or_reopening() {
        assert!(!Pending.can_transition(Delivered, Actor::Admin));
        assert!(!Completed.can_transition(Pending, Actor::Admin));
        assert!(!Cancelled.can_transition(AcceptedProcessed, Actor::Admin));
        assert!(!Delivered.can_transition(Cancelled, Actor::Admin));
    }

    #[test]
    fn labels_and_wire_names() {
        assert_eq!(AcceptedProcessed.to_string(), "Accepted & Processed");
        assert_eq!(
            serde_json::to_string(&AcceptedProcessed).unwrap(),
            "\"accepted_processed\""
        );
    }
}
