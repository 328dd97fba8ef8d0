//! Order status state machine.
//!
//! ```text
//! pending -> processing -> shipped -> delivered
//!    |           |            |           |
//!    v           v            v           v
//! cancelled   cancelled    refunded    refunded
//! ```

use crate::errors::ServiceError;
pub use crate::entities::order::OrderStatus;

/// Statuses reachable in one step from `from`. Self-transitions never appear.
pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Pending => &[Processing, Cancelled],
        Processing => &[Shipped, Cancelled],
        Shipped => &[Delivered, Refunded],
        Delivered => &[Refunded],
        Cancelled | Refunded => &[],
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), ServiceError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidStatusTransition { from, to })
    }
}

/// No further transitions are possible.
pub fn is_final(status: OrderStatus) -> bool {
    allowed_transitions(status).is_empty()
}
