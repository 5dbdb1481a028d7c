//! Order lifecycle state machine.
//!
//! ```text
//!            ┌──► Fulfilled
//! Placed ────┤
//!            └──► Cancelled
//! ```
//!
//! The diagram is the [`TransitionPolicy::Strict`] table. The default
//! [`TransitionPolicy::Unrestricted`] policy accepts any target status.
//! Independently of the policy, entering `Cancelled` releases the order's
//! stock and leaving it reserves the stock again (see [`StockEffect`]).

use common::OrderStatus;
use thiserror::Error;

use crate::error::OrderError;

/// Which status transitions `change_status` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransitionPolicy {
    /// Any status may move to any status.
    #[default]
    Unrestricted,

    /// Only `Placed -> Fulfilled` and `Placed -> Cancelled`.
    Strict,
}

impl TransitionPolicy {
    /// Returns true if the policy permits moving from `from` to `to`.
    pub fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        match self {
            TransitionPolicy::Unrestricted => true,
            TransitionPolicy::Strict => matches!(
                (from, to),
                (OrderStatus::Placed, OrderStatus::Fulfilled)
                    | (OrderStatus::Placed, OrderStatus::Cancelled)
            ),
        }
    }

    /// Checks a transition, failing with
    /// [`OrderError::InvalidStatusTransition`] if it is not permitted.
    pub fn check(&self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if self.allows(from, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidStatusTransition { from, to })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPolicy::Unrestricted => "unrestricted",
            TransitionPolicy::Strict => "strict",
        }
    }
}

impl std::fmt::Display for TransitionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a policy name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transition policy: {0} (expected `unrestricted` or `strict`)")]
pub struct UnknownPolicy(pub String);

impl std::str::FromStr for TransitionPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unrestricted" => Ok(TransitionPolicy::Unrestricted),
            "strict" => Ok(TransitionPolicy::Strict),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// What a status change does to the order's reserved stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    /// Stock stays as it is.
    Keep,
    /// The order stops holding stock; its items go back to the catalog.
    Release,
    /// The order starts holding stock again; its items must be reserved.
    Reserve,
}

impl StockEffect {
    /// Derives the stock effect of moving from `from` to `to`.
    pub fn of(from: OrderStatus, to: OrderStatus) -> Self {
        match (from.holds_stock(), to.holds_stock()) {
            (true, false) => StockEffect::Release,
            (false, true) => StockEffect::Reserve,
            _ => StockEffect::Keep,
        }
    }
}
