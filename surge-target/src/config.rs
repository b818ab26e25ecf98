/// Address the reference target binds to when none is given.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";

/// Amounts at or above this score a risk of 1.0.
pub const MAX_SCORED_AMOUNT: f64 = 100_000.0;

/// Transactions scoring at or above this are declined.
pub const DECLINE_RISK_SCORE: f64 = 0.8;
