use {
    super::error::WebhookError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Failed,
    Paid,
    Received,
    Waived,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Paid => "paid",
            Self::Received => "received",
            Self::Waived => "waived",
            Self::Refunded => "refunded",
        }
    }

    /// Total rank order over statuses. `paid` and `received` share a rank:
    /// both mean "money arrived", they just differ in how.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 10,
            Self::Failed => 15,
            Self::Paid | Self::Received => 20,
            Self::Waived => 25,
            Self::Refunded => 40,
        }
    }

    /// Promotion rule: a webhook may set `target` only if its rank is at
    /// least the current rank. Demotion (refund reversal) never goes through
    /// this function; the resync path carries an explicit flag instead.
    pub fn can_promote_to(&self, target: PaymentStatus) -> bool {
        target.rank() >= self.rank()
    }

    /// What to do with a promotion to `target`, given the current status.
    /// Equal-rank writes (paid over paid, paid over received) are treated as
    /// already-applied no-ops so a late duplicate never bumps `updated_at`.
    pub fn promotion(&self, target: PaymentStatus) -> Promotion {
        if target.rank() < self.rank() {
            Promotion::Blocked
        } else if target.rank() == self.rank() {
            Promotion::AlreadyApplied
        } else {
            Promotion::Apply
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    Apply,
    AlreadyApplied,
    Blocked,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = WebhookError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            "paid" => Ok(Self::Paid),
            "received" => Ok(Self::Received),
            "waived" => Ok(Self::Waived),
            "refunded" => Ok(Self::Refunded),
            other => Err(WebhookError::Unexpected(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}
