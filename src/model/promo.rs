use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a promo code reduces a price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Discount {
    /// Percentage of the subtotal, 0..=100.
    Percentage(f64),
    /// Flat amount in currency units.
    Fixed(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promo {
    pub code: String,
    pub discount: Discount,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_uses: u32,
}

impl Promo {
    /// Reason the promo cannot be applied at `now`, if any.
    pub fn rejection(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if self.expires_at.is_some_and(|exp| exp <= now) {
            Some("expired")
        } else if self.remaining_uses == 0 {
            Some("exhausted")
        } else {
            None
        }
    }
}
