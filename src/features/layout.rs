//! Canonical feature layout.
//!
//! The classifier is fit against exactly this column order. Adding, removing
//! or reordering a feature requires bumping `FEATURE_VERSION` and shipping a
//! model artifact whose manifest lists the new order.

use crc32fast::Hasher;
use thiserror::Error;

/// Current feature layout version
pub const FEATURE_VERSION: u8 = 1;

/// Feature names in the exact order they are fed to the model
pub const FEATURE_LAYOUT: [&str; 7] = [
    "amount",            // 0: raw transaction amount
    "hour_of_day",       // 1: UTC hour, 0-23
    "day_of_week",       // 2: UTC weekday, Monday = 0
    "tx_count_24h",      // 3: user's transactions in (t - 24h, t]
    "avg_spend_user",    // 4: expanding mean of the user's amounts
    "amount_deviation",  // 5: amount / (avg_spend_user + 1e-9)
    "merchant_cat_code", // 6: persisted category code
];

pub const FEATURE_COUNT: usize = FEATURE_LAYOUT.len();

/// CRC32 over the version and the ordered names, logged at startup so
/// mismatched deployments are easy to spot.
pub fn layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[FEATURE_VERSION]);
    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}

/// Feature order recorded in a model artifact disagrees with the layout
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutMismatch {
    #[error("model expects {actual} features, layout v{FEATURE_VERSION} defines {expected}")]
    Length { expected: usize, actual: usize },

    #[error("feature {position} is '{actual}' in the model artifact, layout expects '{expected}'")]
    Name {
        position: usize,
        expected: &'static str,
        actual: String,
    },
}

/// Compare an artifact's feature list against the canonical layout.
pub fn validate_feature_names(names: &[String]) -> Result<(), LayoutMismatch> {
    if names.len() != FEATURE_COUNT {
        return Err(LayoutMismatch::Length {
            expected: FEATURE_COUNT,
            actual: names.len(),
        });
    }
    for (position, (expected, actual)) in FEATURE_LAYOUT.iter().zip(names).enumerate() {
        if *expected != actual.as_str() {
            return Err(LayoutMismatch::Name {
                position,
                expected,
                actual: actual.clone(),
            });
        }
    }
    Ok(())
}
