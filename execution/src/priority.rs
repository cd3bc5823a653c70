//! Priority seller resolution.

use lotto_types::SellerId;
use std::collections::BTreeSet;

/// Order the sellers whose tickets are settled first.
///
/// A manual override replaces the flagged list entirely. Otherwise flagged sellers are
/// ordered by descending id, each appearing once.
pub fn resolve_priority(flagged: &[SellerId], manual_override: Option<SellerId>) -> Vec<SellerId> {
    if let Some(seller) = manual_override {
        return vec![seller];
    }
    let unique: BTreeSet<SellerId> = flagged.iter().copied().collect();
    unique.into_iter().rev().collect()
}
