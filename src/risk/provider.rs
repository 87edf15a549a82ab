//! External data contract for the risk pipeline.

use super::types::RiskInput;
use crate::types::UserId;

/// Supplies positions, balances, and mark prices to the scanner and the
/// tier checkers.
///
/// Implementations must be thread-safe: the full scan calls from several
/// shard workers at once, and the checkers and price-trigger path call
/// concurrently with it.
pub trait UserDataProvider: Send + Sync {
    /// Every user currently holding positions.
    fn get_all_user_ids(&self) -> Vec<UserId>;

    /// The risk input for one user, or `None` if the user disappeared
    /// between listing and fetching.
    fn get_user_risk_input(&self, user_id: UserId) -> Option<RiskInput>;
}
