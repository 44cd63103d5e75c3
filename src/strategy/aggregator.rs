use crate::models::{Action, Decision, Verdict};

/// Combine the active strategies' verdicts into one action
///
/// Unanimity rule: BUY only when every verdict is BUY, SELL only when every
/// verdict is SELL; any HOLD or disagreement yields no action. Trades
/// responsiveness for false-positive suppression.
pub fn aggregate(verdicts: &[Verdict]) -> Action {
    if verdicts.is_empty() {
        return Action::None;
    }

    if verdicts.iter().all(|v| v.decision == Decision::Buy) {
        Action::Buy
    } else if verdicts.iter().all(|v| v.decision == Decision::Sell) {
        Action::Sell
    } else {
        Action::None
    }
}
