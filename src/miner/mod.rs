// Miner module - TURNING THE POOL INTO BLOCKS
// Mining cycle orchestration and reward construction

mod orchestrator;
mod reward;

pub use orchestrator::{MineError, Miner};
pub use reward::{RewardIssuer, SystemReward};
