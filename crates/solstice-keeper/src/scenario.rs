//! JSON scenario format replayed by the keeper.
//!
//! A scenario funds accounts, registers gauges and then lists events in
//! commit order. Each event names its caller and its offset in seconds from
//! the configured genesis timestamp.

use std::path::Path;

use serde::{Deserialize, Serialize};
use solstice_core::{Address, TokenId};

use crate::error::{KeeperError, KeeperResult};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scenario {
    pub name: String,

    /// Initial token balances. Funded accounts approve the escrow, the
    /// distributor and every bribe ledger for their tokens.
    #[serde(default)]
    pub funding: Vec<Funding>,

    /// Gauges registered by governance at genesis
    #[serde(default)]
    pub gauges: Vec<GaugeSpec>,

    /// Tokens accepted as bribes
    #[serde(default)]
    pub whitelist: Vec<Address>,

    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Funding {
    pub token: Address,
    pub account: Address,
    pub amount: u128,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GaugeSpec {
    pub pool: Address,
    pub gauge: Address,
    /// Account of the gauge's bribe ledger
    pub bribe: Address,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Event {
    /// Seconds after genesis
    pub at: u64,
    pub sender: Address,
    pub action: Action,
}

/// Relative weight of one pool in a vote
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct PoolWeight {
    pub pool: Address,
    pub weight: u128,
}

/// What an event does. Encoded externally tagged, e.g.
/// `{ "create_lock": { "amount": 1000, "duration": 604800 } }` or
/// `"checkpoint"`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    // Lock lifecycle
    CreateLock { amount: u128, duration: u64 },
    CreateLockFor { amount: u128, duration: u64, to: Address },
    CreateBonusLock { amount: u128, to: Address },
    DepositFor { token_id: TokenId, amount: u128 },
    IncreaseAmount { token_id: TokenId, amount: u128 },
    IncreaseUnlockTime { token_id: TokenId, duration: u64 },
    ConvertToBonus { token_id: TokenId },
    LockPermanent { token_id: TokenId },
    UnlockPermanent { token_id: TokenId },
    Merge { from: TokenId, to: TokenId },
    Split { token_id: TokenId, amount: u128 },
    Withdraw { token_id: TokenId },
    Transfer { token_id: TokenId, to: Address },
    Approve { token_id: TokenId, approved: Address },
    Delegate { delegatee: Address },
    ToggleSplit { account: Address, allowed: bool },
    Checkpoint,

    // Voting
    Vote { token_id: TokenId, pools: Vec<PoolWeight> },
    Reset { token_id: TokenId },

    // Emissions
    NotifyEmissions { amount: u128 },
    UpdateGauges { gauges: Vec<Address> },
    Distribute,
    DistributeGauges { gauges: Vec<Address> },
    KillGauge { gauge: Address },
    ReviveGauge { gauge: Address },
    SetEmergency { gauge: Address, emergency: bool },
    DistributeFees { gauges: Vec<Address> },

    // Bribes
    NotifyBribe { gauge: Address, token: Address, amount: u128 },
    ClaimBribes { gauge: Address, token_id: TokenId, tokens: Vec<Address> },
}

impl Action {
    /// Short name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateLock { .. } => "create_lock",
            Action::CreateLockFor { .. } => "create_lock_for",
            Action::CreateBonusLock { .. } => "create_bonus_lock",
            Action::DepositFor { .. } => "deposit_for",
            Action::IncreaseAmount { .. } => "increase_amount",
            Action::IncreaseUnlockTime { .. } => "increase_unlock_time",
            Action::ConvertToBonus { .. } => "convert_to_bonus",
            Action::LockPermanent { .. } => "lock_permanent",
            Action::UnlockPermanent { .. } => "unlock_permanent",
            Action::Merge { .. } => "merge",
            Action::Split { .. } => "split",
            Action::Withdraw { .. } => "withdraw",
            Action::Transfer { .. } => "transfer",
            Action::Approve { .. } => "approve",
            Action::Delegate { .. } => "delegate",
            Action::ToggleSplit { .. } => "toggle_split",
            Action::Checkpoint => "checkpoint",
            Action::Vote { .. } => "vote",
            Action::Reset { .. } => "reset",
            Action::NotifyEmissions { .. } => "notify_emissions",
            Action::UpdateGauges { .. } => "update_gauges",
            Action::Distribute => "distribute",
            Action::DistributeGauges { .. } => "distribute_gauges",
            Action::KillGauge { .. } => "kill_gauge",
            Action::ReviveGauge { .. } => "revive_gauge",
            Action::SetEmergency { .. } => "set_emergency",
            Action::DistributeFees { .. } => "distribute_fees",
            Action::NotifyBribe { .. } => "notify_bribe",
            Action::ClaimBribes { .. } => "claim_bribes",
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> KeeperResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> KeeperResult<Self> {
        let scenario: Scenario = serde_json::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Events must be in commit order and gauges must be unique
    pub fn validate(&self) -> KeeperResult<()> {
        if let Some(pair) = self.events.windows(2).find(|pair| pair[1].at < pair[0].at) {
            return Err(KeeperError::InvalidScenario(format!(
                "event at {} follows event at {}",
                pair[1].at, pair[0].at
            )));
        }

        for (i, entry) in self.gauges.iter().enumerate() {
            let clash = self.gauges[..i]
                .iter()
                .any(|other| other.pool == entry.pool || other.gauge == entry.gauge || other.bribe == entry.bribe);
            if clash {
                return Err(KeeperError::InvalidScenario(format!(
                    "gauge {} reuses a pool, gauge or bribe account",
                    entry.gauge
                )));
            }
        }

        Ok(())
    }
}
