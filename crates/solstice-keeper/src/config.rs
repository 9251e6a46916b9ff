use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use solstice_core::{Address, WEEK};

use crate::error::{KeeperError, KeeperResult};

/// Prefix of environment overrides, e.g. `SOLSTICE_LOG_LEVEL=debug` or
/// `SOLSTICE_DISTRIBUTION__BATCH_SIZE=8`
pub const ENV_PREFIX: &str = "SOLSTICE";

/// Keeper configuration loaded from a TOML file
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct KeeperConfig {
    /// Privileged accounts of the deployment
    pub roles: RoleConfig,

    /// Ledger accounts in the token ledger
    pub contracts: ContractConfig,

    pub tokens: TokenConfig,

    /// Mapping from scenario offsets to timestamps and blocks
    pub clock: ClockConfig,

    pub distribution: DistributionConfig,

    /// Default tracing filter level
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RoleConfig {
    pub team: Address,
    pub voter: Address,
    pub minter: Address,
    pub governance: Address,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ContractConfig {
    pub escrow: Address,
    pub distributor: Address,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TokenConfig {
    /// Token locked in the escrow
    pub underlying: Address,
    /// Emission token handed to gauges
    pub reward: Address,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ClockConfig {
    /// Timestamp of scenario offset zero; must start an epoch
    pub genesis_timestamp: u64,
    pub genesis_block: u64,
    pub seconds_per_block: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DistributionConfig {
    /// Gauges handled per `distribute_range` call
    pub batch_size: usize,
}

impl KeeperConfig {
    /// Load configuration from a TOML file, then apply `SOLSTICE_*`
    /// environment overrides
    pub fn load(path: &Path) -> KeeperResult<Self> {
        if !path.exists() {
            return Err(KeeperError::InvalidConfig(format!(
                "config file {} not found",
                path.display()
            )));
        }
        let config: KeeperConfig = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> KeeperResult<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> KeeperResult<()> {
        let named = [
            ("roles.team", self.roles.team),
            ("roles.voter", self.roles.voter),
            ("roles.minter", self.roles.minter),
            ("roles.governance", self.roles.governance),
            ("contracts.escrow", self.contracts.escrow),
            ("contracts.distributor", self.contracts.distributor),
            ("tokens.underlying", self.tokens.underlying),
            ("tokens.reward", self.tokens.reward),
        ];
        if let Some((name, _)) = named.iter().find(|(_, address)| address.is_zero()) {
            return Err(KeeperError::InvalidConfig(format!("{} must not be the zero address", name)));
        }

        if self.contracts.escrow == self.contracts.distributor {
            return Err(KeeperError::InvalidConfig(
                "escrow and distributor must be distinct accounts".to_string(),
            ));
        }

        if self.clock.genesis_timestamp % WEEK != 0 {
            return Err(KeeperError::InvalidConfig(format!(
                "clock.genesis_timestamp {} is not aligned to an epoch",
                self.clock.genesis_timestamp
            )));
        }

        if self.clock.seconds_per_block == 0 {
            return Err(KeeperError::InvalidConfig(
                "clock.seconds_per_block must be greater than 0".to_string(),
            ));
        }

        if self.distribution.batch_size == 0 {
            return Err(KeeperError::InvalidConfig(
                "distribution.batch_size must be greater than 0".to_string(),
            ));
        }

        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(KeeperError::InvalidConfig(format!(
                "log_level {} is not a tracing level",
                self.log_level
            )));
        }

        Ok(())
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            roles: RoleConfig {
                team: Address::from_low_u64(0x7ea),
                voter: Address::from_low_u64(0xb07),
                minter: Address::from_low_u64(0x1117),
                governance: Address::from_low_u64(0x60f),
            },
            contracts: ContractConfig {
                escrow: Address::from_low_u64(0xe5c),
                distributor: Address::from_low_u64(0xe41),
            },
            tokens: TokenConfig {
                underlying: Address::from_low_u64(0xaaa),
                reward: Address::from_low_u64(0xbbb),
            },
            clock: ClockConfig {
                // Thursday 2023-08-31 00:00:00 UTC
                genesis_timestamp: 2_800 * WEEK,
                genesis_block: 18_900_000,
                seconds_per_block: 12,
            },
            distribution: DistributionConfig { batch_size: 10 },
            log_level: "info".to_string(),
        }
    }
}

/// Create example configuration file
pub fn create_example_config(path: &Path) -> KeeperResult<()> {
    KeeperConfig::default().save(path)
}
