pub mod config;
pub mod error;
pub mod scenario;
pub mod simulator;

pub use crate::config::{create_example_config, KeeperConfig};
pub use crate::error::{KeeperError, KeeperResult};
pub use crate::scenario::{Action, Event, Scenario};
pub use crate::simulator::{render_time, Rejection, Report, Simulator};
