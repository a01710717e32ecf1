pub mod automation;
pub mod channel;
pub mod config;
pub mod data;
pub mod extract;
pub mod swap;
pub mod util;

pub use automation::{AutomationDriver, RunEvent, RunHandle, RunObserver, RunState, RunSummary};
pub use channel::{ChannelError, CommandOutcome, PrivilegedChannel, SessionConfig, ShellChannel};
pub use config::Config;
pub use data::{Database, ProfileStore, SqliteDirectory};
pub use extract::IdentityFields;
pub use swap::{Namespace, SwapEngine, SwapError, TargetApp};
