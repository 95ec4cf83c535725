pub mod abi;
pub mod clock;
pub mod config;
pub mod deterministic;
pub mod eip1193;
pub mod host;
pub mod tronweb;

pub use clock::SystemClockAdapter;
pub use config::{AdapterConfig, RuntimeProfile};
pub use deterministic::{DeterministicChain, ScriptedFailure, SentCall};
pub use eip1193::Eip1193Adapter;
pub use host::HostEnvironmentAdapter;
pub use tronweb::TronWebAdapter;
