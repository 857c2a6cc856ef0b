pub mod advisor;
pub mod agents;
pub mod chain;
pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod hub_client;
pub mod market;
pub mod shutdown;
pub mod supervisor;
pub mod ta;

pub use chain::{ChainClient, Registration};
pub use config::Settings;
pub use error::{DuckError, Result};
pub use hub_client::HubClient;
pub use market::{PriceService, Ring};
