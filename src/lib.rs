mod client;
mod diff;
mod error;
mod logger;
mod protocol;
mod tree;
mod types;

pub use client::{DEFAULT_SCAN_INTERVAL, WattsClient, WattsClientBuilder};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use protocol::{DEFAULT_BASE_URL, DEFAULT_CLIENT_ID, DEFAULT_LANG};
pub use types::*;
