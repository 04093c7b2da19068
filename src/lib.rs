pub mod acquire;
pub mod announce;
pub mod config;
pub mod discovery;
pub mod error;
pub mod metadata;
pub mod output;
pub mod peer;

pub use acquire::{acquire, Acquisition, Metadata};
pub use config::Config;
pub use error::{Error, Result};
pub use output::OverwritePolicy;
