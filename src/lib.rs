pub mod config;
pub mod domain;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod storage;

pub use config::Config;
pub use domain::{AccessRequest, AclError, Decision};
pub use protocol::ProtocolLoop;
pub use session::Session;
