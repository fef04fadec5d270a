pub mod decision;
pub mod error;
pub mod request;

pub use decision::Decision;
pub use error::AclError;
pub use request::{extract_domain, AccessRequest};
