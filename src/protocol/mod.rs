pub mod runner;

pub use runner::{LoopState, ProtocolLoop};
