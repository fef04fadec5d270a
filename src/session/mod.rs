pub mod evaluator;
pub mod lifecycle;

pub use evaluator::decide;
pub use lifecycle::{Session, SessionState};
