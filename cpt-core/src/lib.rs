pub mod error;
pub mod phase;
pub mod round;
pub mod stimulus;

pub use error::CoreError;
pub use phase::{Phase, Polarity, RunMode};
pub use round::{CountdownStep, Outcome, ResponseRecord, RoundState, RunResult, RunState};
pub use stimulus::{Alphabet, Symbol};
