pub mod timer;

pub use timer::{HighPrecisionTimer, LatencyStats, LatencyWindow, ManualTimer, Timer};
