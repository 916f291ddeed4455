pub mod battery;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod metrics;
pub mod replay;
pub mod scorer;
pub mod sequence;
pub mod session;
pub mod state;
pub use battery::{Battery, Quota, TestSpec};
pub use clock::PresentationClock;
pub use collaborators::{AudioCue, AudioError, Collaborators, Cue, MetricsSink, Navigator, SharedMetrics, Silent};
pub use config::{RunConfig, Settings};
pub use error::{ConfigError, RunError, SequenceError};
pub use metrics::{SessionMetrics, Totals};
pub use replay::{Participant, Passive, ReplayDriver, ReplayReport, TranscriptEntry};
pub use scorer::ResponseScorer;
pub use sequence::{Policy, Sequence, SequenceGenerator, SequencePlan, Strategy};
pub use session::{Display, KeyHandle, Session, SessionOutcome, TokioTimer};
pub use state::{Directive, RESTART_MESSAGE, RunController, RunEvent, Screen, Wake};
