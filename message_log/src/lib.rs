//! Mining of the server's protocol message log.
//!
//! The log is parsed into [MessageEvent]s which are then correlated into message counts and, when
//! reliable messaging is enabled, the average delivery delay in each direction.

mod correlate;
mod event;
mod parser;
mod stats;

pub use correlate::{
    correlate, correlate_log, Correlation, CorrelationWarning, Correlator, Delays, Direction,
    DirectionDelay, MessageCounters, ACK_TARGET, SERVER_RECIPIENT,
};
pub use event::{EventError, MessageEvent};
pub use parser::{parse, MessageEvents, MessageLog, MessageLogError};
pub use stats::SummaryStats;
