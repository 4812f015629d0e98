/// Returned when a sweep cannot be planned from the requested parameters.
///
/// This is a configuration defect rather than a run failure, so the whole benchmark is abandoned
/// before anything is launched.
#[derive(derive_more::Error, derive_more::Display, Debug, PartialEq, Eq)]
#[display("Invalid sweep: {msg}")]
pub struct InvalidSweepError {
    msg: String,
}

impl InvalidSweepError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}
