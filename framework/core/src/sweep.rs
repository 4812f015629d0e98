use crate::error::InvalidSweepError;

/// Retry timeout written to the settings files when reliable messaging is off.
///
/// The value has no effect on the system under test in that mode, but the settings files always
/// need a number in place.
pub const DEFAULT_TIMEOUT_MS: u64 = 4000;

/// One concrete combination of parameters to benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("connections={connection_count} reliable={reliable} timeout={timeout_ms}ms")]
pub struct SweepPoint {
    connection_count: u32,
    timeout_ms: u64,
    reliable: bool,
}

impl SweepPoint {
    pub fn new(
        connection_count: u32,
        timeout_ms: u64,
        reliable: bool,
    ) -> Result<Self, InvalidSweepError> {
        if connection_count == 0 {
            return Err(InvalidSweepError::new(
                "the number of connections must be at least 1",
            ));
        }

        Ok(Self {
            connection_count,
            timeout_ms,
            reliable,
        })
    }

    pub fn connection_count(&self) -> u32 {
        self.connection_count
    }

    /// The retry timeout in milliseconds. Only meaningful when [SweepPoint::reliable] is true.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn reliable(&self) -> bool {
        self.reliable
    }
}

/// The cross product of connection counts and retry timeouts for a single reliability mode.
///
/// Points are produced lazily, connection count in the outer loop and timeout in the inner loop,
/// so that the settings which are expensive to change are changed least often.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    connection_counts: Vec<u32>,
    timeouts_ms: Vec<u64>,
    reliable: bool,
}

impl SweepPlan {
    /// Plan a sweep.
    ///
    /// When `reliable` is false the timeouts are ignored and every connection count is run once
    /// with [DEFAULT_TIMEOUT_MS]. When it is true at least one timeout is required.
    pub fn new(
        connection_counts: Vec<u32>,
        timeouts_ms: Vec<u64>,
        reliable: bool,
    ) -> Result<Self, InvalidSweepError> {
        if connection_counts.is_empty() {
            return Err(InvalidSweepError::new(
                "at least one number of connections is required",
            ));
        }
        if connection_counts.contains(&0) {
            return Err(InvalidSweepError::new(
                "the number of connections must be at least 1",
            ));
        }

        let timeouts_ms = if reliable {
            if timeouts_ms.is_empty() {
                return Err(InvalidSweepError::new(
                    "timeouts are required when reliable messaging is enabled",
                ));
            }
            timeouts_ms
        } else {
            if !timeouts_ms.is_empty() {
                log::warn!("Ignoring timeouts {timeouts_ms:?} because reliable messaging is disabled");
            }
            vec![DEFAULT_TIMEOUT_MS]
        };

        Ok(Self {
            connection_counts,
            timeouts_ms,
            reliable,
        })
    }

    pub fn reliable(&self) -> bool {
        self.reliable
    }

    /// Total number of points in the sweep.
    pub fn len(&self) -> usize {
        self.connection_counts.len() * self.timeouts_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn points(&self) -> impl Iterator<Item = SweepPoint> + '_ {
        self.connection_counts.iter().flat_map(move |&connection_count| {
            self.timeouts_ms.iter().map(move |&timeout_ms| SweepPoint {
                connection_count,
                timeout_ms,
                reliable: self.reliable,
            })
        })
    }
}
