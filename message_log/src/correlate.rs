use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};

use crate::event::MessageEvent;
use crate::parser::{MessageLog, MessageLogError};
use crate::stats::SummaryStats;

/// Target of acknowledgement messages.
pub const ACK_TARGET: &str = "ACK";

/// Recipient name used by messages addressed to the server.
pub const SERVER_RECIPIENT: &str = "SERVER";

/// Occurrences of each message target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageCounters {
    total: u64,
    by_target: BTreeMap<String, u64>,
}

impl MessageCounters {
    fn record(&mut self, target: &str) {
        self.total += 1;
        *self.by_target.entry(target.to_string()).or_default() += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// The count for a target, zero if it never occurred.
    pub fn get(&self, target: &str) -> u64 {
        self.by_target.get(target).copied().unwrap_or_default()
    }

    /// Counts per target in target order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.by_target.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn into_counts(self) -> BTreeMap<String, u64> {
        self.by_target
    }
}

/// Direction of travel of a message that needs acknowledging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToServer => write!(f, "client -> server"),
            Direction::ServerToClient => write!(f, "server -> client"),
        }
    }
}

/// Something about the log that made a result less meaningful without invalidating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationWarning {
    /// Not a single message in this direction was matched with its acknowledgement.
    NoSamples(Direction),
}

impl fmt::Display for CorrelationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationWarning::NoSamples(direction) => {
                write!(f, "Could not record time deltas for {direction} messages.")
            }
        }
    }
}

/// Delivery delays of the matched messages in one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionDelay {
    pub direction: Direction,
    /// One delay per matched message, in seconds. Negative when the acknowledgement was logged
    /// before the message was created.
    pub samples: Vec<f64>,
    /// Mean of [DirectionDelay::samples], `0.0` when there are none.
    pub average_secs: f64,
}

impl DirectionDelay {
    fn from_samples(direction: Direction, samples: Vec<f64>) -> Self {
        let average_secs = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        };

        Self {
            direction,
            samples,
            average_secs,
        }
    }

    pub fn stats(&self) -> Option<SummaryStats> {
        SummaryStats::from_samples(&self.samples)
    }
}

/// Delivery delays in both directions, only computed when reliable messaging is on.
#[derive(Debug, Clone, PartialEq)]
pub struct Delays {
    pub client_to_server: DirectionDelay,
    pub server_to_client: DirectionDelay,
    pub warnings: Vec<CorrelationWarning>,
}

impl Delays {
    /// The average time to deliver a message to a client, in seconds.
    pub fn average_delivery_secs(&self) -> f64 {
        self.server_to_client.average_secs
    }
}

#[derive(Debug, Clone)]
pub struct Correlation {
    pub counters: MessageCounters,
    /// [None] when reliable messaging was off.
    pub delays: Option<Delays>,
}

#[derive(Debug, Default)]
struct CorrelationEntry {
    created_at: Option<DateTime<Utc>>,
    ack_at: Option<DateTime<Utc>>,
}

impl CorrelationEntry {
    fn delay(&self) -> Option<TimeDelta> {
        Some(self.ack_at? - self.created_at?)
    }
}

/// Consumes message events one at a time and correlates them into counters and delays.
///
/// All state lives in the correlator, so each run should use a fresh one.
#[derive(Debug)]
pub struct Correlator {
    client_role: String,
    reliable: bool,
    counters: MessageCounters,
    /// Messages sent by clients, keyed by message id.
    client_origin: HashMap<String, CorrelationEntry>,
    /// Messages sent by the server, keyed by message id.
    server_origin: HashMap<String, CorrelationEntry>,
}

impl Correlator {
    /// `client_role` is the sender name identifying the game logic that acknowledges client
    /// messages and sends messages to clients.
    pub fn new(client_role: impl Into<String>, reliable: bool) -> Self {
        Self {
            client_role: client_role.into(),
            reliable,
            counters: MessageCounters::default(),
            client_origin: HashMap::new(),
            server_origin: HashMap::new(),
        }
    }

    pub fn observe(&mut self, event: &MessageEvent) {
        self.counters.record(&event.target);

        if !self.reliable {
            return;
        }

        let to_server = event.to == SERVER_RECIPIENT;
        let from_client_role = event.from == self.client_role;

        if event.target == ACK_TARGET {
            let Some(acked_id) = event.text.as_ref() else {
                log::trace!("Ignoring ACK {} without an acknowledged id", event.id);
                return;
            };

            if to_server {
                self.server_origin
                    .entry(acked_id.clone())
                    .or_default()
                    .ack_at = Some(event.timestamp);
            } else if from_client_role {
                self.client_origin
                    .entry(acked_id.clone())
                    .or_default()
                    .ack_at = Some(event.timestamp);
            }
        } else if to_server {
            self.client_origin
                .entry(event.id.clone())
                .or_default()
                .created_at = event.created;
        } else if from_client_role {
            self.server_origin
                .entry(event.id.clone())
                .or_default()
                .created_at = Some(event.timestamp);
        }
    }

    pub fn finish(self) -> Correlation {
        if !self.reliable {
            return Correlation {
                counters: self.counters,
                delays: None,
            };
        }

        let client_to_server =
            DirectionDelay::from_samples(Direction::ClientToServer, samples(&self.client_origin));
        let server_to_client =
            DirectionDelay::from_samples(Direction::ServerToClient, samples(&self.server_origin));

        let warnings = [&client_to_server, &server_to_client]
            .into_iter()
            .filter(|delay| delay.samples.is_empty())
            .map(|delay| CorrelationWarning::NoSamples(delay.direction))
            .collect::<Vec<_>>();
        for warning in &warnings {
            log::warn!("{warning}");
        }

        Correlation {
            counters: self.counters,
            delays: Some(Delays {
                client_to_server,
                server_to_client,
                warnings,
            }),
        }
    }
}

fn samples(entries: &HashMap<String, CorrelationEntry>) -> Vec<f64> {
    entries
        .values()
        .filter_map(CorrelationEntry::delay)
        .map(delta_secs)
        .collect()
}

fn delta_secs(delta: TimeDelta) -> f64 {
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1_000_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Correlate a sequence of events.
pub fn correlate<I>(events: I, reliable: bool, client_role: &str) -> Correlation
where
    I: IntoIterator<Item = MessageEvent>,
{
    let mut correlator = Correlator::new(client_role, reliable);
    for event in events {
        correlator.observe(&event);
    }
    correlator.finish()
}

/// Stream a message log through a [Correlator]. Fails on the first malformed line.
pub fn correlate_log(
    log: &MessageLog,
    reliable: bool,
    client_role: &str,
) -> Result<Correlation, MessageLogError> {
    let mut correlator = Correlator::new(client_role, reliable);
    for event in log.events()? {
        correlator.observe(&event?);
    }
    Ok(correlator.finish())
}
