use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use crate::event::{Envelope, EventError, MessageEvent};

/// A message log on disk.
///
/// Every call to [MessageLog::events] reads the file again from the start.
#[derive(Debug, Clone)]
pub struct MessageLog {
    path: PathBuf,
}

impl MessageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the log and stream its events in file order.
    pub fn events(&self) -> Result<MessageEvents<BufReader<File>>, MessageLogError> {
        let file = File::open(&self.path).map_err(|source| MessageLogError::Open {
            path: self.path.clone(),
            source,
        })?;
        Ok(MessageEvents::new(BufReader::new(file)))
    }
}

/// Parse every event of the log at `path`.
///
/// The first malformed line fails the whole parse. The log is machine written, so a corrupt line
/// points at a deeper fault.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<Vec<MessageEvent>, MessageLogError> {
    MessageLog::new(path.as_ref()).events()?.collect()
}

/// Streams [MessageEvent]s out of newline delimited JSON envelopes. Blank lines are skipped.
pub struct MessageEvents<R> {
    lines: Lines<R>,
    line_number: usize,
}

impl<R: BufRead> MessageEvents<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for MessageEvents<R> {
    type Item = Result<MessageEvent, MessageLogError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(MessageLogError::Io(e))),
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            return Some(parse_line(&line).map_err(|source| MessageLogError::Malformed {
                line: self.line_number,
                source,
            }));
        }
    }
}

fn parse_line(line: &str) -> Result<MessageEvent, EventError> {
    serde_json::from_str::<Envelope>(line)?.into_event()
}

/// An error type for reading a [MessageLog].
#[derive(Debug, thiserror::Error)]
pub enum MessageLogError {
    #[error("Failed to open message log {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed message log entry on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: EventError,
    },
}
