//! Stream container
//!
//! An append-only sequence of `(id, fields)` entries where ids are
//! `<millis>-<sequence>`. Ids assigned by `*` are strictly increasing
//! even when the wall clock stalls or steps backwards, and the last
//! issued id survives snapshots so a restart inside the same millisecond
//! cannot reissue an id.

use monarch_core::{now_millis, Document, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stream entry id: milliseconds plus a per-millisecond sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId {
    /// Milliseconds since epoch
    pub ms: i64,
    /// Sequence within the millisecond
    pub seq: u64,
}

impl StreamId {
    /// Smallest possible id
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    /// Largest possible id
    pub const MAX: StreamId = StreamId {
        ms: i64::MAX,
        seq: u64::MAX,
    };

    /// Next id after this one
    pub fn successor(&self) -> StreamId {
        if self.seq == u64::MAX {
            StreamId {
                ms: self.ms + 1,
                seq: 0,
            }
        } else {
            StreamId {
                ms: self.ms,
                seq: self.seq + 1,
            }
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (ms, seq) = match s.split_once('-') {
            Some((ms, seq)) => (
                ms.parse::<i64>(),
                seq.parse::<u64>(),
            ),
            None => (s.parse::<i64>(), Ok(0)),
        };
        match (ms, seq) {
            (Ok(ms), Ok(seq)) if ms >= 0 => Ok(StreamId { ms, seq }),
            _ => Err(Error::InvalidArgument(format!("invalid stream id: {s}"))),
        }
    }
}

/// Parse a range bound: `-` and `+` are open ends; a bare millisecond
/// takes sequence 0 at the start and the maximum at the end
pub fn parse_bound(s: &str, is_start: bool) -> Result<StreamId> {
    match s {
        "-" => Ok(StreamId::MIN),
        "+" => Ok(StreamId::MAX),
        _ => {
            if s.contains('-') {
                s.parse()
            } else {
                let ms = s
                    .parse::<i64>()
                    .map_err(|_| Error::InvalidArgument(format!("invalid stream id: {s}")))?;
                Ok(StreamId {
                    ms,
                    seq: if is_start { 0 } else { u64::MAX },
                })
            }
        }
    }
}

/// An append-only stream of field documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    entries: Vec<(StreamId, Document)>,
    /// Highest id ever issued, persisted so restarts never reissue
    last_id: Option<StreamId>,
}

impl Stream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an id spec without mutating: `*` assigns the next id
    ///
    /// Explicit ids must be strictly greater than the last issued id.
    pub fn resolve_id(&self, spec: &str) -> Result<StreamId> {
        if spec == "*" {
            let now = now_millis();
            return Ok(match self.last_id {
                Some(last) if now <= last.ms => last.successor(),
                _ => StreamId { ms: now, seq: 0 },
            });
        }
        let id: StreamId = spec.parse()?;
        match self.last_id {
            Some(last) if id <= last => Err(Error::InvalidArgument(format!(
                "stream id {id} is not greater than the last id {last}"
            ))),
            _ => Ok(id),
        }
    }

    /// Append an entry under a resolved id
    pub fn insert(&mut self, id: StreamId, fields: Document) -> Result<()> {
        if let Some(last) = self.last_id {
            if id <= last {
                return Err(Error::InvalidArgument(format!(
                    "stream id {id} is not greater than the last id {last}"
                )));
            }
        }
        self.entries.push((id, fields));
        self.last_id = Some(id);
        Ok(())
    }

    /// Resolve and append in one step
    pub fn xadd(&mut self, spec: &str, fields: Document) -> Result<StreamId> {
        let id = self.resolve_id(spec)?;
        self.insert(id, fields)?;
        Ok(id)
    }

    /// Entries with `start <= id <= end`
    pub fn xrange(&self, start: StreamId, end: StreamId) -> Vec<(StreamId, Document)> {
        let lo = self.entries.partition_point(|(id, _)| *id < start);
        let hi = self.entries.partition_point(|(id, _)| *id <= end);
        self.entries[lo..hi].to_vec()
    }

    /// Number of entries
    pub fn xlen(&self) -> usize {
        self.entries.len()
    }

    /// True when the stream holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest id ever issued
    pub fn last_id(&self) -> Option<StreamId> {
        self.last_id
    }

    /// Drop entries from the head until at most `maxlen` remain;
    /// returns how many were removed
    pub fn xtrim_maxlen(&mut self, maxlen: usize) -> usize {
        if self.entries.len() <= maxlen {
            return 0;
        }
        let excess = self.entries.len() - maxlen;
        self.entries.drain(..excess);
        excess
    }

    /// Drop entries with id strictly below `minid`; returns how many
    /// were removed
    pub fn xtrim_minid(&mut self, minid: StreamId) -> usize {
        let cut = self.entries.partition_point(|(id, _)| *id < minid);
        self.entries.drain(..cut);
        cut
    }
}
