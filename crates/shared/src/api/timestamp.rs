use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned time as the conversation store delivers it.
///
/// Realtime stores hand back their own timestamp object, while exported or
/// replayed documents usually carry a plain RFC 3339 instant. A missing or
/// `null` value is a pending server timestamp and is modelled as `None` at the
/// field level rather than here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreTimestamp {
    Native { seconds: i64, nanoseconds: u32 },
    Instant(DateTime<Utc>),
}

impl StoreTimestamp {
    /// Wrap an instant in the store-native representation.
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        StoreTimestamp::Native {
            seconds: instant.timestamp(),
            nanoseconds: instant.timestamp_subsec_nanos(),
        }
    }

    /// Convert to a plain instant. Out-of-range native values yield `None`.
    pub fn to_instant(&self) -> Option<DateTime<Utc>> {
        match *self {
            StoreTimestamp::Native {
                seconds,
                nanoseconds,
            } => DateTime::from_timestamp(seconds, nanoseconds),
            StoreTimestamp::Instant(instant) => Some(instant),
        }
    }
}
