use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Second + nanosecond instant used for file times and sync watermarks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: u32,
}

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp { sec: 0, nsec: 0 };

    pub fn new(sec: i64, nsec: u32) -> Self {
        Self {
            sec: sec.saturating_add(i64::from(nsec / 1_000_000_000)),
            nsec: nsec % 1_000_000_000,
        }
    }

    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    pub fn is_epoch(&self) -> bool {
        *self == Self::EPOCH
    }

    pub fn parse_rfc3339(value: &str) -> Result<Self, time::error::Parse> {
        let parsed = OffsetDateTime::parse(value, &Rfc3339)?;
        Ok(Self::new(parsed.unix_timestamp(), parsed.nanosecond()))
    }
}

impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        match value.duration_since(UNIX_EPOCH) {
            Ok(after) => Self::new(after.as_secs() as i64, after.subsec_nanos()),
            Err(err) => {
                // pre-1970 mtimes show up on some restored archives
                let before = err.duration();
                let mut sec = -(before.as_secs() as i64);
                let mut nsec = before.subsec_nanos();
                if nsec > 0 {
                    sec -= 1;
                    nsec = 1_000_000_000 - nsec;
                }
                Self { sec, nsec }
            }
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = i128::from(self.sec) * 1_000_000_000 + i128::from(self.nsec);
        match OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(|dt| dt.format(&Rfc3339).ok())
        {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}.{:09}", self.sec, self.nsec),
        }
    }
}
