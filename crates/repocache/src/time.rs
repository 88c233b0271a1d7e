//! Small wrapper around `jiff` so the rest of the crate works with
//! `std::time::Duration` at its edges (matching the index format's
//! nanosecond-integer durations) while storing wall-clock points as
//! `jiff::Timestamp` (ISO-8601 on the wire).

use std::time::Duration;

use jiff::Timestamp;

use crate::error::CacheError;

#[must_use]
pub fn now() -> Timestamp {
    Timestamp::now()
}

/// Adds `duration` to `ts`, returning [`CacheError::Clock`] on overflow.
pub fn add(ts: Timestamp, duration: Duration) -> Result<Timestamp, CacheError> {
    let target = i128::from(ts.as_nanosecond()) + i128::try_from(duration.as_nanos()).unwrap_or(i128::MAX);
    Timestamp::from_nanosecond(target).map_err(|err| CacheError::Clock(err.to_string()))
}

/// Elapsed time from `earlier` to `later`, saturating at zero if `later`
/// is not after `earlier`.
#[must_use]
pub fn elapsed(later: Timestamp, earlier: Timestamp) -> Duration {
    let delta = i128::from(later.as_nanosecond()) - i128::from(earlier.as_nanosecond());
    if delta <= 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(u64::try_from(delta).unwrap_or(u64::MAX))
    }
}

pub(crate) mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => {
                let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
                Some(nanos).serialize(serializer)
            }
            None => None::<i64>.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<i64> = Option::deserialize(deserializer)?;
        Ok(raw.map(|nanos| Duration::from_nanos(nanos.max(0).unsigned_abs())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_elapsed_round_trips() {
        let start = now();
        let later = add(start, Duration::from_secs(5)).unwrap();
        assert_eq!(elapsed(later, start), Duration::from_secs(5));
    }

    #[test]
    fn elapsed_saturates_at_zero_when_not_after() {
        let start = now();
        assert_eq!(elapsed(start, start), Duration::ZERO);
    }
}
