use std::time::Duration;

/// A monotonic instant, in nanoseconds.
///
/// `Timestamp::NEVER` is the distinguished "no time" value used by both the
/// scheduler (as part of `Tag::NEVER`) and the watchdog (an inactive
/// `expiration`). `Timestamp::FOREVER` plays the same role for "the final
/// tag" / "no deadline".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const NEVER: Self = Self(i64::MIN);
    pub const FOREVER: Self = Self(i64::MAX);
    pub const ZERO: Self = Self(0);

    /// The current monotonic time, in nanoseconds since an arbitrary epoch.
    ///
    /// Backed by [`std::time::Instant`] rather than the wall clock: the
    /// scheduler only ever compares `Timestamp`s against each other or
    /// against deadlines computed from the same clock.
    pub fn now() -> Self {
        use std::sync::OnceLock;
        use std::time::Instant;
        static START: OnceLock<Instant> = OnceLock::new();
        let start = *START.get_or_init(Instant::now);
        Self(start.elapsed().as_nanos() as i64)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, offset: Duration) -> Option<Self> {
        i64::try_from(offset.as_nanos())
            .ok()
            .and_then(|n| self.0.checked_add(n))
            .map(Self)
    }

    pub fn checked_duration_since(&self, earlier: Self) -> Option<Duration> {
        self.0
            .checked_sub(earlier.0)
            .filter(|&d| d >= 0)
            .map(|d| Duration::from_nanos(d as u64))
    }
}

impl From<Duration> for Timestamp {
    fn from(duration: Duration) -> Self {
        Self(duration.as_nanos() as i64)
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        self.checked_add(rhs).unwrap_or(Self::FOREVER)
    }
}

/// A logical time point `(time, microstep)`.
///
/// Tags are totally ordered lexicographically by `(time, microstep)`.
/// `Tag::NEVER` represents "no time"; `Tag::FOREVER` the final tag after
/// which the scheduler signals all workers to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    time: Timestamp,
    microstep: u32,
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(t={}, ms={})", self.time.as_nanos(), self.microstep)
    }
}

impl Tag {
    pub const NEVER: Self = Self {
        time: Timestamp::NEVER,
        microstep: 0,
    };

    pub const FOREVER: Self = Self {
        time: Timestamp::FOREVER,
        microstep: u32::MAX,
    };

    pub const ZERO: Self = Self {
        time: Timestamp::ZERO,
        microstep: 0,
    };

    pub fn new(time: Timestamp, microstep: u32) -> Self {
        Self { time, microstep }
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    pub fn microstep(&self) -> u32 {
        self.microstep
    }

    /// The next microstep at the same time, i.e. a same-time tag advance.
    pub fn next_microstep(&self) -> Self {
        Self {
            time: self.time,
            microstep: self.microstep + 1,
        }
    }

    /// A tag `offset` later than this one, at microstep 0.
    pub fn delay(&self, offset: Duration) -> Self {
        Self {
            time: self.time + offset,
            microstep: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_order_lexicographically() {
        let a = Tag::new(Timestamp::from(Duration::from_secs(1)), 5);
        let b = Tag::new(Timestamp::from(Duration::from_secs(1)), 6);
        let c = Tag::new(Timestamp::from(Duration::from_secs(2)), 0);
        assert!(a < b);
        assert!(b < c);
        assert!(Tag::NEVER < a);
        assert!(c < Tag::FOREVER);
    }

    #[test]
    fn next_microstep_keeps_time() {
        let a = Tag::new(Timestamp::from(Duration::from_secs(1)), 5);
        let b = a.next_microstep();
        assert_eq!(a.time(), b.time());
        assert_eq!(b.microstep(), 6);
    }
}
