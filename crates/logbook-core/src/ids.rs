use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreError;

/// 100-ns ticks between the Gregorian epoch (1582-10-15) and the Unix epoch.
const GREGORIAN_OFFSET: i128 = 0x01B2_1DD2_1381_4000;
const TICKS_PER_MILLI: i128 = 10_000;
const MAX_TICKS: i128 = (1 << 60) - 1;

/// Smallest LSB half under signed-byte comparison.
const MIN_LSB: [u8; 8] = [0x80; 8];
/// Largest LSB half under signed-byte comparison.
const MAX_LSB: [u8; 8] = [0x7f; 8];

/// A version-1 UUID: 60-bit timestamp, clock sequence and node.
///
/// Ordering matches the storage engine's timeuuid comparator: embedded
/// timestamp first, then the low eight bytes compared as signed bytes.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Uuid", into = "Uuid")]
pub struct TimeUuid(Uuid);

struct Generator {
    last_ticks: u64,
    lsb: [u8; 8],
}

fn generator() -> &'static Mutex<Generator> {
    static GENERATOR: OnceLock<Mutex<Generator>> = OnceLock::new();
    GENERATOR.get_or_init(|| {
        let clock_seq: u16 = rand::random();
        let node: [u8; 6] = rand::random();
        let mut lsb = [0u8; 8];
        lsb[0] = 0x80 | ((clock_seq >> 8) as u8 & 0x3f);
        lsb[1] = clock_seq as u8;
        lsb[2..].copy_from_slice(&node);
        // random node ids must carry the multicast bit
        lsb[2] |= 0x01;
        Mutex::new(Generator { last_ticks: 0, lsb })
    })
}

impl TimeUuid {
    /// Generate a fresh identifier for the current instant.
    ///
    /// Identifiers from one process are strictly increasing: when the clock
    /// has not advanced past the last issued tick, the tick is bumped.
    pub fn now() -> Self {
        let now = ticks_of(Utc::now(), false);
        let mut state = generator().lock();
        let ticks = now.max(state.last_ticks + 1);
        state.last_ticks = ticks;
        Self::from_parts(ticks, state.lsb)
    }

    /// An identifier whose timestamp is exactly the millisecond of `instant`.
    pub fn at(instant: DateTime<Utc>) -> Self {
        let mut lsb: [u8; 8] = rand::random();
        lsb[0] = 0x80 | (lsb[0] & 0x3f);
        Self::from_parts(ticks_of(instant, true), lsb)
    }

    /// The smallest identifier that can exist for the millisecond of `instant`.
    pub fn start_of(instant: DateTime<Utc>) -> Self {
        Self::from_parts(ticks_of(instant, true), MIN_LSB)
    }

    /// The largest identifier that can exist for the millisecond of `instant`.
    pub fn end_of(instant: DateTime<Utc>) -> Self {
        let ticks = (ticks_of(instant, true) + (TICKS_PER_MILLI as u64 - 1)).min(MAX_TICKS as u64);
        Self::from_parts(ticks, MAX_LSB)
    }

    pub fn from_uuid(uuid: Uuid) -> Result<Self, CoreError> {
        if uuid.get_version_num() == 1 {
            Ok(Self(uuid))
        } else {
            Err(CoreError::NotTimeBased(uuid.to_string()))
        }
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// The embedded timestamp, truncated to milliseconds.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let millis = (i128::from(self.ticks()) - GREGORIAN_OFFSET).div_euclid(TICKS_PER_MILLI);
        DateTime::from_timestamp_millis(millis as i64).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// The raw 60-bit count of 100-ns intervals since 1582-10-15.
    pub fn ticks(&self) -> u64 {
        let (low, mid, hi, _) = self.0.as_fields();
        (u64::from(hi & 0x0fff) << 48) | (u64::from(mid) << 32) | u64::from(low)
    }

    fn from_parts(ticks: u64, lsb: [u8; 8]) -> Self {
        let low = (ticks & 0xffff_ffff) as u32;
        let mid = ((ticks >> 32) & 0xffff) as u16;
        let hi = ((ticks >> 48) & 0x0fff) as u16 | 0x1000;
        Self(Uuid::from_fields(low, mid, hi, &lsb))
    }

    fn signed_lsb(&self) -> [i8; 8] {
        let bytes = self.0.as_bytes();
        let mut out = [0i8; 8];
        for (dst, src) in out.iter_mut().zip(&bytes[8..]) {
            *dst = *src as i8;
        }
        out
    }
}

/// Convert an instant to Gregorian ticks, clamped to the 60-bit range.
fn ticks_of(instant: DateTime<Utc>, truncate_to_millis: bool) -> u64 {
    let mut ticks = GREGORIAN_OFFSET + i128::from(instant.timestamp_millis()) * TICKS_PER_MILLI;
    if !truncate_to_millis {
        ticks += i128::from(instant.timestamp_subsec_nanos() % 1_000_000) / 100;
    }
    ticks.clamp(0, MAX_TICKS) as u64
}

impl Ord for TimeUuid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ticks()
            .cmp(&other.ticks())
            .then_with(|| self.signed_lsb().cmp(&other.signed_lsb()))
    }
}

impl PartialOrd for TimeUuid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<Uuid> for TimeUuid {
    type Error = CoreError;

    fn try_from(uuid: Uuid) -> Result<Self, Self::Error> {
        Self::from_uuid(uuid)
    }
}

impl From<TimeUuid> for Uuid {
    fn from(id: TimeUuid) -> Self {
        id.0
    }
}

impl fmt::Display for TimeUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for TimeUuid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(|e| CoreError::InvalidUuid(format!("{s}: {e}")))?;
        Self::from_uuid(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 28, 10, 30, 0).unwrap() + Duration::milliseconds(250)
    }

    #[test]
    fn now_is_version_one() {
        let id = TimeUuid::now();
        assert_eq!(id.as_uuid().get_version_num(), 1);
    }

    #[test]
    fn now_is_strictly_increasing() {
        let ids: Vec<TimeUuid> = (0..1000).map(|_| TimeUuid::now()).collect();
        for w in ids.windows(2) {
            assert!(w[0] < w[1], "not monotonic: {} >= {}", w[0], w[1]);
        }
    }

    #[test]
    fn now_timestamp_is_close_to_wall_clock() {
        let before = Utc::now() - Duration::seconds(1);
        let id = TimeUuid::now();
        let after = Utc::now() + Duration::seconds(1);
        assert!(id.timestamp() >= before && id.timestamp() <= after);
    }

    #[test]
    fn at_preserves_millisecond() {
        let id = TimeUuid::at(instant());
        assert_eq!(id.timestamp(), instant());
    }

    #[test]
    fn bounds_enclose_the_millisecond() {
        let start = TimeUuid::start_of(instant());
        let end = TimeUuid::end_of(instant());
        for _ in 0..50 {
            let id = TimeUuid::at(instant());
            assert!(start <= id && id <= end);
        }
        assert_eq!(start.timestamp(), instant());
        assert_eq!(end.timestamp(), instant());
    }

    #[test]
    fn end_of_precedes_next_millisecond() {
        let end = TimeUuid::end_of(instant());
        let next = TimeUuid::start_of(instant() + Duration::milliseconds(1));
        assert!(end < next);
    }

    #[test]
    fn signed_lsb_ordering() {
        // 0x80 is the most negative signed byte, 0x7f the most positive
        let lo = TimeUuid::from_parts(100, MIN_LSB);
        let hi = TimeUuid::from_parts(100, MAX_LSB);
        let mid = TimeUuid::from_parts(100, [0; 8]);
        assert!(lo < mid && mid < hi);
    }

    #[test]
    fn timestamp_dominates_lsb() {
        let earlier = TimeUuid::from_parts(100, MAX_LSB);
        let later = TimeUuid::from_parts(101, MIN_LSB);
        assert!(earlier < later);
    }

    #[test]
    fn rejects_non_time_based() {
        let err = TimeUuid::from_uuid(Uuid::nil()).unwrap_err();
        assert!(matches!(err, CoreError::NotTimeBased(_)));

        let v4 = Uuid::from_u128(0x9b2f_0c1e_4d3a_4f6b_8c2d_7e1f_0a9b_3c4d);
        assert!(TimeUuid::from_uuid(v4).is_err());
    }

    #[test]
    fn display_and_from_str_roundtrip() {
        let id = TimeUuid::now();
        let parsed: TimeUuid = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_str_rejects_garbage() {
        let err = "not-a-uuid".parse::<TimeUuid>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidUuid(_)));
    }

    #[test]
    fn serde_is_transparent_string() {
        let id = TimeUuid::now();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: TimeUuid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn serde_rejects_random_uuid() {
        let json = "\"9b2f0c1e-4d3a-4f6b-8c2d-7e1f0a9b3c4d\"";
        assert!(serde_json::from_str::<TimeUuid>(json).is_err());
    }
}
