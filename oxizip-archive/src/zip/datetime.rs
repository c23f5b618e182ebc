//! Packed MS-DOS date and time.
//!
//! ZIP records store timestamps as two 16-bit words:
//!
//! ```text
//! time: hhhhh mmmmmm sssss   (seconds in two-second units)
//! date: yyyyyyy mmmm ddddd   (years since 1980)
//! ```
//!
//! The format has no time zone; values are treated as UTC. Odd seconds
//! cannot be represented and are truncated to the even second below, so a
//! save/read round trip may move a timestamp back by one second.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SECONDS_PER_DAY: u64 = 86_400;

/// A broken-down DOS timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DosDateTime {
    /// Year, 1980 to 2107.
    pub year: u16,
    /// Month, 1 to 12.
    pub month: u8,
    /// Day of month, 1 to 31.
    pub day: u8,
    /// Hour, 0 to 23.
    pub hour: u8,
    /// Minute, 0 to 59.
    pub minute: u8,
    /// Second, always even, 0 to 58.
    pub second: u8,
}

impl Default for DosDateTime {
    /// The DOS epoch, 1980-01-01 00:00:00.
    fn default() -> Self {
        Self {
            year: 1980,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }
}

impl DosDateTime {
    /// Latest representable timestamp, 2107-12-31 23:59:58.
    pub const MAX: Self = Self {
        year: 2107,
        month: 12,
        day: 31,
        hour: 23,
        minute: 59,
        second: 58,
    };

    /// Build from the separate time and date words of a record.
    pub fn from_parts(time: u16, date: u16) -> Self {
        Self {
            year: 1980 + (date >> 9),
            month: ((date >> 5) & 0x0F) as u8,
            day: (date & 0x1F) as u8,
            hour: (time >> 11) as u8,
            minute: ((time >> 5) & 0x3F) as u8,
            second: ((time & 0x1F) * 2) as u8,
        }
    }

    /// Unpack a 32-bit value with the date in the high word.
    pub fn unpack(packed: u32) -> Self {
        Self::from_parts(packed as u16, (packed >> 16) as u16)
    }

    /// Pack into a 32-bit value with the date in the high word.
    pub fn pack(&self) -> u32 {
        (u32::from(self.dos_date()) << 16) | u32::from(self.dos_time())
    }

    /// The time word.
    pub fn dos_time(&self) -> u16 {
        (u16::from(self.hour) << 11) | (u16::from(self.minute) << 5) | u16::from(self.second / 2)
    }

    /// The date word.
    pub fn dos_date(&self) -> u16 {
        (self.year.saturating_sub(1980) << 9) | (u16::from(self.month) << 5) | u16::from(self.day)
    }

    /// Convert from a system timestamp, clamping to the DOS range.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs(),
            Err(_) => return Self::default(),
        };
        let days = (secs / SECONDS_PER_DAY) as i64;
        let rem = secs % SECONDS_PER_DAY;
        let (year, month, day) = civil_from_days(days);

        if year < 1980 {
            return Self::default();
        }
        if year > 2107 {
            return Self::MAX;
        }
        Self {
            year: year as u16,
            month,
            day,
            hour: (rem / 3600) as u8,
            minute: (rem % 3600 / 60) as u8,
            second: (rem % 60 / 2 * 2) as u8,
        }
    }

    /// Convert to a system timestamp.
    ///
    /// Out-of-range fields found in damaged records are clamped rather
    /// than rejected.
    pub fn to_system_time(&self) -> SystemTime {
        let month = self.month.clamp(1, 12);
        let day = self.day.clamp(1, 31);
        let days = days_from_civil(i64::from(self.year), month, day);
        let secs = days as u64 * SECONDS_PER_DAY
            + u64::from(self.hour.min(23)) * 3600
            + u64::from(self.minute.min(59)) * 60
            + u64::from(self.second.min(59));
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    /// The current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }
}

impl std::fmt::Display for DosDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let month = i64::from(month);
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`days_from_civil`].
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_known_timestamp() {
        // 2024-02-29 13:45:31 UTC
        let dos = DosDateTime::from_system_time(at(1_709_214_331));
        assert_eq!(
            (dos.year, dos.month, dos.day, dos.hour, dos.minute),
            (2024, 2, 29, 13, 45)
        );
        assert_eq!(dos.dos_time(), 0x6DAF);
        assert_eq!(dos.dos_date(), 0x585D);
        assert_eq!(dos.pack(), 0x585D_6DAF);
        assert_eq!(DosDateTime::unpack(0x585D_6DAF), dos);
    }

    #[test]
    fn test_odd_seconds_truncate() {
        let dos = DosDateTime::from_system_time(at(1_709_214_331));
        assert_eq!(dos.second, 30);
        assert_eq!(dos.to_system_time(), at(1_709_214_330));

        // Even seconds survive unchanged.
        let even = DosDateTime::from_system_time(at(1_709_214_330));
        assert_eq!(even.to_system_time(), at(1_709_214_330));
    }

    #[test]
    fn test_range_clamping() {
        assert_eq!(DosDateTime::from_system_time(at(0)), DosDateTime::default());
        assert_eq!(DosDateTime::default().to_system_time(), at(315_532_800));
        assert_eq!(
            DosDateTime::from_system_time(at(5_000_000_000)),
            DosDateTime::MAX
        );
        assert_eq!(DosDateTime::MAX.to_system_time(), at(4_354_819_198));
    }

    #[test]
    fn test_zeroed_record_fields() {
        // A record with all-zero date words decodes to a usable time.
        let dos = DosDateTime::from_parts(0, 0);
        assert_eq!(dos.to_system_time(), at(315_532_800));
    }

    #[test]
    fn test_civil_roundtrip() {
        for days in [-1, 0, 59, 365, 3652, 11_016, 19_782, 50_000] {
            let (y, m, d) = civil_from_days(days);
            assert_eq!(days_from_civil(y, m, d), days);
        }
    }

    #[test]
    fn test_display() {
        let dos = DosDateTime::unpack(0x585D_6DAF);
        assert_eq!(dos.to_string(), "2024-02-29 13:45:30");
    }
}
