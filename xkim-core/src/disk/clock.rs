//! Real-time clock record returned by the peer.

use std::fmt;

/// Binary clock reading, one byte per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockRecord {
    pub month: u8,
    pub day: u8,
    /// Year within the century (0-99).
    pub year: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 0 = Sunday
    pub day_of_week: u8,
}

impl ClockRecord {
    /// Size of the record on the wire.
    pub const LEN: usize = 7;

    pub fn from_bytes(raw: [u8; Self::LEN]) -> Self {
        Self {
            month: raw[0],
            day: raw[1],
            year: raw[2],
            hour: raw[3],
            minute: raw[4],
            second: raw[5],
            day_of_week: raw[6],
        }
    }

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        [
            self.month,
            self.day,
            self.year,
            self.hour,
            self.minute,
            self.second,
            self.day_of_week,
        ]
    }
}

/// Two ASCII decimal digits for a value in 0-99, with a leading zero.
///
/// Values above 99 wrap modulo 100.
pub fn decimal_pair(value: u8) -> [u8; 2] {
    let v = value % 100;
    [b'0' + v / 10, b'0' + v % 10]
}

impl fmt::Display for ClockRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            (self.month, '/'),
            (self.day, '/'),
            (self.year, ' '),
            (self.hour, ':'),
            (self.minute, ':'),
        ];
        for (value, sep) in fields {
            let [hi, lo] = decimal_pair(value);
            write!(f, "{}{}{}", hi as char, lo as char, sep)?;
        }
        let [hi, lo] = decimal_pair(self.second);
        write!(f, "{}{}", hi as char, lo as char)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_pair() {
        assert_eq!(&decimal_pair(0), b"00");
        assert_eq!(&decimal_pair(7), b"07");
        assert_eq!(&decimal_pair(99), b"99");
        assert_eq!(&decimal_pair(123), b"23");
    }

    #[test]
    fn test_bytes_round_trip() {
        let raw = [12, 31, 99, 23, 59, 58, 6];
        assert_eq!(ClockRecord::from_bytes(raw).to_bytes(), raw);
    }

    #[test]
    fn test_display() {
        let clock = ClockRecord::from_bytes([1, 2, 3, 4, 5, 6, 0]);
        assert_eq!(clock.to_string(), "01/02/03 04:05:06");
    }
}
