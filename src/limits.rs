use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Range advertised for servos without a registered limit. Not enforced.
pub const UNLIMITED_RANGE: (i32, i32) = (0, 1000);

#[derive(Error, Debug, PartialEq)]
pub enum LimitError {
    #[error("servo {servo_id}: min {min} is greater than max {max}")]
    InvalidLimit { servo_id: u8, min: i32, max: i32 },
    #[error("invalid limit {0:?}, expected ID:MIN:MAX")]
    Parse(String),
}

#[derive(Error, Debug, PartialEq, Clone, Copy)]
#[error("Position {position} out of bounds for servo {servo_id}! Allowed range: {min}-{max}")]
pub struct OutOfRange {
    pub servo_id: u8,
    pub position: i32,
    pub min: i32,
    pub max: i32,
}

/// Inclusive position range of one servo.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ServoLimit {
    servo_id: u8,
    min_position: i32,
    max_position: i32,
}

impl ServoLimit {
    pub fn new(
        servo_id: u8,
        min_position: i32,
        max_position: i32,
    ) -> Result<ServoLimit, LimitError> {
        if min_position > max_position {
            return Err(LimitError::InvalidLimit {
                servo_id,
                min: min_position,
                max: max_position,
            });
        }
        Ok(ServoLimit {
            servo_id,
            min_position,
            max_position,
        })
    }

    pub fn servo_id(&self) -> u8 {
        self.servo_id
    }

    pub fn min_position(&self) -> i32 {
        self.min_position
    }

    pub fn max_position(&self) -> i32 {
        self.max_position
    }

    pub fn contains(&self, position: i32) -> bool {
        (self.min_position..=self.max_position).contains(&position)
    }
}

impl FromStr for ServoLimit {
    type Err = LimitError;

    /// Parses `ID:MIN:MAX`, e.g. `4:300:1000`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_error = || LimitError::Parse(s.to_owned());
        let mut parts = s.trim().split(':');
        let servo_id = parts
            .next()
            .and_then(|part| part.trim().parse().ok())
            .ok_or_else(parse_error)?;
        let min = parts
            .next()
            .and_then(|part| part.trim().parse().ok())
            .ok_or_else(parse_error)?;
        let max = parts
            .next()
            .and_then(|part| part.trim().parse().ok())
            .ok_or_else(parse_error)?;
        if parts.next().is_some() {
            return Err(parse_error());
        }
        ServoLimit::new(servo_id, min, max)
    }
}

impl fmt::Display for ServoLimit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.min_position, self.max_position)
    }
}

/// Per-servo position limits. Servos without an entry are not limited.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LimitTable {
    limits: BTreeMap<u8, ServoLimit>,
}

impl LimitTable {
    pub fn new() -> LimitTable {
        LimitTable::default()
    }

    /// Limits for the arm this tool was written for.
    ///
    /// Servo 2 hits its holder above 850 and points straight up at 500.
    pub fn factory() -> LimitTable {
        LimitTable::new()
            .with_limit(ServoLimit {
                servo_id: 4,
                min_position: 300,
                max_position: 1000,
            })
            .with_limit(ServoLimit {
                servo_id: 5,
                min_position: 0,
                max_position: 1000,
            })
            .with_limit(ServoLimit {
                servo_id: 2,
                min_position: 500,
                max_position: 850,
            })
    }

    pub fn with_limit(mut self, limit: ServoLimit) -> LimitTable {
        self.insert(limit);
        self
    }

    /// Registers `limit`, replacing any previous entry for the same servo.
    pub fn insert(&mut self, limit: ServoLimit) -> Option<ServoLimit> {
        self.limits.insert(limit.servo_id, limit)
    }

    pub fn lookup(&self, servo_id: u8) -> Option<ServoLimit> {
        self.limits.get(&servo_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServoLimit> {
        self.limits.values()
    }

    /// Fails when `servo_id` has a limit and `position` falls outside it.
    pub fn check(&self, servo_id: u8, position: i32) -> Result<(), OutOfRange> {
        match self.lookup(servo_id) {
            Some(limit) if !limit.contains(position) => Err(OutOfRange {
                servo_id,
                position,
                min: limit.min_position,
                max: limit.max_position,
            }),
            _ => Ok(()),
        }
    }

    pub fn describe(&self, servo_id: u8) -> String {
        match self.lookup(servo_id) {
            Some(limit) => format!("Servo {} | Limits: {}", servo_id, limit),
            None => format!(
                "Servo {} | No limits set (use {}-{})",
                servo_id, UNLIMITED_RANGE.0, UNLIMITED_RANGE.1
            ),
        }
    }
}

impl FromIterator<ServoLimit> for LimitTable {
    fn from_iter<I: IntoIterator<Item = ServoLimit>>(iter: I) -> Self {
        let mut table = LimitTable::new();
        for limit in iter {
            table.insert(limit);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_registered_and_unregistered() {
        let table = LimitTable::factory();
        let limit = table.lookup(4).unwrap();
        assert_eq!((limit.min_position(), limit.max_position()), (300, 1000));
        assert_eq!(table.lookup(7), None);
    }

    #[test]
    fn check_is_inclusive() {
        let table = LimitTable::factory();
        assert!(table.check(2, 500).is_ok());
        assert!(table.check(2, 850).is_ok());
        assert_eq!(
            table.check(2, 499),
            Err(OutOfRange {
                servo_id: 2,
                position: 499,
                min: 500,
                max: 850
            })
        );
        assert!(table.check(2, 851).is_err());
    }

    #[test]
    fn unregistered_servo_is_never_out_of_range() {
        let table = LimitTable::factory();
        for position in [i32::MIN, -1, 0, 1000, 1001, i32::MAX] {
            assert!(table.check(9, position).is_ok());
        }
    }

    #[test]
    fn min_greater_than_max_is_rejected() {
        assert_eq!(
            ServoLimit::new(1, 10, 5),
            Err(LimitError::InvalidLimit {
                servo_id: 1,
                min: 10,
                max: 5
            })
        );
        assert!(ServoLimit::new(1, 5, 5).is_ok());
    }

    #[test]
    fn parse_limit() {
        let limit: ServoLimit = "4:300:1000".parse().unwrap();
        assert_eq!(limit, ServoLimit::new(4, 300, 1000).unwrap());
        assert_eq!(
            "4:300".parse::<ServoLimit>(),
            Err(LimitError::Parse("4:300".to_owned()))
        );
        assert!("4:300:1000:1".parse::<ServoLimit>().is_err());
        assert!("x:0:1".parse::<ServoLimit>().is_err());
        assert!("300:0:1".parse::<ServoLimit>().is_err());
        assert!(matches!(
            "4:900:100".parse::<ServoLimit>(),
            Err(LimitError::InvalidLimit { .. })
        ));
    }

    #[test]
    fn insert_replaces_existing_entry() {
        let mut table = LimitTable::factory();
        let previous = table.insert(ServoLimit::new(4, 0, 10).unwrap());
        assert_eq!(previous, Some(ServoLimit::new(4, 300, 1000).unwrap()));
        assert!(table.check(4, 11).is_err());
    }

    #[test]
    fn describe_servo() {
        let table = LimitTable::factory();
        assert_eq!(table.describe(4), "Servo 4 | Limits: 300-1000");
        assert_eq!(table.describe(8), "Servo 8 | No limits set (use 0-1000)");
    }

    #[test]
    fn collect_from_limits() {
        let table: LimitTable = vec![
            ServoLimit::new(1, 0, 10).unwrap(),
            ServoLimit::new(3, 20, 30).unwrap(),
        ]
        .into_iter()
        .collect();
        let ids: Vec<u8> = table.iter().map(|limit| limit.servo_id()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(LimitTable::new().is_empty());
    }
}
