//! Timeouts - Per-category operation budgets and per-instance overrides

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::resource::Value;

const MINUTE: u64 = 60;

/// Operation budget class of a resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeoutCategory {
    /// Quick control-plane writes
    #[default]
    Standard,
    /// Operations that provision infrastructure downstream (sites, clusters)
    LongRunning,
    /// Destructive or hard-to-reverse operations
    Critical,
}

impl TimeoutCategory {
    pub fn defaults(&self) -> TimeoutConfig {
        match self {
            TimeoutCategory::Standard => TimeoutConfig::minutes(10, 5, 10, 10),
            TimeoutCategory::LongRunning => TimeoutConfig::minutes(30, 5, 30, 30),
            TimeoutCategory::Critical => TimeoutConfig::minutes(20, 5, 20, 20),
        }
    }
}

impl fmt::Display for TimeoutCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeoutCategory::Standard => "standard",
            TimeoutCategory::LongRunning => "long-running",
            TimeoutCategory::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle operation a timeout applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Import => "import",
        };
        write!(f, "{}", name)
    }
}

/// Default durations for each operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl TimeoutConfig {
    fn minutes(create: u64, read: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * MINUTE),
            read: Duration::from_secs(read * MINUTE),
            update: Duration::from_secs(update * MINUTE),
            delete: Duration::from_secs(delete * MINUTE),
        }
    }

    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Read | Operation::Import => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// Per-instance overrides from a `timeouts` block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeoutOverrides {
    pub create: Option<Duration>,
    pub read: Option<Duration>,
    pub update: Option<Duration>,
    pub delete: Option<Duration>,
}

impl TimeoutOverrides {
    pub fn for_operation(&self, operation: Operation) -> Option<Duration> {
        match operation {
            Operation::Create => self.create,
            Operation::Read | Operation::Import => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    /// Parse a `timeouts` block value such as `{create = "30m", delete = "1h"}`
    ///
    /// `Null` yields no overrides. Unknown keys are rejected.
    pub fn from_value(value: &Value) -> Result<Self, InvalidDuration> {
        let mut overrides = Self::default();
        let map = match value {
            Value::Null => return Ok(overrides),
            Value::Map(map) => map,
            other => {
                return Err(InvalidDuration::new(
                    other.type_name(),
                    "timeouts must be a map",
                ));
            }
        };

        for (key, raw) in map {
            let parsed = match raw {
                Value::Null => None,
                Value::String(s) => Some(parse_duration(s)?),
                other => {
                    return Err(InvalidDuration::new(
                        other.type_name(),
                        "timeout must be a duration string",
                    ));
                }
            };
            match key.as_str() {
                "create" => overrides.create = parsed,
                "read" => overrides.read = parsed,
                "update" => overrides.update = parsed,
                "delete" => overrides.delete = parsed,
                _ => return Err(InvalidDuration::new(key, "unknown timeout operation")),
            }
        }

        Ok(overrides)
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_none()
            && self.read.is_none()
            && self.update.is_none()
            && self.delete.is_none()
    }
}

/// Resolve the budget for one remote call
///
/// A present, non-zero override wins over the category default.
pub fn resolve_timeout(
    category: TimeoutCategory,
    operation: Operation,
    overrides: &TimeoutOverrides,
) -> Duration {
    match overrides.for_operation(operation) {
        Some(d) if !d.is_zero() => d,
        _ => category.defaults().for_operation(operation),
    }
}

/// Duration string that cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid duration '{input}': {reason}")]
pub struct InvalidDuration {
    pub input: String,
    pub reason: &'static str,
}

impl InvalidDuration {
    fn new(input: impl Into<String>, reason: &'static str) -> Self {
        Self {
            input: input.into(),
            reason,
        }
    }
}

/// Parse a duration string such as `"45s"`, `"10m"`, `"1h30m"`, `"1.5h"` or `"500ms"`
pub fn parse_duration(input: &str) -> Result<Duration, InvalidDuration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(InvalidDuration::new(input, "empty duration"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(InvalidDuration::new(input, "expected a number"));
        }
        let number: f64 = rest[..number_len]
            .parse()
            .map_err(|_| InvalidDuration::new(input, "invalid number"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(InvalidDuration::new(input, "missing unit")),
            _ => return Err(InvalidDuration::new(input, "unknown unit")),
        };
        rest = &rest[unit_len..];
        total_nanos += number * nanos_per_unit;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_defaults() {
        let standard = TimeoutCategory::Standard.defaults();
        assert_eq!(standard.create, Duration::from_secs(600));
        assert_eq!(standard.read, Duration::from_secs(300));

        let long = TimeoutCategory::LongRunning.defaults();
        assert_eq!(long.create, Duration::from_secs(1800));
        assert_eq!(long.delete, Duration::from_secs(1800));
        assert_eq!(long.read, Duration::from_secs(300));

        let critical = TimeoutCategory::Critical.defaults();
        assert_eq!(critical.update, Duration::from_secs(1200));
    }

    #[test]
    fn override_wins_when_non_zero() {
        let overrides = TimeoutOverrides {
            create: Some(Duration::from_secs(90)),
            update: Some(Duration::ZERO),
            ..Default::default()
        };

        assert_eq!(
            resolve_timeout(TimeoutCategory::Standard, Operation::Create, &overrides),
            Duration::from_secs(90)
        );
        assert_eq!(
            resolve_timeout(TimeoutCategory::Standard, Operation::Update, &overrides),
            Duration::from_secs(600)
        );
        assert_eq!(
            resolve_timeout(TimeoutCategory::LongRunning, Operation::Delete, &overrides),
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn import_uses_read_budget() {
        let overrides = TimeoutOverrides {
            read: Some(Duration::from_secs(42)),
            ..Default::default()
        };
        assert_eq!(
            resolve_timeout(TimeoutCategory::Critical, Operation::Import, &overrides),
            Duration::from_secs(42)
        );
    }

    #[test]
    fn parse_durations() {
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("m10").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("1..5s").is_err());
    }

    #[test]
    fn overrides_from_value() {
        let value = Value::string_map([("create", "30m"), ("delete", "1h")]);
        let overrides = TimeoutOverrides::from_value(&value).unwrap();
        assert_eq!(overrides.create, Some(Duration::from_secs(1800)));
        assert_eq!(overrides.delete, Some(Duration::from_secs(3600)));
        assert_eq!(overrides.read, None);

        assert!(TimeoutOverrides::from_value(&Value::Null).unwrap().is_empty());
        assert!(TimeoutOverrides::from_value(&Value::string_map([("patch", "1m")])).is_err());
        assert!(TimeoutOverrides::from_value(&Value::Int(5)).is_err());
    }
}
