use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Execution mode of the daily job.
///
/// `Test` runs exercise the full pipeline against the test recipient set;
/// `Opr` is the real scheduled delivery. The mode is part of the idempotency
/// key, so one test run and one operational run may each happen per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Test,
    #[default]
    Opr,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Test => "test",
            Mode::Opr => "opr",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "test" => Ok(Mode::Test),
            "opr" => Ok(Mode::Opr),
            other => Err(CoreError::InvalidMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn mode_roundtrip() {
        assert_eq!(Mode::from_str("test").unwrap(), Mode::Test);
        assert_eq!(Mode::from_str("opr").unwrap(), Mode::Opr);
        assert_eq!(Mode::Test.to_string(), "test");
        assert_eq!(Mode::Opr.to_string(), "opr");
    }

    #[test]
    fn mode_rejects_unknown() {
        assert!(Mode::from_str("prod").is_err());
        assert!(Mode::from_str("").is_err());
    }
}
