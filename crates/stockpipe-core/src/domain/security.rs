use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Integer identifier of a tradable security, such as `2330`.
///
/// Any 32-bit integer is accepted; only text that is not an integer is
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub struct SecurityId(i32);

impl SecurityId {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySecurityId);
        }

        let value = trimmed
            .parse::<i32>()
            .map_err(|_| ValidationError::InvalidSecurityId {
                value: trimmed.to_owned(),
            })?;
        Ok(Self::new(value))
    }

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl Display for SecurityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SecurityId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<i32> for SecurityId {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

impl From<SecurityId> for i32 {
    fn from(value: SecurityId) -> Self {
        value.0
    }
}
