//! Shared identifier wrappers for the Generation Orchestration Core.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Error returned when parsing a UUID-backed identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

macro_rules! define_uuid_id {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                Uuid::parse_str(value)
                    .map_err(|e| IdParseError::new(format!("Invalid {}: {}", $label, e)))?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

define_uuid_id!(OwnerId, "owner ID");
define_uuid_id!(JobId, "job ID");
define_uuid_id!(ReservationId, "reservation ID");
define_uuid_id!(ProviderCallId, "provider call ID");
define_uuid_id!(CorrelationId, "correlation ID");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_parseable() {
        let id = JobId::new();
        let parsed = JobId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_non_uuid_strings() {
        assert!(OwnerId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn display_matches_as_str() {
        let id = ReservationId::new();
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn distinct_id_types_do_not_compare() {
        let job = JobId::new();
        let owner = OwnerId::parse(job.as_str()).unwrap();
        assert_eq!(job.as_str(), owner.as_str());
    }
}
