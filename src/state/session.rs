use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which client app an actor is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Requests rides, cancels them, rates riders.
    Passenger,
    /// Claims rides and drives them forward.
    Rider,
}

impl ActorRole {
    /// The other party of a ride.
    pub fn counterparty(self) -> Self {
        match self {
            ActorRole::Passenger => ActorRole::Rider,
            ActorRole::Rider => ActorRole::Passenger,
        }
    }

    /// Wire representation, identical to the serde name.
    pub fn as_str(self) -> &'static str {
        match self {
            ActorRole::Passenger => "passenger",
            ActorRole::Rider => "rider",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "passenger" => Ok(ActorRole::Passenger),
            "rider" => Ok(ActorRole::Rider),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

/// Authenticated caller of a lifecycle operation.
///
/// Built once at the edge and passed explicitly to every service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Identity assigned by the external auth provider.
    pub user_id: String,
    /// App the caller is using.
    pub role: ActorRole,
}

impl Session {
    /// Create a session for `user_id` acting as `role`.
    pub fn new(user_id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Shorthand for a passenger session.
    pub fn passenger(user_id: impl Into<String>) -> Self {
        Self::new(user_id, ActorRole::Passenger)
    }

    /// Shorthand for a rider session.
    pub fn rider(user_id: impl Into<String>) -> Self {
        Self::new(user_id, ActorRole::Rider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("Rider".parse::<ActorRole>(), Ok(ActorRole::Rider));
        assert_eq!(" passenger ".parse::<ActorRole>(), Ok(ActorRole::Passenger));
        assert!("driver".parse::<ActorRole>().is_err());
    }

    #[test]
    fn counterparty_flips_role() {
        assert_eq!(ActorRole::Rider.counterparty(), ActorRole::Passenger);
        assert_eq!(ActorRole::Passenger.counterparty(), ActorRole::Rider);
    }
}
