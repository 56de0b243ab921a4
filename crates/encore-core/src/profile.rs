//! User Profiles

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform role attached to a profile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Fan,
    Artist,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &str {
        match self {
            UserType::Fan => "fan",
            UserType::Artist => "artist",
            UserType::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "artist" => UserType::Artist,
            "admin" => UserType::Admin,
            _ => UserType::Fan,
        }
    }
}

impl Default for UserType {
    fn default() -> Self {
        UserType::Fan
    }
}

/// A platform user profile
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    /// Profile ID (matches the auth provider's user id)
    pub id: Uuid,

    /// Display name, if the user set one
    pub full_name: Option<String>,

    /// Contact email
    pub email: String,

    /// Avatar image
    pub avatar_url: Option<String>,

    /// Platform role
    pub user_type: UserType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_type_round_trip() {
        for s in ["fan", "artist", "admin"] {
            assert_eq!(UserType::from_str(s).as_str(), s);
        }
        assert_eq!(UserType::from_str("unknown"), UserType::Fan);
    }
}
