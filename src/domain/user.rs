use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    /// Adopters and other individuals - they write reviews
    Regular,
    /// Shops, shelters, clinics - they receive reviews
    Business,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Regular => "regular",
            UserType::Business => "business",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "regular" => Some(UserType::Regular),
            "business" => Some(UserType::Business),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An account in the user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub user_type: UserType,
    /// Avatar reference (file name or URL), if the user uploaded one
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String, user_type: UserType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            user_type,
            profile_picture: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_profile_picture(mut self, picture: impl Into<String>) -> Self {
        self.profile_picture = Some(picture.into());
        self
    }

    pub fn is_business(&self) -> bool {
        self.user_type == UserType::Business
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_type_roundtrip() {
        for ut in [UserType::Regular, UserType::Business] {
            let parsed = UserType::from_str(ut.as_str()).unwrap();
            assert_eq!(ut, parsed);
        }
        assert_eq!(UserType::from_str("BUSINESS"), Some(UserType::Business));
        assert_eq!(UserType::from_str("shelter"), None);
    }

    #[test]
    fn test_new_user_has_no_avatar() {
        let user = User::new("Dana".into(), "dana@example.com".into(), UserType::Regular);
        assert!(user.profile_picture.is_none());
        assert!(!user.is_business());

        let shop = User::new("Paws".into(), "paws@example.com".into(), UserType::Business)
            .with_profile_picture("paws.png");
        assert_eq!(shop.profile_picture.as_deref(), Some("paws.png"));
        assert!(shop.is_business());
    }
}
