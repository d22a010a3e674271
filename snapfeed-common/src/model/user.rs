use crate::model::{Id, InvalidTextError, auth::PasswordHash, text::validated_text};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

validated_text!(Username, field = "username", max_len = 50);
validated_text!(
    Email,
    field = "email",
    max_len = 254,
    check = |email| email.contains('@')
);

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id<UserMarker>,
    pub username: Username,
    pub email: Email,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// What other entities embed when they resolve a user reference.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct PartialUser {
    pub id: Id<UserMarker>,
    pub username: Username,
}

impl From<User> for PartialUser {
    fn from(value: User) -> Self {
        Self {
            id: value.id,
            username: value.username,
        }
    }
}

/// Registration request body.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct RegisterUser {
    pub username: Username,
    pub email: Email,
    pub password: Password,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CreateUser {
    pub username: Username,
    pub email: Email,
    pub password_hash: PasswordHash,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: PasswordHash,
}

/// A plaintext password as carried in request bodies. No response type holds one.
#[derive(Clone, Eq, PartialEq)]
pub struct Password(String);

impl Password {
    pub const MAX_LEN: usize = 1024;

    pub fn new(password: impl Into<String>) -> Result<Self, InvalidTextError> {
        let password = password.into();
        if password.is_empty() {
            Err(InvalidTextError::Empty { field: "password" })
        } else if password.len() > Self::MAX_LEN {
            Err(InvalidTextError::TooLong {
                field: "password",
                max_len: Self::MAX_LEN,
            })
        } else {
            Ok(Self(password))
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Password").field(&"[redacted]").finish()
    }
}

impl Serialize for Password {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Password::new(inner).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::user::{Password, RegisterUser, User};

    #[test]
    fn password_is_redacted() {
        let password = Password::new("hunter2").unwrap();
        assert!(!format!("{password:?}").contains("hunter2"));
    }

    #[test]
    fn register_body_requires_all_fields() {
        let body = r#"{"username":"alice","email":"a@x.com","password":"pw"}"#;
        let register: RegisterUser = serde_json::from_str(body).unwrap();
        assert_eq!(register.username.get(), "alice");

        let missing = r#"{"username":"alice","email":"a@x.com"}"#;
        assert!(serde_json::from_str::<RegisterUser>(missing).is_err());

        let empty_password = r#"{"username":"alice","email":"a@x.com","password":""}"#;
        assert!(serde_json::from_str::<RegisterUser>(empty_password).is_err());
    }

    #[test]
    fn user_json_uses_camel_case() {
        let user: User = serde_json::from_str(
            r#"{"id":"1","username":"alice","email":"a@x.com","createdAt":"2025-06-01T12:00:00Z"}"#,
        )
        .unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["createdAt"], "2025-06-01T12:00:00Z");
        assert!(json.get("password").is_none());
    }
}
