use thiserror::Error;

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidTextError {
    #[error("The {field} must not be empty")]
    Empty { field: &'static str },
    #[error("The {field} must be at most {max_len} characters long")]
    TooLong { field: &'static str, max_len: usize },
    #[error("The {field} is malformed")]
    Malformed { field: &'static str },
}

pub(crate) fn validate(
    text: &str,
    field: &'static str,
    max_len: usize,
) -> Result<(), InvalidTextError> {
    if text.trim().is_empty() {
        Err(InvalidTextError::Empty { field })
    } else if text.chars().count() > max_len {
        Err(InvalidTextError::TooLong { field, max_len })
    } else {
        Ok(())
    }
}

/// Declares a trimmed, non-empty, length-limited string newtype that is
/// validated on construction and on deserialization.
macro_rules! validated_text {
    ($(#[$meta:meta])* $name:ident, field = $field:literal, max_len = $max_len:expr
        $(, check = $check:expr)?) => {
        $(#[$meta])*
        #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const MAX_LEN: usize = $max_len;

            pub fn new(text: impl Into<String>) -> Result<Self, $crate::model::InvalidTextError> {
                let text = Into::<String>::into(text).trim().to_owned();
                $crate::model::text::validate(&text, $field, Self::MAX_LEN)?;
                $(
                    let check: fn(&str) -> bool = $check;
                    if !check(&text) {
                        return Err($crate::model::InvalidTextError::Malformed { field: $field });
                    }
                )?
                Ok(Self(text))
            }

            #[must_use]
            pub fn get(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let inner = String::deserialize(deserializer)?;
                Self::new(inner).map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use validated_text;

#[cfg(test)]
mod tests {
    use crate::model::{
        InvalidTextError,
        user::{Email, Username},
    };

    #[test]
    fn blank_text_is_rejected() {
        assert_eq!(
            Username::new("   "),
            Err(InvalidTextError::Empty { field: "username" })
        );
    }

    #[test]
    fn surrounding_whitespace_is_dropped() {
        assert_eq!(Email::new("  a@x.com\n").unwrap(), Email::new("a@x.com").unwrap());
        assert_eq!(Username::new(" alice ").unwrap().get(), "alice");
        assert_eq!(
            serde_json::from_str::<Username>("\" bob\"").unwrap().get(),
            "bob"
        );
    }

    #[test]
    fn length_counts_characters() {
        assert!(Username::new("ü".repeat(Username::MAX_LEN)).is_ok());
        assert_eq!(
            Username::new("a".repeat(Username::MAX_LEN + 1)),
            Err(InvalidTextError::TooLong {
                field: "username",
                max_len: Username::MAX_LEN
            })
        );
    }

    #[test]
    fn extra_checks_apply() {
        assert!(Email::new("a@x.com").is_ok());
        assert_eq!(
            Email::new("not-an-email"),
            Err(InvalidTextError::Malformed { field: "email" })
        );
    }

    #[test]
    fn deserialization_validates() {
        assert!(serde_json::from_str::<Username>("\"alice\"").is_ok());
        let err = serde_json::from_str::<Username>("\"\"").unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }
}
