pub mod article;
pub mod auth;
pub mod comment;
pub mod post;
pub mod user;

mod text;

pub use text::InvalidTextError;

use crate::{
    model::auth::InvalidPasswordHashError,
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
    util::NonPositiveDurationError,
};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
    str::FromStr,
};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Text(#[from] InvalidTextError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error(transparent)]
    PasswordHash(#[from] InvalidPasswordHashError),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SnapfeedEpoch;
impl Epoch for SnapfeedEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type SnapfeedSnowflake = Snowflake<SnapfeedEpoch>;
pub type SnapfeedSnowflakeGenerator = SnowflakeGenerator<SnapfeedEpoch>;

/// Entity id, typed by a marker so ids of different entities cannot be mixed up.
///
/// Serialized as a decimal string, because snowflakes exceed the integer range
/// JavaScript clients can represent. Plain JSON numbers are accepted as well.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Id<Marker>(SnapfeedSnowflake, PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: SnapfeedSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> SnapfeedSnowflake {
        self.0
    }

    /// The id as stored in a signed `BIGINT` column.
    #[must_use]
    pub fn to_db(self) -> i64 {
        self.0.get().cast_signed()
    }

    #[must_use]
    pub fn from_db(value: i64) -> Self {
        value.cast_unsigned().into()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str(s).map(Self::from)
    }
}

impl<Marker> From<SnapfeedSnowflake> for Id<Marker> {
    fn from(value: SnapfeedSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for SnapfeedSnowflake {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(SnapfeedSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

impl<Marker> Serialize for Id<Marker> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

struct IdVisitor<Marker>(PhantomData<Marker>);

impl<Marker> Visitor<'_> for IdVisitor<Marker> {
    type Value = Id<Marker>;

    fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("a snowflake id as string or unsigned integer")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(v.into())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(Id::from)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

impl<'de, Marker> Deserialize<'de> for Id<Marker> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(IdVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Id, user::UserMarker};

    #[test]
    fn id_serializes_as_string() {
        let id = Id::<UserMarker>::from(9_007_199_254_740_993);
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"9007199254740993\""
        );
    }

    #[test]
    fn id_accepts_string_and_number() {
        let from_string: Id<UserMarker> = serde_json::from_str("\"42\"").unwrap();
        let from_number: Id<UserMarker> = serde_json::from_str("42").unwrap();
        assert_eq!(from_string, from_number);
        assert_eq!(u64::from(from_string), 42);

        assert!(serde_json::from_str::<Id<UserMarker>>("\"abc\"").is_err());
        assert!(serde_json::from_str::<Id<UserMarker>>("-1").is_err());
    }

    #[test]
    fn id_survives_signed_storage() {
        let id = Id::<UserMarker>::from(u64::MAX - 3);
        assert_eq!(Id::<UserMarker>::from_db(id.to_db()), id);
    }
}
