//! Snowflake IDs: 64-bit, time-ordered identifiers.
//!
//! Layout, most significant bit first: 42 bits of milliseconds since the
//! [`Epoch`], 5 bits worker id, 5 bits process id, 12 bits increment.
//!
//! See <https://discord.com/developers/docs/reference#snowflakes>

use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    fmt::{Debug, Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_OFFSET: u32 = 22;
pub const TIMESTAMP_LENGTH: u32 = 42;

pub const WORKER_ID_OFFSET: u32 = 17;
pub const WORKER_ID_LENGTH: u32 = 5;

pub const PROCESS_ID_OFFSET: u32 = 12;
pub const PROCESS_ID_LENGTH: u32 = 5;

pub const INCREMENT_OFFSET: u32 = 0;
pub const INCREMENT_LENGTH: u32 = 12;

const fn mask(length: u32) -> u64 {
    (1 << length) - 1
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Snowflake part was out of range: {0}")]
pub struct SnowflakePartOutOfRangeError(u64);

/// Declares a bounded integer newtype for one of the fixed-width snowflake parts.
macro_rules! snowflake_part {
    ($name:ident: $repr:ty, offset = $offset:ident, len = $length:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            pub const MAX: Self = Self(mask($length) as $repr);

            #[must_use]
            pub fn new(value: $repr) -> Option<Self> {
                (u64::from(value) <= mask($length)).then_some(Self(value))
            }

            #[must_use]
            pub fn get(self) -> $repr {
                self.0
            }

            #[allow(clippy::cast_possible_truncation)]
            fn extract(snowflake: u64) -> Self {
                Self(((snowflake >> $offset) & mask($length)) as $repr)
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = SnowflakePartOutOfRangeError;

            fn try_from(value: $repr) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(SnowflakePartOutOfRangeError(value.into()))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let inner = <$repr>::deserialize(deserializer)?;
                Self::new(inner).ok_or_else(|| {
                    Error::invalid_value(Unexpected::Unsigned(inner.into()), &stringify!($name))
                })
            }
        }
    };
}

snowflake_part!(WorkerId: u8, offset = WORKER_ID_OFFSET, len = WORKER_ID_LENGTH);
snowflake_part!(ProcessId: u8, offset = PROCESS_ID_OFFSET, len = PROCESS_ID_LENGTH);
snowflake_part!(SnowflakeIncrement: u16, offset = INCREMENT_OFFSET, len = INCREMENT_LENGTH);

impl SnowflakeIncrement {
    #[must_use]
    pub fn next(self) -> Self {
        Self((self.0 + 1) & Self::MAX.0)
    }
}

/// Milliseconds since the epoch `E`, limited to [`TIMESTAMP_LENGTH`] bits.
#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SnowflakeTimestamp<E>(u64, PhantomData<E>);

impl<E> SnowflakeTimestamp<E> {
    #[must_use]
    pub fn new(millis: u64) -> Option<Self> {
        (millis <= mask(TIMESTAMP_LENGTH)).then_some(Self(millis, PhantomData))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    fn extract(snowflake: u64) -> Self {
        Self(snowflake >> TIMESTAMP_OFFSET, PhantomData)
    }
}

impl<E: Epoch> SnowflakeTimestamp<E> {
    pub fn now() -> Result<Self, SnowflakeTimestampError> {
        Self::try_from(UtcDateTime::now())
    }
}

impl<E: Epoch> TryFrom<UtcDateTime> for SnowflakeTimestamp<E> {
    type Error = SnowflakeTimestampError;

    fn try_from(value: UtcDateTime) -> Result<Self, Self::Error> {
        let millis = (value - E::EPOCH_TIME).whole_milliseconds();
        if millis < 0 {
            return Err(SnowflakeTimestampError::TimeBeforeEpoch);
        }
        let millis = u64::try_from(millis).map_err(|_| SnowflakeTimestampError::TimestampTooLarge)?;
        Self::new(millis).ok_or(SnowflakeTimestampError::TimestampTooLarge)
    }
}

impl<E: Epoch> From<SnowflakeTimestamp<E>> for UtcDateTime {
    fn from(value: SnowflakeTimestamp<E>) -> Self {
        // 42 bits always fit into an i64.
        #[allow(clippy::cast_possible_wrap)]
        let millis = value.0 as i64;
        E::EPOCH_TIME + Duration::milliseconds(millis)
    }
}

#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Snowflake<E>(u64, PhantomData<E>);

impl<E> Snowflake<E> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn from_parts(
        timestamp: SnowflakeTimestamp<E>,
        worker_id: WorkerId,
        process_id: ProcessId,
        increment: SnowflakeIncrement,
    ) -> Self {
        let snowflake = timestamp.get() << TIMESTAMP_OFFSET
            | u64::from(worker_id.get()) << WORKER_ID_OFFSET
            | u64::from(process_id.get()) << PROCESS_ID_OFFSET
            | u64::from(increment.get()) << INCREMENT_OFFSET;

        Self::new(snowflake)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn timestamp(self) -> SnowflakeTimestamp<E> {
        SnowflakeTimestamp::extract(self.0)
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        WorkerId::extract(self.0)
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        ProcessId::extract(self.0)
    }

    #[must_use]
    pub fn increment(self) -> SnowflakeIncrement {
        SnowflakeIncrement::extract(self.0)
    }
}

impl<E> Display for Snowflake<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<E> From<u64> for Snowflake<E> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<E> From<Snowflake<E>> for u64 {
    fn from(value: Snowflake<E>) -> Self {
        value.get()
    }
}

/// Hands out unique, strictly increasing snowflakes for one worker/process pair.
///
/// If the clock goes backwards, or more than 4096 ids are requested within the
/// same millisecond, the generator keeps counting from its last timestamp
/// instead of producing duplicates.
#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SnowflakeGenerator<E> {
    worker_id: WorkerId,
    process_id: ProcessId,
    last_timestamp: SnowflakeTimestamp<E>,
    next_increment: SnowflakeIncrement,
}

impl<E> SnowflakeGenerator<E> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last_timestamp: SnowflakeTimestamp::default(),
            next_increment: SnowflakeIncrement::default(),
        }
    }

    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    #[must_use]
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn generate_at(&mut self, time: UtcDateTime) -> Result<Snowflake<E>, SnowflakeTimestampError>
    where
        E: Epoch,
    {
        let requested = SnowflakeTimestamp::try_from(time)?;

        if requested > self.last_timestamp {
            self.last_timestamp = requested;
            self.next_increment = SnowflakeIncrement::default();
        }

        let increment = self.next_increment;
        self.next_increment = increment.next();

        let timestamp = self.last_timestamp;
        if self.next_increment == SnowflakeIncrement::default() {
            // Increment space for this millisecond is exhausted.
            self.last_timestamp = SnowflakeTimestamp::new(timestamp.get() + 1)
                .ok_or(SnowflakeTimestampError::TimestampTooLarge)?;
        }

        Ok(Snowflake::from_parts(
            timestamp,
            self.worker_id,
            self.process_id,
            increment,
        ))
    }

    pub fn generate(&mut self) -> Result<Snowflake<E>, SnowflakeTimestampError>
    where
        E: Epoch,
    {
        self.generate_at(UtcDateTime::now())
    }
}
