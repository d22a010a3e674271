use crate::{
    model::{
        Id,
        user::{Email, Password, UserMarker},
    },
    util::PositiveDuration,
};
use argon2::{
    Argon2,
    password_hash::{self, PasswordHasher, PasswordVerifier, SaltString},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Formatter},
    sync::LazyLock,
};
use thiserror::Error;
use time::OffsetDateTime;

pub const PASSWORD_SALT_LEN: usize = 16;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing or verifying a password failed: {0}")]
pub struct PasswordHashError(password_hash::Error);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The stored password hash is not a valid PHC string")]
pub struct InvalidPasswordHashError;

#[derive(Debug, Error)]
pub enum AuthTokenError {
    #[error("Signing the auth token failed: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("The auth token was rejected: {0}")]
    Verify(#[source] jsonwebtoken::errors::Error),
    #[error("The token lifetime puts the expiry out of range")]
    ExpiryOutOfRange,
}

/// Stand-in hash verified against when a login names no known account.
static UNKNOWN_ACCOUNT_HASH: LazyLock<Result<PasswordHash, PasswordHashError>> =
    LazyLock::new(|| PasswordHash::hash_bytes(b"unknown account"));

/// Argon2id hash of a password in PHC string format.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn hash(password: &Password) -> Result<Self, PasswordHashError> {
        Self::hash_bytes(password.as_bytes())
    }

    fn hash_bytes(password: &[u8]) -> Result<Self, PasswordHashError> {
        let salt_bytes: [u8; PASSWORD_SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordHashError)?;

        let hash = Argon2::default()
            .hash_password(password, &salt)
            .map_err(PasswordHashError)?;

        Ok(Self(hash.to_string()))
    }

    pub fn verify(&self, password: &Password) -> Result<bool, PasswordHashError> {
        let parsed = password_hash::PasswordHash::new(&self.0).map_err(PasswordHashError)?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(PasswordHashError(err)),
        }
    }

    /// Verifies `password` against a fixed hash and discards the result.
    ///
    /// Rejecting an unknown account this way takes as long as rejecting a
    /// wrong password.
    pub fn verify_unknown_account(password: &Password) -> Result<(), PasswordHashError> {
        match &*UNKNOWN_ACCOUNT_HASH {
            Ok(hash) => hash.verify(password).map(|_| ()),
            Err(err) => Err(err.clone()),
        }
    }

    pub fn from_phc(phc: String) -> Result<Self, InvalidPasswordHashError> {
        password_hash::PasswordHash::new(&phc).map_err(|_| InvalidPasswordHashError)?;
        Ok(Self(phc))
    }

    #[must_use]
    pub fn as_phc(&self) -> &str {
        &self.0
    }
}

impl Debug for PasswordHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PasswordHash").field(&"[redacted]").finish()
    }
}

/// Login request body.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: Email,
    pub password: Password,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: AuthToken,
}

/// A signed bearer token as handed to clients.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self(token)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthToken").field(&"[redacted]").finish()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Id<UserMarker>,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies HS256 bearer tokens with a shared secret.
#[derive(Clone)]
pub struct AuthKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_lifetime: PositiveDuration,
}

impl AuthKeys {
    #[must_use]
    pub fn from_secret(secret: &[u8], token_lifetime: PositiveDuration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            token_lifetime,
        }
    }

    #[must_use]
    pub fn token_lifetime(&self) -> PositiveDuration {
        self.token_lifetime
    }

    pub fn issue(&self, user_id: Id<UserMarker>) -> Result<AuthToken, AuthTokenError> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub fn issue_at(
        &self,
        user_id: Id<UserMarker>,
        issued_at: OffsetDateTime,
    ) -> Result<AuthToken, AuthTokenError> {
        let expires_at = issued_at
            .checked_add(self.token_lifetime.get())
            .ok_or(AuthTokenError::ExpiryOutOfRange)?;

        let claims = Claims {
            sub: user_id,
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map(AuthToken)
            .map_err(AuthTokenError::Sign)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthTokenError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(AuthTokenError::Verify)
    }
}

impl Debug for AuthKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthKeys")
            .field("secret", &"[redacted]")
            .field("token_lifetime", &self.token_lifetime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        model::{
            Id,
            auth::{AuthKeys, AuthTokenError, PasswordHash},
            user::Password,
        },
        util::PositiveDuration,
    };
    use time::{Duration, OffsetDateTime};

    fn keys(secret: &[u8]) -> AuthKeys {
        AuthKeys::from_secret(secret, PositiveDuration::ONE_HOUR)
    }

    #[test]
    fn password_hash_verifies() {
        let password = Password::new("pw").unwrap();
        let hash = PasswordHash::hash(&password).unwrap();

        assert!(hash.as_phc().starts_with("$argon2id$"));
        assert!(hash.verify(&password).unwrap());
        assert!(!hash.verify(&Password::new("wrong").unwrap()).unwrap());
    }

    #[test]
    fn password_hashes_are_salted() {
        let password = Password::new("pw").unwrap();
        let first = PasswordHash::hash(&password).unwrap();
        let second = PasswordHash::hash(&password).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn stored_hash_must_be_phc() {
        assert!(PasswordHash::from_phc("plaintext".to_owned()).is_err());

        let hash = PasswordHash::hash(&Password::new("pw").unwrap()).unwrap();
        assert_eq!(
            PasswordHash::from_phc(hash.as_phc().to_owned()).unwrap(),
            hash
        );
    }

    #[test]
    fn unknown_account_verification_runs() {
        for password in ["pw", "unknown account"] {
            let password = Password::new(password).unwrap();
            assert!(PasswordHash::verify_unknown_account(&password).is_ok());
        }
    }

    #[test]
    fn token_carries_user_id() {
        let keys = keys(b"secret");
        let token = keys.issue(Id::from(1234)).unwrap();

        let claims = keys.verify(token.as_str()).unwrap();
        assert_eq!(claims.sub, Id::from(1234));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = keys(b"secret");
        let issued_at = OffsetDateTime::now_utc() - Duration::hours(2);
        let token = keys.issue_at(Id::from(1), issued_at).unwrap();

        assert!(keys.verify(token.as_str()).is_err());
    }

    #[test]
    fn huge_lifetime_fails_without_panicking() {
        let lifetime = PositiveDuration::new(Duration::seconds(1_000_000_000_000)).unwrap();
        let keys = AuthKeys::from_secret(b"secret", lifetime);

        assert!(matches!(
            keys.issue(Id::from(1)),
            Err(AuthTokenError::ExpiryOutOfRange)
        ));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = keys(b"secret").issue(Id::from(1)).unwrap();

        assert!(keys(b"other secret").verify(token.as_str()).is_err());
        assert!(keys(b"secret").verify("not.a.token").is_err());
    }
}
