//! Accounts and bearer tokens.
//!
//! Passwords are stored as Argon2 PHC strings. Tokens are
//! `base64url(claims_json) "." base64url(hmac_sha256(secret, claims_part))`,
//! where the claims carry `{id, email, name, exp}`. A token is accepted only
//! if the signature matches and `exp` is in the future.

use anyhow::{anyhow, Context, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use recordsift_core::models::{FieldError, NewUser, User};
use recordsift_core::store::{DuplicateEmail, Store};
use recordsift_core::validate::{validate_email, validate_name, validate_password};

use crate::config::AuthConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid account details")]
    Validation(Vec<FieldError>),
    #[error("email is already registered")]
    EmailTaken,
    #[error("no user with this email")]
    UnknownEmail,
    #[error("wrong password")]
    WrongPassword,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Hash a password into an Argon2id PHC string with a random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes()).map_err(|e| anyhow!("{e}"))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string.
pub fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| anyhow!("malformed password hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// What a token asserts about its bearer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub id: i64,
    pub email: String,
    pub name: String,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Issues and verifies signed bearer tokens.
pub struct TokenService {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl TokenService {
    pub fn new(secret: impl Into<Vec<u8>>, ttl_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Build from `[auth]`, reading the secret from the environment.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let secret = std::env::var(&config.secret_env)
            .with_context(|| format!("{} environment variable not set", config.secret_env))?;
        if secret.is_empty() {
            anyhow::bail!("{} must not be empty", config.secret_env);
        }
        Ok(Self::new(secret, config.token_ttl_secs))
    }

    fn sign(&self, payload: &str) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|e| anyhow!("{e}"))?;
        mac.update(payload.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Issue a token for `user` valid for the configured lifetime.
    pub fn issue(&self, user: &User) -> Result<String> {
        let claims = Claims {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            exp: Utc::now().timestamp().saturating_add(self.ttl_secs),
        };
        self.encode(&claims)
    }

    fn encode(&self, claims: &Claims) -> Result<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&payload)?);
        Ok(format!("{}.{}", payload, signature))
    }

    /// Verify signature and expiry, returning the embedded claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let (payload, signature) = token.split_once('.').ok_or(AuthError::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|e| anyhow!("{e}"))?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::InvalidToken)?;
        let claims: Claims = serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidToken)?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

/// Registration input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Validate and create an account. Violations of all three fields are
/// reported together.
pub async fn register<S: Store + ?Sized>(store: &S, input: &Registration) -> Result<User, AuthError> {
    let mut errors = validate_name(&input.name);
    errors.extend(validate_email(&input.email));
    errors.extend(validate_password(&input.password));
    if !errors.is_empty() {
        return Err(AuthError::Validation(errors));
    }

    if store.find_user_by_email(&input.email).await?.is_some() {
        return Err(AuthError::EmailTaken);
    }

    // A concurrent registration can still win the race to the insert.
    let user = store
        .create_user(&NewUser {
            name: input.name.clone(),
            email: input.email.clone(),
            password_hash: hash_password(&input.password)?,
        })
        .await
        .map_err(|e| {
            if e.downcast_ref::<DuplicateEmail>().is_some() {
                AuthError::EmailTaken
            } else {
                AuthError::Internal(e)
            }
        })?;

    info!(user_id = user.id, "registered user");
    Ok(user)
}

/// Check credentials and issue a token.
pub async fn login<S: Store + ?Sized>(
    store: &S,
    tokens: &TokenService,
    email: &str,
    password: &str,
) -> Result<String, AuthError> {
    let mut errors = validate_email(email);
    if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }
    if !errors.is_empty() {
        return Err(AuthError::Validation(errors));
    }

    let user = store
        .find_user_by_email(email)
        .await?
        .ok_or(AuthError::UnknownEmail)?;

    if !verify_password(password, &user.password_hash)? {
        return Err(AuthError::WrongPassword);
    }

    Ok(tokens.issue(&user)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordsift_core::models::{
        Dataset, DatasetSummary, DatasetTarget, NewQueryLog, NewRecord, QueryLog, Record,
    };
    use recordsift_core::store::memory::InMemoryStore;

    fn tokens() -> TokenService {
        TokenService::new("test-secret", 3600)
    }

    fn ana() -> Registration {
        Registration {
            name: "Ana Souza".into(),
            email: "ana@example.com".into(),
            password: "Str0ng!pass".into(),
        }
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("Str0ng!pass").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Str0ng!pass", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn token_carries_claims() {
        let user = User {
            id: 7,
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password_hash: String::new(),
        };
        let svc = tokens();
        let claims = svc.verify(&svc.issue(&user).unwrap()).unwrap();
        assert_eq!(claims.id, 7);
        assert_eq!(claims.email, "ana@example.com");
        assert_eq!(claims.name, "Ana");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn tampered_or_foreign_tokens_rejected() {
        let user = User {
            id: 1,
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password_hash: String::new(),
        };
        let token = tokens().issue(&user).unwrap();

        let other = TokenService::new("other-secret", 3600);
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));

        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(br#"{"id":2,"email":"x@y.io","name":"X","exp":9999999999}"#),
            token.split_once('.').unwrap().1
        );
        assert!(matches!(tokens().verify(&forged), Err(AuthError::InvalidToken)));
        assert!(matches!(tokens().verify("garbage"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn expired_token_rejected() {
        let svc = tokens();
        let token = svc
            .encode(&Claims {
                id: 1,
                email: "a@b.io".into(),
                name: "A".into(),
                exp: Utc::now().timestamp() - 1,
            })
            .unwrap();
        assert!(matches!(svc.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn missing_secret_env_is_an_error() {
        let config = AuthConfig {
            secret_env: "RECORDSIFT_TEST_SECRET_NOT_SET".into(),
            token_ttl_secs: 60,
        };
        let err = TokenService::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("RECORDSIFT_TEST_SECRET_NOT_SET"));
    }

    #[tokio::test]
    async fn register_then_login() {
        let store = InMemoryStore::new();
        let user = register(&store, &ana()).await.unwrap();
        assert_ne!(user.password_hash, "Str0ng!pass");

        let svc = tokens();
        let token = login(&store, &svc, "ana@example.com", "Str0ng!pass").await.unwrap();
        assert_eq!(svc.verify(&token).unwrap().id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let store = InMemoryStore::new();
        register(&store, &ana()).await.unwrap();
        assert!(matches!(register(&store, &ana()).await, Err(AuthError::EmailTaken)));
    }

    /// Never sees existing users on lookup, like a registration that lost
    /// the race between the email check and the insert.
    struct StaleLookup(InMemoryStore);

    #[async_trait::async_trait]
    impl Store for StaleLookup {
        async fn create_user(&self, user: &NewUser) -> Result<User> {
            self.0.create_user(user).await
        }
        async fn find_user_by_email(&self, _email: &str) -> Result<Option<User>> {
            Ok(None)
        }
        async fn get_user(&self, id: i64) -> Result<Option<User>> {
            self.0.get_user(id).await
        }
        async fn list_datasets(&self, user_id: i64) -> Result<Vec<DatasetSummary>> {
            self.0.list_datasets(user_id).await
        }
        async fn has_datasets(&self, user_id: i64) -> Result<bool> {
            self.0.has_datasets(user_id).await
        }
        async fn find_dataset(&self, user_id: i64, name: &str) -> Result<Option<Dataset>> {
            self.0.find_dataset(user_id, name).await
        }
        async fn get_dataset(&self, id: i64) -> Result<Option<Dataset>> {
            self.0.get_dataset(id).await
        }
        async fn existing_record_names(
            &self,
            dataset_id: i64,
            names: &[String],
        ) -> Result<Vec<String>> {
            self.0.existing_record_names(dataset_id, names).await
        }
        async fn insert_batch(
            &self,
            target: &DatasetTarget,
            records: &[NewRecord],
        ) -> Result<(Dataset, Vec<Record>)> {
            self.0.insert_batch(target, records).await
        }
        async fn list_records(&self, dataset_id: i64) -> Result<Vec<Record>> {
            self.0.list_records(dataset_id).await
        }
        async fn insert_query(&self, query: &NewQueryLog) -> Result<QueryLog> {
            self.0.insert_query(query).await
        }
    }

    #[tokio::test]
    async fn email_taken_at_insert_is_a_conflict() {
        let store = StaleLookup(InMemoryStore::new());
        register(&store, &ana()).await.unwrap();
        assert!(matches!(register(&store, &ana()).await, Err(AuthError::EmailTaken)));
    }

    #[tokio::test]
    async fn name_is_stored_as_given() {
        let store = InMemoryStore::new();
        let input = Registration {
            name: "  Ana Souza ".into(),
            ..ana()
        };
        let user = register(&store, &input).await.unwrap();
        assert_eq!(user.name, "  Ana Souza ");
    }

    #[tokio::test]
    async fn all_field_violations_reported() {
        let store = InMemoryStore::new();
        let input = Registration {
            name: "A1".into(),
            email: "nope".into(),
            password: "short".into(),
        };
        match register(&store, &input).await {
            Err(AuthError::Validation(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert!(fields.contains(&"name"));
                assert!(fields.contains(&"email"));
                assert!(fields.contains(&"password"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_failures_are_distinguished() {
        let store = InMemoryStore::new();
        register(&store, &ana()).await.unwrap();
        let svc = tokens();

        assert!(matches!(
            login(&store, &svc, "bob@example.com", "Str0ng!pass").await,
            Err(AuthError::UnknownEmail)
        ));
        assert!(matches!(
            login(&store, &svc, "ana@example.com", "Wr0ng!pass").await,
            Err(AuthError::WrongPassword)
        ));
        assert!(matches!(
            login(&store, &svc, "", "").await,
            Err(AuthError::Validation(_))
        ));
    }
}
