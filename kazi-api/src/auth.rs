//! Caller identity.
//!
//! A request names its principal either with an `x-api-key` header or with
//! an HS256 bearer token whose `sub` is the principal's UUID. Both resolve to
//! an `AuthContext` (principal plus permissions); gateway calls are then
//! scoped to that principal as owner. Keys are kept only as SHA-256 digests.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use axum::http::Method;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use kazi_core::{digest_secret, ConfigError, KaziError, OwnerId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

const INSECURE_DEFAULT_SECRET: &str = "kazi-dev-secret-do-not-deploy";
const MIN_SECRET_LEN: usize = 32;

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Time source for token expiry checks.
pub trait JwtClock: Send + Sync {
    /// Unix seconds; negative on a host with a broken clock.
    fn now_epoch_secs(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Pinned time, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
pub mod test_clocks {
    use super::FixedClock;

    /// 2024-01-01 00:00:00 UTC
    pub fn valid() -> FixedClock {
        FixedClock(1704067200)
    }

    /// 2030-01-01 00:00:00 UTC
    pub fn future() -> FixedClock {
        FixedClock(1893456000)
    }
}

// ============================================================================
// JWT SECRET
// ============================================================================

/// HMAC key for bearer tokens. `Debug` prints only its length.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    pub fn new(secret: String) -> Result<Self, KaziError> {
        if secret.is_empty() {
            return Err(KaziError::Config(ConfigError::MissingRequired {
                field: "jwt_secret".to_string(),
            }));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

/// Blank input falls back to the placeholder secret, which
/// `validate_for_production` refuses.
fn build_jwt_secret(raw: String) -> JwtSecret {
    match raw.trim() {
        "" => JwtSecret(SecretString::new(INSECURE_DEFAULT_SECRET.into())),
        _ => JwtSecret(SecretString::new(raw.into())),
    }
}

// ============================================================================
// PERMISSIONS
// ============================================================================

/// Permission granted to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Admin => "admin",
        }
    }

    /// Permission an HTTP method requires. Safe methods only read.
    pub fn required_for(method: &Method) -> Self {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => Permission::Read,
            _ => Permission::Write,
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "admin" => Ok(Permission::Admin),
            other => Err(ConfigError::InvalidValue {
                field: "permission".to_string(),
                value: other.to_string(),
                reason: "expected read, write or admin".to_string(),
            }),
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Principal and permissions bound to one API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyGrant {
    pub principal: OwnerId,
    pub permissions: HashSet<Permission>,
}

#[derive(Clone)]
pub struct AuthConfig {
    /// Grants keyed by the hex SHA-256 of the key.
    pub api_keys: HashMap<String, ApiKeyGrant>,
    pub jwt_secret: JwtSecret,
    pub jwt_algorithm: Algorithm,
    /// Lifetime of issued tokens.
    pub jwt_expiration_secs: i64,
    /// Leeway applied to `exp`.
    pub jwt_clock_skew_secs: i64,
    pub environment: String,
    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_keys", &format!("[{} keys]", self.api_keys.len()))
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("environment", &self.environment)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: HashMap::new(),
            jwt_secret: build_jwt_secret(INSECURE_DEFAULT_SECRET.to_string()),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: 3600,
            jwt_clock_skew_secs: 60,
            environment: "development".to_string(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Reads `KAZI_API_KEYS` (comma-separated `key:principal_uuid:perm|perm`),
    /// `KAZI_JWT_SECRET`, `KAZI_JWT_EXPIRATION_SECS` (3600),
    /// `KAZI_JWT_CLOCK_SKEW_SECS` (60) and `KAZI_ENVIRONMENT` (development).
    /// A malformed key entry is logged and skipped.
    pub fn from_env() -> Self {
        let secs = |name: &str, fallback: i64| {
            std::env::var(name)
                .ok()
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(fallback)
        };
        let mut config = Self {
            jwt_secret: build_jwt_secret(std::env::var("KAZI_JWT_SECRET").unwrap_or_default()),
            jwt_expiration_secs: secs("KAZI_JWT_EXPIRATION_SECS", 3600),
            jwt_clock_skew_secs: secs("KAZI_JWT_CLOCK_SKEW_SECS", 60),
            environment: std::env::var("KAZI_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .to_lowercase(),
            ..Self::default()
        };

        if let Ok(keys_str) = std::env::var("KAZI_API_KEYS") {
            for entry in keys_str.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                match parse_api_key_entry(entry) {
                    Ok((key, grant)) => config.add_api_key(&key, grant),
                    Err(e) => tracing::warn!(error = %e, "ignoring KAZI_API_KEYS entry"),
                }
            }
        }

        config
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production" || self.environment == "prod"
    }

    /// In production the placeholder secret and anything under 32 bytes are
    /// errors. Other environments get a warning.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        let problem = if self.jwt_secret.is_insecure_default() {
            Some("KAZI_JWT_SECRET is unset".to_string())
        } else if self.jwt_secret.len() < MIN_SECRET_LEN {
            Some(format!(
                "KAZI_JWT_SECRET has {} bytes, need at least {}",
                self.jwt_secret.len(),
                MIN_SECRET_LEN
            ))
        } else {
            None
        };

        match problem {
            Some(problem) if self.is_production() => Err(ApiError::invalid_input(format!(
                "{} (KAZI_ENVIRONMENT={})",
                problem, self.environment
            ))),
            Some(problem) => {
                tracing::warn!(%problem, "weak token secret outside production");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Register an API key. Only its digest is stored.
    pub fn add_api_key(&mut self, key: &str, grant: ApiKeyGrant) {
        self.api_keys.insert(digest_secret(key), grant);
    }

    /// Look up the grant for a presented key.
    pub fn api_key_grant(&self, key: &str) -> Option<&ApiKeyGrant> {
        self.api_keys.get(&digest_secret(key))
    }
}

/// Parse one `key:principal_uuid:perm|perm` entry.
pub fn parse_api_key_entry(entry: &str) -> Result<(String, ApiKeyGrant), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        field: "KAZI_API_KEYS".to_string(),
        value: "[REDACTED]".to_string(),
        reason: reason.to_string(),
    };

    let mut parts = entry.splitn(3, ':');
    let key = parts.next().map(str::trim).unwrap_or_default();
    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    let principal = parts
        .next()
        .ok_or_else(|| invalid("missing principal"))?
        .trim()
        .parse::<OwnerId>()
        .map_err(|_| invalid("principal must be a UUID"))?;
    let permissions = match parts.next() {
        Some(perms) => perms
            .split('|')
            .filter(|p| !p.trim().is_empty())
            .map(Permission::from_str)
            .collect::<Result<HashSet<_>, _>>()?,
        None => HashSet::from([Permission::Read]),
    };

    Ok((
        key.to_string(),
        ApiKeyGrant {
            principal,
            permissions,
        },
    ))
}

// ============================================================================
// JWT CLAIMS
// ============================================================================

/// Bearer token body. `sub` holds the principal UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Claims {
    pub fn new(principal: OwnerId, expiration_secs: i64, clock: &dyn JwtClock) -> Self {
        let now = clock.now_epoch_secs();
        Self {
            sub: principal.to_string(),
            iat: now,
            exp: now + expiration_secs,
            permissions: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions.extend(permissions);
        self
    }

    pub fn principal(&self) -> ApiResult<OwnerId> {
        self.sub
            .parse()
            .map_err(|_| ApiError::invalid_token("token subject is not a UUID"))
    }
}

// ============================================================================
// AUTHENTICATION CONTEXT
// ============================================================================

/// Who is calling and what they may do.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: OwnerId,
    pub permissions: HashSet<Permission>,
    pub method: AuthMethod,
}

impl AuthContext {
    pub fn new(
        principal: OwnerId,
        permissions: impl IntoIterator<Item = Permission>,
        method: AuthMethod,
    ) -> Self {
        Self {
            principal,
            permissions: permissions.into_iter().collect(),
            method,
        }
    }

    /// `admin` implies every other permission.
    pub fn allows(&self, permission: Permission) -> bool {
        self.permissions.contains(&Permission::Admin) || self.permissions.contains(&permission)
    }

    pub fn require(&self, permission: Permission) -> ApiResult<()> {
        if self.allows(permission) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!("{} permission required", permission)))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    ApiKey,
    Jwt,
}

// ============================================================================
// AUTHENTICATION FUNCTIONS
// ============================================================================

/// Check a bearer token's signature, then its expiry against `config.clock`
/// with `jwt_clock_skew_secs` of leeway.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    use jsonwebtoken::errors::ErrorKind;

    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = HashSet::from(["exp".to_string()]);

    let key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    let claims = decode::<Claims>(token, &key, &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => ApiError::invalid_token("bad token signature"),
            ErrorKind::InvalidToken => ApiError::invalid_token("malformed token"),
            _ => ApiError::invalid_token(format!("token rejected: {}", e)),
        })?
        .claims;

    let now = config.clock.now_epoch_secs();
    if now < 0 {
        tracing::error!(now, "clock is before the epoch");
        return Err(ApiError::internal_error("server clock misconfigured"));
    }
    if claims.exp + config.jwt_clock_skew_secs < now {
        return Err(ApiError::token_expired());
    }
    Ok(claims)
}

/// Sign a token for `principal` valid for `jwt_expiration_secs`.
pub fn generate_jwt_token(
    config: &AuthConfig,
    principal: OwnerId,
    permissions: impl IntoIterator<Item = Permission>,
) -> ApiResult<String> {
    let claims = Claims::new(principal, config.jwt_expiration_secs, &*config.clock)
        .with_permissions(permissions);

    let key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    encode(&Header::new(config.jwt_algorithm), &claims, &key)
        .map_err(|e| ApiError::internal_error(format!("token signing failed: {}", e)))
}

pub fn authenticate_api_key(config: &AuthConfig, api_key: &str) -> ApiResult<AuthContext> {
    let grant = config
        .api_key_grant(api_key)
        .ok_or_else(|| ApiError::unauthorized("unknown API key"))?;
    Ok(AuthContext::new(
        grant.principal,
        grant.permissions.iter().copied(),
        AuthMethod::ApiKey,
    ))
}

pub fn authenticate_jwt(config: &AuthConfig, token: &str) -> ApiResult<AuthContext> {
    let claims = validate_jwt_token(config, token)?;
    let principal = claims.principal()?;
    Ok(AuthContext::new(principal, claims.permissions, AuthMethod::Jwt))
}

/// Resolve the caller from the raw header values. An API key takes
/// precedence over a bearer token.
pub fn authenticate(
    config: &AuthConfig,
    api_key: Option<&str>,
    authorization: Option<&str>,
) -> ApiResult<AuthContext> {
    match (api_key, authorization) {
        (Some(key), _) => authenticate_api_key(config, key),
        (None, Some(value)) => match value.strip_prefix("Bearer ") {
            Some(token) => authenticate_jwt(config, token.trim()),
            None => Err(ApiError::invalid_token("expected a Bearer token")),
        },
        (None, None) => Err(ApiError::unauthorized(
            "send x-api-key or Authorization: Bearer",
        )),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::Mutex;
    use uuid::Uuid;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.as_deref() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    fn principal() -> OwnerId {
        OwnerId::new(Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0001))
    }

    fn test_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.add_api_key(
            "test_key_123",
            ApiKeyGrant {
                principal: principal(),
                permissions: HashSet::from([Permission::Read, Permission::Write]),
            },
        );
        config.jwt_secret =
            JwtSecret::new("test_secret".to_string()).expect("non-empty secret");
        config.clock = Arc::new(test_clocks::valid());
        config
    }

    #[test]
    fn test_api_keys_are_stored_as_digests() {
        let config = test_config();
        assert!(!config.api_keys.contains_key("test_key_123"));
        assert!(config.api_keys.contains_key(&digest_secret("test_key_123")));
    }

    #[test]
    fn test_authenticate_api_key() -> ApiResult<()> {
        let config = test_config();
        let ctx = authenticate_api_key(&config, "test_key_123")?;
        assert_eq!(ctx.principal, principal());
        assert_eq!(ctx.method, AuthMethod::ApiKey);
        assert!(ctx.allows(Permission::Write));
        assert!(!ctx.allows(Permission::Admin));

        let err = authenticate_api_key(&config, "wrong").err().ok_or(ApiError::internal_error("accepted"))?;
        assert_eq!(err.code, ErrorCode::Unauthorized);
        Ok(())
    }

    #[test]
    fn test_jwt_generation_and_validation() -> ApiResult<()> {
        let config = test_config();
        let token = generate_jwt_token(&config, principal(), [Permission::Read])?;

        let claims = validate_jwt_token(&config, &token)?;
        assert_eq!(claims.principal()?, principal());
        assert_eq!(claims.permissions, vec![Permission::Read]);
        assert!(claims.exp > test_clocks::valid().now_epoch_secs());

        let ctx = authenticate(&config, None, Some(&format!("Bearer {}", token)))?;
        assert_eq!(ctx.method, AuthMethod::Jwt);
        assert!(ctx.allows(Permission::Read));
        assert!(!ctx.allows(Permission::Write));
        Ok(())
    }

    #[test]
    fn test_expired_token() -> ApiResult<()> {
        let mut config = test_config();
        let token = generate_jwt_token(&config, principal(), [Permission::Read])?;
        config.clock = Arc::new(test_clocks::future());

        let result = validate_jwt_token(&config, &token);
        assert_eq!(result.err().map(|e| e.code), Some(ErrorCode::TokenExpired));
        Ok(())
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() -> ApiResult<()> {
        let config = test_config();
        let mut other = test_config();
        other.jwt_secret = JwtSecret::new("another_secret".to_string())
            .map_err(|e| ApiError::internal_error(e.to_string()))?;
        let token = generate_jwt_token(&other, principal(), [Permission::Admin])?;

        assert_eq!(
            validate_jwt_token(&config, &token).err().map(|e| e.code),
            Some(ErrorCode::InvalidToken)
        );
        Ok(())
    }

    #[test]
    fn test_authenticate_requires_credentials() {
        let config = test_config();
        let missing = authenticate(&config, None, None);
        assert_eq!(missing.err().map(|e| e.code), Some(ErrorCode::Unauthorized));

        let basic = authenticate(&config, None, Some("Basic dXNlcjpwYXNz"));
        assert_eq!(basic.err().map(|e| e.code), Some(ErrorCode::InvalidToken));
    }

    #[test]
    fn test_admin_implies_everything() {
        let ctx = AuthContext::new(principal(), [Permission::Admin], AuthMethod::ApiKey);
        assert!(ctx.allows(Permission::Read));
        assert!(ctx.allows(Permission::Write));
        assert!(ctx.require(Permission::Write).is_ok());

        let reader = AuthContext::new(principal(), [Permission::Read], AuthMethod::ApiKey);
        assert_eq!(
            reader.require(Permission::Write).err().map(|e| e.code),
            Some(ErrorCode::Forbidden)
        );
    }

    #[test]
    fn test_required_permission_by_method() {
        assert_eq!(Permission::required_for(&Method::GET), Permission::Read);
        assert_eq!(Permission::required_for(&Method::HEAD), Permission::Read);
        assert_eq!(Permission::required_for(&Method::POST), Permission::Write);
        assert_eq!(Permission::required_for(&Method::PATCH), Permission::Write);
        assert_eq!(Permission::required_for(&Method::DELETE), Permission::Write);
    }

    #[test]
    fn test_parse_api_key_entry() -> Result<(), String> {
        let (key, grant) = parse_api_key_entry(&format!("k1:{}:read|admin", principal()))
            .map_err(|e| e.to_string())?;
        assert_eq!(key, "k1");
        assert_eq!(grant.principal, principal());
        assert_eq!(
            grant.permissions,
            HashSet::from([Permission::Read, Permission::Admin])
        );

        let (_, read_only) =
            parse_api_key_entry(&format!("k2:{}", principal())).map_err(|e| e.to_string())?;
        assert_eq!(read_only.permissions, HashSet::from([Permission::Read]));

        assert!(parse_api_key_entry("k3:not-a-uuid:read").is_err());
        assert!(parse_api_key_entry(&format!("k4:{}:root", principal())).is_err());
        assert!(parse_api_key_entry(":x").is_err());
        Ok(())
    }

    #[test]
    fn test_from_env_loads_keys() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let entry = format!("alpha:{}:write, broken-entry", principal());
        let _keys = EnvVarGuard::set("KAZI_API_KEYS", Some(&entry));
        let _env = EnvVarGuard::set("KAZI_ENVIRONMENT", Some("development"));

        let config = AuthConfig::from_env();
        assert_eq!(config.api_keys.len(), 1);
        let grant = config.api_key_grant("alpha");
        assert_eq!(grant.map(|g| g.principal), Some(principal()));
    }

    #[test]
    fn test_validate_for_production_rejects_default_secret() {
        let mut config = AuthConfig {
            environment: "production".to_string(),
            ..AuthConfig::default()
        };
        assert!(config.validate_for_production().is_err());

        config.jwt_secret = build_jwt_secret("short".to_string());
        assert!(config.validate_for_production().is_err());

        config.jwt_secret = build_jwt_secret("a".repeat(48));
        assert!(config.validate_for_production().is_ok());

        config.environment = "development".to_string();
        config.jwt_secret = build_jwt_secret(String::new());
        assert!(config.jwt_secret.is_insecure_default());
        assert!(config.validate_for_production().is_ok());
    }

    #[test]
    fn test_jwt_secret_debug_is_redacted() {
        let secret = build_jwt_secret("super-secret-value".to_string());
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("REDACTED"));
    }
}
