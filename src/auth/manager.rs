/// Token Lifecycle Manager
///
/// Issues and rotates credential pairs. Per identity the session moves
/// `Unissued -> Active -> Rotating -> Active'`, or is refused (`Blocked`)
/// when presented from an unexpected origin. Every successful refresh
/// starts a new generation; identifiers of the previous generation are
/// rejected from then on.
///
/// All durable state lives in the [`SessionStore`]; the manager keeps no
/// mutable state of its own and can be shared across workers.

use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::auth::anomaly::AnomalyGuard;
use crate::auth::claims::Claims;
use crate::auth::jwt::ClaimsCodec;
use crate::auth::secret::{generate_refresh_secret, SecretHasher};
use crate::configuration::TokenSettings;
use crate::error::{ConfigError, StoreError, TokenError};
use crate::notification::Notifier;
use crate::store::{Rotation, SessionRecord, SessionStore};

/// Credentials handed to the caller
///
/// The refresh secret is only ever returned here; the store keeps its hash.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_secret: String,
}

/// A freshly minted generation, not yet persisted
struct Generation {
    session_id: Uuid,
    pair: TokenPair,
    refresh_hash: String,
}

pub struct TokenManager {
    codec: ClaimsCodec,
    hasher: SecretHasher,
    guard: AnomalyGuard,
    store: Arc<dyn SessionStore>,
    access_token_ttl: i64,
    refresh_window: i64,
    store_timeout: Duration,
}

impl TokenManager {
    /// # Errors
    /// Returns error if the token settings are unusable
    pub fn new(
        settings: &TokenSettings,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        notify_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;

        Ok(Self {
            codec: ClaimsCodec::new(settings.signing_secret.as_bytes(), settings.issuer.clone()),
            hasher: SecretHasher::new(settings.hash_cost)?,
            guard: AnomalyGuard::new(notifier, notify_timeout),
            store,
            access_token_ttl: settings.access_token_ttl_seconds,
            refresh_window: settings.refresh_window_seconds,
            store_timeout: settings.store_timeout(),
        })
    }

    pub fn codec(&self) -> &ClaimsCodec {
        &self.codec
    }

    pub fn access_token_ttl(&self) -> i64 {
        self.access_token_ttl
    }

    /// Strictly verify an access token presented on a protected call
    pub fn verify_access(&self, access_token: &str) -> Result<Claims, TokenError> {
        self.codec.verify(access_token)
    }

    /// Issue a credential pair for `identity` connecting from `origin`
    ///
    /// # Errors
    /// - `OriginMismatch` if the identity's session is bound elsewhere
    /// - `ConcurrentRotation` if another issuance for the identity won the race
    /// - `StoreUnavailable` on store timeout or failure
    pub async fn authenticate(&self, identity: Uuid, origin: IpAddr) -> Result<TokenPair, TokenError> {
        let existing = self.with_deadline(self.store.find_session(identity)).await?;

        if let Some(record) = &existing {
            if !self.guard.check(identity, record.origin_address, origin) {
                return Err(TokenError::OriginMismatch);
            }
        }

        let generation = self.mint(identity, origin).await?;

        match existing {
            None => {
                let record = SessionRecord {
                    identity,
                    session_id: generation.session_id,
                    refresh_hash: generation.refresh_hash,
                    origin_address: origin,
                };
                self.with_deadline(self.store.create_session(record)).await?;
            }
            Some(record) => {
                let rotation = Rotation {
                    new_session_id: generation.session_id,
                    new_refresh_hash: generation.refresh_hash,
                    new_origin_address: origin,
                };
                let rotated = self
                    .with_deadline(self.store.rotate_session(identity, record.session_id, rotation))
                    .await?;
                if !rotated {
                    tracing::warn!(identity = %identity, "Re-authentication lost rotation race");
                    return Err(TokenError::ConcurrentRotation);
                }
            }
        }

        tracing::info!(
            identity = %identity,
            session_id = %generation.session_id,
            origin = %origin,
            "Session issued"
        );

        Ok(generation.pair)
    }

    /// Rotate a credential pair into a new generation
    ///
    /// The access token may be past its expiry but must carry a valid
    /// signature and be within the refresh window.
    ///
    /// # Errors
    /// - `InvalidCredential` on a bad signature or wrong refresh secret
    /// - `MalformedClaims` if the token payload does not decode
    /// - `OriginMismatch` if `origin` differs from the bound address
    /// - `Expired` once the refresh window has elapsed
    /// - `StaleSession` if the token belongs to a superseded generation
    /// - `ConcurrentRotation` if another refresh of this generation won
    /// - `StoreUnavailable` on store timeout or failure
    pub async fn refresh(
        &self,
        access_token: &str,
        refresh_secret: &str,
        origin: IpAddr,
    ) -> Result<TokenPair, TokenError> {
        let claims = self
            .codec
            .verify_allow_expired(access_token)
            .map_err(|e| match e {
                TokenError::InvalidSignature => TokenError::InvalidCredential,
                other => other,
            })?;

        let identity = claims.identity();
        let session_id = claims.session_id();

        // Origin first: a stale token replayed from elsewhere must still alert
        if !self.guard.check(identity, claims.origin(), origin) {
            return Err(TokenError::OriginMismatch);
        }

        if !claims.within_refresh_window(self.refresh_window) {
            tracing::info!(identity = %identity, session_id = %session_id, "Refresh window elapsed");
            return Err(TokenError::Expired);
        }

        // A signed token whose session id no longer resolves was rotated out
        match self.with_deadline(self.store.find_by_session_id(session_id)).await? {
            None => {
                tracing::warn!(identity = %identity, session_id = %session_id, "Replay of superseded session");
                return Err(TokenError::StaleSession);
            }
            Some(holder) if holder != identity => {
                tracing::error!(session_id = %session_id, "Session id bound to a different identity");
                return Err(TokenError::InvalidCredential);
            }
            Some(_) => {}
        }

        let record = self
            .with_deadline(self.store.find_session(identity))
            .await?
            .ok_or(TokenError::StaleSession)?;

        if record.session_id != session_id {
            tracing::warn!(identity = %identity, session_id = %session_id, "Replay of superseded session");
            return Err(TokenError::StaleSession);
        }

        if !self.guard.check(identity, record.origin_address, origin) {
            return Err(TokenError::OriginMismatch);
        }

        if !self.verify_secret(refresh_secret, &record.refresh_hash).await? {
            tracing::warn!(identity = %identity, session_id = %session_id, "Refresh secret mismatch");
            return Err(TokenError::InvalidCredential);
        }

        let generation = self.mint(identity, origin).await?;
        let rotation = Rotation {
            new_session_id: generation.session_id,
            new_refresh_hash: generation.refresh_hash,
            new_origin_address: origin,
        };

        let rotated = self
            .with_deadline(self.store.rotate_session(identity, session_id, rotation))
            .await?;
        if !rotated {
            tracing::warn!(identity = %identity, session_id = %session_id, "Refresh lost rotation race");
            return Err(TokenError::ConcurrentRotation);
        }

        tracing::info!(
            identity = %identity,
            previous_session_id = %session_id,
            session_id = %generation.session_id,
            "Session rotated"
        );

        Ok(generation.pair)
    }

    /// Create the identifiers and credentials of a new generation
    async fn mint(&self, identity: Uuid, origin: IpAddr) -> Result<Generation, TokenError> {
        let session_id = Uuid::new_v4();
        let access_token = self
            .codec
            .issue(session_id, identity, origin, self.access_token_ttl)?;
        let refresh_secret = generate_refresh_secret();
        let refresh_hash = self.hash_secret(refresh_secret.clone()).await?;

        Ok(Generation {
            session_id,
            pair: TokenPair {
                access_token,
                refresh_secret,
            },
            refresh_hash,
        })
    }

    // bcrypt blocks; run it off the async workers
    async fn hash_secret(&self, secret: String) -> Result<String, TokenError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| TokenError::Internal(format!("hashing task failed: {}", e)))?
    }

    async fn verify_secret(&self, secret: &str, hash: &str) -> Result<bool, TokenError> {
        let hasher = self.hasher;
        let secret = secret.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &hash))
            .await
            .map_err(|e| TokenError::Internal(format!("verification task failed: {}", e)))
    }

    /// Bound a store call by the configured deadline
    async fn with_deadline<T, F>(&self, call: F) -> Result<T, TokenError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(TokenError::from),
            Err(_) => {
                tracing::error!(timeout_ms = self.store_timeout.as_millis() as u64, "Store call timed out");
                Err(StoreError::Timeout.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::store::InMemorySessionStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn notify(&self, _: Uuid, _: IpAddr) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    struct ChannelNotifier(mpsc::UnboundedSender<(Uuid, IpAddr)>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn notify(&self, identity: Uuid, address: IpAddr) -> Result<(), NotifyError> {
            let _ = self.0.send((identity, address));
            Ok(())
        }
    }

    /// Store whose every call outlives any sane deadline
    struct StalledStore;

    #[async_trait]
    impl SessionStore for StalledStore {
        async fn find_session(&self, _: Uuid) -> Result<Option<SessionRecord>, StoreError> {
            futures::future::pending().await
        }
        async fn find_by_session_id(&self, _: Uuid) -> Result<Option<Uuid>, StoreError> {
            futures::future::pending().await
        }
        async fn create_session(&self, _: SessionRecord) -> Result<(), StoreError> {
            futures::future::pending().await
        }
        async fn rotate_session(&self, _: Uuid, _: Uuid, _: Rotation) -> Result<bool, StoreError> {
            futures::future::pending().await
        }
    }

    /// Sets its flag when dropped
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Store that parks every call and records whether the parked future was dropped
    #[derive(Default)]
    struct ParkedStore {
        entered: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    impl ParkedStore {
        async fn park<T>(&self) -> Result<T, StoreError> {
            let _flag = DropFlag(self.dropped.clone());
            self.entered.store(true, Ordering::SeqCst);
            futures::future::pending().await
        }
    }

    #[async_trait]
    impl SessionStore for ParkedStore {
        async fn find_session(&self, _: Uuid) -> Result<Option<SessionRecord>, StoreError> {
            self.park().await
        }
        async fn find_by_session_id(&self, _: Uuid) -> Result<Option<Uuid>, StoreError> {
            self.park().await
        }
        async fn create_session(&self, _: SessionRecord) -> Result<(), StoreError> {
            self.park().await
        }
        async fn rotate_session(&self, _: Uuid, _: Uuid, _: Rotation) -> Result<bool, StoreError> {
            self.park().await
        }
    }

    fn settings() -> TokenSettings {
        TokenSettings {
            signing_secret: "test-secret-key-at-least-32-characters-long".to_string(),
            issuer: "test".to_string(),
            access_token_ttl_seconds: 900,
            refresh_window_seconds: 3600,
            hash_cost: 4,
            store_timeout_millis: 50,
        }
    }

    fn manager_with(store: Arc<dyn SessionStore>) -> TokenManager {
        TokenManager::new(&settings(), store, Arc::new(NullNotifier), Duration::from_millis(100))
            .expect("valid settings")
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    /// Re-sign a token's claims as if it had been issued `seconds` earlier
    fn backdate(manager: &TokenManager, token: &str, seconds: i64) -> String {
        let mut claims = manager.codec.verify_allow_expired(token).unwrap();
        claims.iat -= seconds;
        claims.exp -= seconds;
        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS512),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(settings().signing_secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut bad = settings();
        bad.signing_secret = "short".to_string();
        let result = TokenManager::new(
            &bad,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(NullNotifier),
            Duration::from_millis(100),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_first_authentication_binds_origin() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = manager_with(store.clone());
        let identity = Uuid::new_v4();

        let pair = manager.authenticate(identity, addr("1.2.3.4")).await.unwrap();
        let claims = manager.verify_access(&pair.access_token).unwrap();
        let record = store.find_session(identity).await.unwrap().unwrap();

        assert_eq!(claims.sub, identity);
        assert_eq!(claims.jti, record.session_id);
        assert_eq!(record.origin_address, addr("1.2.3.4"));
        assert_ne!(record.refresh_hash, pair.refresh_secret);
        assert!(manager.hasher.verify(&pair.refresh_secret, &record.refresh_hash));
    }

    #[tokio::test]
    async fn test_store_deadline_yields_store_unavailable() {
        let manager = manager_with(Arc::new(StalledStore));

        let result = manager.authenticate(Uuid::new_v4(), addr("1.2.3.4")).await;
        assert!(matches!(result, Err(TokenError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_refresh_with_garbage_token_touches_nothing() {
        // StalledStore would time out if the refresh reached the store
        let manager = manager_with(Arc::new(StalledStore));

        let result = manager.refresh("not.a.token", "secret", addr("1.2.3.4")).await;
        assert!(matches!(result, Err(TokenError::MalformedClaims(_))));
    }

    #[tokio::test]
    async fn test_refresh_with_foreign_signature_is_invalid_credential() {
        let manager = manager_with(Arc::new(StalledStore));
        let foreign = ClaimsCodec::new(b"another-secret-key-at-least-32-characters", "test");
        let token = foreign.issue(Uuid::new_v4(), Uuid::new_v4(), addr("1.2.3.4"), 900).unwrap();

        let result = manager.refresh(&token, "secret", addr("1.2.3.4")).await;
        assert_eq!(result.unwrap_err(), TokenError::InvalidCredential);
    }

    #[tokio::test]
    async fn test_refresh_outside_window_is_expired() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = manager_with(store.clone());
        let identity = Uuid::new_v4();
        let pair = manager.authenticate(identity, addr("1.2.3.4")).await.unwrap();
        let record = store.find_session(identity).await.unwrap().unwrap();

        let old_token = backdate(&manager, &pair.access_token, 7200);

        let result = manager.refresh(&old_token, &pair.refresh_secret, addr("1.2.3.4")).await;
        assert_eq!(result.unwrap_err(), TokenError::Expired);
        assert_eq!(store.find_session(identity).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_stale_token_from_new_origin_is_mismatch_and_alerts() {
        let store = Arc::new(InMemorySessionStore::new());
        let (tx, mut alerts) = mpsc::unbounded_channel();
        let manager = TokenManager::new(
            &settings(),
            store.clone(),
            Arc::new(ChannelNotifier(tx)),
            Duration::from_millis(100),
        )
        .expect("valid settings");
        let identity = Uuid::new_v4();
        let pair = manager.authenticate(identity, addr("1.2.3.4")).await.unwrap();

        let old_token = backdate(&manager, &pair.access_token, 7200);

        let result = manager.refresh(&old_token, &pair.refresh_secret, addr("9.9.9.9")).await;
        assert_eq!(result.unwrap_err(), TokenError::OriginMismatch);

        let alert = tokio::time::timeout(Duration::from_secs(1), alerts.recv())
            .await
            .expect("alert not dispatched");
        assert_eq!(alert, Some((identity, addr("9.9.9.9"))));
    }

    #[tokio::test]
    async fn test_refresh_store_deadline_yields_store_unavailable() {
        let manager = manager_with(Arc::new(StalledStore));
        let token = manager
            .codec
            .issue(Uuid::new_v4(), Uuid::new_v4(), addr("1.2.3.4"), 900)
            .unwrap();

        let result = manager.refresh(&token, "secret", addr("1.2.3.4")).await;
        assert!(matches!(result, Err(TokenError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_dropping_refresh_cancels_store_call() {
        let store = Arc::new(ParkedStore::default());
        let manager = manager_with(store.clone());
        let token = manager
            .codec
            .issue(Uuid::new_v4(), Uuid::new_v4(), addr("1.2.3.4"), 900)
            .unwrap();

        // The caller gives up well inside the 50ms store deadline
        let result = tokio::time::timeout(
            Duration::from_millis(10),
            manager.refresh(&token, "secret", addr("1.2.3.4")),
        )
        .await;

        assert!(result.is_err());
        assert!(store.entered.load(Ordering::SeqCst));
        assert!(store.dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropping_authenticate_cancels_store_call() {
        let store = Arc::new(ParkedStore::default());
        let manager = manager_with(store.clone());

        let task = {
            let manager = Arc::new(manager);
            tokio::spawn(async move { manager.authenticate(Uuid::new_v4(), addr("1.2.3.4")).await })
        };
        while !store.entered.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(store.dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_refresh_accepts_expired_access_token() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = manager_with(store.clone());
        let identity = Uuid::new_v4();
        let pair = manager.authenticate(identity, addr("1.2.3.4")).await.unwrap();

        let record = store.find_session(identity).await.unwrap().unwrap();
        let expired = manager
            .codec
            .issue(record.session_id, identity, addr("1.2.3.4"), -300)
            .unwrap();
        assert_eq!(manager.verify_access(&expired), Err(TokenError::Expired));

        let next = manager.refresh(&expired, &pair.refresh_secret, addr("1.2.3.4")).await;
        assert!(next.is_ok());
    }
}
