//! Session-aware async client for the food API.
//!
//! # Design
//! `ApiClient` composes the stateless `FoodClient` codec with a `Transport`
//! and owns the `Session` (token plus default position) behind an async
//! `RwLock`. Reads take a snapshot; writes replace the token wholesale, so
//! concurrent calls never observe a half-updated session.
//!
//! `create_user` establishes the session and propagates every failure. The
//! remaining operations are best effort: any failure is logged, published
//! on the failure channel and turned into `None`.

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::FoodClient;
use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorKind};
use crate::http::{HttpRequest, HttpResponse};
use crate::store::{IdentityStore, StoreError};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{Location, Menu, User, UserResponse};

const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Credentials and defaults shared by every call of one client.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub sid: Option<String>,
    pub location: Location,
}

/// A degraded call, as published on the failure channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub operation: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

/// The identity `ensure_user` settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub sid: String,
    pub uid: u32,
    /// `true` when a new user was registered on this call.
    pub created: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ApiClient<T = ReqwestTransport> {
    codec: FoodClient,
    transport: T,
    session: RwLock<Session>,
    demo_menu_id: u32,
    failures: broadcast::Sender<Failure>,
    shutdown: CancellationToken,
}

impl ApiClient<ReqwestTransport> {
    /// Build a client that talks to `config.base_url` over reqwest.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(config: &ClientConfig, transport: T) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            codec: FoodClient::new(&config.base_url),
            transport,
            session: RwLock::new(Session {
                sid: config.initial_sid.clone(),
                location: config.location,
            }),
            demo_menu_id: config.demo_menu_id,
            failures,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn codec(&self) -> &FoodClient {
        &self.codec
    }

    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn set_sid(&self, sid: impl Into<String>) {
        self.session.write().await.sid = Some(sid.into());
    }

    pub async fn clear_sid(&self) {
        self.session.write().await.sid = None;
    }

    pub async fn set_location(&self, location: Location) {
        self.session.write().await.location = location;
    }

    /// Receive a `Failure` for every best-effort call that returned `None`
    /// after this point.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<Failure> {
        self.failures.subscribe()
    }

    /// Cancel every in-flight call and refuse new ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Register a new user and adopt its session token.
    pub async fn create_user(&self) -> Result<UserResponse, ApiError> {
        debug!("create_user");
        let result = async {
            let response = self.execute(self.codec.build_create_user()?).await?;
            self.codec.parse_create_user(response)
        }
        .await;

        match result {
            Ok(created) => {
                self.set_sid(created.sid.clone()).await;
                info!(uid = created.uid, "user created, session established");
                Ok(created)
            }
            Err(err) => {
                error!(kind = ?err.kind(), error = %err, "create_user failed");
                Err(err)
            }
        }
    }

    pub async fn get_user(&self, uid: u32) -> Option<User> {
        debug!(uid, "get_user");
        let result = async {
            let sid = self.current_sid().await?;
            let response = self.execute(self.codec.build_get_user(uid, &sid)?).await?;
            self.codec.parse_get_user(response)
        }
        .await;
        self.degrade("get_user", result)
    }

    /// Menus near the session's default position, in server order.
    pub async fn get_menu(&self) -> Option<Vec<Menu>> {
        debug!("get_menu");
        let result = async {
            let Session { sid, location } = self.session().await;
            let sid = sid.ok_or(ApiError::MissingSession)?;
            let response = self.execute(self.codec.build_get_menu(location, &sid)?).await?;
            self.codec.parse_get_menu(response)
        }
        .await;
        self.degrade("get_menu", result)
    }

    /// Base64 image of the configured demo menu.
    pub async fn get_image(&self) -> Option<String> {
        self.get_menu_image(self.demo_menu_id).await
    }

    /// Base64 image of menu `mid`, `None` when the server sends none.
    pub async fn get_menu_image(&self, mid: u32) -> Option<String> {
        debug!(mid, "get_menu_image");
        let result = async {
            let sid = self.current_sid().await?;
            let response = self.execute(self.codec.build_get_image(mid, &sid)?).await?;
            self.codec.parse_get_image(response)
        }
        .await;
        self.degrade("get_image", result).flatten()
    }

    pub async fn put_user(&self, uid: u32, user: &User) -> Option<UserResponse> {
        debug!(uid, "put_user");
        let result = async {
            let sid = self.current_sid().await?;
            let response = self.execute(self.codec.build_put_user(uid, user, &sid)?).await?;
            self.codec.parse_put_user(response)
        }
        .await;
        self.degrade("put_user", result)
    }

    /// Reuse the identity persisted in `store`, or register a new user and
    /// persist it when either value is missing.
    pub async fn ensure_user<S>(&self, store: &S) -> Result<Identity, IdentityError>
    where
        S: IdentityStore + ?Sized,
    {
        if let (Some(sid), Some(uid)) = store.load_identity().await? {
            info!(uid, "reusing stored identity");
            self.set_sid(sid.clone()).await;
            return Ok(Identity {
                sid,
                uid,
                created: false,
            });
        }

        info!("no stored identity, creating user");
        let created = self.create_user().await?;
        store.save_identity(&created.sid, created.uid).await?;
        Ok(Identity {
            sid: created.sid,
            uid: created.uid,
            created: true,
        })
    }

    async fn current_sid(&self) -> Result<String, ApiError> {
        self.session
            .read()
            .await
            .sid
            .clone()
            .ok_or(ApiError::MissingSession)
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        if self.shutdown.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ApiError::Cancelled),
            result = self.transport.execute(request) => result,
        }
    }

    fn degrade<V>(&self, operation: &'static str, result: Result<V, ApiError>) -> Option<V> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                let kind = err.kind();
                error!(operation, ?kind, error = %err, "request degraded to no result");
                // No subscribers is fine.
                let _ = self.failures.send(Failure {
                    operation,
                    kind,
                    message: err.to_string(),
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::http::HttpMethod;
    use crate::store::MemoryStore;

    const BASE_URL: &str = "http://localhost:3000";

    /// Replays canned responses and records every request it sees.
    #[derive(Default)]
    struct StubTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl StubTransport {
        fn replying(bodies: &[(u16, &str)]) -> Self {
            let responses: VecDeque<Result<HttpResponse, ApiError>> = bodies
                .iter()
                .map(|(status, body)| {
                    Ok(HttpResponse {
                        status: *status,
                        headers: Vec::new(),
                        body: body.to_string(),
                    })
                })
                .collect();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: ApiError) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from([Err(err)])),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Transport("no canned response".to_string())))
        }
    }

    /// Never answers.
    struct PendingTransport;

    #[async_trait]
    impl Transport for PendingTransport {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, ApiError> {
            std::future::pending().await
        }
    }

    fn config(sid: Option<&str>) -> ClientConfig {
        ClientConfig {
            base_url: BASE_URL.to_string(),
            initial_sid: sid.map(str::to_string),
            ..ClientConfig::default()
        }
    }

    fn client(sid: Option<&str>, stub: &Arc<StubTransport>) -> ApiClient<Arc<StubTransport>> {
        ApiClient::with_transport(&config(sid), Arc::clone(stub))
    }

    const USER_BODY: &str = r#"{"firstName":"Ada","lastName":"Lovelace","cardFullName":"ADA LOVELACE",
        "cardNumber":"1234567812345678","cardExpireMonth":12,"cardExpireYear":2030,"cardCVV":"123",
        "uid":42,"lastOid":9,"orderStatus":"COMPLETED"}"#;

    const MENU_BODY: &str = r#"[
        {"mid":3,"name":"Ramen","price":12.0,"location":{"lat":45.47,"lng":9.22},"imageVersion":1,"shortDescription":"broth","deliveryTime":30},
        {"mid":1,"name":"Pizza","price":8.5,"location":{"lat":45.48,"lng":9.23},"imageVersion":2,"shortDescription":"hot","deliveryTime":20}
    ]"#;

    fn ada() -> User {
        serde_json::from_str(USER_BODY).unwrap()
    }

    #[tokio::test]
    async fn create_user_returns_and_adopts_session() {
        let stub = Arc::new(StubTransport::replying(&[(200, r#"{"sid":"abc","uid":7}"#)]));
        let client = client(None, &stub);

        let created = client.create_user().await.unwrap();
        assert_eq!(created, UserResponse { sid: "abc".to_string(), uid: 7 });
        assert_eq!(client.session().await.sid.as_deref(), Some("abc"));

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].url, "http://localhost:3000/user");
        assert!(requests[0].body.is_none());
    }

    #[tokio::test]
    async fn create_user_propagates_transport_failure() {
        let stub = Arc::new(StubTransport::failing(ApiError::Transport("refused".to_string())));
        let client = client(None, &stub);
        let err = client.create_user().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(client.session().await.sid.is_none());
    }

    #[tokio::test]
    async fn create_user_propagates_decode_failure() {
        let stub = Arc::new(StubTransport::replying(&[(200, r#"{"sid":"abc"}"#)]));
        let err = client(None, &stub).create_user().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[tokio::test]
    async fn get_user_without_session_skips_network() {
        let stub = Arc::new(StubTransport::default());
        let client = client(None, &stub);
        let mut failures = client.subscribe_failures();

        assert!(client.get_user(42).await.is_none());
        assert!(stub.requests().is_empty());

        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.operation, "get_user");
        assert_eq!(failure.kind, ErrorKind::Precondition);
    }

    #[tokio::test]
    async fn cleared_session_short_circuits() {
        let stub = Arc::new(StubTransport::default());
        let client = client(Some("tok"), &stub);
        client.clear_sid().await;

        assert!(client.get_menu().await.is_none());
        assert!(client.get_image().await.is_none());
        assert!(stub.requests().is_empty());
    }

    #[tokio::test]
    async fn get_user_decodes_fields() {
        let stub = Arc::new(StubTransport::replying(&[(200, USER_BODY)]));
        let client = client(Some("tok"), &stub);

        let user = client.get_user(42).await.unwrap();
        assert_eq!(user, ada());
        assert_eq!(user.card_cvv, "123");
        assert_eq!(stub.requests()[0].url, "http://localhost:3000/user/42?sid=tok");
    }

    #[tokio::test]
    async fn get_user_malformed_body_is_none() {
        let stub = Arc::new(StubTransport::replying(&[(200, r#"{"firstName":"Ada"}"#)]));
        let client = client(Some("tok"), &stub);
        let mut failures = client.subscribe_failures();

        assert!(client.get_user(42).await.is_none());
        assert_eq!(failures.recv().await.unwrap().kind, ErrorKind::Decode);
    }

    #[tokio::test]
    async fn get_user_error_status_is_none() {
        let stub = Arc::new(StubTransport::replying(&[(401, r#"{"message":"invalid sid"}"#)]));
        let client = client(Some("tok"), &stub);
        let mut failures = client.subscribe_failures();

        assert!(client.get_user(42).await.is_none());
        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.kind, ErrorKind::Http);
        assert!(failure.message.contains("invalid sid"));
    }

    #[tokio::test]
    async fn get_menu_keeps_server_order() {
        let stub = Arc::new(StubTransport::replying(&[(200, MENU_BODY)]));
        let client = client(Some("tok"), &stub);

        let menus = client.get_menu().await.unwrap();
        let mids: Vec<u32> = menus.iter().map(|m| m.mid).collect();
        assert_eq!(mids, vec![3, 1]);

        let url = url::Url::parse(&stub.requests()[0].url).unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("lat".to_string(), "45.478".to_string()),
                ("lng".to_string(), "9.227".to_string()),
                ("sid".to_string(), "tok".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn get_menu_uses_updated_location() {
        let stub = Arc::new(StubTransport::replying(&[(200, "[]")]));
        let client = client(Some("tok"), &stub);
        client.set_location(Location { lat: 41.9, lng: 12.5 }).await;

        client.get_menu().await.unwrap();
        assert_eq!(
            stub.requests()[0].url,
            "http://localhost:3000/menu?lat=41.9&lng=12.5&sid=tok"
        );
    }

    #[tokio::test]
    async fn get_menu_empty_array_is_empty_not_none() {
        let stub = Arc::new(StubTransport::replying(&[(200, "[]")]));
        let menus = client(Some("tok"), &stub).get_menu().await;
        assert_eq!(menus, Some(Vec::new()));
    }

    #[tokio::test]
    async fn get_menu_twice_is_structurally_equal() {
        let stub = Arc::new(StubTransport::replying(&[(200, MENU_BODY), (200, MENU_BODY)]));
        let client = client(Some("tok"), &stub);
        let first = client.get_menu().await;
        let second = client.get_menu().await;
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(stub.requests()[0], stub.requests()[1]);
    }

    #[tokio::test]
    async fn get_image_uses_demo_menu_and_extracts_base64() {
        let stub = Arc::new(StubTransport::replying(&[(200, r#"{"base64":"QQ=="}"#)]));
        let client = client(Some("tok"), &stub);

        assert_eq!(client.get_image().await.as_deref(), Some("QQ=="));
        assert_eq!(stub.requests()[0].url, "http://localhost:3000/menu/21/image?sid=tok");
    }

    #[tokio::test]
    async fn get_image_without_key_is_none() {
        let stub = Arc::new(StubTransport::replying(&[(200, "{}")]));
        let client = client(Some("tok"), &stub);
        let mut failures = client.subscribe_failures();

        assert!(client.get_menu_image(5).await.is_none());
        assert_eq!(stub.requests()[0].url, "http://localhost:3000/menu/5/image?sid=tok");
        // A missing key is not a failure.
        assert!(failures.try_recv().is_err());
    }

    #[tokio::test]
    async fn put_user_body_has_exactly_mutable_fields_and_sid() {
        let stub = Arc::new(StubTransport::replying(&[(200, r#"{"sid":"tok","uid":42}"#)]));
        let client = client(Some("tok"), &stub);

        let res = client.put_user(42, &ada()).await.unwrap();
        assert_eq!(res, UserResponse { sid: "tok".to_string(), uid: 42 });

        let request = &stub.requests()[0];
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.url, "http://localhost:3000/user/42");
        let body: serde_json::Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        let mut keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "cardCVV",
                "cardExpireMonth",
                "cardExpireYear",
                "cardFullName",
                "cardNumber",
                "firstName",
                "lastName",
                "sid",
            ]
        );
    }

    #[tokio::test]
    async fn put_user_invalid_month_skips_network() {
        let stub = Arc::new(StubTransport::default());
        let client = client(Some("tok"), &stub);
        let mut failures = client.subscribe_failures();
        let mut user = ada();
        user.card_expire_month = 0;

        assert!(client.put_user(42, &user).await.is_none());
        assert!(stub.requests().is_empty());
        assert_eq!(failures.recv().await.unwrap().kind, ErrorKind::Precondition);
    }

    #[tokio::test]
    async fn ensure_user_creates_and_persists_when_store_is_empty() {
        let stub = Arc::new(StubTransport::replying(&[(200, r#"{"sid":"abc","uid":7}"#)]));
        let client = client(None, &stub);
        let store = MemoryStore::new();

        let identity = client.ensure_user(&store).await.unwrap();
        assert_eq!(
            identity,
            Identity { sid: "abc".to_string(), uid: 7, created: true }
        );
        assert_eq!(store.load_sid().await.unwrap().as_deref(), Some("abc"));
        assert_eq!(store.load_uid().await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn ensure_user_reuses_stored_identity() {
        let stub = Arc::new(StubTransport::default());
        let client = client(None, &stub);
        let store = MemoryStore::new();
        store.save_identity("stored", 35223).await.unwrap();

        let identity = client.ensure_user(&store).await.unwrap();
        assert!(!identity.created);
        assert_eq!(identity.uid, 35223);
        assert!(stub.requests().is_empty());
        assert_eq!(client.session().await.sid.as_deref(), Some("stored"));
    }

    /// Answers single-key reads from a stale slot, snapshots from the
    /// current one.
    struct SplitStore;

    #[async_trait]
    impl IdentityStore for SplitStore {
        async fn load_identity(&self) -> Result<(Option<String>, Option<u32>), StoreError> {
            Ok((Some("current".to_string()), Some(2)))
        }

        async fn save_identity(&self, _sid: &str, _uid: u32) -> Result<(), StoreError> {
            Ok(())
        }

        async fn load_sid(&self) -> Result<Option<String>, StoreError> {
            Ok(Some("stale".to_string()))
        }

        async fn load_uid(&self) -> Result<Option<u32>, StoreError> {
            Ok(Some(1))
        }
    }

    #[tokio::test]
    async fn ensure_user_reads_sid_and_uid_together() {
        let stub = Arc::new(StubTransport::default());
        let client = client(None, &stub);

        let identity = client.ensure_user(&SplitStore).await.unwrap();
        assert_eq!(
            identity,
            Identity { sid: "current".to_string(), uid: 2, created: false }
        );
        assert_eq!(client.session().await.sid.as_deref(), Some("current"));
    }

    #[tokio::test]
    async fn codec_uses_configured_base_url() {
        let stub = Arc::new(StubTransport::default());
        let client = ApiClient::with_transport(
            &ClientConfig {
                base_url: format!("{BASE_URL}/"),
                ..ClientConfig::default()
            },
            stub,
        );
        assert_eq!(client.codec().base_url(), BASE_URL);
    }

    #[tokio::test]
    async fn ensure_user_propagates_create_failure() {
        let stub = Arc::new(StubTransport::failing(ApiError::Transport("down".to_string())));
        let client = client(None, &stub);
        let store = MemoryStore::new();

        let err = client.ensure_user(&store).await.unwrap_err();
        assert!(matches!(err, IdentityError::Api(ApiError::Transport(_))));
        assert_eq!(store.load_sid().await.unwrap(), None);
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_call() {
        let client = Arc::new(ApiClient::with_transport(&config(Some("tok")), PendingTransport));
        let mut failures = client.subscribe_failures();

        let task = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.get_menu().await }
        });
        client.shutdown();

        assert!(task.await.unwrap().is_none());
        assert_eq!(failures.recv().await.unwrap().kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn create_user_after_shutdown_is_cancelled() {
        let client = ApiClient::with_transport(&config(None), PendingTransport);
        assert!(!client.is_shut_down());
        client.shutdown();
        assert!(client.is_shut_down());
        let err = client.create_user().await.unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
    }
}
