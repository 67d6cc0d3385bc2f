use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use auth_client::{
    ApiResponse, AuthClientConfig, AuthenticatedClient, Clock, HttpRefreshTransport,
    HttpTransport, ManualClock, Method, OutboundRequest, TokenVault, TransportError,
};
use data_service_http::{HttpAuthService, HttpDataService, HttpEndpoints};
use pretty_assertions::assert_eq;
use sync_protocol::{
    AuthCredentials, AuthService, CredentialState, DataService, ServiceError, Space,
};

/// Replays scripted responses in order and records every request.
struct ReplayHttp {
    responses: Mutex<VecDeque<ApiResponse>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ReplayHttp {
    fn new(responses: Vec<ApiResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl HttpTransport for ReplayHttp {
    async fn send(&self, request: OutboundRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().expect("requests lock").push(request);
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .ok_or_else(|| TransportError::Connect("no scripted response".to_string()))
    }
}

fn endpoints() -> HttpEndpoints {
    HttpEndpoints::new("http://api.local/rest/v1", "http://api.local/auth/v1")
        .expect("endpoints parse")
}

fn data_service(http: &Arc<ReplayHttp>) -> HttpDataService {
    let endpoints = endpoints();
    let config = AuthClientConfig::new(endpoints.token_url().expect("token url"))
        .insert_header("apikey", "anon");
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
    let transport = Arc::clone(http) as Arc<dyn HttpTransport>;
    let refresh = Arc::new(HttpRefreshTransport::new(
        Arc::clone(&transport),
        config.clone(),
        Arc::clone(&clock),
    ));
    let client = AuthenticatedClient::new(
        config,
        Arc::new(TokenVault::with_credentials(CredentialState::new(
            "access", "refresh", 10_000,
        ))),
        transport,
        refresh,
        clock,
    );
    HttpDataService::new(Arc::new(client), endpoints)
}

fn auth_service(http: &Arc<ReplayHttp>) -> HttpAuthService {
    HttpAuthService::new(
        Arc::clone(http) as Arc<dyn HttpTransport>,
        AuthClientConfig::default().insert_header("apikey", "anon"),
        endpoints(),
        Arc::new(ManualClock::new(1_000)),
    )
}

#[tokio::test]
async fn spaces_are_fetched_with_bearer_and_api_key() {
    let http = ReplayHttp::new(vec![ApiResponse::new(
        200,
        r#"[{"id":"s1","name":"Home","created_at":"2024-01-01T00:00:00Z","owner":"u1"}]"#,
    )]);

    let spaces = data_service(&http).fetch_spaces().await.expect("spaces load");

    assert_eq!(spaces.len(), 1);
    assert_eq!(spaces[0].id, "s1");
    let requests = http.requests();
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(
        requests[0].url,
        "http://api.local/rest/v1/spaces?select=*&order=created_at.asc"
    );
    assert_eq!(requests[0].header("authorization"), Some("Bearer access"));
    assert_eq!(requests[0].header("apikey"), Some("anon"));
}

#[tokio::test]
async fn active_space_takes_the_most_recently_used_row() {
    let http = ReplayHttp::new(vec![ApiResponse::new(
        200,
        r#"[{"id":"s2","name":"Work"}]"#,
    )]);

    assert_eq!(
        data_service(&http).fetch_active_space().await,
        Ok(Some(Space::new("s2", "Work")))
    );
    assert!(http.requests()[0].url.contains("limit=1"));
}

#[tokio::test]
async fn empty_conversation_list_skips_the_message_query() {
    let http = ReplayHttp::new(Vec::new());

    assert_eq!(data_service(&http).fetch_messages(&[]).await, Ok(Vec::new()));
    assert!(http.requests().is_empty());
}

#[tokio::test]
async fn conversations_are_filtered_by_space() {
    let http = ReplayHttp::new(vec![ApiResponse::new(
        200,
        r#"[{"id":"c1","space_id":"s1","title":"Groceries"}]"#,
    )]);

    let conversations = data_service(&http)
        .fetch_conversations("s1")
        .await
        .expect("conversations load");

    assert_eq!(conversations[0].title, "Groceries");
    assert!(http.requests()[0].url.contains("space_id=eq.s1"));
}

#[tokio::test]
async fn touch_space_patches_last_used_at() {
    let http = ReplayHttp::new(vec![ApiResponse::new(204, "")]);

    data_service(&http)
        .touch_space("s1")
        .await
        .expect("touch succeeds");

    let requests = http.requests();
    let request = &requests[0];
    assert_eq!(request.method, Method::PATCH);
    assert!(request.url.ends_with("/spaces?id=eq.s1"));
    assert!(request
        .body
        .as_ref()
        .and_then(|body| body.get("last_used_at"))
        .is_some());
}

#[tokio::test]
async fn unprocessable_response_is_a_validation_error() {
    let http = ReplayHttp::new(vec![ApiResponse::new(
        422,
        r#"{"message":"invalid input syntax"}"#,
    )]);

    assert_eq!(
        data_service(&http).fetch_spaces().await,
        Err(ServiceError::Validation("invalid input syntax".to_string()))
    );
}

#[tokio::test]
async fn missing_user_is_none() {
    let http = ReplayHttp::new(vec![ApiResponse::new(404, "")]);
    assert_eq!(data_service(&http).fetch_user().await, Ok(None));
}

#[tokio::test]
async fn sign_in_parses_session_and_user() {
    let http = ReplayHttp::new(vec![ApiResponse::new(
        200,
        r#"{"access_token":"a1","refresh_token":"r1","expires_in":3600,"token_type":"bearer",
            "user":{"id":"u1","email":"ada@example.com","user_metadata":{"display_name":"Ada"}}}"#,
    )]);

    let session = auth_service(&http)
        .sign_in(&AuthCredentials::new("ada@example.com", "pw"))
        .await
        .expect("sign-in succeeds");

    assert_eq!(session.credentials, CredentialState::new("a1", "r1", 4_600));
    assert_eq!(
        session.user.and_then(|user| user.display_name).as_deref(),
        Some("Ada")
    );
    let requests = http.requests();
    let request = &requests[0];
    assert_eq!(
        request.url,
        "http://api.local/auth/v1/token?grant_type=password"
    );
    assert_eq!(request.header("authorization"), None);
}

#[tokio::test]
async fn bad_credentials_are_a_validation_error() {
    let http = ReplayHttp::new(vec![ApiResponse::new(
        400,
        r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
    )]);

    assert_eq!(
        auth_service(&http)
            .sign_in(&AuthCredentials::new("ada@example.com", "nope"))
            .await,
        Err(ServiceError::Validation("Invalid login credentials".to_string()))
    );
}

#[tokio::test]
async fn sign_up_without_session_awaits_confirmation() {
    let http = ReplayHttp::new(vec![ApiResponse::new(
        200,
        r#"{"id":"u2","email":"new@example.com","confirmation_sent_at":"2024-01-01T00:00:00Z"}"#,
    )]);

    assert_eq!(
        auth_service(&http)
            .sign_up(&AuthCredentials::new("new@example.com", "pw"))
            .await,
        Ok(None)
    );
}

#[tokio::test]
async fn sign_out_revokes_with_the_access_token() {
    let http = ReplayHttp::new(vec![ApiResponse::new(204, "")]);

    auth_service(&http)
        .sign_out("a1")
        .await
        .expect("sign-out succeeds");
    assert_eq!(http.requests()[0].header("authorization"), Some("Bearer a1"));
    assert!(http.requests()[0].url.ends_with("/auth/v1/logout"));
}

#[tokio::test]
async fn transport_failure_is_a_network_error() {
    let http = ReplayHttp::new(Vec::new());
    assert_matches!(
        auth_service(&http).reset_password("ada@example.com").await,
        Err(ServiceError::Network(_))
    );
}
