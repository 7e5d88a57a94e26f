use platform_rest::RestClient;
use platform_authn::RestAuthGateway;
use products_crm::{AuthGateway, CrmError};
use serde_json::json;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path, query_param},
};

const KEY: &str = "anon-key";

async fn setup() -> (MockServer, RestClient, RestAuthGateway) {
    let server = MockServer::start().await;
    let client = RestClient::new(&server.uri(), KEY).unwrap();
    let gateway = RestAuthGateway::new(client.clone());
    (server, client, gateway)
}

async fn mount_password_grant(server: &MockServer, user_id: Uuid) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", KEY))
        .and(body_json(json!({ "email": "gp@fund.vc", "password": "pw" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh",
            "user": { "id": user_id, "email": "gp@fund.vc", "aud": "authenticated" }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn no_token_means_no_user_without_a_request() {
    let (_server, _client, gateway) = setup().await;
    assert_eq!(gateway.current_user().await.unwrap(), None);
}

#[tokio::test]
async fn password_sign_in_stores_the_token_and_notifies() {
    let (server, client, gateway) = setup().await;
    let user_id = Uuid::new_v4();
    mount_password_grant(&server, user_id).await;
    let mut changes = gateway.subscribe();

    let user = gateway.sign_in(" gp@fund.vc ", "pw").await.unwrap();
    assert_eq!(user.id, user_id);
    assert_eq!(client.access_token().as_deref(), Some("user-jwt"));
    changes.changed().await.unwrap();
    assert_eq!(changes.borrow().as_ref().map(|u| u.id), Some(user_id));
}

#[tokio::test]
async fn rejected_credentials_are_auth_errors() {
    let (server, client, gateway) = setup().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let err = gateway.sign_in("gp@fund.vc", "nope").await.unwrap_err();
    assert!(matches!(&err, CrmError::Auth(msg) if msg == "Invalid login credentials"));
    assert_eq!(client.access_token(), None);
}

#[tokio::test]
async fn expired_session_reads_as_signed_out() {
    let (server, client, gateway) = setup().await;
    client.set_access_token(Some("stale".into()));
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "msg": "invalid JWT" })))
        .mount(&server)
        .await;

    assert_eq!(gateway.current_user().await.unwrap(), None);
    assert_eq!(client.access_token(), None);
}

#[tokio::test]
async fn sign_out_clears_the_session() {
    let (server, client, gateway) = setup().await;
    let user_id = Uuid::new_v4();
    mount_password_grant(&server, user_id).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    gateway.sign_in("gp@fund.vc", "pw").await.unwrap();
    gateway.sign_out().await.unwrap();
    assert_eq!(client.access_token(), None);
    assert_eq!(*gateway.subscribe().borrow(), None);
}
