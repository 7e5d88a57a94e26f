//! Auth gateway for the hosted backend.
//!
//! Signs in with email + password, keeps the access token on the shared
//! [`RestClient`] so the deal store acts as the user, and publishes session
//! changes on a watch channel.

use async_trait::async_trait;
use platform_rest::{RestClient, RestError};
use products_crm::{AuthGateway, AuthUser, CrmError, CrmResult, TransportError};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug)]
pub struct RestAuthGateway {
    client: RestClient,
    session: watch::Sender<Option<AuthUser>>,
}

impl RestAuthGateway {
    pub fn new(client: RestClient) -> Self {
        let (session, _) = watch::channel(None);
        Self { client, session }
    }

    fn publish(&self, user: Option<AuthUser>) {
        self.session.send_if_modified(|current| {
            if *current == user {
                return false;
            }
            *current = user;
            true
        });
    }

    fn clear(&self) {
        self.client.set_access_token(None);
        self.publish(None);
    }
}

#[async_trait]
impl AuthGateway for RestAuthGateway {
    async fn current_user(&self) -> CrmResult<Option<AuthUser>> {
        if self.client.access_token().is_none() {
            return Ok(None);
        }
        let url = self.client.endpoint("auth/v1/user").map_err(transport)?;
        let request = self.client.request(Method::GET, url);
        match self.client.send_json::<AuthUser>(request).await {
            Ok(user) => {
                self.publish(Some(user.clone()));
                Ok(Some(user))
            }
            Err(RestError::Status { status, .. })
                if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
            {
                debug!("stored session rejected; signing out locally");
                self.clear();
                Ok(None)
            }
            Err(err) => Err(transport(err)),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> CrmResult<AuthUser> {
        let mut url = self.client.endpoint("auth/v1/token").map_err(transport)?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let request = self
            .client
            .request(Method::POST, url)
            .json(&json!({ "email": email.trim(), "password": password }));
        match self.client.send_json::<TokenGrant>(request).await {
            Ok(grant) => {
                self.client.set_access_token(Some(grant.access_token));
                info!(user = %grant.user.id, "signed in");
                self.publish(Some(grant.user.clone()));
                Ok(grant.user)
            }
            Err(RestError::Status { status, message }) if status.is_client_error() => {
                Err(CrmError::auth(message))
            }
            Err(err) => Err(transport(err)),
        }
    }

    async fn sign_out(&self) -> CrmResult<()> {
        if self.client.access_token().is_none() {
            self.publish(None);
            return Ok(());
        }
        let url = self.client.endpoint("auth/v1/logout").map_err(transport)?;
        let request = self.client.request(Method::POST, url);
        let result = self.client.send(request).await;
        // The local session ends whatever the backend says.
        self.clear();
        match result {
            Ok(_) => Ok(()),
            Err(RestError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED => Ok(()),
            Err(err) => {
                warn!(error = %err, "remote sign out failed");
                Err(transport(err))
            }
        }
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.session.subscribe()
    }
}

fn transport(err: RestError) -> CrmError {
    CrmError::Transport(TransportError::from(err))
}
