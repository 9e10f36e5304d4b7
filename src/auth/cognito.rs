use crate::auth::{AuthError, AuthProvider, Identity, SessionCheck, SignUpOutcome};
use crate::storage::{ACCESS_TOKEN_KEY, ClientStorage};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// Maps a provider error body onto the cases callers branch on.
fn classify_error(kind: &str, message: &str) -> AuthError {
    // __type is sometimes namespaced: "com.amazonaws...#UserNotConfirmedException"
    let kind = kind.rsplit('#').next().unwrap_or(kind);
    match kind {
        "UserNotConfirmedException" => AuthError::NotConfirmed,
        "NotAuthorizedException" | "UserNotFoundException" => AuthError::NotAuthorized,
        _ if !message.is_empty() => AuthError::Provider(message.to_string()),
        _ => AuthError::Provider(kind.to_string()),
    }
}

fn attribute<'a>(user: &'a Value, name: &str) -> Option<&'a str> {
    user.get("UserAttributes")?
        .as_array()?
        .iter()
        .find(|attr| attr.get("Name").and_then(Value::as_str) == Some(name))?
        .get("Value")?
        .as_str()
}

/// Hosted user pool reached through its JSON API. The access token is kept in client
/// storage so the session survives restarts.
pub struct CognitoAuth {
    client: Client,
    endpoint: String,
    client_id: String,
    storage: ClientStorage,
}

impl CognitoAuth {
    pub fn new(region: &str, client_id: &str, storage: ClientStorage) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("https://cognito-idp.{}.amazonaws.com/", region),
            client_id: client_id.to_string(),
            storage,
        }
    }

    async fn call(&self, action: &str, body: Value) -> Result<Value, AuthError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Target", format!("{}.{}", TARGET_PREFIX, action))
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| AuthError::Provider(format!("unreadable {} response: {}", action, e)));
        }

        let err = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => classify_error(&body.kind, &body.message),
            Err(_) => AuthError::Provider(format!("{} failed with status {}", action, status)),
        };
        Err(err)
    }

    async fn access_token(&self) -> Option<String> {
        match self.storage.get_raw(ACCESS_TOKEN_KEY).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read access token: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl AuthProvider for CognitoAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let response = self
            .call(
                "SignUp",
                json!({
                    "ClientId": self.client_id,
                    "Username": email,
                    "Password": password,
                    "UserAttributes": [{ "Name": "email", "Value": email }],
                }),
            )
            .await?;

        let confirmed = response
            .get("UserConfirmed")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(SignUpOutcome {
            username: email.to_string(),
            confirmation_required: !confirmed,
        })
    }

    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), AuthError> {
        self.call(
            "ConfirmSignUp",
            json!({
                "ClientId": self.client_id,
                "Username": email,
                "ConfirmationCode": code,
            }),
        )
        .await?;
        Ok(())
    }

    async fn resend_code(&self, email: &str) -> Result<(), AuthError> {
        self.call(
            "ResendConfirmationCode",
            json!({ "ClientId": self.client_id, "Username": email }),
        )
        .await?;
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let response = self
            .call(
                "InitiateAuth",
                json!({
                    "AuthFlow": "USER_PASSWORD_AUTH",
                    "ClientId": self.client_id,
                    "AuthParameters": { "USERNAME": email, "PASSWORD": password },
                }),
            )
            .await?;

        if let Some(challenge) = response.get("ChallengeName").and_then(Value::as_str) {
            return Err(AuthError::Provider(format!("Sign-in requires {}", challenge)));
        }

        let token = response
            .get("AuthenticationResult")
            .and_then(|result| result.get("AccessToken"))
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::Provider("Sign-in returned no access token".to_string()))?;

        self.storage.set_raw(ACCESS_TOKEN_KEY, token).await?;
        info!("Stored session for {}", email);

        Ok(Identity {
            username: email.to_string(),
            email: Some(email.to_string()),
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(token) = self.access_token().await else {
            return Ok(());
        };
        let result = self
            .call("GlobalSignOut", json!({ "AccessToken": token }))
            .await
            .map(|_| ());
        self.storage.remove(ACCESS_TOKEN_KEY).await?;
        result
    }

    async fn check_session(&self) -> SessionCheck {
        let Some(token) = self.access_token().await else {
            return SessionCheck::default();
        };

        match self.call("GetUser", json!({ "AccessToken": token })).await {
            Ok(user) => {
                let username = user
                    .get("Username")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let email = attribute(&user, "email").map(str::to_string);
                SessionCheck {
                    authenticated: true,
                    identity: Some(Identity { username, email }),
                }
            }
            Err(e) => {
                warn!("Stored session is no longer valid: {}", e);
                SessionCheck::default()
            }
        }
    }
}
