pub mod cognito;

use crate::forms::{self, ConfirmForm, FieldErrors, LoginForm, RegisterForm};
use crate::live::LiveStatsStore;
use crate::models::SessionState;
use crate::storage::{ClientStorage, StorageError};
use async_trait::async_trait;
use log::{error, info, warn};
use thiserror::Error;

pub use cognito::CognitoAuth;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User is not confirmed.")]
    NotConfirmed,
    #[error("Incorrect username or password.")]
    NotAuthorized,
    #[error("{0}")]
    Provider(String),
    #[error("auth request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    pub username: String,
    pub confirmation_required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub username: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionCheck {
    pub authenticated: bool,
    pub identity: Option<Identity>,
}

/// Hosted identity provider. Emails passed in are already normalized.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError>;
    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), AuthError>;
    async fn resend_code(&self, email: &str) -> Result<(), AuthError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    /// Never fails: any problem reads as "not authenticated".
    async fn check_session(&self) -> SessionCheck;
}

/// Where the user should go next.
#[derive(Debug, Clone, PartialEq)]
pub enum Redirect {
    ConfirmSignUp { email: String },
    Login { email: String, message: String },
    Dashboard,
}

/// User-facing auth failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthFailure {
    #[error("Please verify your email first. Check your inbox for the verification code.")]
    Unconfirmed { email: String },
    #[error("Incorrect email or password")]
    WrongCredentials,
    #[error("{0}")]
    Invalid(FieldErrors),
    #[error("{0}")]
    Failed(String),
}

impl AuthFailure {
    /// Unconfirmed accounts are sent to the confirmation flow.
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            AuthFailure::Unconfirmed { email } => Some(Redirect::ConfirmSignUp {
                email: email.clone(),
            }),
            _ => None,
        }
    }

    fn from_sign_in(err: AuthError, email: &str) -> Self {
        match err {
            AuthError::NotConfirmed => AuthFailure::Unconfirmed {
                email: email.to_string(),
            },
            AuthError::NotAuthorized => AuthFailure::WrongCredentials,
            AuthError::Provider(message) if message.contains("not confirmed") => {
                AuthFailure::Unconfirmed {
                    email: email.to_string(),
                }
            }
            AuthError::Provider(message) if message.contains("Incorrect") => {
                AuthFailure::WrongCredentials
            }
            other => AuthFailure::failed(other, "Failed to sign in. Please try again."),
        }
    }

    fn failed(err: AuthError, fallback: &str) -> Self {
        let message = err.to_string();
        if message.is_empty() {
            AuthFailure::Failed(fallback.to_string())
        } else {
            AuthFailure::Failed(message)
        }
    }
}

impl From<StorageError> for AuthFailure {
    fn from(err: StorageError) -> Self {
        AuthFailure::Failed(err.to_string())
    }
}

pub const ACCOUNT_CONFIRMED_MESSAGE: &str = "Account confirmed! Please sign in.";
pub const CODE_SENT_MESSAGE: &str = "Code sent! Check your email.";

/// Sole writer of the persisted session flags.
pub struct AuthBridge<P: AuthProvider> {
    provider: P,
    storage: ClientStorage,
    live_stats: LiveStatsStore,
}

impl<P: AuthProvider> AuthBridge<P> {
    pub fn new(provider: P, storage: ClientStorage, live_stats: LiveStatsStore) -> Self {
        Self {
            provider,
            storage,
            live_stats,
        }
    }

    pub async fn session(&self) -> SessionState {
        self.storage.load_session().await
    }

    pub async fn register(&self, form: &RegisterForm) -> Result<Redirect, AuthFailure> {
        form.validate().map_err(AuthFailure::Invalid)?;
        let email = forms::normalize_email(&form.email);

        let outcome = self
            .provider
            .sign_up(&email, &form.password)
            .await
            .map_err(|e| {
                error!("Error signing up: {}", e);
                AuthFailure::failed(e, "Failed to sign up")
            })?;

        info!("Signed up {} (confirmation required: {})", outcome.username, outcome.confirmation_required);
        Ok(Redirect::ConfirmSignUp { email })
    }

    pub async fn confirm(&self, form: &ConfirmForm) -> Result<Redirect, AuthFailure> {
        form.validate().map_err(AuthFailure::Invalid)?;
        let email = forms::normalize_email(&form.email);

        self.provider
            .confirm_sign_up(&email, form.code.trim())
            .await
            .map_err(|e| {
                error!("Error confirming sign up: {}", e);
                AuthFailure::failed(e, "Invalid confirmation code. Please try again.")
            })?;

        Ok(Redirect::Login {
            email,
            message: ACCOUNT_CONFIRMED_MESSAGE.to_string(),
        })
    }

    pub async fn resend_code(&self, email: &str) -> Result<&'static str, AuthFailure> {
        let email = forms::normalize_email(email);
        self.provider.resend_code(&email).await.map_err(|e| {
            error!("Resend code error: {}", e);
            AuthFailure::failed(e, "Failed to resend code. Please try again.")
        })?;
        Ok(CODE_SENT_MESSAGE)
    }

    pub async fn login(&self, form: &LoginForm) -> Result<Redirect, AuthFailure> {
        form.validate().map_err(AuthFailure::Invalid)?;
        let email = forms::normalize_email(&form.email);

        match self.provider.sign_in(&email, &form.password).await {
            Ok(identity) => {
                info!("Signed in as {}", identity.username);
                self.storage.set_authenticated(true).await?;
                self.storage.set_email(Some(&email)).await?;
                Ok(Redirect::Dashboard)
            }
            Err(e) => {
                error!("Login error: {}", e);
                Err(AuthFailure::from_sign_in(e, &email))
            }
        }
    }

    /// Local state is reset even when the provider call fails.
    pub async fn logout(&self) -> Result<(), AuthFailure> {
        let provider_result = self.provider.sign_out().await;

        self.live_stats.clear();
        self.storage.reset_session().await?;

        provider_result.map_err(|e| {
            warn!("Error signing out: {}", e);
            AuthFailure::failed(e, "Failed to sign out")
        })
    }

    /// Re-checks the provider and brings the stored flags in line with it.
    pub async fn verify_session(&self) -> SessionState {
        let check = self.provider.check_session().await;

        let synced = match check.identity {
            Some(identity) if check.authenticated => {
                let email = identity.email.unwrap_or(identity.username);
                match self.storage.set_authenticated(true).await {
                    Ok(()) => self.storage.set_email(Some(&email)).await,
                    Err(e) => Err(e),
                }
            }
            _ => match self.storage.set_authenticated(false).await {
                Ok(()) => self.storage.set_email(None).await,
                Err(e) => Err(e),
            },
        };

        if let Err(e) = synced {
            error!("Auth check error: {}", e);
        }
        self.storage.load_session().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Provider with scripted answers.
    #[derive(Default)]
    pub struct FakeProvider {
        pub sign_in_error: Mutex<Option<AuthError>>,
        pub sign_out_error: Mutex<Option<AuthError>>,
        pub signed_in: Mutex<Option<Identity>>,
        pub calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AuthProvider for FakeProvider {
        async fn sign_up(&self, email: &str, _password: &str) -> Result<SignUpOutcome, AuthError> {
            self.calls.lock().unwrap().push(format!("sign_up {}", email));
            Ok(SignUpOutcome {
                username: email.to_string(),
                confirmation_required: true,
            })
        }

        async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), AuthError> {
            self.calls.lock().unwrap().push(format!("confirm {} {}", email, code));
            if code == "000000" {
                return Err(AuthError::Provider("Invalid verification code provided".to_string()));
            }
            Ok(())
        }

        async fn resend_code(&self, email: &str) -> Result<(), AuthError> {
            self.calls.lock().unwrap().push(format!("resend {}", email));
            Ok(())
        }

        async fn sign_in(&self, email: &str, _password: &str) -> Result<Identity, AuthError> {
            self.calls.lock().unwrap().push(format!("sign_in {}", email));
            if let Some(err) = self.sign_in_error.lock().unwrap().take() {
                return Err(err);
            }
            let identity = Identity {
                username: email.to_string(),
                email: Some(email.to_string()),
            };
            *self.signed_in.lock().unwrap() = Some(identity.clone());
            Ok(identity)
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            self.calls.lock().unwrap().push("sign_out".to_string());
            *self.signed_in.lock().unwrap() = None;
            match self.sign_out_error.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn check_session(&self) -> SessionCheck {
            let identity = self.signed_in.lock().unwrap().clone();
            SessionCheck {
                authenticated: identity.is_some(),
                identity,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeProvider;
    use super::*;
    use crate::live::LiveView;
    use crate::live::transport::testing::ChannelTransport;
    use crate::models::{LiveStats, Poll, PollStatus};
    use std::sync::Arc;

    async fn bridge() -> (AuthBridge<FakeProvider>, ClientStorage, LiveStatsStore) {
        let storage = ClientStorage::in_memory().await.unwrap();
        let live_stats = LiveStatsStore::new();
        let bridge = AuthBridge::new(FakeProvider::default(), storage.clone(), live_stats.clone());
        (bridge, storage, live_stats)
    }

    fn login_form(email: &str) -> LoginForm {
        LoginForm {
            email: email.to_string(),
            password: "secret1".to_string(),
        }
    }

    #[tokio::test]
    async fn login_persists_session_with_normalized_email() {
        let (bridge, storage, _) = bridge().await;
        let redirect = bridge.login(&login_form("  Ada@Example.COM ")).await.unwrap();
        assert_eq!(redirect, Redirect::Dashboard);

        let session = storage.load_session().await;
        assert!(session.is_authenticated);
        assert_eq!(session.email.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn unconfirmed_login_redirects_to_confirmation() {
        let (bridge, storage, _) = bridge().await;
        *bridge.provider.sign_in_error.lock().unwrap() = Some(AuthError::NotConfirmed);

        let failure = bridge.login(&login_form("ada@example.com")).await.unwrap_err();
        assert_eq!(
            failure.redirect(),
            Some(Redirect::ConfirmSignUp {
                email: "ada@example.com".to_string()
            })
        );
        assert!(!storage.load_session().await.is_authenticated);
    }

    #[tokio::test]
    async fn login_failures_are_categorised() {
        let (bridge, _, _) = bridge().await;

        *bridge.provider.sign_in_error.lock().unwrap() = Some(AuthError::NotAuthorized);
        let failure = bridge.login(&login_form("a@b.co")).await.unwrap_err();
        assert_eq!(failure, AuthFailure::WrongCredentials);
        assert_eq!(failure.redirect(), None);

        *bridge.provider.sign_in_error.lock().unwrap() =
            Some(AuthError::Provider("Password attempts exceeded".to_string()));
        let failure = bridge.login(&login_form("a@b.co")).await.unwrap_err();
        assert_eq!(failure, AuthFailure::Failed("Password attempts exceeded".to_string()));
    }

    #[tokio::test]
    async fn invalid_forms_never_reach_the_provider() {
        let (bridge, _, _) = bridge().await;
        let failure = bridge.login(&LoginForm::default()).await.unwrap_err();
        assert!(matches!(failure, AuthFailure::Invalid(_)));

        let failure = bridge.register(&RegisterForm::default()).await.unwrap_err();
        assert!(matches!(failure, AuthFailure::Invalid(_)));
        assert!(bridge.provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_then_confirm_leads_to_login() {
        let (bridge, _, _) = bridge().await;
        let form = RegisterForm {
            email: "Ada@Example.com".to_string(),
            password: "secret1".to_string(),
            confirm_password: "secret1".to_string(),
        };
        let redirect = bridge.register(&form).await.unwrap();
        assert_eq!(
            redirect,
            Redirect::ConfirmSignUp {
                email: "ada@example.com".to_string()
            }
        );

        let confirm = ConfirmForm {
            email: "ada@example.com".to_string(),
            code: " 123456 ".to_string(),
        };
        let redirect = bridge.confirm(&confirm).await.unwrap();
        assert_eq!(
            redirect,
            Redirect::Login {
                email: "ada@example.com".to_string(),
                message: ACCOUNT_CONFIRMED_MESSAGE.to_string(),
            }
        );
        assert!(
            bridge
                .provider
                .calls
                .lock()
                .unwrap()
                .contains(&"confirm ada@example.com 123456".to_string())
        );

        let bad = ConfirmForm {
            email: "ada@example.com".to_string(),
            code: "000000".to_string(),
        };
        assert!(matches!(bridge.confirm(&bad).await, Err(AuthFailure::Failed(_))));
    }

    #[tokio::test]
    async fn logout_clears_session_and_live_stats() {
        let (bridge, storage, live_stats) = bridge().await;
        bridge.login(&login_form("ada@example.com")).await.unwrap();
        live_stats.replace(LiveStats {
            total_votes: 12,
            standings: vec![("Yes", 12)].into_iter().collect(),
        });

        bridge.logout().await.unwrap();

        assert_eq!(storage.load_session().await, SessionState::default());
        assert_eq!(live_stats.read(), None);

        // A live view mounted afterwards starts from nothing
        let poll = Poll {
            id: "p1".to_string(),
            title: "Yes or no".to_string(),
            description: None,
            options: Vec::new(),
            status: PollStatus::Active,
            created_at: None,
            closed_at: None,
            total_votes: 0,
        };
        let (transport, _tx) = ChannelTransport::new();
        let view = LiveView::mount(poll, live_stats, Arc::new(transport), None);
        assert_eq!(view.participants(), 0);
        assert!(view.display().standings.is_empty());
        view.unmount().await;
    }

    #[tokio::test]
    async fn logout_resets_locally_even_if_provider_fails() {
        let (bridge, storage, _) = bridge().await;
        bridge.login(&login_form("ada@example.com")).await.unwrap();
        *bridge.provider.sign_out_error.lock().unwrap() =
            Some(AuthError::Provider("network down".to_string()));

        assert!(bridge.logout().await.is_err());
        assert!(!storage.load_session().await.is_authenticated);
    }

    #[tokio::test]
    async fn verify_session_syncs_stored_flags() {
        let (bridge, storage, _) = bridge().await;
        storage.set_authenticated(true).await.unwrap();
        storage.set_email(Some("stale@example.com")).await.unwrap();

        // Provider says nobody is signed in
        let session = bridge.verify_session().await;
        assert!(!session.is_authenticated);
        assert_eq!(session.email, None);

        bridge.login(&login_form("ada@example.com")).await.unwrap();
        let session = bridge.verify_session().await;
        assert!(session.is_authenticated);
        assert_eq!(session.email.as_deref(), Some("ada@example.com"));
    }
}
