mod account;
mod live;
mod poll;

use crate::api::HttpPollApi;
use crate::auth::{AuthBridge, AuthFailure, CognitoAuth, Redirect};
use crate::live::{LiveStatsStore, SubscriptionTransport};
use crate::storage::ClientStorage;
use clap::{Parser, Subcommand};
use log::info;
use std::sync::Arc;

pub type CommandResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Everything a command needs, built once in `main`.
pub struct App {
    pub storage: ClientStorage,
    pub api: Arc<HttpPollApi>,
    pub live_stats: LiveStatsStore,
    pub auth: AuthBridge<CognitoAuth>,
    pub transport: Arc<dyn SubscriptionTransport>,
}

#[derive(Parser, Debug)]
#[command(name = "poll-live", author, version)]
#[command(about = "Admin and live-results client for the polling backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Create an account and get a confirmation code by email
    Register {
        email: String,
        password: String,
        confirm_password: String,
    },
    /// Confirm an account with the emailed code
    Confirm { email: String, code: String },
    /// Send the confirmation code again
    ResendCode { email: String },
    Login { email: String, password: String },
    Logout,
    Whoami,
    /// Show the stored theme, or flip it
    Theme {
        #[arg(long)]
        toggle: bool,
    },
    /// Manage the active poll (sign-in required)
    #[command(subcommand)]
    Poll(PollCommand),
    /// Stream live results for the active poll (sign-in required)
    Live,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum PollCommand {
    Show,
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Repeat once per option
        #[arg(long = "option")]
        options: Vec<String>,
    },
    /// Unset fields keep their current values
    Edit {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Close,
    Delete {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

pub async fn handle_command(app: &App, command: Command) -> CommandResult {
    info!("Received command: {}", command_name(&command));

    match command {
        Command::Register {
            email,
            password,
            confirm_password,
        } => account::register(app, email, password, confirm_password).await?,
        Command::Confirm { email, code } => account::confirm(app, email, code).await?,
        Command::ResendCode { email } => account::resend_code(app, &email).await?,
        Command::Login { email, password } => account::login(app, email, password).await?,
        Command::Logout => account::logout(app).await?,
        Command::Whoami => account::whoami(app).await?,
        Command::Theme { toggle } => account::theme(app, toggle).await?,
        Command::Poll(poll_command) => {
            if require_session(app).await {
                poll::handle_poll_command(app, poll_command).await?;
            }
        }
        Command::Live => {
            if require_session(app).await {
                live::watch_active_poll(app).await?;
            }
        }
    }

    Ok(())
}

// Passwords stay out of the log
fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Register { .. } => "register",
        Command::Confirm { .. } => "confirm",
        Command::ResendCode { .. } => "resend-code",
        Command::Login { .. } => "login",
        Command::Logout => "logout",
        Command::Whoami => "whoami",
        Command::Theme { .. } => "theme",
        Command::Poll(_) => "poll",
        Command::Live => "live",
    }
}

// Protected commands re-check the provider before running
async fn require_session(app: &App) -> bool {
    let session = app.auth.verify_session().await;
    if !session.is_authenticated {
        println!("Please sign in first: poll-live login <email> <password>");
    }
    session.is_authenticated
}

pub(crate) fn describe_redirect(redirect: &Redirect) -> String {
    match redirect {
        Redirect::ConfirmSignUp { email } => {
            format!("Check your inbox, then run: poll-live confirm {} <code>", email)
        }
        Redirect::Login { email, message } => {
            format!("{}\nSign in with: poll-live login {} <password>", message, email)
        }
        Redirect::Dashboard => "Signed in. Try: poll-live poll show".to_string(),
    }
}

pub(crate) fn report_failure(failure: &AuthFailure) {
    match failure {
        AuthFailure::Invalid(errors) => {
            for error in errors.iter() {
                println!("{}: {}", error.field, error.message);
            }
        }
        other => println!("{}", other),
    }
    if let Some(redirect) = failure.redirect() {
        println!("{}", describe_redirect(&redirect));
    }
}
