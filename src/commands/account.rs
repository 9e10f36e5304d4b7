use super::{App, CommandResult, describe_redirect, report_failure};
use crate::forms::{ConfirmForm, LoginForm, RegisterForm};

pub async fn register(app: &App, email: String, password: String, confirm_password: String) -> CommandResult {
    let form = RegisterForm {
        email,
        password,
        confirm_password,
    };
    match app.auth.register(&form).await {
        Ok(redirect) => println!("{}", describe_redirect(&redirect)),
        Err(failure) => report_failure(&failure),
    }
    Ok(())
}

pub async fn confirm(app: &App, email: String, code: String) -> CommandResult {
    let form = ConfirmForm { email, code };
    match app.auth.confirm(&form).await {
        Ok(redirect) => println!("{}", describe_redirect(&redirect)),
        Err(failure) => report_failure(&failure),
    }
    Ok(())
}

pub async fn resend_code(app: &App, email: &str) -> CommandResult {
    if email.trim().is_empty() {
        println!("email: Email is required");
        return Ok(());
    }
    match app.auth.resend_code(email).await {
        Ok(message) => println!("{}", message),
        Err(failure) => report_failure(&failure),
    }
    Ok(())
}

pub async fn login(app: &App, email: String, password: String) -> CommandResult {
    let form = LoginForm { email, password };
    match app.auth.login(&form).await {
        Ok(redirect) => println!("{}", describe_redirect(&redirect)),
        Err(failure) => report_failure(&failure),
    }
    Ok(())
}

pub async fn logout(app: &App) -> CommandResult {
    match app.auth.logout().await {
        Ok(()) => println!("Signed out."),
        // Local session is already cleared at this point
        Err(failure) => println!("Signed out locally ({})", failure),
    }
    Ok(())
}

pub async fn whoami(app: &App) -> CommandResult {
    let session = app.auth.verify_session().await;
    match (session.is_authenticated, session.email) {
        (true, Some(email)) => println!("Signed in as {}", email),
        (true, None) => println!("Signed in"),
        (false, _) => println!("Not signed in"),
    }
    Ok(())
}

pub async fn theme(app: &App, toggle: bool) -> CommandResult {
    let theme = if toggle {
        app.storage.toggle_theme().await?
    } else {
        app.storage.theme().await
    };
    println!("Theme: {}", theme.as_str());
    Ok(())
}
