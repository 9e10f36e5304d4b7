use super::{App, CommandResult, PollCommand};
use crate::api::PollApi;
use crate::dashboard::Dashboard;
use crate::forms::{EditPollForm, FieldErrors, PollForm};
use crate::models::Poll;
use std::sync::Arc;

pub async fn handle_poll_command(app: &App, command: PollCommand) -> CommandResult {
    let mut dashboard = Dashboard::new(Arc::clone(&app.api), app.live_stats.clone());
    dashboard.refresh().await;

    match command {
        PollCommand::Show => {}
        PollCommand::Create {
            title,
            description,
            options,
        } => {
            let form = PollForm {
                title,
                description,
                options,
            };
            if let Err(errors) = dashboard.create(&form).await {
                print_field_errors(&errors);
                return Ok(());
            }
        }
        PollCommand::Edit { title, description } => {
            let Some(poll) = dashboard.poll() else {
                println!("No active poll found");
                return Ok(());
            };
            // Unset fields keep their current values
            let form = EditPollForm {
                title: title.unwrap_or_else(|| poll.title.clone()),
                description: description.unwrap_or_else(|| poll.description.clone().unwrap_or_default()),
            };
            if let Err(errors) = dashboard.save_edit(&form).await {
                print_field_errors(&errors);
                return Ok(());
            }
        }
        PollCommand::Close => {
            if dashboard.poll().is_some() && !dashboard.can_close() {
                println!("Only active polls can be closed");
                return Ok(());
            }
            dashboard.close().await;
        }
        PollCommand::Delete { yes } => {
            if let Some(poll) = dashboard.poll() {
                if !yes {
                    println!(
                        "Are you sure you want to delete \"{}\"? This action cannot be undone. Re-run with --yes.",
                        poll.title
                    );
                    return Ok(());
                }
            }
            dashboard.delete().await;
        }
    }

    print_dashboard(&dashboard);
    Ok(())
}

fn print_field_errors(errors: &FieldErrors) {
    for error in errors.iter() {
        println!("{}: {}", error.field, error.message);
    }
}

fn print_dashboard<A: PollApi>(dashboard: &Dashboard<A>) {
    if let Some(notice) = dashboard.notice() {
        println!("{}", notice);
    }
    if let Some(error) = dashboard.error() {
        println!("Error: {}", error);
    }
    println!(
        "Active polls: {}  Participants: {}",
        dashboard.active_polls(),
        dashboard.participants()
    );
    match dashboard.poll() {
        Some(poll) => println!("{}", describe_poll(poll)),
        None => println!("No active poll found"),
    }
}

pub(crate) fn describe_poll(poll: &Poll) -> String {
    let mut lines = vec![format!("{} [{}]", poll.title, poll.status.as_str().to_uppercase())];
    if let Some(description) = poll.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(description.to_string());
    }
    for option in &poll.options {
        lines.push(format!("  {} ({} votes)", option.text, option.votes));
    }
    lines.push(format!("Poll ID: {}", poll.id));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PollOption, PollStatus};

    #[test]
    fn describes_poll_with_upper_case_status() {
        let poll = Poll {
            id: "p1".to_string(),
            title: "Lunch".to_string(),
            description: Some("Friday".to_string()),
            options: vec![PollOption {
                id: "o1".to_string(),
                text: "Pizza".to_string(),
                votes: 2,
            }],
            status: PollStatus::Active,
            created_at: None,
            closed_at: None,
            total_votes: 2,
        };
        assert_eq!(
            describe_poll(&poll),
            "Lunch [ACTIVE]\nFriday\n  Pizza (2 votes)\nPoll ID: p1"
        );
    }
}
