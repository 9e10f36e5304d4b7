use super::{App, CommandResult};
use crate::api::PollApi;
use crate::live::{LinkStatus, LiveDisplay, LiveView, SnapshotSource, TotalVotesObserver};
use log::{error, info};
use std::sync::Arc;

/// Streams live results for the active poll until Ctrl-C or the feed drops.
pub async fn watch_active_poll(app: &App) -> CommandResult {
    let poll = match app.api.active_poll().await {
        Ok(Some(poll)) => poll,
        Ok(None) => {
            println!("No active poll found");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to fetch poll: {}", e);
            println!("Error: {}", e);
            return Ok(());
        }
    };

    let observer: TotalVotesObserver = Arc::new(|total: u64| info!("Participants now {}", total));
    let view = LiveView::mount(
        poll,
        app.live_stats.clone(),
        Arc::clone(&app.transport),
        Some(observer),
    );
    let mut updates = view.watch_updates();
    let mut status = view.watch_status();

    info!("Watching poll {}", view.poll().id);
    println!("Watching \"{}\" (Poll ID: {})", view.poll().title, view.poll().id);
    println!("Status: {}", view.status());
    println!("{}", render(&view.display()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, leaving live view");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", render(&view.display()));
                println!("Participants: {}", view.participants());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                println!("Status: {}", current);
                if current == LinkStatus::Disconnected {
                    break;
                }
            }
        }
    }

    view.unmount().await;
    Ok(())
}

pub(crate) fn render(display: &LiveDisplay) -> String {
    let source = match display.source {
        SnapshotSource::Live => "live",
        SnapshotSource::Cached => "cached",
        SnapshotSource::Poll => "last fetch",
    };
    let mut lines = vec![format!(
        "{} ({} votes, {})",
        display.title, display.total_votes, source
    )];
    if display.standings.is_empty() {
        lines.push("  No votes yet".to_string());
    }
    for (label, votes) in display.standings.iter() {
        lines.push(format!("  {}: {}", label, votes));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Standings;

    #[test]
    fn renders_standings_in_feed_order() {
        let display = LiveDisplay {
            title: "Lunch".to_string(),
            total_votes: 10,
            standings: [("Pizza", 6), ("Salad", 4)].into_iter().collect(),
            source: SnapshotSource::Live,
        };
        assert_eq!(render(&display), "Lunch (10 votes, live)\n  Pizza: 6\n  Salad: 4");
    }

    #[test]
    fn empty_standings_say_so() {
        let display = LiveDisplay {
            title: "Lunch".to_string(),
            total_votes: 0,
            standings: Standings::new(),
            source: SnapshotSource::Poll,
        };
        assert_eq!(render(&display), "Lunch (0 votes, last fetch)\n  No votes yet");
    }
}
