// Time-remaining formatting for credential expiry
use chrono::{DateTime, Utc};

pub fn format_time_remaining_at(expires_at: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    if *expires_at <= now {
        return "EXPIRED".to_string();
    }

    let duration = (*expires_at - now).num_seconds();
    let hours = duration / 3600;
    let minutes = (duration % 3600) / 60;
    let seconds = duration % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
