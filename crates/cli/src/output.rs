//! Terminal rendering helpers

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use console::style;
use loners_client::notifications::UnreadCounts;
use loners_protocol::{ChatMessage, Event, Location, User};

pub fn table<const N: usize>(header: [&str; N]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn events_table(events: &[Event], me: Option<&str>) -> Table {
    let mut table = table(["ID", "Name", "Type", "Date", "Where", "Going"]);
    for event in events {
        let going = match me {
            Some(me) if event.has_attendee(me) => format!("{} (you)", event.attendees.len()),
            _ => event.attendees.len().to_string(),
        };
        table.add_row([
            event.id.clone(),
            event.name.clone(),
            event.kind.clone().unwrap_or_default(),
            event.date.clone().unwrap_or_default(),
            event.location_name().unwrap_or("-").to_string(),
            going,
        ]);
    }
    table
}

pub fn locations_table(locations: &[Location]) -> Table {
    let mut table = table(["ID", "Name", "Address", "Lat", "Lng"]);
    for location in locations {
        let point = location.coordinates.as_ref();
        table.add_row([
            location.id.clone(),
            location.name.clone(),
            location.address.clone().unwrap_or_default(),
            coordinate(point.and_then(|p| p.lat())),
            coordinate(point.and_then(|p| p.lng())),
        ]);
    }
    table
}

pub fn unread_table(counts: &UnreadCounts) -> Table {
    let mut table = table(["Room", "Unread"]);
    for (room, count) in counts.iter().filter(|(_, count)| *count > 0) {
        table.add_row([room.to_string(), count.to_string()]);
    }
    table
}

pub fn user_summary(user: &User) -> String {
    let mut line = format!("{} ({})", style(&user.username).bold(), user.id);
    if let Some(email) = &user.email {
        line.push_str(&format!(" <{email}>"));
    }
    if user.is_verified == Some(false) {
        line.push_str(&format!(" {}", style("unverified").yellow()));
    }
    line
}

/// One chat line: `[time] name: text`
pub fn chat_line(message: &ChatMessage) -> String {
    let time = message
        .created_at
        .as_deref()
        .map(short_time)
        .unwrap_or_default();
    format!(
        "{}{}: {}",
        if time.is_empty() {
            String::new()
        } else {
            format!("{} ", style(format!("[{time}]")).dim())
        },
        style(message.sender_name()).cyan().bold(),
        message.text
    )
}

fn coordinate(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.5}")).unwrap_or_default()
}

/// `2024-05-01T18:30:00.000Z` becomes `05-01 18:30`
fn short_time(timestamp: &str) -> String {
    match (timestamp.get(5..10), timestamp.get(11..16)) {
        (Some(day), Some(time)) => format!("{day} {time}"),
        _ => timestamp.to_string(),
    }
}
