//! `loners events ...` and `loners locations ...`

use console::style;
use loners_protocol::{CreateLocationRequest, Event, EventForm, Ref, User};

use crate::cli::{EventFormArgs, EventsCommand, LocationsCommand};
use crate::output;
use crate::App;

pub async fn events(app: &App, command: EventsCommand) -> anyhow::Result<()> {
    let session = app.session.current();
    let me = session.user_id();
    match command {
        EventsCommand::Nearby { lat, lng } => {
            let events = app.api.nearby_events(lat, lng).await?;
            if events.is_empty() {
                println!("Nothing nearby. Create one with `loners events create`.");
            } else {
                println!("{}", output::events_table(&events, me));
            }
        }
        EventsCommand::Mine => {
            app.require_login()?;
            let events = app.api.my_events().await?;
            if events.is_empty() {
                println!("You have not created or joined any event.");
            } else {
                println!("{}", output::events_table(&events, me));
            }
        }
        EventsCommand::Show { id } => {
            let event = app.api.event(&id).await?;
            print_event(&event, me);
        }
        EventsCommand::Join { id } => {
            app.require_login()?;
            app.api.join_event(&id).await?;
            println!("Joined. Chat with `loners chat {id} --follow`.");
        }
        EventsCommand::Create(args) => {
            app.require_login()?;
            app.api.create_event(&form(args)).await?;
            println!("Event created.");
        }
        EventsCommand::Update { id, form: args } => {
            app.require_login()?;
            app.api.update_event(&id, &form(args)).await?;
            println!("Event {id} updated.");
        }
    }
    Ok(())
}

pub async fn locations(app: &App, command: LocationsCommand) -> anyhow::Result<()> {
    match command {
        LocationsCommand::Search { query } => {
            let locations = app.api.search_locations(&query).await?;
            if locations.is_empty() {
                println!("No location matches \"{query}\".");
            } else {
                println!("{}", output::locations_table(&locations));
            }
        }
        LocationsCommand::Create {
            name,
            address,
            lat,
            lng,
        } => {
            app.require_login()?;
            let location = app
                .api
                .create_location(&CreateLocationRequest {
                    name,
                    address,
                    lat,
                    lng,
                })
                .await?;
            println!("Location created: {} ({})", location.name, location.id);
        }
    }
    Ok(())
}

fn form(args: EventFormArgs) -> EventForm {
    EventForm {
        name: args.name,
        description: args.description,
        kind: args.kind,
        date: args.date,
        location_id: args.location,
    }
}

fn print_event(event: &Event, me: Option<&str>) {
    println!("{}  {}", style(&event.name).bold(), style(&event.id).dim());
    if let Some(kind) = &event.kind {
        println!("Type:  {kind}");
    }
    if let Some(date) = &event.date {
        println!("Date:  {date}");
    }
    if let Some(place) = event.location_name() {
        println!("Where: {place}");
    }
    if let Some(creator) = &event.creator {
        println!("By:    {}", display_name(creator));
    }
    if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
        println!();
        println!("{description}");
    }
    println!();
    let names: Vec<String> = event.attendees.iter().map(display_name).collect();
    println!("Going ({}): {}", names.len(), names.join(", "));
    if me.is_some_and(|me| event.has_attendee(me)) {
        println!("{}", style("You are going.").green());
    }
}

fn display_name(user: &Ref<User>) -> String {
    user.doc()
        .map(|u| u.username.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| user.id().to_string())
}
