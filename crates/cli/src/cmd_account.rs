//! `loners login|signup|google|logout|whoami|profile|consent` and the
//! email verification commands.

use anyhow::Context;
use console::{style, Term};
use loners_protocol::UpdateProfileRequest;

use crate::cli::{ConsentCommand, LoginArgs, ProfileCommand, SignupArgs};
use crate::output;
use crate::App;

pub async fn login(app: &App, args: LoginArgs) -> anyhow::Result<()> {
    let password = password_or_prompt(args.password)?;
    let user = app.api.login(&args.email, &password).await?;
    println!("Logged in as {}", output::user_summary(&user));
    Ok(())
}

pub async fn signup(app: &App, args: SignupArgs) -> anyhow::Result<()> {
    let password = password_or_prompt(args.password)?;
    let user = app
        .api
        .signup(&args.username, &args.email, &password)
        .await?;
    println!("Welcome, {}", output::user_summary(&user));
    if user.is_verified != Some(true) {
        println!("Check {} for a verification link.", args.email);
    }
    Ok(())
}

pub async fn google(app: &App, credential: &str) -> anyhow::Result<()> {
    let user = app.api.google_login(credential).await?;
    println!("Logged in as {}", output::user_summary(&user));
    Ok(())
}

pub fn logout(app: &App) -> anyhow::Result<()> {
    let was_signed_in = app.session.current().is_authenticated();
    app.api.logout()?;
    if was_signed_in {
        println!("Logged out.");
    } else {
        println!("No session to end.");
    }
    Ok(())
}

pub fn whoami(app: &App) -> anyhow::Result<()> {
    let session = app.session.current();
    match (&session.user, session.is_authenticated()) {
        (Some(user), true) => println!("{}", output::user_summary(user)),
        (None, true) => println!("Signed in (user details not stored)"),
        _ => println!("Not logged in"),
    }
    Ok(())
}

pub async fn verify_email(app: &App, token: &str) -> anyhow::Result<()> {
    app.api.verify_email(token).await?;
    println!("Email verified.");
    Ok(())
}

pub async fn resend_verification(app: &App, email: &str) -> anyhow::Result<()> {
    app.api.resend_verification(email).await?;
    println!("Verification mail sent to {email}.");
    Ok(())
}

pub async fn profile(app: &App, command: ProfileCommand) -> anyhow::Result<()> {
    match command {
        ProfileCommand::Show { user_id } => {
            let session = app.session.current();
            let user_id = match user_id.as_deref().or(session.user_id()) {
                Some(id) => id.to_string(),
                None => anyhow::bail!("no user id given and not logged in"),
            };
            let profile = app.api.user_profile(&user_id).await?;
            println!("{}", output::user_summary(&profile.user));
            if let Some(avatar) = &profile.user.avatar_url {
                println!("Avatar: {avatar}");
            }
            if profile.events.is_empty() {
                println!("No events yet.");
            } else {
                println!("{}", output::events_table(&profile.events, session.user_id()));
            }
        }
        ProfileCommand::Update {
            username,
            avatar_url,
        } => {
            app.require_login()?;
            if username.is_none() && avatar_url.is_none() {
                anyhow::bail!("nothing to update; pass --username and/or --avatar-url");
            }
            let user = app
                .api
                .update_profile(&UpdateProfileRequest {
                    username,
                    avatar_url,
                })
                .await?;
            println!("Profile updated: {}", output::user_summary(&user));
        }
    }
    Ok(())
}

pub fn consent(app: &App, command: ConsentCommand) -> anyhow::Result<()> {
    let storage = app.session.storage();
    match command {
        ConsentCommand::Accept => {
            storage.set_cookie_consent(true)?;
            println!("Cookie consent recorded: accepted");
        }
        ConsentCommand::Reject => {
            storage.set_cookie_consent(false)?;
            println!("Cookie consent recorded: rejected");
        }
        ConsentCommand::Status => match storage.cookie_consent() {
            Some(true) => println!("accepted"),
            Some(false) => println!("rejected"),
            None => println!("{}", style("not set").yellow()),
        },
    }
    Ok(())
}

fn password_or_prompt(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    let term = Term::stderr();
    term.write_str("Password: ")?;
    let password = term.read_secure_line().context("reading password")?;
    if password.is_empty() {
        anyhow::bail!("empty password");
    }
    Ok(password)
}
