use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(
    name = "loners",
    about = "Nearby events, event chat and unread badges for Loners",
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "LONERS_API_URL",
        value_name = "URL",
        help = "REST base URL, including the /api prefix"
    )]
    pub api_url: Option<String>,

    #[arg(
        long,
        global = true,
        env = "LONERS_SOCKET_URL",
        value_name = "URL",
        help = "Origin of the push (Socket.IO) server"
    )]
    pub socket_url: Option<String>,

    #[arg(
        long,
        global = true,
        env = "LONERS_DATA_DIR",
        value_name = "DIR",
        help = "Where session, config and logs live (default ~/.loners)"
    )]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in with email and password
    Login(LoginArgs),
    /// Create an account and sign in
    Signup(SignupArgs),
    /// Sign in with a Google identity credential
    Google {
        #[arg(value_name = "ID_TOKEN")]
        credential: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Confirm an email address with the token from the verification mail
    VerifyEmail { token: String },
    /// Send the verification mail again
    ResendVerification { email: String },
    /// Unread message counts per room
    Unread,
    /// Reset a room's unread count
    MarkRead { room: String },
    /// Rooms you can chat in
    Rooms,
    /// Show a room's history; with --follow, stream it and send stdin lines
    Chat(ChatArgs),
    /// Stay connected and print notifications as they arrive
    Watch,
    #[command(subcommand)]
    Events(EventsCommand),
    #[command(subcommand)]
    Locations(LocationsCommand),
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Cookie consent stored for this client
    #[command(subcommand)]
    Consent(ConsentCommand),
    /// Print shell completions
    Completions { shell: Shell },
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,
    #[arg(
        long,
        env = "LONERS_PASSWORD",
        hide_env_values = true,
        help = "Prompted for when omitted"
    )]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct SignupArgs {
    #[arg(long)]
    pub username: String,
    #[arg(long)]
    pub email: String,
    #[arg(
        long,
        env = "LONERS_PASSWORD",
        hide_env_values = true,
        help = "Prompted for when omitted"
    )]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    pub room: String,
    #[arg(long, short)]
    pub follow: bool,
}

/// Events near you, yours, and single events
#[derive(Subcommand, Debug)]
pub enum EventsCommand {
    /// Events around a point
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    /// Events you created or joined
    Mine,
    Show { id: String },
    Join { id: String },
    Create(EventFormArgs),
    Update {
        id: String,
        #[command(flatten)]
        form: EventFormArgs,
    },
}

#[derive(Args, Debug)]
pub struct EventFormArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long = "type", value_name = "TYPE")]
    pub kind: String,
    #[arg(long, value_name = "ISO_DATE")]
    pub date: String,
    #[arg(long, value_name = "LOCATION_ID")]
    pub location: Option<String>,
}

/// Venues
#[derive(Subcommand, Debug)]
pub enum LocationsCommand {
    Search { query: String },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
}

/// Public profiles and your own
#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// A user's profile; yours when no id is given
    Show { user_id: Option<String> },
    Update {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConsentCommand {
    Accept,
    Reject,
    Status,
}
