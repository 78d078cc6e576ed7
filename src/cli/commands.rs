use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "relaybot")]
#[command(
    author,
    version,
    about = "Chat relay bot with per-user LLM conversation context",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Relay console input to the completion API until EOF
    Run {
        /// User id for lines without an `@user` prefix
        #[arg(short, long, default_value = "console")]
        user: String,
    },

    /// Process a single message and print the reply
    Chat { user: String, text: String },

    /// Print the stored history of a user
    History { user: String },

    /// List users with stored history
    Users,
}
