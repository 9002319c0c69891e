//! Mercato CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! mercato-cli migrate
//!
//! # Create a shopper account
//! mercato-cli user create -e shopper@example.com -p 'correct horse battery'
//!
//! # Print a user's cart document
//! mercato-cli cart show -u 42
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user create` - Create shopper accounts
//! - `cart show` - Inspect stored carts

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mercato-cli")]
#[command(author, version, about = "Mercato CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage shopper accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Inspect carts
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password (at least 8 characters)
        #[arg(short, long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Print a user's cart as JSON
    Show {
        /// User id
        #[arg(short, long)]
        user: i32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::User { action } => match action {
            UserAction::Create { email, password } => {
                commands::user::create(&email, &password).await?;
            }
        },
        Commands::Cart { action } => match action {
            CartAction::Show { user } => commands::cart::show(user).await?,
        },
    }
    Ok(())
}
