mod admin;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bazaar-cli")]
#[command(about = "Bazaar storefront administration")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Staff account management
    Staff {
        #[command(subcommand)]
        command: StaffCommands,
    },
    /// One-time password helpers
    Otp {
        #[command(subcommand)]
        command: OtpCommands,
    },
    /// Access-token revocation
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[derive(Debug, Subcommand)]
enum StaffCommands {
    /// Create a staff account, or promote an existing user
    Create {
        /// Phone number, e.g. 09121234567
        #[arg(long)]
        phone: String,
    },
}

#[derive(Debug, Subcommand)]
enum OtpCommands {
    /// Issue a code for a phone number and print it
    Issue {
        #[arg(long)]
        phone: String,
    },
}

#[derive(Debug, Subcommand)]
enum TokenCommands {
    /// Blacklist an access token by its jti claim
    Revoke {
        #[arg(long)]
        jti: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("bazaar-cli: run with --help to list commands");
        return Ok(());
    };

    tracing::debug!(?command, "running command");
    let config = bazaar_core::load_app_config()?;
    let pool = bazaar_db::connect_pool_from_config(&config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            bazaar_db::health_check(&pool).await?;
            println!("database ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = bazaar_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Staff {
            command: StaffCommands::Create { phone },
        } => {
            let user = admin::create_staff(&admin::services(pool, &config), &phone).await?;
            println!("staff user {} ({})", user.id, user.phone_number);
        }
        Commands::Otp {
            command: OtpCommands::Issue { phone },
        } => {
            let otp = admin::issue_otp(&admin::services(pool, &config), &phone).await?;
            println!("{} expires {}", otp.code, otp.expires_at.to_rfc3339());
        }
        Commands::Token {
            command: TokenCommands::Revoke { jti },
        } => {
            admin::revoke(&admin::services(pool, &config), &jti).await?;
            println!("revoked {jti}");
        }
    }

    Ok(())
}
