use clap::{Parser, Subcommand};
use prospector::config::Config;
use prospector::domain::ResolutionRequest;
use prospector::logging::init_logging;
use prospector::orchestrator::Resolver;
use std::sync::Arc;
use tracing::error;

#[derive(Parser)]
#[command(name = "prospector")]
#[command(about = "OSINT identity enrichment resolver")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enrichment HTTP API
    Serve {
        /// Bind address, overriding the configured one (e.g. 127.0.0.1:8080)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Resolve one person and print the profile as JSON
    Person {
        #[arg(long)]
        email: String,
        /// Full name of the person
        #[arg(long)]
        name: String,
    },
    /// Resolve one company and print the profile as JSON
    Company {
        #[arg(long)]
        domain: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;
    let resolver = Arc::new(Resolver::new(&config));

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            prospector::server::serve(resolver, &bind).await?;
        }
        Commands::Person { email, name } => {
            let request = ResolutionRequest::for_person(&email, &name);
            print_outcome(resolver.resolve(request).await)?;
        }
        Commands::Company { domain } => {
            let request = ResolutionRequest::for_company(&domain);
            print_outcome(resolver.resolve(request).await)?;
        }
    }

    Ok(())
}

/// Exit codes mirror the HTTP statuses: 0 success (including partial data),
/// 3 subject opted out, 2 every provider failed, 1 anything else.
fn print_outcome(result: prospector::error::Result<prospector::domain::Profile>) -> anyhow::Result<()> {
    match result {
        Ok(profile) => {
            println!("{}", serde_json::to_string_pretty(&profile)?);
            if profile.opted_out {
                std::process::exit(3);
            }
        }
        Err(prospector::error::ResolveError::AllProvidersFailed) => {
            error!("Every provider failed; no profile produced");
            eprintln!("error: all providers failed");
            std::process::exit(2);
        }
        Err(e) => {
            error!(error = %e, "Resolution failed");
            return Err(e.into());
        }
    }
    Ok(())
}
