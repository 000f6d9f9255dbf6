use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::process;
use tracing::{error, info, warn};

use feedcaster::auth::{Consumer, Credential, Endpoints, Handshake, OAuthClient};
use feedcaster::detector::ChangeDetector;
use feedcaster::environment::{self, Config};
use feedcaster::logging;
use feedcaster::publish::{format_post, ApiPublisher, DryRunPublisher, Publisher};
use feedcaster::rss::{FeedSource, HttpFeedSource};
use feedcaster::scheduler::{FeedOutcome, Scheduler};
use feedcaster::store::{CredentialStore, SnapshotStore};
use feedcaster::{RelayError, TARGET_AUTH};

#[derive(Parser)]
#[clap(name = "feedcaster", about = "Relay new RSS/Atom items to a social account", version)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured feeds and post new items (default)
    Run {
        /// Poll every feed once and exit
        #[clap(long)]
        once: bool,

        /// Log the posts instead of sending them
        #[clap(long)]
        dry_run: bool,
    },

    /// Run the authorization handshake and store a fresh token
    Authorize,

    /// Fetch a feed and print its items with their fingerprints
    CheckFeed {
        #[clap(required = true)]
        url: String,
    },

    /// Preview the posts that would be generated for a feed
    Format {
        #[clap(required = true)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = logging::configure_logging();
    let args = Cli::parse();

    match args.command.unwrap_or(Commands::Run {
        once: false,
        dry_run: false,
    }) {
        Commands::Run { once, dry_run } => run(once, dry_run).await,
        Commands::Authorize => {
            let config = load_config();
            let client = oauth_client(&config)?;
            let store = CredentialStore::new(&config.token_file);
            let credential = authorize(&client, &store).await?;
            println!("Authorized as @{}", credential.account_handle);
            Ok(())
        }
        Commands::CheckFeed { url } => check_feed(&url).await,
        Commands::Format { url } => preview_posts(&url).await,
    }
}

fn exit_with(err: RelayError) -> ! {
    eprintln!("{}", err);
    process::exit(1);
}

/// Reads the configuration or exits with a diagnostic before any work.
fn load_config() -> Config {
    match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            if err.to_string().contains("TWITTER_") {
                eprintln!("Set TWITTER_API_KEY and TWITTER_KEY_SECRET to the application's consumer key and secret.");
            }
            exit_with(err)
        }
    }
}

/// Builds the signing client. A bad API base URL is a configuration error
/// and ends the process like any other.
fn oauth_client(config: &Config) -> Result<OAuthClient> {
    let consumer = Consumer::new(&config.consumer_key, &config.consumer_secret);
    match Endpoints::from_base(&config.api_base_url)
        .and_then(|endpoints| OAuthClient::new(consumer, endpoints))
    {
        Ok(client) => Ok(client),
        Err(err) if err.is_fatal() => exit_with(err),
        Err(err) => Err(err.into()),
    }
}

async fn run(once: bool, dry_run: bool) -> Result<()> {
    let config = load_config();
    let client = oauth_client(&config)?;
    let credential_store = CredentialStore::new(&config.token_file);

    let credential = match credential_store.load() {
        Some(credential) => credential,
        None => authorize(&client, &credential_store).await?,
    };
    info!(target: TARGET_AUTH, "Logged in as @{}", credential.account_handle);

    let publisher: Box<dyn Publisher> = if dry_run {
        Box::new(DryRunPublisher)
    } else {
        Box::new(ApiPublisher::new(client))
    };

    let scheduler = Scheduler::new(
        config.feeds.clone(),
        config.poll_interval,
        Box::new(HttpFeedSource::default()),
        publisher,
        SnapshotStore::new(&config.snapshot_file),
        ChangeDetector::new(config.fingerprint_strategy),
    );

    if once {
        let report = scheduler.run_once(&credential).await;
        for feed in &report.feeds {
            match &feed.outcome {
                FeedOutcome::Failed(err) => error!("{}: {}", feed.feed_url, err),
                outcome => info!("{}: {}", feed.feed_url, outcome),
            }
        }
        return Ok(());
    }

    scheduler.run(&credential).await;
    Ok(())
}

/// Runs the interactive handshake and stores the result.
///
/// A failure to store the token is logged but does not stop the process; the
/// handshake simply runs again on the next start.
async fn authorize(client: &OAuthClient, store: &CredentialStore) -> Result<Credential> {
    let mut handshake = Handshake::new(client);
    let url = handshake
        .start()
        .await
        .context("Could not obtain a request token")?;

    println!("Open this URL in a browser and authorize the application:");
    println!("\n    {}\n", url);
    print!("Enter the PIN shown after authorizing: ");
    io::stdout().flush()?;

    let mut verifier = String::new();
    io::stdin().lock().read_line(&mut verifier)?;

    let credential = handshake
        .complete(verifier.trim())
        .await
        .context("Could not exchange the PIN for an access token")?;

    if let Err(err) = store.save(&credential) {
        warn!(target: TARGET_AUTH, "Access token was not saved, authorization will be asked again next start: {}", err);
    }

    Ok(credential)
}

async fn check_feed(url: &str) -> Result<()> {
    let detector = ChangeDetector::new(environment::fingerprint_strategy_from_env()?);
    let items = HttpFeedSource::default().fetch(url).await?;

    println!("{} items in {}", items.len(), url);
    println!("{}", "─".repeat(80));
    for (i, item) in items.iter().enumerate() {
        println!("{}. {}", i + 1, item.title);
        println!("   link:        {}", item.link);
        if !item.categories.is_empty() {
            println!("   categories:  {}", item.categories.join(", "));
        }
        println!("   fingerprint: {}", detector.fingerprint(item));
    }
    Ok(())
}

async fn preview_posts(url: &str) -> Result<()> {
    let items = HttpFeedSource::default().fetch(url).await?;

    for item in &items {
        let payload = format_post(item);
        println!("{}", "─".repeat(80));
        println!("{}", payload.text);
        println!("({} characters)", payload.text.chars().count());
    }
    Ok(())
}
