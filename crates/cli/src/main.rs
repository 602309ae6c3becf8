//! Cartsync CLI - drive a cart session from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the current cart
//! cart-cli show
//!
//! # Add two units of a product
//! cart-cli add sku-1 -q 2
//!
//! # Set, change or remove a line
//! cart-cli set sku-1 5
//! cart-cli increment sku-1 -1
//! cart-cli remove sku-1
//!
//! # Empty the cart
//! cart-cli clear
//! ```
//!
//! Configuration comes from the environment (or `.env`): `CART_API_BASE_URL`,
//! `CART_API_TOKEN`, `CART_API_TIMEOUT_SECS`, `CART_CURRENCY`, `SENTRY_DSN`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use cartsync::EngineConfig;
use cartsync_core::ProductId;
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;

use commands::cart::Surfaces;
use error::CliError;

#[derive(Parser)]
#[command(name = "cart-cli")]
#[command(author, version, about = "Cartsync cart session driver")]
struct Cli {
    /// Print the views as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current cart
    Show,
    /// Add units of a product
    Add {
        /// Product ID
        product: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: i64,
    },
    /// Set a line's quantity (0 removes the line)
    Set {
        /// Product ID
        product: String,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Change a line's quantity by a delta
    Increment {
        /// Product ID
        product: String,

        /// Units to add (negative to take away)
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },
    /// Remove a product's line
    Remove {
        /// Product ID
        product: String,
    },
    /// Empty the cart
    Clear,
}

/// Initialize Sentry error tracking if a DSN is configured.
fn init_sentry(config: &EngineConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartsync=info,cartsync_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(CliError::from(e)),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &EngineConfig) -> Result<(), CliError> {
    let surfaces = Surfaces::open(config).await?;
    let store = surfaces.store();

    let outcome = match cli.command {
        Commands::Show => None,
        Commands::Add { product, quantity } => {
            Some(store.add_to_cart(&ProductId::new(product), quantity).await?)
        }
        Commands::Set { product, quantity } => Some(
            surfaces
                .panel()
                .set_quantity(&ProductId::new(product), quantity)
                .await?,
        ),
        Commands::Increment { product, delta } => {
            Some(store.increment_quantity(&ProductId::new(product), delta).await?)
        }
        Commands::Remove { product } => {
            Some(surfaces.panel().remove(&ProductId::new(product)).await?)
        }
        Commands::Clear => Some(surfaces.panel().clear().await?),
    };

    if let Some(outcome) = &outcome {
        commands::cart::report(outcome);
    }
    surfaces.render(cli.json)
}
