//! Cart session commands.
//!
//! Opens a session from the environment, mounts the badge, panel and checkout
//! consumers, and prints what they show after the command ran.

use std::fmt::Write as _;

use cartsync::consumers::{BadgeCounter, CartPanel, CartView, CheckoutSummary, CheckoutView};
use cartsync::{CartSession, CartStore, EngineConfig, MutationOutcome};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::CliError;

/// A session with every consumer mounted.
pub struct Surfaces {
    session: CartSession,
    badge: BadgeCounter,
    panel: CartPanel,
    checkout: CheckoutSummary,
}

impl Surfaces {
    /// Begin a session and load the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable, no credential is
    /// configured, or the initial fetch fails.
    pub async fn open(config: &EngineConfig) -> Result<Self, CliError> {
        let session = CartSession::begin(config)?;
        if !session.is_authenticated() {
            return Err(CliError::NotSignedIn);
        }

        // Mount first so the rehydrated snapshot reaches every consumer.
        let badge = BadgeCounter::mount(session.store());
        let panel = CartPanel::mount(session.store());
        let checkout = CheckoutSummary::mount(session.store());

        session.resume().await?;
        info!(base_url = %config.base_url, "Cart session ready");

        Ok(Self {
            session,
            badge,
            panel,
            checkout,
        })
    }

    pub const fn store(&self) -> &CartStore {
        self.session.store()
    }

    pub const fn panel(&self) -> &CartPanel {
        &self.panel
    }

    /// Print every consumer's view to stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON encoding fails.
    #[allow(clippy::print_stdout)]
    pub fn render(&self, json: bool) -> Result<(), CliError> {
        let output = Output {
            badge: self.badge.count(),
            cart: self.panel.view(),
            checkout: self.checkout.summary(),
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print!("{}", output.to_text());
        }
        Ok(())
    }
}

/// Log how a mutation resolved.
pub fn report(outcome: &MutationOutcome) {
    match outcome {
        MutationOutcome::Committed(snapshot) => {
            info!(lines = snapshot.lines.len(), "Cart updated");
        }
        MutationOutcome::Superseded { issued_at, current } => {
            warn!(%issued_at, %current, "Result arrived after a newer change and was dropped");
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    badge: u64,
    cart: CartView,
    checkout: CheckoutView,
}

impl Output {
    fn to_text(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "Badge: {}", self.badge);

        if self.cart.is_empty() {
            let _ = writeln!(text, "Cart is empty");
        } else {
            let _ = writeln!(text, "Cart ({} items)", self.cart.item_count);
            for item in &self.cart.items {
                let _ = writeln!(
                    text,
                    "  {} x {} @ {} = {}  [{}]",
                    item.quantity, item.title, item.price, item.line_price, item.product_id
                );
            }
            let _ = writeln!(text, "Subtotal: {}", self.cart.subtotal);
        }

        match (&self.checkout.checkout_url, self.checkout.can_checkout) {
            (Some(url), true) => {
                let _ = writeln!(text, "Checkout {}: {url}", self.checkout.total);
            }
            (None, true) => {
                let _ = writeln!(text, "Checkout {}: no checkout link yet", self.checkout.total);
            }
            (_, false) => {
                let _ = writeln!(text, "Checkout unavailable");
            }
        }
        text
    }
}
