//! Cart consumers: read-only views over the store.
//!
//! Each consumer subscribes when mounted and keeps only the last snapshot it
//! was handed. Display values are derived from that snapshot on every read,
//! never cached. Dropping a consumer (or calling `unmount`) releases its
//! subscription; operations it started still complete for everyone else.
//!
//! Mutations go through the [`CartStore`]; a consumer never edits state.

use std::sync::Arc;

use cartsync_core::{CartLine, CartSnapshot, ProductId};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::instrument;

use crate::error::Result;
use crate::store::{CartListener, CartStore, MutationOutcome, Subscription};

/// Last snapshot delivered to a consumer.
#[derive(Clone)]
struct LatestSnapshot(Arc<RwLock<Arc<CartSnapshot>>>);

impl LatestSnapshot {
    fn mount(store: &CartStore) -> (Self, Subscription) {
        let latest = Self(Arc::new(RwLock::new(store.current_snapshot())));
        let subscription = store.subscribe(latest.clone());
        (latest, subscription)
    }

    fn get(&self) -> Arc<CartSnapshot> {
        Arc::clone(&self.0.read())
    }
}

impl CartListener for LatestSnapshot {
    fn on_snapshot(&self, snapshot: &Arc<CartSnapshot>) {
        *self.0.write() = Arc::clone(snapshot);
    }
}

// =============================================================================
// Badge Counter
// =============================================================================

/// Item count shown next to the cart icon.
pub struct BadgeCounter {
    latest: LatestSnapshot,
    _subscription: Subscription,
}

impl BadgeCounter {
    /// Subscribe to `store`.
    #[must_use]
    pub fn mount(store: &CartStore) -> Self {
        let (latest, subscription) = LatestSnapshot::mount(store);
        Self {
            latest,
            _subscription: subscription,
        }
    }

    /// Total units in the cart.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.latest.get().item_count()
    }

    /// Release the subscription.
    pub fn unmount(self) {}
}

// =============================================================================
// Cart Panel
// =============================================================================

/// One line as displayed in the cart panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItemView {
    pub line_id: String,
    pub product_id: String,
    pub title: String,
    pub quantity: u32,
    pub price: String,
    pub line_price: String,
    pub image: Option<String>,
}

impl From<&CartLine> for CartItemView {
    fn from(line: &CartLine) -> Self {
        Self {
            line_id: line.line_id.to_string(),
            product_id: line.product_id.to_string(),
            title: line.display_name.clone(),
            quantity: line.quantity.get(),
            price: line.unit_price.display(),
            // Empty when the total does not fit; wire lines are rejected earlier.
            line_price: line
                .line_total()
                .map(|total| total.display())
                .unwrap_or_default(),
            image: line.image_ref.clone(),
        }
    }
}

/// Cart panel contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    /// The server's grand total, formatted.
    pub subtotal: String,
    pub item_count: u64,
}

impl CartView {
    /// Whether there is nothing to show.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<&CartSnapshot> for CartView {
    fn from(snapshot: &CartSnapshot) -> Self {
        Self {
            items: snapshot.lines.iter().map(CartItemView::from).collect(),
            subtotal: snapshot.grand_total.display(),
            item_count: snapshot.item_count(),
        }
    }
}

/// Slide-over cart panel with quantity controls.
pub struct CartPanel {
    store: CartStore,
    latest: LatestSnapshot,
    _subscription: Subscription,
}

impl CartPanel {
    /// Subscribe to `store`.
    #[must_use]
    pub fn mount(store: &CartStore) -> Self {
        let (latest, subscription) = LatestSnapshot::mount(store);
        Self {
            store: store.clone(),
            latest,
            _subscription: subscription,
        }
    }

    /// Panel contents for the last snapshot received.
    #[must_use]
    pub fn view(&self) -> CartView {
        CartView::from(self.latest.get().as_ref())
    }

    /// "+" button.
    ///
    /// # Errors
    ///
    /// Whatever the store reports.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn increment(&self, product_id: &ProductId) -> Result<MutationOutcome> {
        self.store.increment_quantity(product_id, 1).await
    }

    /// "-" button. Removes the line when it reaches zero.
    ///
    /// # Errors
    ///
    /// Whatever the store reports.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn decrement(&self, product_id: &ProductId) -> Result<MutationOutcome> {
        self.store.increment_quantity(product_id, -1).await
    }

    /// Quantity input.
    ///
    /// # Errors
    ///
    /// Whatever the store reports.
    pub async fn set_quantity(&self, product_id: &ProductId, quantity: i64) -> Result<MutationOutcome> {
        self.store.set_quantity(product_id, quantity).await
    }

    /// Remove button.
    ///
    /// # Errors
    ///
    /// Whatever the store reports.
    pub async fn remove(&self, product_id: &ProductId) -> Result<MutationOutcome> {
        self.store.remove_item(product_id).await
    }

    /// "Clear cart" link.
    ///
    /// # Errors
    ///
    /// Whatever the store reports.
    pub async fn clear(&self) -> Result<MutationOutcome> {
        self.store.clear_cart().await
    }

    /// Release the subscription.
    pub fn unmount(self) {}
}

// =============================================================================
// Checkout Summary
// =============================================================================

/// Order summary on the checkout page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutView {
    pub line_count: usize,
    pub item_count: u64,
    pub total: String,
    pub checkout_url: Option<String>,
    pub can_checkout: bool,
}

impl From<&CartSnapshot> for CheckoutView {
    fn from(snapshot: &CartSnapshot) -> Self {
        Self {
            line_count: snapshot.lines.len(),
            item_count: snapshot.item_count(),
            total: snapshot.grand_total.display(),
            checkout_url: snapshot.checkout_url.clone(),
            can_checkout: !snapshot.is_empty(),
        }
    }
}

/// Checkout page summary.
pub struct CheckoutSummary {
    store: CartStore,
    latest: LatestSnapshot,
    _subscription: Subscription,
}

impl CheckoutSummary {
    /// Subscribe to `store`.
    #[must_use]
    pub fn mount(store: &CartStore) -> Self {
        let (latest, subscription) = LatestSnapshot::mount(store);
        Self {
            store: store.clone(),
            latest,
            _subscription: subscription,
        }
    }

    /// Summary for the last snapshot received.
    #[must_use]
    pub fn summary(&self) -> CheckoutView {
        CheckoutView::from(self.latest.get().as_ref())
    }

    /// Re-fetch before showing the final total.
    ///
    /// # Errors
    ///
    /// Whatever the store reports.
    pub async fn refresh(&self) -> Result<MutationOutcome> {
        self.store.refresh().await
    }

    /// Release the subscription.
    pub fn unmount(self) {}
}
