//! The cart store: the single in-memory copy of the committed cart.
//!
//! # Commit rules
//!
//! - Every mutation goes to the remote service; nothing is applied optimistically.
//! - Operations are not serialized against each other. Each one records the
//!   [`Revision`] it observed when issued, and its result is committed only if
//!   the revision is still current when the result arrives. Otherwise the
//!   result is dropped and the caller gets [`MutationOutcome::Superseded`].
//! - A commit replaces the `Arc<CartSnapshot>` wholesale and notifies every
//!   listener synchronously, in registration order.
//! - Failures go back to the initiating caller only. `NotAuthenticated` also
//!   resets the cart to empty and notifies everyone, unless a newer result
//!   was committed after the failed request was issued.
//!
//! No lock is held across an `.await`. Listener dispatch runs under a
//! re-entrant lock so listeners observe commits in commit order and may read
//! the store from inside their callback.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use cartsync_core::{CartSnapshot, CurrencyCode, ProductId, Quantity};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{CartError, Result};
use crate::gateway::CartGateway;

/// Monotonic marker of committed state, used to detect stale results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revision(u64);

impl Revision {
    /// Revision of a freshly created store.
    pub const INITIAL: Self = Self(0);

    /// Wrap a raw revision number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw revision number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a mutation that reached the remote service resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The result was committed and broadcast.
    Committed(Arc<CartSnapshot>),
    /// A later operation committed first; this result was dropped.
    Superseded {
        /// Revision observed when the operation was issued.
        issued_at: Revision,
        /// Revision current when its result arrived.
        current: Revision,
    },
}

impl MutationOutcome {
    /// The committed snapshot, if any.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&Arc<CartSnapshot>> {
        match self {
            Self::Committed(snapshot) => Some(snapshot),
            Self::Superseded { .. } => None,
        }
    }

    /// Whether the result was dropped as stale.
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}

/// Receives every committed snapshot.
///
/// Implemented for any `Fn(&Arc<CartSnapshot>)` closure, so consumers can
/// subscribe with a closure or a dedicated type.
pub trait CartListener: Send + Sync + 'static {
    /// Called synchronously after each commit, and once on subscription.
    fn on_snapshot(&self, snapshot: &Arc<CartSnapshot>);
}

impl<F> CartListener for F
where
    F: Fn(&Arc<CartSnapshot>) + Send + Sync + 'static,
{
    fn on_snapshot(&self, snapshot: &Arc<CartSnapshot>) {
        self(snapshot);
    }
}

/// A listener registration. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    store: Weak<StoreInner>,
}

impl Subscription {
    /// Remove the registration now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Whether the store is still alive and this listener is still registered with it.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.store.upgrade().is_some_and(|inner| {
            let listeners = inner.listeners.lock();
            listeners.iter().any(|r| r.id == self.id)
        })
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner.listeners.lock().retain(|r| r.id != self.id);
        }
    }
}

// =============================================================================
// CartStore
// =============================================================================

/// Authoritative client-side cart state.
///
/// Cheap to clone; clones share the same state. Construct one per session and
/// pass it to whoever needs it.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    gateway: Box<dyn CartGateway>,
    currency: CurrencyCode,
    state: RwLock<EngineState>,
    listeners: Mutex<Vec<Registration>>,
    next_listener_id: AtomicU64,
    dispatch: ReentrantMutex<()>,
}

struct EngineState {
    snapshot: Arc<CartSnapshot>,
    revision: Revision,
}

struct Registration {
    id: u64,
    listener: Arc<dyn CartListener>,
}

impl fmt::Debug for CartStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("CartStore")
            .field("revision", &state.revision)
            .field("lines", &state.snapshot.lines.len())
            .field("listeners", &self.inner.listeners.lock().len())
            .finish_non_exhaustive()
    }
}

impl CartStore {
    /// Create a store holding the empty cart.
    ///
    /// `currency` is used for the canonical empty snapshot.
    #[must_use]
    pub fn new(gateway: impl CartGateway + 'static, currency: CurrencyCode) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                gateway: Box::new(gateway),
                currency,
                state: RwLock::new(EngineState {
                    snapshot: Arc::new(CartSnapshot::empty(currency)),
                    revision: Revision::INITIAL,
                }),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                dispatch: ReentrantMutex::new(()),
            }),
        }
    }

    /// The last committed snapshot.
    #[must_use]
    pub fn current_snapshot(&self) -> Arc<CartSnapshot> {
        Arc::clone(&self.inner.state.read().snapshot)
    }

    /// The current revision.
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.inner.state.read().revision
    }

    /// Register a listener.
    ///
    /// The listener is called once, synchronously, with the current snapshot
    /// before this returns, and then after every commit until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(&self, listener: impl CartListener) -> Subscription {
        let listener: Arc<dyn CartListener> = Arc::new(listener);
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);

        let _dispatch = self.inner.dispatch.lock();
        self.inner.listeners.lock().push(Registration {
            id,
            listener: Arc::clone(&listener),
        });
        listener.on_snapshot(&self.current_snapshot());

        debug!(listener_id = id, "Cart listener subscribed");
        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add units of a product.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if `quantity` is not positive; otherwise any
    /// gateway failure.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_cart(
        &self,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<MutationOutcome> {
        let quantity = Quantity::new(quantity).map_err(invalid)?;
        let (_, issued_at) = self.observe();
        self.apply(issued_at, self.inner.gateway.add_line(product_id, quantity))
            .await
    }

    /// Change a line's quantity by `delta`.
    ///
    /// A missing line with a positive delta is added; a result of zero or
    /// less removes the line.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` for a zero delta or a negative delta on a product
    /// not in the cart; otherwise any gateway failure.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn increment_quantity(
        &self,
        product_id: &ProductId,
        delta: i64,
    ) -> Result<MutationOutcome> {
        if delta == 0 {
            return Err(invalid("quantity delta must be non-zero"));
        }

        let (snapshot, issued_at) = self.observe();
        let current = snapshot.line_for(product_id).map(|l| l.quantity.as_i64());
        match current {
            Some(current) => {
                self.route_quantity(issued_at, product_id, current.saturating_add(delta))
                    .await
            }
            None if delta > 0 => {
                let quantity = Quantity::new(delta).map_err(invalid)?;
                self.apply(issued_at, self.inner.gateway.add_line(product_id, quantity))
                    .await
            }
            None => Err(invalid(format!(
                "cannot decrease {product_id}: it is not in the cart"
            ))),
        }
    }

    /// Set a line's quantity. Zero or less removes the line.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` for a non-positive quantity on a product not in the
    /// cart; otherwise any gateway failure.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn set_quantity(
        &self,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<MutationOutcome> {
        let (snapshot, issued_at) = self.observe();
        if snapshot.line_for(product_id).is_some() {
            return self.route_quantity(issued_at, product_id, quantity).await;
        }

        if quantity <= 0 {
            return Err(invalid(format!(
                "cannot set {product_id} to {quantity}: it is not in the cart"
            )));
        }
        let quantity = Quantity::new(quantity).map_err(invalid)?;
        self.apply(issued_at, self.inner.gateway.add_line(product_id, quantity))
            .await
    }

    /// Remove a product's line.
    ///
    /// # Errors
    ///
    /// `NotFound` if the product is not in the committed cart (no remote call
    /// is made); otherwise any gateway failure.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_item(&self, product_id: &ProductId) -> Result<MutationOutcome> {
        let (snapshot, issued_at) = self.observe();
        if snapshot.line_for(product_id).is_none() {
            debug!("Product not in cart, nothing to remove");
            return Err(CartError::NotFound(product_id.to_string()));
        }
        self.apply(issued_at, self.inner.gateway.remove_line(product_id))
            .await
    }

    /// Empty the cart.
    ///
    /// On success the canonical empty snapshot is committed, whatever the
    /// remote service echoed.
    ///
    /// # Errors
    ///
    /// Any gateway failure.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<MutationOutcome> {
        let (_, issued_at) = self.observe();
        let currency = self.inner.currency;
        let cleared = async {
            self.inner.gateway.clear().await?;
            Ok(CartSnapshot::empty(currency))
        };
        self.apply(issued_at, cleared).await
    }

    /// Re-fetch the cart from the remote service and commit it.
    ///
    /// # Errors
    ///
    /// Any gateway failure.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<MutationOutcome> {
        let (_, issued_at) = self.observe();
        self.apply(issued_at, self.inner.gateway.fetch_snapshot())
            .await
    }

    // =========================================================================
    // Session Lifecycle
    // =========================================================================

    /// Initial fetch at the start of a session.
    ///
    /// # Errors
    ///
    /// Any gateway failure.
    pub async fn rehydrate(&self) -> Result<MutationOutcome> {
        info!("Rehydrating cart from remote service");
        self.refresh().await
    }

    /// Drop back to the empty cart (logout, credential loss).
    ///
    /// Bumps the revision, so results of operations still in flight are
    /// reported as superseded instead of resurrecting the old cart.
    pub fn reset(&self) -> Arc<CartSnapshot> {
        info!("Resetting cart to empty");
        self.reset_state()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Read the snapshot and revision together.
    fn observe(&self) -> (Arc<CartSnapshot>, Revision) {
        let state = self.inner.state.read();
        (Arc::clone(&state.snapshot), state.revision)
    }

    /// Route a target quantity for a line known to exist.
    async fn route_quantity(
        &self,
        issued_at: Revision,
        product_id: &ProductId,
        target: i64,
    ) -> Result<MutationOutcome> {
        if target <= 0 {
            debug!(target, "Quantity reaches zero, removing line");
            return self
                .apply(issued_at, self.inner.gateway.remove_line(product_id))
                .await;
        }
        let quantity = Quantity::new(target).map_err(invalid)?;
        self.apply(issued_at, self.inner.gateway.set_quantity(product_id, quantity))
            .await
    }

    /// Await a gateway call and commit or report its result.
    async fn apply(
        &self,
        issued_at: Revision,
        call: impl Future<Output = Result<CartSnapshot>>,
    ) -> Result<MutationOutcome> {
        match call.await {
            Ok(snapshot) => Ok(self.commit(issued_at, Arc::new(snapshot))),
            Err(err) => Err(self.fail(issued_at, err)),
        }
    }

    fn commit(&self, issued_at: Revision, snapshot: Arc<CartSnapshot>) -> MutationOutcome {
        let _dispatch = self.inner.dispatch.lock();
        let revision = {
            let mut state = self.inner.state.write();
            if state.revision != issued_at {
                let current = state.revision;
                drop(state);
                warn!(%issued_at, %current, "Dropping stale cart result");
                return MutationOutcome::Superseded { issued_at, current };
            }
            state.revision = state.revision.next();
            state.snapshot = Arc::clone(&snapshot);
            state.revision
        };

        debug!(
            %revision,
            lines = snapshot.lines.len(),
            grand_total = %snapshot.grand_total,
            "Committed cart snapshot"
        );
        self.notify(&snapshot);
        MutationOutcome::Committed(snapshot)
    }

    fn fail(&self, issued_at: Revision, err: CartError) -> CartError {
        match &err {
            CartError::NotAuthenticated => {
                if self.reset_if_current(issued_at) {
                    warn!("Credential missing or rejected, cart reset");
                } else {
                    warn!(%issued_at, "Stale credential failure, keeping newer cart");
                }
            }
            CartError::ServerError(reason) => error!(%reason, "Cart operation failed"),
            other => warn!(error = %other, "Cart operation failed"),
        }
        err
    }

    fn reset_state(&self) -> Arc<CartSnapshot> {
        let _dispatch = self.inner.dispatch.lock();
        let empty = Arc::new(CartSnapshot::empty(self.inner.currency));
        {
            let mut state = self.inner.state.write();
            state.revision = state.revision.next();
            state.snapshot = Arc::clone(&empty);
        }
        self.notify(&empty);
        empty
    }

    /// Reset to empty only if nothing was committed since `issued_at`.
    fn reset_if_current(&self, issued_at: Revision) -> bool {
        let _dispatch = self.inner.dispatch.lock();
        let empty = Arc::new(CartSnapshot::empty(self.inner.currency));
        {
            let mut state = self.inner.state.write();
            if state.revision != issued_at {
                return false;
            }
            state.revision = state.revision.next();
            state.snapshot = Arc::clone(&empty);
        }
        self.notify(&empty);
        true
    }

    /// Call every listener. Caller holds the dispatch lock.
    fn notify(&self, snapshot: &Arc<CartSnapshot>) {
        let listeners: Vec<Arc<dyn CartListener>> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|r| Arc::clone(&r.listener))
            .collect();
        for listener in listeners {
            listener.on_snapshot(snapshot);
        }
    }
}

fn invalid(reason: impl fmt::Display) -> CartError {
    debug!(%reason, "Rejected cart operation locally");
    CartError::InvalidOperation(reason.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use cartsync_core::{CartLine, LineId, Money};
    use rust_decimal::Decimal;
    use tokio::sync::oneshot;

    use super::*;

    /// A remote call as seen by the scripted gateway.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Fetch,
        Add(String, u32),
        Set(String, u32),
        Remove(String),
        Clear,
    }

    enum Reply {
        Ready(Result<CartSnapshot>),
        Deferred(oneshot::Receiver<Result<CartSnapshot>>),
    }

    /// Gateway double answering each expected call with a scripted reply.
    #[derive(Default)]
    pub struct ScriptedGateway {
        calls: Mutex<Vec<Call>>,
        replies: Mutex<VecDeque<(Call, Reply)>>,
    }

    impl ScriptedGateway {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Answer the next matching call immediately.
        pub fn expect(&self, call: Call, result: Result<CartSnapshot>) {
            self.replies.lock().push_back((call, Reply::Ready(result)));
        }

        /// Hold the next matching call until the returned sender fires.
        pub fn defer(&self, call: Call) -> oneshot::Sender<Result<CartSnapshot>> {
            let (tx, rx) = oneshot::channel();
            self.replies.lock().push_back((call, Reply::Deferred(rx)));
            tx
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        async fn answer(&self, call: Call) -> Result<CartSnapshot> {
            self.calls.lock().push(call.clone());
            let reply = {
                let mut replies = self.replies.lock();
                let index = replies.iter().position(|(c, _)| *c == call);
                index.and_then(|i| replies.remove(i))
            };
            match reply {
                Some((_, Reply::Ready(result))) => result,
                Some((_, Reply::Deferred(rx))) => rx
                    .await
                    .unwrap_or_else(|_| Err(CartError::Network("reply dropped".to_string()))),
                None => panic!("unexpected gateway call: {call:?}"),
            }
        }
    }

    #[async_trait]
    impl CartGateway for ScriptedGateway {
        async fn fetch_snapshot(&self) -> Result<CartSnapshot> {
            self.answer(Call::Fetch).await
        }

        async fn add_line(&self, product_id: &ProductId, quantity: Quantity) -> Result<CartSnapshot> {
            self.answer(Call::Add(product_id.to_string(), quantity.get()))
                .await
        }

        async fn set_quantity(
            &self,
            product_id: &ProductId,
            quantity: Quantity,
        ) -> Result<CartSnapshot> {
            self.answer(Call::Set(product_id.to_string(), quantity.get()))
                .await
        }

        async fn remove_line(&self, product_id: &ProductId) -> Result<CartSnapshot> {
            self.answer(Call::Remove(product_id.to_string())).await
        }

        async fn clear(&self) -> Result<()> {
            self.answer(Call::Clear).await.map(|_| ())
        }
    }

    /// Build a VND snapshot from `(product, quantity, unit price)` triples.
    pub fn snapshot(lines: &[(&str, i64, i64)], total: i64) -> CartSnapshot {
        CartSnapshot {
            lines: lines
                .iter()
                .map(|(product, quantity, price)| CartLine {
                    line_id: LineId::new(format!("line-{product}")),
                    product_id: ProductId::new(*product),
                    display_name: product.to_uppercase(),
                    image_ref: None,
                    unit_price: Money::new(Decimal::from(*price), CurrencyCode::VND).unwrap(),
                    quantity: Quantity::new(*quantity).unwrap(),
                })
                .collect(),
            grand_total: Money::new(Decimal::from(total), CurrencyCode::VND).unwrap(),
            checkout_url: None,
            updated_at: None,
        }
    }

    fn sku(id: &str) -> ProductId {
        ProductId::new(id)
    }

    fn recorder(store: &CartStore) -> (Arc<Mutex<Vec<Arc<CartSnapshot>>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = store.subscribe(move |s: &Arc<CartSnapshot>| sink.lock().push(Arc::clone(s)));
        (seen, subscription)
    }

    async fn seeded(gateway: &Arc<ScriptedGateway>, lines: &[(&str, i64, i64)], total: i64) -> CartStore {
        let store = CartStore::new(Arc::clone(gateway), CurrencyCode::VND);
        gateway.expect(Call::Fetch, Ok(snapshot(lines, total)));
        store.rehydrate().await.unwrap();
        store
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = CartStore::new(ScriptedGateway::new(), CurrencyCode::VND);
        assert!(store.current_snapshot().is_empty());
        assert_eq!(store.revision(), Revision::INITIAL);
    }

    #[test]
    fn test_revision_wraps_instead_of_overflowing() {
        assert_eq!(Revision::new(u64::MAX).next(), Revision::INITIAL);
        assert_eq!(Revision::INITIAL.next(), Revision::new(1));
    }

    #[test]
    fn test_subscription_inactive_once_store_dropped() {
        let store = CartStore::new(ScriptedGateway::new(), CurrencyCode::VND);
        let (_seen, subscription) = recorder(&store);
        assert!(subscription.is_active());

        drop(store);
        assert!(!subscription.is_active());
    }

    #[test]
    fn test_subscribe_delivers_current_snapshot_immediately() {
        let store = CartStore::new(ScriptedGateway::new(), CurrencyCode::VND);
        let (seen, _subscription) = recorder(&store);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(Arc::ptr_eq(&seen[0], &store.current_snapshot()));
    }

    #[tokio::test]
    async fn test_add_to_cart_commits_and_notifies_all_subscribers() {
        let gateway = ScriptedGateway::new();
        let store = CartStore::new(Arc::clone(&gateway), CurrencyCode::VND);
        let (badge, _badge_sub) = recorder(&store);
        let (panel, _panel_sub) = recorder(&store);

        gateway.expect(
            Call::Add("sku-1".to_string(), 2),
            Ok(snapshot(&[("sku-1", 2, 50_000)], 100_000)),
        );
        let outcome = store.add_to_cart(&sku("sku-1"), 2).await.unwrap();

        let committed = outcome.snapshot().unwrap();
        assert_eq!(committed.lines.len(), 1);
        assert_eq!(committed.grand_total.amount, Decimal::from(100_000));
        assert_eq!(store.revision(), Revision::new(1));
        for seen in [badge, panel] {
            let seen = seen.lock();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[1].lines.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_grand_total_comes_from_server() {
        let gateway = ScriptedGateway::new();
        let store = seeded(&gateway, &[("sku-1", 1, 50_000)], 50_000).await;

        // Promotion applied server-side: 2 x 50000 billed at 90000.
        gateway.expect(
            Call::Set("sku-1".to_string(), 2),
            Ok(snapshot(&[("sku-1", 2, 50_000)], 90_000)),
        );
        store.increment_quantity(&sku("sku-1"), 1).await.unwrap();

        assert_eq!(
            store.current_snapshot().grand_total.amount,
            Decimal::from(90_000)
        );
    }

    #[tokio::test]
    async fn test_decrement_to_zero_routes_to_remove() {
        let gateway = ScriptedGateway::new();
        let store = seeded(&gateway, &[("sku-1", 2, 50_000)], 100_000).await;

        gateway.expect(Call::Remove("sku-1".to_string()), Ok(snapshot(&[], 0)));
        store.increment_quantity(&sku("sku-1"), -2).await.unwrap();

        assert!(store.current_snapshot().is_empty());
        assert_eq!(
            gateway.calls(),
            vec![Call::Fetch, Call::Remove("sku-1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_set_quantity_routing() {
        let gateway = ScriptedGateway::new();
        let store = seeded(&gateway, &[("sku-1", 2, 10)], 20).await;

        gateway.expect(Call::Remove("sku-1".to_string()), Ok(snapshot(&[], 0)));
        store.set_quantity(&sku("sku-1"), 0).await.unwrap();

        gateway.expect(
            Call::Add("sku-2".to_string(), 4),
            Ok(snapshot(&[("sku-2", 4, 10)], 40)),
        );
        store.set_quantity(&sku("sku-2"), 4).await.unwrap();

        gateway.expect(
            Call::Set("sku-2".to_string(), 1),
            Ok(snapshot(&[("sku-2", 1, 10)], 10)),
        );
        store.set_quantity(&sku("sku-2"), 1).await.unwrap();

        assert_eq!(store.current_snapshot().item_count(), 1);
    }

    #[tokio::test]
    async fn test_increment_missing_line_adds_it() {
        let gateway = ScriptedGateway::new();
        let store = CartStore::new(Arc::clone(&gateway), CurrencyCode::VND);

        gateway.expect(
            Call::Add("sku-3".to_string(), 1),
            Ok(snapshot(&[("sku-3", 1, 10)], 10)),
        );
        store.increment_quantity(&sku("sku-3"), 1).await.unwrap();

        assert_eq!(gateway.calls(), vec![Call::Add("sku-3".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_invalid_operations_never_reach_gateway() {
        let gateway = ScriptedGateway::new();
        let store = CartStore::new(Arc::clone(&gateway), CurrencyCode::VND);
        let (seen, _subscription) = recorder(&store);

        let results = [
            store.add_to_cart(&sku("sku-1"), 0).await,
            store.add_to_cart(&sku("sku-1"), -1).await,
            store.increment_quantity(&sku("sku-1"), 0).await,
            store.increment_quantity(&sku("sku-1"), -1).await,
            store.set_quantity(&sku("sku-1"), -4).await,
        ];

        for result in results {
            assert!(matches!(result, Err(CartError::InvalidOperation(_))));
        }
        assert!(gateway.calls().is_empty());
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(store.revision(), Revision::INITIAL);
    }

    #[tokio::test]
    async fn test_failure_keeps_snapshot_and_is_not_broadcast() {
        let gateway = ScriptedGateway::new();
        let store = seeded(&gateway, &[("sku-1", 1, 10)], 10).await;
        let before = store.current_snapshot();
        let (seen, _subscription) = recorder(&store);

        gateway.expect(
            Call::Add("sku-2".to_string(), 1),
            Err(CartError::Network("connection reset".to_string())),
        );
        let err = store.add_to_cart(&sku("sku-2"), 1).await.unwrap_err();

        assert_eq!(err, CartError::Network("connection reset".to_string()));
        assert!(Arc::ptr_eq(&before, &store.current_snapshot()));
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(store.revision(), Revision::new(1));
    }

    #[tokio::test]
    async fn test_not_authenticated_resets_and_notifies() {
        let gateway = ScriptedGateway::new();
        let store = seeded(&gateway, &[("sku-1", 1, 10)], 10).await;
        let (seen, _subscription) = recorder(&store);

        gateway.expect(
            Call::Add("sku-1".to_string(), 1),
            Err(CartError::NotAuthenticated),
        );
        let err = store.add_to_cart(&sku("sku-1"), 1).await.unwrap_err();

        assert_eq!(err, CartError::NotAuthenticated);
        assert!(store.current_snapshot().is_empty());
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].is_empty());
    }

    #[tokio::test]
    async fn test_not_authenticated_on_empty_cart_stays_empty() {
        let gateway = ScriptedGateway::new();
        let store = CartStore::new(Arc::clone(&gateway), CurrencyCode::VND);

        gateway.expect(
            Call::Add("sku-1".to_string(), 1),
            Err(CartError::NotAuthenticated),
        );
        let err = store.add_to_cart(&sku("sku-1"), 1).await.unwrap_err();

        assert_eq!(err, CartError::NotAuthenticated);
        assert_eq!(*store.current_snapshot(), CartSnapshot::empty(CurrencyCode::VND));
    }

    #[tokio::test]
    async fn test_remove_twice_in_sequence() {
        let gateway = ScriptedGateway::new();
        let store = seeded(&gateway, &[("sku-1", 1, 10)], 10).await;

        gateway.expect(Call::Remove("sku-1".to_string()), Ok(snapshot(&[], 0)));
        store.remove_item(&sku("sku-1")).await.unwrap();
        let second = store.remove_item(&sku("sku-1")).await;

        assert_eq!(second, Err(CartError::NotFound("sku-1".to_string())));
        assert!(store.current_snapshot().line_for(&sku("sku-1")).is_none());
        // Second call resolved locally.
        assert_eq!(gateway.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_twice_concurrently() {
        let gateway = ScriptedGateway::new();
        let store = seeded(&gateway, &[("sku-1", 1, 10)], 10).await;

        let release_first = gateway.defer(Call::Remove("sku-1".to_string()));
        let release_second = gateway.defer(Call::Remove("sku-1".to_string()));
        let spawn_remove = || {
            let store = store.clone();
            tokio::spawn(async move { store.remove_item(&sku("sku-1")).await })
        };
        let first = spawn_remove();
        let second = spawn_remove();
        while gateway.calls().len() < 3 {
            tokio::task::yield_now().await;
        }

        release_first.send(Ok(snapshot(&[], 0))).unwrap();
        release_second
            .send(Err(CartError::NotFound("sku-1".to_string())))
            .unwrap();

        // Each deferred reply goes to whichever removal claimed it first, so
        // only the combined result is asserted.
        let results = [first.await.unwrap(), second.await.unwrap()];
        let committed = results.iter().filter(|r| matches!(r, Ok(o) if o.snapshot().is_some())).count();
        let not_found = results
            .iter()
            .filter(|r| matches!(r, Err(CartError::NotFound(_))))
            .count();
        assert_eq!((committed, not_found), (1, 1));
        assert!(store.current_snapshot().line_for(&sku("sku-1")).is_none());
    }

    #[tokio::test]
    async fn test_stale_result_is_superseded() {
        let gateway = ScriptedGateway::new();
        let store = seeded(&gateway, &[("sku-1", 2, 10)], 20).await;
        for _ in 0..4 {
            gateway.expect(Call::Fetch, Ok(snapshot(&[("sku-1", 2, 10)], 20)));
            store.refresh().await.unwrap();
        }
        assert_eq!(store.revision(), Revision::new(5));

        let release_three = gateway.defer(Call::Set("sku-1".to_string(), 3));
        let release_one = gateway.defer(Call::Set("sku-1".to_string(), 1));

        let slow = tokio::spawn({
            let store = store.clone();
            async move { store.set_quantity(&sku("sku-1"), 3).await }
        });
        let fast = tokio::spawn({
            let store = store.clone();
            async move { store.set_quantity(&sku("sku-1"), 1).await }
        });
        while gateway.calls().len() < 7 {
            tokio::task::yield_now().await;
        }

        release_one
            .send(Ok(snapshot(&[("sku-1", 1, 10)], 10)))
            .unwrap();
        let fast = fast.await.unwrap().unwrap();
        assert!(fast.snapshot().is_some());
        assert_eq!(store.revision(), Revision::new(6));

        release_three
            .send(Ok(snapshot(&[("sku-1", 3, 10)], 30)))
            .unwrap();
        let slow = slow.await.unwrap().unwrap();
        assert_eq!(
            slow,
            MutationOutcome::Superseded {
                issued_at: Revision::new(5),
                current: Revision::new(6),
            }
        );

        let line_quantity = store
            .current_snapshot()
            .line_for(&sku("sku-1"))
            .map(|l| l.quantity.get());
        assert_eq!(line_quantity, Some(1));
        assert_eq!(store.revision(), Revision::new(6));
    }

    #[tokio::test]
    async fn test_clear_commits_canonical_empty_snapshot() {
        let gateway = ScriptedGateway::new();
        let store = seeded(&gateway, &[("sku-1", 1, 10), ("sku-2", 1, 10)], 20).await;

        // Whatever the server echoes is ignored.
        gateway.expect(Call::Clear, Ok(snapshot(&[("sku-2", 1, 10)], 10)));
        let outcome = store.clear_cart().await.unwrap();

        assert_eq!(
            **outcome.snapshot().unwrap(),
            CartSnapshot::empty(CurrencyCode::VND)
        );
        assert!(store.current_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribed_listener_misses_in_flight_commit() {
        let gateway = ScriptedGateway::new();
        let store = CartStore::new(Arc::clone(&gateway), CurrencyCode::VND);
        let (seen, subscription) = recorder(&store);
        let (other, _other_sub) = recorder(&store);

        let release = gateway.defer(Call::Add("sku-1".to_string(), 1));
        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.add_to_cart(&sku("sku-1"), 1).await }
        });
        while gateway.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        assert!(subscription.is_active());
        subscription.unsubscribe();
        release
            .send(Ok(snapshot(&[("sku-1", 1, 10)], 10)))
            .unwrap();
        pending.await.unwrap().unwrap();

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(other.lock().len(), 2);
        assert_eq!(store.current_snapshot().item_count(), 1);
    }

    #[tokio::test]
    async fn test_listeners_notified_in_registration_order() {
        let gateway = ScriptedGateway::new();
        let store = CartStore::new(Arc::clone(&gateway), CurrencyCode::VND);
        let order = Arc::new(Mutex::new(Vec::new()));

        let _subs: Vec<Subscription> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                store.subscribe(move |_: &Arc<CartSnapshot>| order.lock().push(i))
            })
            .collect();
        order.lock().clear();

        gateway.expect(Call::Fetch, Ok(snapshot(&[], 0)));
        store.refresh().await.unwrap();

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_listener_can_read_store_during_notification() {
        let gateway = ScriptedGateway::new();
        let store = CartStore::new(Arc::clone(&gateway), CurrencyCode::VND);
        let consistent = Arc::new(Mutex::new(Vec::new()));

        let reader = store.clone();
        let sink = Arc::clone(&consistent);
        let _subscription = store.subscribe(move |s: &Arc<CartSnapshot>| {
            sink.lock().push(Arc::ptr_eq(s, &reader.current_snapshot()));
        });

        gateway.expect(Call::Fetch, Ok(snapshot(&[("sku-1", 1, 10)], 10)));
        store.refresh().await.unwrap();

        assert_eq!(*consistent.lock(), vec![true, true]);
    }

    #[tokio::test]
    async fn test_reset_supersedes_in_flight_operation() {
        let gateway = ScriptedGateway::new();
        let store = seeded(&gateway, &[("sku-1", 1, 10)], 10).await;

        let release = gateway.defer(Call::Fetch);
        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.refresh().await }
        });
        while gateway.calls().len() < 2 {
            tokio::task::yield_now().await;
        }

        store.reset();
        release
            .send(Ok(snapshot(&[("sku-1", 1, 10)], 10)))
            .unwrap();

        assert!(pending.await.unwrap().unwrap().is_superseded());
        assert!(store.current_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_late_not_authenticated_keeps_newer_cart() {
        let gateway = ScriptedGateway::new();
        let store = CartStore::new(Arc::clone(&gateway), CurrencyCode::VND);
        let (seen, _subscription) = recorder(&store);

        let release = gateway.defer(Call::Add("sku-1".to_string(), 1));
        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.add_to_cart(&sku("sku-1"), 1).await }
        });
        while gateway.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        gateway.expect(Call::Fetch, Ok(snapshot(&[("sku-2", 3, 10)], 30)));
        store.refresh().await.unwrap();
        release.send(Err(CartError::NotAuthenticated)).unwrap();

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err, CartError::NotAuthenticated);
        assert_eq!(store.revision(), Revision::new(1));
        assert_eq!(store.current_snapshot().item_count(), 3);
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].item_count(), 3);
    }
}
