//! Active Symbol Subscription State
//!
//! Domain state for the single upstream subscription. The connection
//! carries at most one actively-subscribed symbol at any time; switching
//! it is the only supported subscription mutation.
//!
//! # Design
//!
//! The manager is a pure state machine: [`SubscriptionManager::plan_switch`]
//! produces the ordered outbound frames for a switch (unsubscribe the old
//! symbol first, then subscribe the new one), and
//! [`SubscriptionManager::commit`] records the new symbol. The caller owns
//! the sends and commits **only after the subscribe send succeeded**; the
//! manager never claims a symbol it has not confirmed, where "confirmed"
//! means the send went out (the venue sends no acknowledgment).
//!
//! Symbols pass through in venue format, exactly as requested. The venue
//! matches subscription symbols case-sensitively (`BINANCE:BTCUSDT`), so
//! the manager never rewrites what it is asked to subscribe.
//!
//! The unsubscribe/subscribe pair is not transactional against upstream
//! state. If the subscribe send fails after the unsubscribe already went
//! out, the venue holds no subscription and `current()` still names the
//! old symbol that was just unsubscribed. The next successful switch
//! resolves the mismatch: its redundant unsubscribe is harmless upstream.

// =============================================================================
// Types
// =============================================================================

/// A symbol string in venue format, e.g. `BINANCE:BTCUSDT`.
pub type Symbol = String;

/// Ordered outbound frames for one symbol switch.
///
/// `unsubscribe`, when present, must be sent strictly before `subscribe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchPlan {
    /// Symbol to unsubscribe first (the currently-active one, if any).
    pub unsubscribe: Option<Symbol>,
    /// Symbol to subscribe after.
    pub subscribe: Symbol,
}

// =============================================================================
// Subscription Manager
// =============================================================================

/// Tracks the single actively-subscribed upstream symbol.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Symbol currently subscribed, `None` before the first committed
    /// switch.
    current: Option<Symbol>,
}

impl SubscriptionManager {
    /// Create a manager with no active symbol.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// The currently-active symbol, if any.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Plan a switch to `new_symbol`.
    ///
    /// The requested symbol goes on the wire verbatim. A switch to the
    /// already-active symbol still plans the full round trip; the
    /// upstream treats the redundant pair as a refresh.
    #[must_use]
    pub fn plan_switch(&self, new_symbol: &str) -> SwitchPlan {
        SwitchPlan {
            unsubscribe: self.current.clone(),
            subscribe: new_symbol.to_string(),
        }
    }

    /// Record `symbol` as the active subscription.
    ///
    /// Call only after the subscribe send for this symbol succeeded; on a
    /// failed send the plan is abandoned and state stays as it was.
    pub fn commit(&mut self, symbol: Symbol) {
        self.current = Some(symbol);
    }
}
