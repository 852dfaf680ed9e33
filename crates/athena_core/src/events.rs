//! Typed change notifications emitted by core services.
//!
//! # Responsibility
//! - Let presentation code observe profile, entitlement and session changes
//!   without polling storage.
//!
//! # Invariants
//! - Subscribers run synchronously, in subscription order, on the emitting
//!   thread.
//! - Events are emitted only after the corresponding write succeeded.

use crate::model::book::BookId;
use crate::repo::preferences_repo::Theme;
use log::debug;
use std::sync::{Mutex, MutexGuard};

/// Change notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Identity fields of the active profile changed.
    ProfileChanged,
    /// A book was unlocked for the active profile.
    EntitlementChanged { book_id: BookId },
    /// EXP balance changed by `delta` (negative for purchases).
    CurrencyChanged { balance: u64, delta: i64 },
    FavoritesChanged { book_id: BookId, favorite: bool },
    AuthStateChanged { logged_in: bool },
    ThemeChanged { theme: Theme },
}

impl ChangeEvent {
    /// Stable event name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProfileChanged => "profile_changed",
            Self::EntitlementChanged { .. } => "entitlement_changed",
            Self::CurrencyChanged { .. } => "currency_changed",
            Self::FavoritesChanged { .. } => "favorites_changed",
            Self::AuthStateChanged { .. } => "auth_state_changed",
            Self::ThemeChanged { .. } => "theme_changed",
        }
    }
}

type Subscriber = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Publish/subscribe hub shared by services.
#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for every subsequent event.
    pub fn subscribe(&self, subscriber: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.lock().push(Box::new(subscriber));
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Delivers `event` to all subscribers.
    pub fn emit(&self, event: ChangeEvent) {
        let subscribers = self.lock();
        debug!(
            "event=change_emit module=events status=ok kind={} subscribers={}",
            event.name(),
            subscribers.len()
        );
        for subscriber in subscribers.iter() {
            subscriber(&event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        // A panicking subscriber must not disable notifications for the rest
        // of the session.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeEvent, ChangeNotifier};
    use std::sync::{Arc, Mutex};

    #[test]
    fn delivers_events_in_subscription_order() {
        let notifier = ChangeNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second"] {
            let seen = Arc::clone(&seen);
            notifier.subscribe(move |event| {
                seen.lock()
                    .expect("lock")
                    .push(format!("{label}:{}", event.name()));
            });
        }

        notifier.emit(ChangeEvent::EntitlementChanged { book_id: 11 });
        assert_eq!(
            *seen.lock().expect("lock"),
            vec![
                "first:entitlement_changed".to_string(),
                "second:entitlement_changed".to_string()
            ]
        );
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let notifier = ChangeNotifier::new();
        notifier.emit(ChangeEvent::ProfileChanged);
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
