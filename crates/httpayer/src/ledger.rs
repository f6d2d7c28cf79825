//! Spend ledger and guard.
//!
//! The guard enforces a per-asset ceiling over a UTC-day window. Authorization
//! uses a reservation discipline: `authorize` atomically checks
//! `committed + reserved + requested <= limit` and records a reservation
//! inside one critical section, so two concurrent pipelines can never both
//! pass a check that together would exceed the limit. The reservation is
//! committed after the payment settles, or released on failure.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;

/// `(asset, network)` ledger key. Assets are case-insensitive.
type LedgerKey = (String, String);

fn key(asset: &str, network: &str) -> LedgerKey {
    (asset.to_ascii_uppercase(), network.to_string())
}

/// A granted reservation. Pass back to [`SpendGuard::commit`] once the
/// payment settles, or [`SpendGuard::release`] if it does not.
#[derive(Debug)]
pub struct Authorization {
    id: u64,
    pub amount: u128,
    pub asset: String,
    pub network: String,
}

/// Outcome of an authorization request.
#[derive(Debug)]
pub enum Verdict {
    Allowed(Authorization),
    /// Vetoed. `remaining` is what the window could still accommodate.
    Denied { remaining: u128 },
}

#[derive(Default)]
struct LedgerState {
    window: Option<NaiveDate>,
    next_id: u64,
    committed: HashMap<LedgerKey, u128>,
    reserved: HashMap<LedgerKey, u128>,
    pending: HashMap<u64, (LedgerKey, u128)>,
}

impl LedgerState {
    /// Reset everything when the UTC day has rolled over.
    fn roll_window(&mut self, today: NaiveDate) {
        if self.window != Some(today) {
            if self.window.is_some() {
                tracing::info!(window = %today, "spend window rolled over, resetting ledger");
            }
            self.window = Some(today);
            self.committed.clear();
            self.reserved.clear();
            self.pending.clear();
        }
    }

    fn outstanding(&self, k: &LedgerKey) -> u128 {
        // Saturating: unlimited assets have no limit check bounding these.
        self.committed
            .get(k)
            .copied()
            .unwrap_or(0)
            .saturating_add(self.reserved.get(k).copied().unwrap_or(0))
    }
}

/// Process-scoped spend guard shared by all pipelines.
pub struct SpendGuard {
    /// Daily limits in minor units, enforced per (asset, network) pair.
    /// An absent asset means unlimited.
    limits: HashMap<String, u128>,
    state: Mutex<LedgerState>,
}

impl SpendGuard {
    /// Build a guard from per-asset limits in minor units.
    pub fn new(limits: HashMap<String, u128>) -> Self {
        let limits = limits
            .into_iter()
            .map(|(asset, v)| (asset.to_ascii_uppercase(), v))
            .collect();
        Self {
            limits,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// A guard with no limits: every payment is allowed but still ledgered.
    pub fn unlimited() -> Self {
        Self::new(HashMap::new())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::error!("spend ledger mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn today() -> NaiveDate {
        chrono::Utc::now().date_naive()
    }

    /// Check the limit and reserve `amount` in one critical section.
    pub fn authorize(&self, asset: &str, network: &str, amount: u128) -> Verdict {
        self.authorize_at(asset, network, amount, Self::today())
    }

    fn authorize_at(&self, asset: &str, network: &str, amount: u128, today: NaiveDate) -> Verdict {
        let k = key(asset, network);
        let mut state = self.lock();
        state.roll_window(today);

        if let Some(&limit) = self.limits.get(&k.0) {
            let outstanding = state.outstanding(&k);
            let remaining = limit.saturating_sub(outstanding);
            if amount > remaining {
                tracing::warn!(
                    asset = %k.0,
                    network = %k.1,
                    amount,
                    remaining,
                    "spend authorization denied"
                );
                return Verdict::Denied { remaining };
            }
        }

        state.next_id += 1;
        let id = state.next_id;
        let reserved = state.reserved.entry(k.clone()).or_insert(0);
        *reserved = reserved.saturating_add(amount);
        state.pending.insert(id, (k.clone(), amount));
        tracing::debug!(asset = %k.0, network = %k.1, amount, "spend authorized");
        Verdict::Allowed(Authorization {
            id,
            amount,
            asset: k.0,
            network: k.1,
        })
    }

    /// Move a reservation into the committed ledger after payment settled.
    pub fn commit(&self, auth: Authorization) {
        self.settle(auth, true)
    }

    /// Return a reservation without committing it (payment did not happen
    /// or was not accepted).
    pub fn release(&self, auth: Authorization) {
        self.settle(auth, false)
    }

    fn settle(&self, auth: Authorization, commit: bool) {
        let mut state = self.lock();
        state.roll_window(Self::today());
        let Some((k, amount)) = state.pending.remove(&auth.id) else {
            // Window rolled over between authorize and settle; nothing to move.
            tracing::debug!(asset = %auth.asset, "reservation no longer pending, ignoring");
            return;
        };
        if let Some(reserved) = state.reserved.get_mut(&k) {
            *reserved = reserved.saturating_sub(amount);
        }
        if commit {
            let committed = state.committed.entry(k).or_insert(0);
            *committed = committed.saturating_add(amount);
        }
    }

    /// Committed spend for the current window.
    pub fn spent_today(&self, asset: &str, network: &str) -> u128 {
        let mut state = self.lock();
        state.roll_window(Self::today());
        state.committed.get(&key(asset, network)).copied().unwrap_or(0)
    }

    /// Remaining headroom for the current window. `None` means unlimited.
    pub fn remaining(&self, asset: &str, network: &str) -> Option<u128> {
        let k = key(asset, network);
        let limit = *self.limits.get(&k.0)?;
        let mut state = self.lock();
        state.roll_window(Self::today());
        Some(limit.saturating_sub(state.outstanding(&k)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc_guard(limit: u128) -> SpendGuard {
        SpendGuard::new(HashMap::from([("USDC".to_string(), limit)]))
    }

    #[test]
    fn commit_accumulates_spend() {
        let guard = usdc_guard(1_000_000);
        let Verdict::Allowed(auth) = guard.authorize("USDC", "base", 300_000) else {
            panic!("expected allow");
        };
        guard.commit(auth);
        assert_eq!(guard.spent_today("USDC", "base"), 300_000);
        assert_eq!(guard.remaining("USDC", "base"), Some(700_000));
    }

    #[test]
    fn denial_reports_remaining() {
        let guard = usdc_guard(1_000_000);
        let Verdict::Allowed(auth) = guard.authorize("USDC", "base", 600_000) else {
            panic!("expected allow");
        };
        guard.commit(auth);
        match guard.authorize("USDC", "base", 600_000) {
            Verdict::Denied { remaining } => assert_eq!(remaining, 400_000),
            Verdict::Allowed(_) => panic!("should have been denied"),
        }
    }

    #[test]
    fn release_returns_headroom() {
        let guard = usdc_guard(1_000_000);
        let Verdict::Allowed(auth) = guard.authorize("USDC", "base", 900_000) else {
            panic!("expected allow");
        };
        guard.release(auth);
        assert_eq!(guard.spent_today("USDC", "base"), 0);
        assert!(matches!(
            guard.authorize("USDC", "base", 1_000_000),
            Verdict::Allowed(_)
        ));
    }

    #[test]
    fn reservations_count_against_limit_before_commit() {
        let guard = usdc_guard(1_000_000);
        let Verdict::Allowed(_held) = guard.authorize("USDC", "base", 600_000) else {
            panic!("expected allow");
        };
        // The first reservation is still pending; a second 0.6 must be denied.
        assert!(matches!(
            guard.authorize("USDC", "base", 600_000),
            Verdict::Denied { .. }
        ));
    }

    #[test]
    fn over_limit_sequence_denies_at_least_one() {
        let guard = usdc_guard(1_000_000);
        let amounts = [400_000u128, 400_000, 400_000];
        let mut denied = 0;
        for amount in amounts {
            match guard.authorize("USDC", "base", amount) {
                Verdict::Allowed(auth) => guard.commit(auth),
                Verdict::Denied { .. } => denied += 1,
            }
        }
        assert!(denied >= 1);
        assert!(guard.spent_today("USDC", "base") <= 1_000_000);
    }

    #[test]
    fn concurrent_authorizations_never_jointly_exceed() {
        use std::sync::Arc;
        let guard = Arc::new(usdc_guard(1_000_000));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let guard = Arc::clone(&guard);
            handles.push(std::thread::spawn(move || {
                match guard.authorize("USDC", "base", 600_000) {
                    Verdict::Allowed(auth) => {
                        guard.commit(auth);
                        true
                    }
                    Verdict::Denied { .. } => false,
                }
            }));
        }
        let allowed: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(allowed, 1);
        assert_eq!(guard.spent_today("USDC", "base"), 600_000);
    }

    #[test]
    fn assets_without_limit_are_unrestricted_but_ledgered() {
        let guard = usdc_guard(1_000_000);
        let Verdict::Allowed(auth) = guard.authorize("DAI", "base", u128::MAX / 2) else {
            panic!("expected allow");
        };
        guard.commit(auth);
        assert_eq!(guard.spent_today("DAI", "base"), u128::MAX / 2);
        assert_eq!(guard.remaining("DAI", "base"), None);
    }

    #[test]
    fn unlimited_ledger_saturates_instead_of_wrapping() {
        let guard = usdc_guard(1_000_000);
        for _ in 0..2 {
            let Verdict::Allowed(auth) = guard.authorize("DAI", "base", u128::MAX) else {
                panic!("expected allow");
            };
            guard.commit(auth);
        }
        assert_eq!(guard.spent_today("DAI", "base"), u128::MAX);
    }

    #[test]
    fn asset_keys_are_case_insensitive() {
        let guard = usdc_guard(1_000_000);
        let Verdict::Allowed(auth) = guard.authorize("usdc", "base", 800_000) else {
            panic!("expected allow");
        };
        guard.commit(auth);
        assert!(matches!(
            guard.authorize("USDC", "base", 300_000),
            Verdict::Denied { .. }
        ));
    }

    #[test]
    fn window_rollover_resets_ledger() {
        let guard = usdc_guard(1_000_000);
        let yesterday = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();

        let Verdict::Allowed(auth) =
            guard.authorize_at("USDC", "base", 1_000_000, yesterday)
        else {
            panic!("expected allow");
        };
        guard.commit(auth);
        // New day: the full limit is available again.
        assert!(matches!(
            guard.authorize_at("USDC", "base", 1_000_000, today),
            Verdict::Allowed(_)
        ));
    }

    #[test]
    fn networks_are_ledgered_separately() {
        let guard = usdc_guard(1_000_000);
        let Verdict::Allowed(a) = guard.authorize("USDC", "base", 800_000) else {
            panic!("expected allow");
        };
        guard.commit(a);
        // Limits apply per (asset, network) pair.
        assert!(matches!(
            guard.authorize("USDC", "polygon", 800_000),
            Verdict::Allowed(_)
        ));
        assert_eq!(guard.spent_today("USDC", "polygon"), 0);
    }
}
