// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Low-balance threshold tracking.
//!
//! A wallet raises its low-balance signal when a movement takes the balance
//! from above the threshold to at or below it, and clears the signal once the
//! balance rises above the threshold again. The raised state is persisted on
//! the wallet row so a restart does not re-fire an alert that already went out.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tollgate_core::OrganizationId;
use tracing::{info, warn};

/// Low-balance notification published on the ledger's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalanceAlert {
    /// The balance dropped to or below the threshold.
    Low {
        organization_id: OrganizationId,
        balance: Decimal,
        threshold: Decimal,
        currency: String,
    },
    /// The balance recovered above the threshold.
    Cleared {
        organization_id: OrganizationId,
        balance: Decimal,
        threshold: Decimal,
        currency: String,
    },
}

impl BalanceAlert {
    pub fn organization_id(&self) -> &OrganizationId {
        match self {
            BalanceAlert::Low {
                organization_id, ..
            }
            | BalanceAlert::Cleared {
                organization_id, ..
            } => organization_id,
        }
    }
}

/// What a balance movement does to the low-balance signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdTransition {
    Unchanged,
    Raise,
    Clear,
}

/// Snapshot of a wallet's threshold settings at the time of a movement.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdState {
    pub threshold: Decimal,
    pub alerts_enabled: bool,
    pub active: bool,
}

impl ThresholdState {
    /// Decide the transition for a movement from `before` to `after`.
    pub fn evaluate(&self, before: Decimal, after: Decimal) -> ThresholdTransition {
        if self.active {
            if after > self.threshold {
                ThresholdTransition::Clear
            } else {
                ThresholdTransition::Unchanged
            }
        } else if self.alerts_enabled && before > self.threshold && after <= self.threshold {
            ThresholdTransition::Raise
        } else {
            ThresholdTransition::Unchanged
        }
    }

    /// Whether the signal is raised after applying `transition`.
    pub fn active_after(&self, transition: ThresholdTransition) -> bool {
        match transition {
            ThresholdTransition::Raise => true,
            ThresholdTransition::Clear => false,
            ThresholdTransition::Unchanged => self.active,
        }
    }
}

/// Build (and log) the alert for a transition, if it produces one.
pub fn alert_for(
    transition: ThresholdTransition,
    organization_id: &OrganizationId,
    balance: Decimal,
    threshold: Decimal,
    currency: &str,
) -> Option<BalanceAlert> {
    match transition {
        ThresholdTransition::Unchanged => None,
        ThresholdTransition::Raise => {
            warn!(
                organization_id = %organization_id,
                balance = %balance,
                threshold = %threshold,
                currency = %currency,
                "wallet balance at or below low-balance threshold"
            );
            Some(BalanceAlert::Low {
                organization_id: organization_id.clone(),
                balance,
                threshold,
                currency: currency.to_string(),
            })
        }
        ThresholdTransition::Clear => {
            info!(
                organization_id = %organization_id,
                balance = %balance,
                threshold = %threshold,
                "wallet balance recovered above low-balance threshold"
            );
            Some(BalanceAlert::Cleared {
                organization_id: organization_id.clone(),
                balance,
                threshold,
                currency: currency.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tracing_test::traced_test;

    fn state(active: bool, alerts_enabled: bool) -> ThresholdState {
        ThresholdState {
            threshold: dec!(1.00),
            alerts_enabled,
            active,
        }
    }

    #[test]
    fn downward_crossing_raises() {
        assert_eq!(
            state(false, true).evaluate(dec!(1.50), dec!(0.90)),
            ThresholdTransition::Raise
        );
        // Landing exactly on the threshold counts.
        assert_eq!(
            state(false, true).evaluate(dec!(1.50), dec!(1.00)),
            ThresholdTransition::Raise
        );
    }

    #[test]
    fn staying_below_does_not_re_raise() {
        assert_eq!(
            state(false, true).evaluate(dec!(0.90), dec!(0.50)),
            ThresholdTransition::Unchanged
        );
        assert_eq!(
            state(true, true).evaluate(dec!(0.90), dec!(0.50)),
            ThresholdTransition::Unchanged
        );
    }

    #[test]
    fn disabled_alerts_never_raise() {
        assert_eq!(
            state(false, false).evaluate(dec!(5), dec!(0)),
            ThresholdTransition::Unchanged
        );
    }

    #[test]
    fn recovery_clears_active_signal() {
        let s = state(true, true);
        let t = s.evaluate(dec!(0.50), dec!(10));
        assert_eq!(t, ThresholdTransition::Clear);
        assert!(!s.active_after(t));
    }

    #[test]
    fn alert_carries_wallet_figures() {
        let org = OrganizationId::from("org-1");
        let alert = alert_for(
            ThresholdTransition::Raise,
            &org,
            dec!(0.5),
            dec!(1),
            "USD",
        )
        .unwrap();
        assert_eq!(alert.organization_id(), &org);
        assert!(matches!(alert, BalanceAlert::Low { balance, .. } if balance == dec!(0.5)));
        assert!(alert_for(ThresholdTransition::Unchanged, &org, dec!(0), dec!(1), "USD").is_none());
    }

    #[test]
    #[traced_test]
    fn raise_is_logged_with_wallet_fields() {
        let org = OrganizationId::from("org-log");
        alert_for(ThresholdTransition::Raise, &org, dec!(0.2), dec!(1), "USD");
        assert!(logs_contain("at or below low-balance threshold"));
        assert!(logs_contain("org-log"));
    }
}
