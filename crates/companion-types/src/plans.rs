use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Monthly,
    Yearly,
}

impl Interval {
    /// Length of one billing period in days.
    pub fn days(&self) -> i64 {
        match self {
            Self::Monthly => 30,
            Self::Yearly => 365,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub name: &'static str,
    pub amount: f64,
    pub currency: &'static str,
    pub interval: Interval,
    pub features: &'static [&'static str],
}

const PREMIUM_FEATURES: &[&str] = &[
    "Unlimited messages",
    "Voice messages",
    "50 image generations per month",
    "Create up to 5 custom characters",
];

const ULTIMATE_FEATURES: &[&str] = &[
    "Everything in Premium",
    "Unlimited image generations",
    "Unlimited custom characters",
    "Priority responses",
    "Early access to new characters",
];

/// Static subscription catalog, keyed by plan id.
pub const PLANS: &[(&str, Plan)] = &[
    (
        "premium_monthly",
        Plan { name: "Premium Monthly", amount: 9.99, currency: "usd", interval: Interval::Monthly, features: PREMIUM_FEATURES },
    ),
    (
        "premium_yearly",
        Plan { name: "Premium Yearly", amount: 59.99, currency: "usd", interval: Interval::Yearly, features: PREMIUM_FEATURES },
    ),
    (
        "ultimate_monthly",
        Plan { name: "Ultimate Monthly", amount: 19.99, currency: "usd", interval: Interval::Monthly, features: ULTIMATE_FEATURES },
    ),
    (
        "ultimate_yearly",
        Plan { name: "Ultimate Yearly", amount: 119.99, currency: "usd", interval: Interval::Yearly, features: ULTIMATE_FEATURES },
    ),
];

pub fn find_plan(plan_id: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|(id, _)| *id == plan_id).map(|(_, plan)| plan)
}

pub fn plan_map() -> BTreeMap<&'static str, &'static Plan> {
    PLANS.iter().map(|(id, plan)| (*id, plan)).collect()
}

/// Tier name ("premium" / "ultimate") a plan id belongs to.
pub fn tier_of(plan_id: &str) -> &'static str {
    if plan_id.starts_with("ultimate") {
        "ultimate"
    } else if plan_id.starts_with("premium") {
        "premium"
    } else {
        "free"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_prices() {
        assert_eq!(find_plan("premium_monthly").unwrap().amount, 9.99);
        assert_eq!(find_plan("premium_yearly").unwrap().amount, 59.99);
        assert_eq!(find_plan("ultimate_monthly").unwrap().amount, 19.99);
        assert_eq!(find_plan("ultimate_yearly").unwrap().amount, 119.99);
        assert!(find_plan("invalid_plan").is_none());
    }

    #[test]
    fn every_plan_is_usd_with_features() {
        for (_, plan) in PLANS {
            assert_eq!(plan.currency, "usd");
            assert!(!plan.features.is_empty());
        }
        assert_eq!(plan_map().len(), 4);
    }

    #[test]
    fn tiers() {
        assert_eq!(tier_of("ultimate_yearly"), "ultimate");
        assert_eq!(tier_of("premium_monthly"), "premium");
        assert_eq!(tier_of("free"), "free");
    }
}
