use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::Budget;

const WARNING_THRESHOLD: Decimal = Decimal::from_parts(75, 0, 0, false, 0);
const URGENT_THRESHOLD: Decimal = Decimal::from_parts(90, 0, 0, false, 0);

/// Severity of a budget alert, derived from percentage used. Each tier
/// includes its lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum AlertTier {
    /// Below 75%.
    None,
    /// 75% up to 90%.
    Warning,
    /// 90% up to 100%.
    Urgent,
    /// 100% and over.
    Critical,
}

impl AlertTier {
    pub(crate) fn classify(percentage_used: Decimal) -> Self {
        if percentage_used >= Decimal::ONE_HUNDRED {
            Self::Critical
        } else if percentage_used >= URGENT_THRESHOLD {
            Self::Urgent
        } else if percentage_used >= WARNING_THRESHOLD {
            Self::Warning
        } else {
            Self::None
        }
    }

    pub(crate) fn default_icon(&self) -> Option<&'static str> {
        match self {
            Self::Critical => Some("🚨"),
            Self::Urgent | Self::Warning => Some("⚠️"),
            Self::None => None,
        }
    }

    /// Alert text for this tier, or `None` for `AlertTier::None`.
    /// A non-empty `icon_override` replaces the default icon; critical alerts
    /// always show the icon twice.
    pub(crate) fn render(
        &self,
        category: &str,
        percentage_used: Decimal,
        icon_override: Option<&str>,
    ) -> Option<String> {
        let icon = icon_override
            .filter(|icon| !icon.is_empty())
            .or_else(|| self.default_icon())?;
        let used = whole_percent(percentage_used);

        let message = match self {
            Self::Critical => format!(
                "{icon}{icon} CRITICAL BUDGET ALERT! You've EXCEEDED your {category} budget by {}%! Total spending: {used}% of budget",
                whole_percent(percentage_used - Decimal::ONE_HUNDRED)
            ),
            Self::Urgent => format!(
                "{icon} URGENT: You've used {used}% of your {category} budget! Only {}% remaining",
                whole_percent(Decimal::ONE_HUNDRED - percentage_used)
            ),
            Self::Warning => {
                format!("{icon} Budget Warning: You've used {used}% of your {category} budget")
            }
            Self::None => return None,
        };
        Some(message)
    }
}

impl std::fmt::Display for AlertTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Warning => "warning",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BudgetAlert {
    pub(crate) tier: AlertTier,
    pub(crate) message: String,
}

/// Classify a budget's current usage and render the alert, if any.
pub(crate) fn alert_for(budget: &Budget, icon_override: Option<&str>) -> Option<BudgetAlert> {
    let percentage = budget.percentage_used();
    let tier = AlertTier::classify(percentage);
    tier.render(&budget.category, percentage, icon_override)
        .map(|message| BudgetAlert { tier, message })
}

/// Rounded to the nearest whole number, halves away from zero.
fn whole_percent(value: Decimal) -> String {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

#[cfg(test)]
#[path = "alert_tests.rs"]
mod tests;
