use tracing::warn;

use super::category_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Categories,
    Currency,
    DateFormat,
    Theme,
    DarkMode,
    ShowBudgetAlerts,
    EmailNotifications,
    WeeklySummary,
    AutoLogout,
}

impl SettingKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Categories => "Categories",
            Self::Currency => "Currency",
            Self::DateFormat => "DateFormat",
            Self::Theme => "Theme",
            Self::DarkMode => "DarkMode",
            Self::ShowBudgetAlerts => "ShowBudgetAlerts",
            Self::EmailNotifications => "EmailNotifications",
            Self::WeeklySummary => "WeeklySummary",
            Self::AutoLogout => "AutoLogout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|k| k.as_str().to_lowercase() == lower)
    }

    pub fn all() -> &'static [SettingKey] {
        &[
            Self::Categories,
            Self::Currency,
            Self::DateFormat,
            Self::Theme,
            Self::DarkMode,
            Self::ShowBudgetAlerts,
            Self::EmailNotifications,
            Self::WeeklySummary,
            Self::AutoLogout,
        ]
    }

    pub fn is_flag(&self) -> bool {
        matches!(
            self,
            Self::DarkMode
                | Self::ShowBudgetAlerts
                | Self::EmailNotifications
                | Self::WeeklySummary
                | Self::AutoLogout
        )
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-user preferences. Stored values override these defaults key by key.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSettings {
    pub categories: Vec<String>,
    pub currency: String,
    pub date_format: String,
    pub theme: String,
    pub dark_mode: bool,
    pub show_budget_alerts: bool,
    pub email_notifications: bool,
    pub weekly_summary: bool,
    pub auto_logout: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            categories: [
                "Food & Dining",
                "Transportation",
                "Shopping",
                "Entertainment",
                "Utilities",
                "Salary",
                "Freelance",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            currency: "USD".into(),
            date_format: "MM/dd/yyyy".into(),
            theme: "light".into(),
            dark_mode: false,
            show_budget_alerts: true,
            email_notifications: true,
            weekly_summary: true,
            auto_logout: false,
        }
    }
}

impl UserSettings {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (SettingKey, &'a str)>) -> Self {
        let mut settings = Self::default();
        for (key, value) in pairs {
            settings.apply(key, value);
        }
        settings
    }

    /// Malformed values are logged and leave the default in place.
    pub fn apply(&mut self, key: SettingKey, value: &str) {
        match key {
            SettingKey::Categories => match serde_json::from_str::<Vec<String>>(value) {
                Ok(categories) => self.categories = categories,
                Err(e) => warn!("Ignoring malformed category list: {e}"),
            },
            SettingKey::Currency => self.currency = value.to_string(),
            SettingKey::DateFormat => self.date_format = value.to_string(),
            SettingKey::Theme => self.theme = value.to_string(),
            flag => match (parse_flag(value), self.flag_mut(flag)) {
                (Some(on), Some(field)) => *field = on,
                _ => warn!("Ignoring non-boolean value '{value}' for {flag}"),
            },
        }
    }

    fn flag_mut(&mut self, key: SettingKey) -> Option<&mut bool> {
        match key {
            SettingKey::DarkMode => Some(&mut self.dark_mode),
            SettingKey::ShowBudgetAlerts => Some(&mut self.show_budget_alerts),
            SettingKey::EmailNotifications => Some(&mut self.email_notifications),
            SettingKey::WeeklySummary => Some(&mut self.weekly_summary),
            SettingKey::AutoLogout => Some(&mut self.auto_logout),
            SettingKey::Categories
            | SettingKey::Currency
            | SettingKey::DateFormat
            | SettingKey::Theme => None,
        }
    }

    /// Find a configured category by name (case-insensitive).
    pub fn match_category(&self, name: &str) -> Option<&str> {
        let key = category_key(name);
        self.categories
            .iter()
            .find(|c| category_key(c) == key)
            .map(String::as_str)
    }
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}
