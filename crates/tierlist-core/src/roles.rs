// Admin roles and the panel tabs each role can reach.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    Owner,
    Admin,
    Moderator,
    Tester,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminTab {
    Submit,
    System,
    Analytics,
    Database,
    Users,
    Applications,
}

impl AdminRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Some(AdminRole::Owner),
            "admin" => Some(AdminRole::Admin),
            "moderator" => Some(AdminRole::Moderator),
            "tester" => Some(AdminRole::Tester),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::Owner => "owner",
            AdminRole::Admin => "admin",
            AdminRole::Moderator => "moderator",
            AdminRole::Tester => "tester",
        }
    }

    /// Tabs shown in the admin panel, in display order.
    pub fn visible_tabs(&self) -> &'static [AdminTab] {
        match self {
            AdminRole::Owner => &[
                AdminTab::Submit,
                AdminTab::System,
                AdminTab::Analytics,
                AdminTab::Database,
                AdminTab::Users,
                AdminTab::Applications,
            ],
            AdminRole::Admin => &[
                AdminTab::Submit,
                AdminTab::System,
                AdminTab::Analytics,
                AdminTab::Database,
                AdminTab::Users,
            ],
            AdminRole::Moderator => &[AdminTab::Submit, AdminTab::Analytics, AdminTab::System],
            AdminRole::Tester => &[AdminTab::Submit],
        }
    }

    pub fn can_access(&self, tab: AdminTab) -> bool {
        self.visible_tabs().contains(&tab)
    }

    /// Roles an application may request or a reviewer may assign. Owner is
    /// reserved for the owner password.
    pub fn is_assignable(&self) -> bool {
        !matches!(self, AdminRole::Owner)
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AdminTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminTab::Submit => "submit",
            AdminTab::System => "system",
            AdminTab::Analytics => "analytics",
            AdminTab::Database => "database",
            AdminTab::Users => "users",
            AdminTab::Applications => "applications",
        }
    }
}

impl fmt::Display for AdminTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
