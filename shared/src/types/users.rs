use std::fmt;

use serde::{Deserialize, Serialize};

use super::role::Role;

/// An account as returned by `GET /users/:id` and `PUT /users/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl UserAccount {
    /// The editable part of the account, as the body of `PUT /users/:id`.
    pub fn to_update(&self) -> UserUpdate {
        UserUpdate {
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            active: self.active,
        }
    }
}

impl fmt::Display for UserAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.active { "active" } else { "inactive" };
        write!(f, "{} <{}> {} [{}]", self.name, self.email, self.role, state)
    }
}

/// Body of `PUT /users/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
}

/// Answer of `PATCH /users/:id/toggle-active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveState {
    pub active: bool,
}

/// One bar of the appointments-per-month chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthCount {
    pub month: String,
    #[serde(default)]
    pub value: u64,
}

/// One slice of the records-by-type chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: u64,
}

/// `GET /dashboard`, admin only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(default)]
    pub doctors: u64,
    #[serde(default)]
    pub patients: u64,
    #[serde(default)]
    pub records: u64,
    #[serde(default)]
    pub appointments: u64,
    #[serde(default)]
    pub appointments_per_month: Vec<MonthCount>,
    #[serde(default)]
    pub records_by_type: Vec<TypeCount>,
}
