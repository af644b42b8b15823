//! User account models as returned by the `/auth/users` and `/auth/me` endpoints.

use serde::{Deserialize, Serialize};

/// Account role. Unknown roles from the backend map to `Unknown`;
/// the raw string stays on `User::role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Hr,
    Employee,
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Roles an admin can assign from the user table
    pub const ASSIGNABLE: [Role; 3] = [Role::Admin, Role::Hr, Role::Employee];

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "admin" => Role::Admin,
            "hr" => Role::Hr,
            "employee" => Role::Employee,
            _ => Role::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Hr => "hr",
            Role::Employee => "employee",
            Role::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(rename = "fullName", default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    pub role: String,
    #[serde(default)]
    pub is_superuser: bool,
}

impl User {
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    /// Admins are users with the admin role or the superuser flag
    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin || self.is_superuser
    }

    pub fn is_hr(&self) -> bool {
        self.role() == Role::Hr
    }

    pub fn is_employee(&self) -> bool {
        self.role() == Role::Employee
    }

    /// Superusers pass every role check
    pub fn has_role(&self, roles: &[Role]) -> bool {
        self.is_superuser || roles.contains(&self.role())
    }

    /// Full name if set, otherwise the email address
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.email,
        }
    }
}
