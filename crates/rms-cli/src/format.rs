//! Text formatting for terminal output.

use rms_core::models::User;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an optional string, returning a default if None
pub fn format_optional(value: &Option<String>, default: &str) -> String {
    value.as_deref().unwrap_or(default).to_string()
}

pub fn status_label(is_active: bool) -> &'static str {
    if is_active {
        "Active"
    } else {
        "Inactive"
    }
}

/// Render the admin user table, marking the signed-in user's own row
pub fn users_table(users: &[&User], current_id: Option<i64>) -> String {
    let mut out = format!(
        "{:<6} {:<10} {:<24} {:<30} {:<14} {}\n",
        "ID", "EMP ID", "NAME", "EMAIL", "ROLE", "STATUS"
    );
    for user in users {
        let role = if Some(user.id) == current_id {
            format!("{} (You)", user.role)
        } else {
            user.role.clone()
        };
        out.push_str(&format!(
            "{:<6} {:<10} {:<24} {:<30} {:<14} {}\n",
            user.id,
            truncate_string(&format_optional(&user.employee_id, "N/A"), 10),
            truncate_string(user.display_name(), 24),
            truncate_string(&user.email, 30),
            role,
            status_label(user.is_active),
        ));
    }
    out
}
