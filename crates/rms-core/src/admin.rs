//! User-management table logic for the admin screen.

use crate::models::{Role, UpdateUserRoleRequest, User};

/// Rows shown per page of the user table
pub const PAGE_SIZE: usize = 10;

/// Number of pages needed for `total` rows (always at least one)
pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 1;
    }
    total.div_ceil(page_size).max(1)
}

/// Rows for a 1-based page. Admin accounts are hidden after paging,
/// so a page can hold fewer than `page_size` rows.
pub fn visible_users(users: &[User], page: usize, page_size: usize) -> Vec<&User> {
    let start = page.saturating_sub(1).saturating_mul(page_size);
    users
        .iter()
        .skip(start)
        .take(page_size)
        .filter(|u| u.role() != Role::Admin)
        .collect()
}

/// Users can edit every row but their own
pub fn can_edit_role(row: &User, current: Option<&User>) -> bool {
    current.map(|c| c.id != row.id).unwrap_or(true)
}

/// Only employees other than the current user can be deleted
pub fn can_delete(row: &User, current: Option<&User>) -> bool {
    row.role() == Role::Employee && can_edit_role(row, current)
}

/// Build the role update for a row. `None` if neither the role nor the
/// superuser flag changes. Promoting to admin always grants superuser;
/// `make_superuser` grants it for any role. Superuser is never revoked here.
pub fn role_change(row: &User, new_role: Role, make_superuser: bool) -> Option<UpdateUserRoleRequest> {
    let is_superuser = new_role == Role::Admin || make_superuser || row.is_superuser;
    if new_role == row.role() && is_superuser == row.is_superuser {
        return None;
    }
    Some(UpdateUserRoleRequest {
        user_id: row.id,
        role: new_role.as_str().to_string(),
        is_superuser: Some(is_superuser),
    })
}
