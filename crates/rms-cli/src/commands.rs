//! Command parsing and handlers for the `rms` binary.

use anyhow::{anyhow, bail, Context, Result};
use rms_core::admin::{self, PAGE_SIZE};
use rms_core::auth::access::{Access, AuthState, RouteGuard};
use rms_core::models::{ChangePasswordForm, RegisterRequest, Role, User};
use rms_core::{Config, RmsClient, StorageKey};
use tracing::{debug, info};

use crate::format::users_table;

pub const USAGE: &str = "\
Usage: rms <command> [args]

Commands:
  login [email]              Sign in (password is prompted)
  signup <email> <full name> Create an account
  logout                     Sign out and clear the local session
  whoami                     Show the signed-in user
  change-password            Change your password
  users [--page N]           List users (admin/hr)
  set-role <id> <role> [--superuser]
                             Change a user's role: admin, hr, employee (admin/hr)
  delete-user <id>           Delete an employee account (admin/hr)
  theme [light|dark]         Show or set the stored theme preference
  help                       Show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: Option<String> },
    Signup { email: String, full_name: String },
    Logout,
    WhoAmI,
    ChangePassword,
    Users { page: usize },
    SetRole { user_id: i64, role: Role, superuser: bool },
    DeleteUser { user_id: i64 },
    Theme { value: Option<String> },
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            return Ok(Command::Help);
        };
        let rest = &args[1..];

        let command = match name.as_str() {
            "login" => Command::Login {
                email: rest.first().cloned(),
            },
            "signup" => {
                let email = rest.first().ok_or_else(|| anyhow!("signup needs an email"))?;
                if rest.len() < 2 {
                    bail!("signup needs a full name");
                }
                Command::Signup {
                    email: email.clone(),
                    full_name: rest[1..].join(" "),
                }
            }
            "logout" => Command::Logout,
            "whoami" => Command::WhoAmI,
            "change-password" => Command::ChangePassword,
            "users" => {
                let page = match rest {
                    [] => 1,
                    [flag, n] if flag == "--page" => {
                        n.parse().with_context(|| format!("Invalid page number: {}", n))?
                    }
                    _ => bail!("usage: rms users [--page N]"),
                };
                Command::Users { page }
            }
            "set-role" => {
                let (id, role, superuser) = match rest {
                    [id, role] => (id, role, false),
                    [id, role, flag] if flag == "--superuser" => (id, role, true),
                    _ => bail!("usage: rms set-role <id> <role> [--superuser]"),
                };
                let role = Role::parse(role);
                if !Role::ASSIGNABLE.contains(&role) {
                    bail!("Unknown role; expected admin, hr or employee");
                }
                Command::SetRole {
                    user_id: parse_user_id(id)?,
                    role,
                    superuser,
                }
            }
            "delete-user" => match rest {
                [id] => Command::DeleteUser {
                    user_id: parse_user_id(id)?,
                },
                _ => bail!("usage: rms delete-user <id>"),
            },
            "theme" => match rest {
                [] => Command::Theme { value: None },
                [value] if value == "light" || value == "dark" => Command::Theme {
                    value: Some(value.clone()),
                },
                _ => bail!("usage: rms theme [light|dark]"),
            },
            "help" | "--help" | "-h" => Command::Help,
            other => bail!("Unknown command: {}\n\n{}", other, USAGE),
        };
        Ok(command)
    }
}

fn parse_user_id(s: &str) -> Result<i64> {
    s.parse().with_context(|| format!("Invalid user id: {}", s))
}

fn prompt(label: &str) -> Result<String> {
    use std::io::{self, Write};

    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_password(label: &str) -> Result<String> {
    rpassword::prompt_password(label).context("Failed to read password")
}

/// Fetch the current user and check the admin screen's guard
async fn require_admin_screen(client: &RmsClient) -> Result<User> {
    let me = client.current_user().await?;
    let guard = RouteGuard::for_route("/admin/users")
        .ok_or_else(|| anyhow!("Admin route is not guarded"))?;
    match guard.check(&AuthState::loaded(me.clone())) {
        Access::Allowed => Ok(me),
        Access::Denied => bail!("Access denied: you don't have permission to manage users"),
        Access::Redirect(_) | Access::Loading => bail!("Not signed in. Run `rms login` first."),
    }
}

pub async fn run(command: Command, client: &RmsClient, config: &mut Config) -> Result<()> {
    debug!(?command, "Running command");
    match command {
        Command::Help => println!("{}", USAGE),

        Command::Login { email } => {
            let email = match email.or_else(|| config.last_email.clone()) {
                Some(email) => email,
                None => prompt("Email: ")?,
            };
            let password = prompt_password("Password: ")?;
            client.login(&email, &password).await?;
            config.last_email = Some(email.clone());
            config.save()?;
            println!("Login successful");
        }

        Command::Signup { email, full_name } => {
            let password = prompt_password("Password: ")?;
            let confirm_password = prompt_password("Confirm password: ")?;
            let request = RegisterRequest {
                email,
                password,
                confirm_password,
                full_name,
            };
            client.register(&request).await?;
            println!("Signup successful. Run `rms login {}` to sign in.", request.email);
        }

        Command::Logout => {
            let response = client.logout().await?;
            println!("{}", response.message);
        }

        Command::WhoAmI => {
            if client.session()?.is_none() {
                bail!("Not signed in. Run `rms login` first.");
            }
            let me = client.current_user().await?;
            println!("{} <{}>", me.display_name(), me.email);
            println!("Role: {}{}", me.role, if me.is_superuser { " (superuser)" } else { "" });
        }

        Command::ChangePassword => {
            let me = client.current_user().await?;
            let form = ChangePasswordForm {
                old_password: prompt_password("Current password: ")?,
                new_password: prompt_password("New password: ")?,
                confirm_password: prompt_password("Confirm new password: ")?,
            };
            let response = client.change_password(&form.into_request(&me.email)?).await?;
            println!("{}", response.message);
        }

        Command::Users { page } => {
            let me = require_admin_screen(client).await?;
            let users = client.users().await?;
            let pages = admin::page_count(users.len(), PAGE_SIZE);
            let rows = admin::visible_users(&users, page, PAGE_SIZE);
            print!("{}", users_table(&rows, Some(me.id)));
            println!("Page {} of {}", page.max(1), pages);
        }

        Command::SetRole { user_id, role, superuser } => {
            let me = require_admin_screen(client).await?;
            let users = client.users().await?;
            let row = users
                .iter()
                .find(|u| u.id == user_id)
                .ok_or_else(|| anyhow!("No user with id {}", user_id))?;
            if !admin::can_edit_role(row, Some(&me)) {
                bail!("You cannot change your own role");
            }
            match admin::role_change(row, role, superuser) {
                Some(request) => {
                    let response = client.update_user_role(&request).await?;
                    info!(user_id, role = %role, "Role updated");
                    println!("{}", response.message);
                }
                None => println!("{} already has role {}", row.display_name(), role),
            }
        }

        Command::DeleteUser { user_id } => {
            let me = require_admin_screen(client).await?;
            let users = client.users().await?;
            let row = users
                .iter()
                .find(|u| u.id == user_id)
                .ok_or_else(|| anyhow!("No user with id {}", user_id))?;
            if !admin::can_delete(row, Some(&me)) {
                bail!("Only other employees' accounts can be deleted");
            }
            let answer = prompt(&format!(
                "Has {} quit the company? Type 'yes' to delete: ",
                row.display_name()
            ))?;
            if answer != "yes" {
                println!("Cancelled");
                return Ok(());
            }
            client.delete_user(user_id).await?;
            println!("User {} deleted successfully", row.display_name());
        }

        Command::Theme { value } => {
            let storage = client.pipeline().storage();
            match value {
                Some(theme) => {
                    storage
                        .set(StorageKey::Theme, &theme)
                        .context("Failed to save theme")?;
                    println!("Theme set to {}", theme);
                }
                None => {
                    let theme = storage.get(StorageKey::Theme)?;
                    println!("{}", theme.as_deref().unwrap_or("light"));
                }
            }
        }
    }
    Ok(())
}
