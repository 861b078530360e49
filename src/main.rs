use clap::{Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use credential_gate::auth::{read_password, CredentialWorkflow, JsonFileStore, RoleSet};
use credential_gate::utils::io::prompt_with_confirmation;
use credential_gate::utils::logging::initialize_logging;
use credential_gate::utils::time::{
    format_duration, format_timestamp, get_current_timestamp, parse_duration, parse_local_datetime,
};
use credential_gate::{
    EmailFormatValidator, GateConfig, PasswordPolicyEvaluator, UsernameValidator,
    ValidationVerdict,
};

const CONFIG_FILE: &str = "credential_gate.json";

fn password_arg() -> Arg {
    Arg::new("password")
        .long("password")
        .help("Password; prompted for without echo when omitted")
        .value_name("PASSWORD")
}

fn build_cli() -> Command {
    Command::new("credential-gate")
        .about("Validate account credentials and manage invitation codes")
        .arg(
            Arg::new("config")
                .long("config")
                .help("Path of the JSON configuration file")
                .value_name("PATH")
                .global(true),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .help("Path of the record store, overriding the configuration")
                .value_name("PATH")
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("check-username")
                .about("Validate a username")
                .arg(Arg::new("username").required(true)),
        )
        .subcommand(
            Command::new("check-password")
                .about("Evaluate a password against the policy")
                .arg(Arg::new("password").help("Password; prompted for when omitted")),
        )
        .subcommand(
            Command::new("check-email")
                .about("Validate an email address")
                .arg(Arg::new("email").required(true)),
        )
        .subcommand(
            Command::new("check-registration")
                .about("Validate all registration fields at once")
                .arg(Arg::new("username").required(true))
                .arg(Arg::new("email").required(true))
                .arg(password_arg()),
        )
        .subcommand(
            Command::new("invite")
                .about("Generate an invitation code")
                .arg(
                    Arg::new("roles")
                        .long("roles")
                        .help("Comma-separated roles, e.g. student,reviewer")
                        .required(true),
                )
                .arg(
                    Arg::new("expires-in")
                        .long("expires-in")
                        .help("Lifetime such as 30m, 12h or 7d")
                        .conflicts_with("expires-at"),
                )
                .arg(
                    Arg::new("expires-at")
                        .long("expires-at")
                        .help("Local expiry time, YYYY-MM-DD HH:MM:SS"),
                ),
        )
        .subcommand(
            Command::new("redeem")
                .about("Consume an invitation code and print its roles")
                .arg(Arg::new("code").required(true)),
        )
        .subcommand(
            Command::new("role-of")
                .about("Show the roles of an invitation code without consuming it")
                .arg(Arg::new("code").required(true)),
        )
        .subcommand(
            Command::new("register")
                .about("Create an account with an invitation code")
                .arg(Arg::new("username").required(true))
                .arg(Arg::new("email").required(true))
                .arg(Arg::new("code").required(true))
                .arg(password_arg()),
        )
        .subcommand(
            Command::new("setup-admin")
                .about("Create the first administrator account")
                .arg(Arg::new("username").required(true))
                .arg(Arg::new("email").required(true))
                .arg(password_arg()),
        )
        .subcommand(
            Command::new("login")
                .about("Check a username and password")
                .arg(Arg::new("username").required(true))
                .arg(password_arg()),
        )
        .subcommand(
            Command::new("reset-password")
                .about("Issue a one-time password for a user")
                .arg(Arg::new("username").required(true)),
        )
        .subcommand(
            Command::new("change-password")
                .about("Set a new password and clear a pending reset")
                .arg(Arg::new("username").required(true))
                .arg(password_arg()),
        )
        .subcommand(
            Command::new("set-roles")
                .about("Replace the roles of a user")
                .arg(Arg::new("username").required(true))
                .arg(Arg::new("roles").required(true)),
        )
        .subcommand(
            Command::new("update-email")
                .about("Change the email address of a user")
                .arg(Arg::new("username").required(true))
                .arg(Arg::new("email").required(true)),
        )
        .subcommand(
            Command::new("update-profile")
                .about("Rewrite a user's username, email and password")
                .arg(Arg::new("username").required(true).help("Current username"))
                .arg(
                    Arg::new("new-username")
                        .long("new-username")
                        .help("New username; unchanged when omitted")
                        .value_name("USERNAME"),
                )
                .arg(Arg::new("email").required(true))
                .arg(password_arg()),
        )
        .subcommand(
            Command::new("delete-user")
                .about("Delete a user")
                .arg(Arg::new("username").required(true))
                .arg(
                    Arg::new("yes")
                        .long("yes")
                        .help("Skip the confirmation prompt")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("list-users").about("List all users"))
        .subcommand(
            Command::new("purge-invitations").about("Remove consumed and expired invitation codes"),
        )
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or_default()
}

/// Take the password from `--password` or prompt for it
fn password_from(matches: &ArgMatches, prompt: &str) -> io::Result<String> {
    if let Some(password) = matches.get_one::<String>("password") {
        return Ok(password.clone());
    }
    print!("{}", prompt);
    io::stdout().flush()?;
    read_password()
}

/// Print a verdict, pointing at the offending character when there is one
fn report(label: &str, input: &str, verdict: &ValidationVerdict) -> bool {
    if verdict.ok {
        println!("{}: ok", label);
        return true;
    }
    println!("{}: {}", label, verdict.message);
    if let Some(index) = verdict.error_index {
        if !input.is_empty() && index <= input.chars().count() {
            println!("  {}", input);
            println!("  {}^", " ".repeat(index));
        }
    }
    false
}

fn exit_for(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(matches: ArgMatches) -> Result<ExitCode, Box<dyn Error>> {
    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let mut config = GateConfig::load(&config_path)?;
    if let Some(store) = matches.get_one::<String>("store") {
        config.store_path = PathBuf::from(store);
    }

    if let Err(e) = initialize_logging(&config.log_file, config.level_filter()) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let (name, sub) = match matches.subcommand() {
        Some(pair) => pair,
        None => return Ok(ExitCode::FAILURE),
    };

    // Pure checks need no store
    match name {
        "check-username" => {
            let username = required(sub, "username");
            return Ok(exit_for(report(
                "username",
                username,
                &UsernameValidator::validate(username),
            )));
        }
        "check-password" => {
            let password = match sub.get_one::<String>("password") {
                Some(password) => password.clone(),
                None => {
                    print!("Password: ");
                    io::stdout().flush()?;
                    read_password()?
                }
            };
            // Never echo the password itself
            let verdict = PasswordPolicyEvaluator::evaluate(&password);
            return Ok(exit_for(report("password", "", &verdict)));
        }
        "check-email" => {
            let email = required(sub, "email");
            return Ok(exit_for(report(
                "email",
                email,
                &EmailFormatValidator::validate(email),
            )));
        }
        "check-registration" => {
            let username = required(sub, "username");
            let email = required(sub, "email");
            let password = password_from(sub, "Password: ")?;
            let check = CredentialWorkflow::check_fields(username, &password, email);
            let username_ok = report("username", username, &check.username);
            let password_ok = report("password", "", &check.password);
            let email_ok = report("email", email, &check.email);
            return Ok(exit_for(username_ok && password_ok && email_ok));
        }
        _ => {}
    }

    let store = JsonFileStore::open(&config.store_path)?;
    let workflow = CredentialWorkflow::from_config(Arc::new(store), &config);

    match name {
        "invite" => {
            let roles = RoleSet::parse(required(sub, "roles"))?;
            let now = get_current_timestamp();
            let expires_at = if let Some(at) = sub.get_one::<String>("expires-at") {
                parse_local_datetime(at).ok_or_else(|| format!("invalid date and time: {}", at))?
            } else {
                let ttl = match sub.get_one::<String>("expires-in") {
                    Some(text) => parse_duration(text).ok_or_else(|| format!("invalid duration: {}", text))?,
                    None => config.default_invitation_ttl_secs,
                };
                now.saturating_add(ttl)
            };
            if expires_at <= now {
                eprintln!("Warning: this invitation is already expired");
            }

            let code = workflow.generate_invitation(&roles, expires_at)?;
            println!("Invitation code: {}", code);
            println!("Roles: {}", roles);
            println!(
                "Expires: {} UTC (in {})",
                format_timestamp(expires_at),
                format_duration(expires_at.saturating_sub(now))
            );
        }
        "redeem" => {
            let roles = workflow.redeem_invitation(required(sub, "code"))?;
            println!("Code accepted; roles: {}", roles);
        }
        "role-of" => {
            let code = required(sub, "code");
            let tokens = workflow.tokens();
            match (tokens.role_of(code)?, tokens.state_at(code, get_current_timestamp())?) {
                (Some(roles), Some(state)) => println!("{} ({:?})", roles, state),
                _ => {
                    println!("Unknown invitation code");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        "register" => {
            let password = password_from(sub, "Password: ")?;
            let user = workflow.register(
                required(sub, "username"),
                &password,
                required(sub, "email"),
                required(sub, "code"),
            )?;
            println!("Account {} created with roles {}", user.username, user.roles);
        }
        "setup-admin" => {
            let password = password_from(sub, "Administrator password: ")?;
            let user = workflow.register_initial_admin(
                required(sub, "username"),
                &password,
                required(sub, "email"),
            )?;
            println!("Administrator {} created", user.username);
        }
        "login" => {
            let password = password_from(sub, "Password: ")?;
            let outcome = workflow.login(required(sub, "username"), &password)?;
            println!("Welcome, {} ({})", outcome.username, outcome.roles);
            if outcome.password_reset_pending {
                println!("A password reset is pending; run change-password before continuing.");
            }
        }
        "reset-password" => {
            let otp = workflow.admin_reset_password(required(sub, "username"))?;
            println!("One-time password: {}", otp);
        }
        "change-password" => {
            let password = password_from(sub, "New password: ")?;
            workflow.change_password(required(sub, "username"), &password)?;
            println!("Password updated");
        }
        "set-roles" => {
            let roles = RoleSet::parse(required(sub, "roles"))?;
            workflow.set_roles(required(sub, "username"), roles)?;
            println!("Roles updated");
        }
        "update-email" => {
            workflow.update_email(required(sub, "username"), required(sub, "email"))?;
            println!("Email updated");
        }
        "update-profile" => {
            let old_username = required(sub, "username");
            let username = sub
                .get_one::<String>("new-username")
                .map(String::as_str)
                .unwrap_or(old_username);
            let password = password_from(sub, "New password: ")?;
            let user = workflow.update_profile(old_username, username, &password, required(sub, "email"))?;
            println!("Profile of {} updated", user.username);
        }
        "delete-user" => {
            let username = required(sub, "username");
            let confirmed = sub.get_flag("yes")
                || prompt_with_confirmation(&format!("Delete user {}?", username))?;
            if !confirmed {
                println!("Cancelled");
                return Ok(ExitCode::SUCCESS);
            }
            if workflow.delete_user(username)? {
                println!("User {} deleted", username);
            } else {
                println!("No user named {}", username);
                return Ok(ExitCode::FAILURE);
            }
        }
        "list-users" => {
            for user in workflow.list_users()? {
                println!(
                    "{:<16} {:<32} {:<24} {}",
                    user.username,
                    user.email,
                    user.roles,
                    if user.password_reset_pending { "reset pending" } else { "" }
                );
            }
        }
        "purge-invitations" => {
            let removed = workflow.tokens().purge_inactive(get_current_timestamp())?;
            println!("Removed {} inactive invitation codes", removed);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            return Ok(ExitCode::FAILURE);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let matches = build_cli().get_matches();
    match run(matches) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_invite_arguments() {
        let matches = build_cli()
            .try_get_matches_from(["credential-gate", "invite", "--roles", "student,staff", "--expires-in", "2h"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "invite");
        assert_eq!(required(sub, "roles"), "student,staff");
        assert_eq!(sub.get_one::<String>("expires-in").map(String::as_str), Some("2h"));
    }

    #[test]
    fn test_update_profile_arguments() {
        let matches = build_cli()
            .try_get_matches_from([
                "credential-gate",
                "update-profile",
                "Alice01",
                "alice@example.com",
                "--new-username",
                "Alicia.B",
                "--password",
                "N3w~Passw0rd",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "update-profile");
        assert_eq!(required(sub, "username"), "Alice01");
        assert_eq!(required(sub, "new-username"), "Alicia.B");
        assert_eq!(password_from(sub, "").unwrap(), "N3w~Passw0rd");
    }

    #[test]
    fn test_expiry_options_conflict() {
        let result = build_cli().try_get_matches_from([
            "credential-gate",
            "invite",
            "--roles",
            "student",
            "--expires-in",
            "2h",
            "--expires-at",
            "2030-01-01 00:00:00",
        ]);
        assert!(result.is_err());
    }
}
