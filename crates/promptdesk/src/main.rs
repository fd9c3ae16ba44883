use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{anyhow, Result};
use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand};
use fastrace::prelude::*;
use promptdesk_config::{get_config_path, get_log_dir, Config};
use promptdesk_output::*;
use promptdesk_types::{NewUser, Role, User, UserPatch, AVATAR_PALETTE};
use regex::RegexBuilder;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod profiling;

use app::App;
use profiling::SpanCollector;

static PROFILING_ENABLED: AtomicBool = AtomicBool::new(false);

fn profile_start(name: &str) -> (Instant, &str) {
    (Instant::now(), name)
}

fn profile_end((start, name): (Instant, &str)) {
    if PROFILING_ENABLED.load(Ordering::Relaxed) {
        let elapsed = start.elapsed();
        eprintln!(
            "[profile] {:>8.2}ms  {}",
            elapsed.as_secs_f64() * 1000.0,
            name
        );
    }
}

const MAIN_HELP: &str = r#"promptdesk manages the users of the Prompt Manager dashboard.

Users live in a local LMDB store. The first run seeds three default users
(an admin, a user and an editor). Emails are unique regardless of case, and
ids are never reused after a user is deleted.

`promptdesk users list` is a good starting point. `promptdesk login` picks
the identity the dashboard acts as.

See `promptdesk COMMAND --help` for more documentation and command-specific options."#;

#[derive(Parser)]
#[command(name = "promptdesk")]
#[command(about = MAIN_HELP)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Output as JSON")]
    json: bool,

    #[arg(long, global = true, help = "Print timing information for profiling")]
    profile: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Manage users.")]
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },

    #[command(about = "Log in as a user, by id or email.")]
    Login {
        #[arg(help = "User id or email")]
        user: String,
    },

    #[command(about = "End the current session.")]
    Logout,

    #[command(about = "Show the logged-in user.")]
    Whoami,

    #[command(about = "Show store location and usage.")]
    Info,

    #[command(about = "Print config file location and contents.")]
    Config {
        #[arg(long, help = "Write a default config file if none exists")]
        init: bool,
    },

    #[command(about = "Print help for all commands.")]
    HelpAll,
}

#[derive(Subcommand)]
enum UserCommands {
    #[command(about = "List users in insertion order.")]
    List {
        #[arg(short = 'r', long, help = "Only users with this role")]
        role: Option<Role>,
        #[arg(short = 'n', long, help = "Regex matched against names (case-insensitive)")]
        name: Option<String>,
    },

    #[command(about = "Show a user by id.")]
    Show {
        #[arg(help = "User id")]
        id: u64,
    },

    #[command(about = "Find a user by email (case-insensitive).")]
    Find {
        #[arg(help = "Email address")]
        email: String,
    },

    #[command(about = "Add a user.")]
    Add {
        #[arg(long, help = "Display name")]
        name: String,
        #[arg(long, help = "Email address, must be unique")]
        email: String,
        #[arg(long, help = "Role (default: user)")]
        role: Option<Role>,
    },

    #[command(about = "Update fields of a user.")]
    Update {
        #[arg(help = "User id")]
        id: u64,
        #[arg(long, help = "New display name")]
        name: Option<String>,
        #[arg(long, help = "New email address")]
        email: Option<String>,
        #[arg(long, help = "New role")]
        role: Option<Role>,
        #[arg(
            long,
            value_parser = PossibleValuesParser::new(AVATAR_PALETTE),
            help = "New avatar color"
        )]
        avatar: Option<String>,
    },

    #[command(about = "Delete a user.")]
    Delete {
        #[arg(help = "User id")]
        id: u64,
    },

    #[command(about = "Pick a random user.")]
    Random,

    #[command(about = "List users as selection options (id and label).")]
    Options,

    #[command(about = "Replace all users with the default set.")]
    Reset,
}

fn main() -> Result<()> {
    let total_start = profile_start("total");
    let cli = Cli::parse();

    if cli.profile {
        PROFILING_ENABLED.store(true, Ordering::Relaxed);
    }

    let json = cli.json;
    let result = match cli.command {
        Commands::HelpAll => handle_help_all(),
        Commands::Config { init } => handle_config(init),
        Commands::Users { command } => {
            let name = user_command_name(&command);
            with_app(name, |app| handle_user_command(app, json, command))
        }
        Commands::Login { user } => with_app("login", |app| handle_login(app, json, &user)),
        Commands::Logout => with_app("logout", handle_logout),
        Commands::Whoami => with_app("whoami", |app| handle_whoami(app, json)),
        Commands::Info => with_app("info", |app| handle_info(app, json)),
    };

    profile_end(total_start);
    result
}

/// Loads config, opens the store and runs `run` under a root span named after the command.
fn with_app<F>(name: &'static str, run: F) -> Result<()>
where
    F: FnOnce(&App) -> Result<()>,
{
    let config = Config::load()?;
    init_logging(&config)?;

    let collector: Option<SpanCollector> = PROFILING_ENABLED
        .load(Ordering::Relaxed)
        .then(profiling::install);

    let result = {
        let root = if collector.is_some() {
            Span::root(name, SpanContext::random())
        } else {
            Span::noop()
        };
        let _guard = root.set_local_parent();
        open_and_run(&config, run)
    };

    if let Err(e) = &result {
        error!("{} failed: {:#}", name, e);
    }

    if let Some(collector) = collector {
        fastrace::flush();
        eprintln!("{}", format_profiling(&collector.collect_and_aggregate()));
    }

    result
}

fn open_and_run<F>(config: &Config, run: F) -> Result<()>
where
    F: FnOnce(&App) -> Result<()>,
{
    let open_start = profile_start("open store");
    let app = App::open(config)?;
    profile_end(open_start);
    run(&app)
}

fn user_command_name(command: &UserCommands) -> &'static str {
    match command {
        UserCommands::List { .. } => "users list",
        UserCommands::Show { .. } => "users show",
        UserCommands::Find { .. } => "users find",
        UserCommands::Add { .. } => "users add",
        UserCommands::Update { .. } => "users update",
        UserCommands::Delete { .. } => "users delete",
        UserCommands::Random => "users random",
        UserCommands::Options => "users options",
        UserCommands::Reset => "users reset",
    }
}

fn init_logging(config: &Config) -> Result<()> {
    let log_dir = get_log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("promptdesk.log"))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    Ok(())
}

fn handle_help_all() -> Result<()> {
    use clap::CommandFactory;

    let mut cmd = Cli::command();

    cmd.write_long_help(&mut std::io::stdout())?;
    println!("\n");

    let subcommands: Vec<_> = cmd
        .get_subcommands()
        .map(|c| c.get_name().to_string())
        .collect();
    for name in subcommands {
        if name == "help-all" || name == "help" {
            continue;
        }
        let mut subcmd = Cli::command();
        if let Some(sub) = subcmd.find_subcommand_mut(&name) {
            println!(
                "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
            );
            println!("promptdesk {}", name);
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
            sub.write_long_help(&mut std::io::stdout())?;
            println!("\n");
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn filter_users(users: Vec<User>, role: Option<Role>, name: Option<&str>) -> Result<Vec<User>> {
    let name_re = match name {
        Some(pattern) => Some(
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| anyhow!("Invalid name pattern: {}", e))?,
        ),
        None => None,
    };

    Ok(users
        .into_iter()
        .filter(|u| role.map_or(true, |r| u.role == r))
        .filter(|u| name_re.as_ref().map_or(true, |re| re.is_match(&u.name)))
        .collect())
}

fn handle_user_command(app: &App, json_output: bool, command: UserCommands) -> Result<()> {
    let registry = &app.registry;

    match command {
        UserCommands::List { role, name } => {
            let users = filter_users(registry.list_users()?, role, name.as_deref())?;
            if json_output {
                print_json(&users)?;
            } else {
                println!("{}", format_users(&users));
            }
        }
        UserCommands::Show { id } => {
            let user = registry
                .get_user_by_id(id)?
                .ok_or_else(|| anyhow!("No user with id {}", id))?;
            print_user(&user, json_output)?;
        }
        UserCommands::Find { email } => {
            let user = registry
                .get_user_by_email(&email)?
                .ok_or_else(|| anyhow!("No user with email {}", email))?;
            print_user(&user, json_output)?;
        }
        UserCommands::Add { name, email, role } => {
            let mut input = NewUser::new(name, email);
            input.role = role;
            let user = registry.add_user(input)?;
            info!("Added user {} <{}>", user.id, user.email);
            if json_output {
                print_json(&user)?;
            } else {
                println!("Added user:\n{}", format_user(&user));
            }
        }
        UserCommands::Update {
            id,
            name,
            email,
            role,
            avatar,
        } => {
            let patch = UserPatch {
                name,
                role,
                email,
                avatar,
            };
            let user = registry.update_user(id, patch)?;
            info!("Updated user {}", user.id);
            if json_output {
                print_json(&user)?;
            } else {
                println!("Updated user:\n{}", format_user(&user));
            }
        }
        UserCommands::Delete { id } => {
            let user = registry.delete_user(id)?;
            info!("Deleted user {} <{}>", user.id, user.email);
            if json_output {
                print_json(&user)?;
            } else {
                println!("Deleted user #{} {}", user.id, user.name);
            }
        }
        UserCommands::Random => {
            let user = registry.get_random_user()?;
            print_user(&user, json_output)?;
        }
        UserCommands::Options => {
            let options = registry.list_for_selection()?;
            if json_output {
                print_json(&options)?;
            } else {
                println!("{}", format_selection_options(&options));
            }
        }
        UserCommands::Reset => {
            let users = registry.reset()?;
            info!("Reset registry to {} default users", users.len());
            if json_output {
                print_json(&users)?;
            } else {
                println!("Reset to default users:\n{}", format_users(&users));
            }
        }
    }
    Ok(())
}

fn print_user(user: &User, json_output: bool) -> Result<()> {
    if json_output {
        print_json(user)
    } else {
        println!("{}", format_user(user));
        Ok(())
    }
}

fn resolve_user(app: &App, target: &str) -> Result<User> {
    let found = match target.trim().parse::<u64>() {
        Ok(id) => app.registry.get_user_by_id(id)?,
        Err(_) => app.registry.get_user_by_email(target)?,
    };
    found.ok_or_else(|| anyhow!("No user matching {}\nRun: promptdesk users list", target))
}

fn handle_login(app: &App, json_output: bool, target: &str) -> Result<()> {
    let user = resolve_user(app, target)?;
    app.sessions.login(&user)?;
    info!("Logged in as user {}", user.id);
    if json_output {
        print_json(&user)
    } else {
        println!("{}", format_session(Some(&user)));
        Ok(())
    }
}

fn handle_logout(app: &App) -> Result<()> {
    if app.sessions.logout()? {
        info!("Logged out");
        println!("Logged out");
    } else {
        println!("Not logged in");
    }
    Ok(())
}

fn handle_whoami(app: &App, json_output: bool) -> Result<()> {
    let current = app.sessions.current()?;
    if json_output {
        print_json(&current)
    } else {
        println!("{}", format_session(current.as_ref()));
        Ok(())
    }
}

fn handle_info(app: &App, json_output: bool) -> Result<()> {
    let info = app.store_info()?;
    if json_output {
        print_json(&info)
    } else {
        println!("{}", format_store_info(&info));
        Ok(())
    }
}

fn handle_config(init: bool) -> Result<()> {
    let config_path = get_config_path();
    println!("Config file: {}", config_path.display());
    println!();

    if init && !config_path.exists() {
        Config::default().save()?;
        println!("(wrote default config)");
    }

    if config_path.exists() {
        println!("{}", std::fs::read_to_string(&config_path)?);
    } else {
        println!("(file does not exist, using defaults)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn users() -> Vec<User> {
        serde_json::from_str(
            r#"[
                {"id":1,"name":"Sarah Johnson","role":"admin","email":"sarah@company.com","avatar":"bg-blue-500","createdAt":"2024-01-01T00:00:00Z"},
                {"id":2,"name":"Mike Chen","role":"user","email":"mike@company.com","avatar":"bg-green-500","createdAt":"2024-01-01T00:00:00Z"},
                {"id":3,"name":"Emily Davis","role":"editor","email":"emily@company.com","avatar":"bg-purple-500","createdAt":"2024-01-01T00:00:00Z"}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_filter_users() {
        let ids = |users: Vec<User>| users.iter().map(|u| u.id).collect::<Vec<_>>();

        assert_eq!(ids(filter_users(users(), None, None).unwrap()), vec![1, 2, 3]);
        assert_eq!(
            ids(filter_users(users(), Some(Role::Editor), None).unwrap()),
            vec![3]
        );
        assert_eq!(ids(filter_users(users(), None, Some("^m")).unwrap()), vec![2]);
        assert_eq!(
            ids(filter_users(users(), Some(Role::Admin), Some("chen")).unwrap()),
            Vec::<u64>::new()
        );
        assert!(filter_users(users(), None, Some("(")).is_err());
    }

    #[test]
    fn test_parse_update_command() {
        let cli = Cli::try_parse_from([
            "promptdesk",
            "users",
            "update",
            "2",
            "--role",
            "Manager",
            "--avatar",
            "bg-teal-500",
        ])
        .unwrap();
        match cli.command {
            Commands::Users {
                command: UserCommands::Update { id, role, avatar, .. },
            } => {
                assert_eq!(id, 2);
                assert_eq!(role, Some(Role::Manager));
                assert_eq!(avatar.as_deref(), Some("bg-teal-500"));
            }
            _ => panic!("expected users update"),
        }

        assert!(Cli::try_parse_from([
            "promptdesk",
            "users",
            "update",
            "2",
            "--avatar",
            "plaid",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "promptdesk",
            "users",
            "add",
            "--name",
            "X",
            "--email",
            "x@y",
            "--role",
            "owner",
        ])
        .is_err());
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::try_parse_from(["promptdesk", "config", "--init"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { init: true }));

        let cli = Cli::try_parse_from(["promptdesk", "config"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { init: false }));
    }

    #[test]
    fn test_user_command_names() {
        let cli = Cli::try_parse_from(["promptdesk", "users", "delete", "4"]).unwrap();
        match cli.command {
            Commands::Users { command } => assert_eq!(user_command_name(&command), "users delete"),
            _ => panic!("expected users delete"),
        }
    }
}
