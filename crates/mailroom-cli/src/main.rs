//! Mailroom CLI
//!
//! Command-line client for the Mailroom mail service: accounts, folders,
//! mail, server sync and AI classification.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use mailroom_core::api::ApiClient;
use mailroom_core::mailbox::MailboxSession;
use mailroom_core::models::{
    flatten_folders, format_remaining, Gender, JobState, MailQuery, SyncStatus, VirtualFolder,
};
use mailroom_core::orchestrator::{ClassificationOutcome, MailboxEvent, NoticeLevel};
use mailroom_core::token_store::create_token_store;
use mailroom_core::validate::{format_phone, ChangePasswordForm, LoginForm, SignupForm};
use mailroom_core::Config;

#[derive(Parser)]
#[command(name = "mailroom")]
#[command(about = "Mailroom - mail client with server-side sync and AI folder classification")]
#[command(long_about = "Mailroom talks to a Mailroom mail server. The server syncs your mailbox and \
sorts incoming mail into folders with AI classification; this CLI drives both.

QUICK START:
  1. Sign in:            mailroom auth login --email you@example.com
  2. Start a sync:       mailroom sync start --wait
  3. List mail:          mailroom mail list --view unread
  4. Classify backlog:   mailroom classify start --wait

OUTPUT FORMAT:
  All commands output JSON by default (best for scripting).
  Add --human for terminal-friendly output.

SERVER:
  The API base URL comes from ~/.config/mailroom/config.toml ([api] base_url)
  and can be overridden with MAILROOM_API_URL.

EXAMPLES:
  mailroom mail list --folder 12 --search invoice
  mailroom mail bulk-move 101 102 103 --folder 12
  mailroom classify status")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in human-readable format instead of JSON. Applies to all subcommands.
    #[arg(long, global = true)]
    human: bool,

    /// Log progress to stderr (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Register, sign in and manage the account.
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// List and manage mail folders.
    Folder {
        #[command(subcommand)]
        command: FolderCommands,
    },
    /// List, read and organize mail.
    Mail {
        #[command(subcommand)]
        command: MailCommands,
    },
    /// Check, start or stop the server-side mailbox sync.
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Check, start or stop AI classification of unclassified mail.
    Classify {
        #[command(subcommand)]
        command: ClassifyCommands,
    },
    /// View or change local settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

// ============================================================================
// Auth Commands
// ============================================================================

#[derive(Subcommand)]
enum AuthCommands {
    /// Create an account. Missing fields are prompted for.
    #[command(long_about = "Create a new account.

The username is taken from the local part of the email address. The email is
checked for availability before the form is submitted. Passwords are always
prompted for and never accepted as arguments.

EXAMPLES:
  mailroom auth register --email you@example.com --birth-date 1990-04-01 --phone 01012345678")]
    Register {
        #[arg(long)]
        email: Option<String>,
        /// Birth date (YYYY-MM-DD)
        #[arg(long)]
        birth_date: Option<String>,
        /// Phone number, digits or 010-1234-5678
        #[arg(long)]
        phone: Option<String>,
        /// M, F or O
        #[arg(long)]
        gender: Option<Gender>,
    },
    /// Sign in and store the session locally.
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Forget the stored session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Check whether an email address is free to register.
    #[command(name = "check-email")]
    CheckEmail { email: String },
    /// Change the account password.
    Passwd,
}

// ============================================================================
// Folder Commands
// ============================================================================

#[derive(Subcommand)]
enum FolderCommands {
    /// List folders as a flattened tree with unread/total counts.
    List,
    /// Create a folder.
    Create {
        name: String,
        /// Parent folder ID for a nested folder
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Rename a folder.
    Rename { id: i64, name: String },
    /// Delete a folder.
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(long)]
        confirm: bool,
    },
}

// ============================================================================
// Mail Commands
// ============================================================================

#[derive(Subcommand)]
enum MailCommands {
    /// List one page of mail.
    #[command(long_about = "List one page of mail.

SCOPE (pick one, default --view all):
  --view <name>   Built-in view: all, unread, starred, unclassified
  --folder <id>   A folder by ID (see 'mailroom folder list')

RESPONSE FIELDS:
  mails       - id, subject, from, received_at, is_read, is_starred, is_classified,
                has_attachments, folder
  pagination  - total_count, total_pages, current_page, page_size

EXAMPLES:
  mailroom mail list --view unclassified
  mailroom mail list --folder 12 --search invoice --page 2")]
    List {
        #[arg(long, conflicts_with = "folder")]
        view: Option<VirtualFolder>,
        #[arg(long)]
        folder: Option<i64>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Show a mail. Opening a mail marks it as read.
    Show {
        id: i64,
        /// Print the raw HTML body instead of converting it to text
        #[arg(long)]
        html: bool,
    },
    /// Toggle the star on a mail.
    Star { id: i64 },
    /// Move a mail to a folder.
    Move {
        id: i64,
        #[arg(long)]
        folder: i64,
    },
    /// Delete a mail.
    Delete {
        id: i64,
        #[arg(long)]
        confirm: bool,
    },
    /// Mark mails as read.
    Read {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Mark mails as unread.
    Unread {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Move several mails to a folder.
    #[command(name = "bulk-move")]
    BulkMove {
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        folder: i64,
    },
    /// Delete several mails.
    #[command(name = "bulk-delete")]
    BulkDelete {
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        confirm: bool,
    },
    /// Download an attachment.
    Attachment {
        mail_id: i64,
        attachment_id: String,
        /// Directory to save into (default: current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand)]
enum SyncCommands {
    /// Show the current server sync status.
    #[command(long_about = "Show the current server sync status.

RESPONSE FIELDS:
  sync_id              - ID of the latest sync (may be null)
  state                - idle, pending, in_progress, completed, failed, cancelled
  type                 - initial or incremental
  progress             - total, synced, classified, percentage
  estimated_remaining  - seconds left, server estimate (may be null)")]
    Status,
    /// Start a sync.
    Start {
        /// Follow the sync until it finishes
        #[arg(long)]
        wait: bool,
    },
    /// Stop the running sync.
    Stop,
}

// ============================================================================
// Classify Commands
// ============================================================================

#[derive(Subcommand)]
enum ClassifyCommands {
    /// Show the unclassified backlog, or one classification job.
    Status {
        /// Classification job ID
        #[arg(long)]
        id: Option<String>,
    },
    /// Start classifying unclassified mail.
    #[command(long_about = "Start classifying unclassified mail.

The server classifies in batches. With --wait, the CLI follows each batch
and keeps starting new ones until the backlog is empty, printing overall
progress. Ctrl+C stops the run.")]
    Start {
        #[arg(long)]
        wait: bool,
    },
    /// Stop a classification job.
    Stop { id: String },
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show settings; any flag given is changed and saved first.
    #[command(alias = "settings")]
    Show {
        /// API base URL including the version prefix
        #[arg(long)]
        api_url: Option<String>,
        /// Start classification automatically (daemon)
        #[arg(long)]
        auto_classify: Option<bool>,
        /// Mails per page
        #[arg(long)]
        page_size: Option<u32>,
        /// Write daemon logs to files
        #[arg(long)]
        log_to_file: Option<bool>,
    },
    /// Write a config file with default settings.
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// JSON Output Types
// ============================================================================

#[derive(Serialize)]
struct MailRow {
    id: i64,
    subject: String,
    from: String,
    received_at: String,
    is_read: bool,
    is_starred: bool,
    is_classified: bool,
    has_attachments: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder: Option<String>,
}

#[derive(Serialize)]
struct BacklogStatus {
    unclassified: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync_state: Option<JobState>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let human = cli.human;

    let result = match cli.command {
        Commands::Auth { command } => handle_auth_command(command, human).await,
        Commands::Folder { command } => handle_folder_command(command, human).await,
        Commands::Mail { command } => handle_mail_command(command, human).await,
        Commands::Sync { command } => handle_sync_command(command, human).await,
        Commands::Classify { command } => handle_classify_command(command, human).await,
        Commands::Config { command } => handle_config_command(command, human).await,
    };

    if let Err(e) = &result {
        if let Some(hint) = e
            .downcast_ref::<mailroom_core::Error>()
            .and_then(|e| e.action_hint())
        {
            eprintln!("{}", hint);
        }
    }
    result
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|_| {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    })
}

fn connect(config: &Config) -> Result<Arc<ApiClient>> {
    let tokens = create_token_store(config);
    Ok(Arc::new(ApiClient::new(&config.api, tokens)?))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_success(human: bool, message: &str) -> Result<()> {
    if human {
        println!("✅ {}", message);
        Ok(())
    } else {
        print_json(&json!({ "success": true, "message": message }))
    }
}

fn print_failure(human: bool, message: &str) -> Result<()> {
    if human {
        println!("❌ {}", message);
        Ok(())
    } else {
        print_json(&json!({ "success": false, "error": message }))
    }
}

fn confirm(prompt: &str, confirmed: bool) -> Result<bool> {
    if confirmed {
        return Ok(true);
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

fn format_local(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

// ============================================================================
// Auth Command Handlers
// ============================================================================

async fn handle_auth_command(command: AuthCommands, human: bool) -> Result<()> {
    let config = load_config();
    let api = connect(&config)?;

    match command {
        AuthCommands::Register {
            email,
            birth_date,
            phone,
            gender,
        } => {
            let email = match email {
                Some(email) => email,
                None => Input::new().with_prompt("Email").interact_text()?,
            };
            let email_available = Some(api.check_email(email.trim()).await?);
            let password = Password::new()
                .with_prompt("Password")
                .with_confirmation("Confirm password", "Passwords do not match")
                .interact()?;
            let birth_date = match birth_date {
                Some(date) => date,
                None => Input::new()
                    .with_prompt("Birth date (YYYY-MM-DD)")
                    .interact_text()?,
            };
            let phone = match phone {
                Some(phone) => phone,
                None => Input::new().with_prompt("Phone number").interact_text()?,
            };

            let form = SignupForm {
                email,
                password_confirm: password.clone(),
                password,
                birth_date,
                phone: format_phone(&phone),
                gender,
                email_available,
            };
            let request = match form.validate() {
                Ok(request) => request,
                Err(errors) => {
                    if human {
                        println!("❌ Please fix the following:");
                        for (field, message) in errors.iter() {
                            println!("   {}: {}", field, message);
                        }
                        return Ok(());
                    }
                    return print_json(&json!({ "success": false, "errors": errors }));
                }
            };

            match api.signup(&request).await {
                Ok(user) => {
                    if human {
                        println!("✅ Account created for {}", user.email);
                        println!("   Sign in with: mailroom auth login --email {}", user.email);
                        Ok(())
                    } else {
                        print_json(&json!({ "success": true, "user": user }))
                    }
                }
                Err(e) => {
                    let errors = mailroom_core::validate::FieldErrors::from_signup_error(&e);
                    if human {
                        print_failure(true, &errors.to_string())
                    } else {
                        print_json(&json!({ "success": false, "errors": errors }))
                    }
                }
            }
        }

        AuthCommands::Login { email } => {
            let email = match email {
                Some(email) => email,
                None => Input::new().with_prompt("Email").interact_text()?,
            };
            let password = Password::new().with_prompt("Password").interact()?;
            let request = LoginForm { email, password }
                .validate()
                .map_err(mailroom_core::Error::from)?;

            let user = api.login(&request).await?;
            if human {
                println!("✅ Signed in as {} ({})", user.username, user.email);
                Ok(())
            } else {
                print_json(&json!({ "success": true, "user": user }))
            }
        }

        AuthCommands::Logout => {
            api.logout().await?;
            print_success(human, "Signed out")
        }

        AuthCommands::Whoami => {
            let user = api.me().await?;
            if human {
                println!("{} <{}>", user.username, user.email);
                if let Some(phone) = &user.phone_number {
                    println!("   Phone: {}", phone);
                }
                if let Some(birth_date) = user.birth_date {
                    println!("   Birth date: {}", birth_date);
                }
                if let Some(last_sync) = user.last_sync_at {
                    println!("   Last sync: {}", format_local(last_sync));
                }
                Ok(())
            } else {
                print_json(&user)
            }
        }

        AuthCommands::CheckEmail { email } => {
            if !mailroom_core::validate::is_valid_email(&email) {
                return print_failure(human, "Enter a valid email address");
            }
            let available = api.check_email(&email).await?;
            if human {
                if available {
                    println!("✅ {} is available", email);
                } else {
                    println!("❌ {} is already in use", email);
                }
                Ok(())
            } else {
                print_json(&json!({ "email": email, "available": available }))
            }
        }

        AuthCommands::Passwd => {
            let current_password = Password::new().with_prompt("Current password").interact()?;
            let new_password = Password::new()
                .with_prompt("New password")
                .with_confirmation("Confirm new password", "Passwords do not match")
                .interact()?;
            let request = ChangePasswordForm {
                current_password,
                new_password_confirm: new_password.clone(),
                new_password,
            }
            .validate()
            .map_err(mailroom_core::Error::from)?;

            api.change_password(&request).await?;
            print_success(human, "Password changed")
        }
    }
}

// ============================================================================
// Folder Command Handlers
// ============================================================================

async fn handle_folder_command(command: FolderCommands, human: bool) -> Result<()> {
    let config = load_config();
    let api = connect(&config)?;

    match command {
        FolderCommands::List => {
            let folders = api.list_folders().await?;
            let flat = flatten_folders(&folders);
            if human {
                if flat.is_empty() {
                    println!("No folders.");
                }
                for folder in &flat {
                    println!(
                        "{}{:<24} {:>5} unread / {:>5}   (id {})",
                        "  ".repeat(folder.depth),
                        folder.name,
                        folder.unread_count,
                        folder.mail_count,
                        folder.id
                    );
                }
                Ok(())
            } else {
                print_json(&flat)
            }
        }

        FolderCommands::Create { name, parent } => {
            api.create_folder(&name, parent).await?;
            print_success(human, &format!("Folder \"{}\" created", name))
        }

        FolderCommands::Rename { id, name } => {
            api.rename_folder(id, &name).await?;
            print_success(human, &format!("Folder renamed to \"{}\"", name))
        }

        FolderCommands::Delete { id, confirm: confirmed } => {
            if !confirm(&format!("Delete folder {}?", id), confirmed)? {
                return print_failure(human, "Cancelled");
            }
            api.delete_folder(id).await?;
            print_success(human, "Folder deleted")
        }
    }
}

// ============================================================================
// Mail Command Handlers
// ============================================================================

async fn handle_mail_command(command: MailCommands, human: bool) -> Result<()> {
    let config = load_config();
    let api = connect(&config)?;

    match command {
        MailCommands::List {
            view,
            folder,
            search,
            page,
            page_size,
        } => {
            let mut query = MailQuery {
                page: page.max(1),
                page_size: page_size.unwrap_or(config.mailbox.page_size),
                folder_id: folder,
                search,
                ..Default::default()
            };
            if folder.is_none() {
                query.filter = view.unwrap_or(VirtualFolder::All).filter();
            }

            let result = api.list_mails(&query).await?;
            if human {
                let p = &result.pagination;
                println!(
                    "\nPage {}/{} ({} mails)\n",
                    p.current_page,
                    p.total_pages.max(1),
                    p.total_count
                );
                for mail in &result.mails {
                    let flags = format!(
                        "{}{}{}",
                        if mail.is_read { ' ' } else { '●' },
                        if mail.is_starred { '★' } else { ' ' },
                        if mail.has_attachments { '📎' } else { ' ' },
                    );
                    println!(
                        "{} {:>7}  {}  {:<24}  {}",
                        flags,
                        mail.id,
                        format_local(mail.received_at),
                        truncate(mail.from.display_name(), 24),
                        mail.subject
                    );
                }
                if p.has_next() {
                    println!("\nNext: --page {}", p.current_page + 1);
                }
                Ok(())
            } else {
                let rows: Vec<MailRow> = result
                    .mails
                    .iter()
                    .map(|m| MailRow {
                        id: m.id,
                        subject: m.subject.clone(),
                        from: m.from.to_string(),
                        received_at: m.received_at.to_rfc3339(),
                        is_read: m.is_read,
                        is_starred: m.is_starred,
                        is_classified: m.is_classified,
                        has_attachments: m.has_attachments,
                        folder: m.folder.as_ref().map(|f| f.name.clone()),
                    })
                    .collect();
                print_json(&json!({ "mails": rows, "pagination": result.pagination }))
            }
        }

        MailCommands::Show { id, html } => {
            let mail = api.get_mail(id).await?;
            if !human {
                return print_json(&mail);
            }

            println!("Subject: {}", mail.subject);
            println!("From:    {}", mail.from);
            if !mail.to.is_empty() {
                let to: Vec<String> = mail.to.iter().map(|a| a.to_string()).collect();
                println!("To:      {}", to.join(", "));
            }
            if !mail.cc.is_empty() {
                let cc: Vec<String> = mail.cc.iter().map(|a| a.to_string()).collect();
                println!("Cc:      {}", cc.join(", "));
            }
            println!("Date:    {}", format_local(mail.received_at));
            if let Some(folder) = &mail.folder {
                println!("Folder:  {}", folder.name);
            }
            println!();

            let body = match (&mail.body_html, html) {
                (Some(body_html), true) => body_html.clone(),
                (Some(body_html), false) if mail.body_text.trim().is_empty() => {
                    html2text::from_read(body_html.as_bytes(), 100)
                        .unwrap_or_else(|_| body_html.clone())
                }
                _ => mail.body_text.clone(),
            };
            println!("{}", body.trim_end());

            if !mail.attachments.is_empty() {
                println!("\n📎 Attachments:");
                for attachment in &mail.attachments {
                    println!(
                        "   {}  {} ({})",
                        attachment.id,
                        attachment.name,
                        attachment.size_human()
                    );
                }
            }
            Ok(())
        }

        MailCommands::Star { id } => {
            let starred = !api.get_mail(id).await?.is_starred;
            api.set_starred(id, starred).await?;
            if human {
                println!("{} Mail {}", if starred { "★ Starred" } else { "☆ Unstarred" }, id);
                Ok(())
            } else {
                print_json(&json!({ "success": true, "id": id, "is_starred": starred }))
            }
        }

        MailCommands::Move { id, folder } => {
            api.move_mail(id, folder).await?;
            print_success(human, "Mail moved")
        }

        MailCommands::Delete { id, confirm: confirmed } => {
            if !confirm(&format!("Delete mail {}?", id), confirmed)? {
                return print_failure(human, "Cancelled");
            }
            api.delete_mail(id).await?;
            print_success(human, "Mail deleted")
        }

        MailCommands::Read { ids } => {
            api.bulk_set_read(&ids, true).await?;
            print_success(human, &format!("Marked {} mails as read", ids.len()))
        }

        MailCommands::Unread { ids } => {
            api.bulk_set_read(&ids, false).await?;
            print_success(human, &format!("Marked {} mails as unread", ids.len()))
        }

        MailCommands::BulkMove { ids, folder } => {
            api.bulk_move(&ids, folder).await?;
            print_success(human, &format!("Moved {} mails", ids.len()))
        }

        MailCommands::BulkDelete { ids, confirm: confirmed } => {
            if !confirm(&format!("Delete {} mails?", ids.len()), confirmed)? {
                return print_failure(human, "Cancelled");
            }
            api.delete_mails(&ids).await?;
            print_success(human, &format!("Deleted {} mails", ids.len()))
        }

        MailCommands::Attachment {
            mail_id,
            attachment_id,
            dir,
        } => {
            let dir = match dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            let (session, _events) = MailboxSession::new(api, &config);
            let path = session
                .download_attachment(mail_id, &attachment_id, &dir)
                .await?;
            if human {
                println!("✅ Saved {}", path.display());
                Ok(())
            } else {
                print_json(&json!({ "success": true, "path": path }))
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

// ============================================================================
// Sync Command Handlers
// ============================================================================

async fn handle_sync_command(command: SyncCommands, human: bool) -> Result<()> {
    let mut config = load_config();
    // A one-shot command never starts classification on its own
    config.mailbox.auto_classify = false;
    let api = connect(&config)?;

    match command {
        SyncCommands::Status => {
            let status = api.sync_status().await?;
            if human {
                print_sync_status(&status);
                Ok(())
            } else {
                print_json(&status)
            }
        }

        SyncCommands::Start { wait } => {
            let (session, mut events) = MailboxSession::new(api, &config);
            if !session.start_sync().await {
                let message = drain_error(&mut events).unwrap_or_else(|| "Sync not started".into());
                return print_failure(human, &message);
            }
            if !wait {
                return print_success(human, "Mail sync started");
            }

            let result = follow_events(&mut events, human, |event| match event {
                MailboxEvent::SyncCompleted => Some(Ok(())),
                MailboxEvent::SyncStatusChanged(status) if status.state == JobState::Failed => {
                    Some(Err(anyhow!("Mail sync failed")))
                }
                MailboxEvent::SyncStatusChanged(status) if status.state == JobState::Cancelled => {
                    Some(Ok(()))
                }
                _ => None,
            })
            .await;
            session.shutdown();
            result
        }

        SyncCommands::Stop => {
            let (session, mut events) = MailboxSession::new(api, &config);
            session.refresh_sync().await?;
            if session.stop_sync().await {
                print_success(human, "Mail sync stopped")
            } else {
                let message = drain_error(&mut events).unwrap_or_else(|| "No sync running".into());
                print_failure(human, &message)
            }
        }
    }
}

fn print_sync_status(status: &SyncStatus) {
    println!("\n📊 Mail Sync Status\n");
    println!("State:     {:?}", status.state);
    if let Some(sync_type) = status.sync_type {
        println!("Type:      {:?}", sync_type);
    }
    let p = &status.progress;
    println!(
        "Progress:  {}/{} synced, {} classified ({:.0}%)",
        p.synced, p.total, p.classified, p.percentage
    );
    if status.state.is_running() {
        println!("Remaining: {}", format_remaining(status.estimated_remaining));
    }
    if let Some(started) = status.started_at {
        println!("Started:   {}", format_local(started));
    }
    if let Some(completed) = status.completed_at {
        println!("Completed: {}", format_local(completed));
    }
}

// ============================================================================
// Classify Command Handlers
// ============================================================================

async fn handle_classify_command(command: ClassifyCommands, human: bool) -> Result<()> {
    let mut config = load_config();
    config.mailbox.auto_classify = false;
    let api = connect(&config)?;

    match command {
        ClassifyCommands::Status { id: Some(id) } => {
            let status = api.classification_status(&id).await?;
            if human {
                let s = &status.summary;
                println!("Job {}: {:?}", status.classification_id, status.state);
                println!(
                    "   {}/{} classified, {} failed, {} new folders",
                    s.success, s.total, s.failed, s.new_folders_created
                );
                if let Some(error) = &status.error {
                    println!("   Error: {}", error);
                }
                Ok(())
            } else {
                print_json(&status)
            }
        }

        ClassifyCommands::Status { id: None } => {
            let unclassified = api
                .count_mails(VirtualFolder::Unclassified.filter())
                .await?;
            let sync_state = api.sync_status().await.ok().map(|s| s.state);
            if human {
                println!("Unclassified mails: {}", unclassified);
                if let Some(state) = sync_state {
                    println!("Sync state:         {:?}", state);
                }
                Ok(())
            } else {
                print_json(&BacklogStatus {
                    unclassified,
                    sync_state,
                })
            }
        }

        ClassifyCommands::Start { wait } => {
            let (session, mut events) = MailboxSession::new(api, &config);
            if !session.start_classification().await {
                let message = drain_error(&mut events)
                    .unwrap_or_else(|| "No unclassified mail".to_string());
                return print_failure(human, &message);
            }
            if !wait {
                let job = session.classification().job;
                return if human {
                    print_success(true, "AI classification started")
                } else {
                    print_json(&json!({ "success": true, "job": job }))
                };
            }

            let result = tokio::select! {
                result = follow_events(&mut events, human, |event| match event {
                    MailboxEvent::ClassificationFinished { outcome, .. } => Some(match outcome {
                        ClassificationOutcome::Completed | ClassificationOutcome::Stopped => Ok(()),
                        other => Err(anyhow!("Classification ended: {:?}", other)),
                    }),
                    MailboxEvent::ClassificationProgress(_) if human => {
                        if let Some(progress) = session.classification().progress {
                            println!("   {}", progress.status_line());
                        }
                        None
                    }
                    _ => None,
                }) => result,
                _ = tokio::signal::ctrl_c() => {
                    session.stop_classification().await;
                    Ok(())
                }
            };
            session.shutdown();
            result
        }

        ClassifyCommands::Stop { id } => {
            api.stop_classification(&id).await?;
            print_success(human, "AI classification stopped")
        }
    }
}

/// Print events until `done` returns a result
async fn follow_events<F>(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<MailboxEvent>,
    human: bool,
    mut done: F,
) -> Result<()>
where
    F: FnMut(&MailboxEvent) -> Option<Result<()>>,
{
    while let Some(event) = events.recv().await {
        if human {
            if let MailboxEvent::Notice(notice) = &event {
                let icon = match notice.level {
                    NoticeLevel::Info => "ℹ️ ",
                    NoticeLevel::Success => "✅",
                    NoticeLevel::Error => "❌",
                };
                println!("{} {}", icon, notice.message);
            }
        } else {
            println!("{}", serde_json::to_string(&event)?);
        }
        if let Some(result) = done(&event) {
            return result;
        }
    }
    Ok(())
}

/// Latest error notice already queued on the event stream
fn drain_error(events: &mut tokio::sync::mpsc::UnboundedReceiver<MailboxEvent>) -> Option<String> {
    let mut last = None;
    while let Ok(event) = events.try_recv() {
        if let MailboxEvent::Notice(notice) = event {
            if notice.level == NoticeLevel::Error {
                last = Some(notice.message);
            }
        }
    }
    last
}

// ============================================================================
// Config Command Handlers
// ============================================================================

async fn handle_config_command(command: ConfigCommands, human: bool) -> Result<()> {
    match command {
        ConfigCommands::Show {
            api_url,
            auto_classify,
            page_size,
            log_to_file,
        } => config_settings(api_url, auto_classify, page_size, log_to_file, human),
        ConfigCommands::Init { force } => {
            let path = Config::default_path();
            if path.exists() && !force {
                return print_failure(
                    human,
                    &format!("{} already exists (use --force to overwrite)", path.display()),
                );
            }
            Config::default().save_to(&path)?;
            print_success(human, &format!("Wrote {}", path.display()))
        }
    }
}

fn config_settings(
    api_url: Option<String>,
    auto_classify: Option<bool>,
    page_size: Option<u32>,
    log_to_file: Option<bool>,
    human: bool,
) -> Result<()> {
    let path = Config::default_path();
    let mut config = Config::load_from(&path)?;
    let mut changes = vec![];

    if let Some(url) = api_url {
        if config.api.base_url != url {
            config.api.base_url = url.clone();
            changes.push(format!("api.base_url: {}", url));
        }
    }

    if let Some(enabled) = auto_classify {
        if config.mailbox.auto_classify != enabled {
            config.mailbox.auto_classify = enabled;
            changes.push(format!("mailbox.auto_classify: {}", enabled));
        }
    }

    if let Some(size) = page_size {
        let clamped = size.clamp(1, 100);
        if config.mailbox.page_size != clamped {
            config.mailbox.page_size = clamped;
            changes.push(format!("mailbox.page_size: {}", clamped));
        }
    }

    if let Some(enabled) = log_to_file {
        if config.general.log_to_file != enabled {
            config.general.log_to_file = enabled;
            changes.push(format!("general.log_to_file: {}", enabled));
        }
    }

    if !changes.is_empty() {
        config.validate()?;
        config.save_to(&path)?;
    }

    if human {
        println!("\n⚙️  Settings");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("API URL: {}", config.api.base_url);
        println!("Auto-classify: {}", config.mailbox.auto_classify);
        println!("Page size: {}", config.mailbox.page_size);
        println!("Log to file: {} ({})", config.general.log_to_file, config.general.log_dir.display());
        println!("\nConfig file: {}", path.display());

        if !changes.is_empty() {
            println!("\nChanges made:");
            for change in &changes {
                println!("  - {}", change);
            }
            println!("\nRestart the daemon for changes to take effect.");
        }
        Ok(())
    } else {
        print_json(&json!({
            "settings": config,
            "config_path": path,
            "changes": changes
        }))
    }
}
