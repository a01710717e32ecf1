use anyhow::{bail, Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use slotswap::automation::{AutomationDriver, RunEvent};
use slotswap::channel::{PrivilegedChannel, ShellChannel};
use slotswap::config::{save_storage_root, Config};
use slotswap::data::{
    ActivityEntry, ActivityStore, Customer, CustomerStore, Database, Event, EventStore,
    ProfileStore, SqliteDirectory, SuspensionStatus, Team, TeamStore, TEAM_SLOTS,
};
use slotswap::extract::friend_link_user_id;
use slotswap::swap::{CaptureOptions, Namespace, RestoreOptions, SnapshotKind, SwapEngine};
use slotswap::util;

#[derive(Parser, Debug)]
#[command(name = "slotswap", version, about = "Swap game profiles on a rooted device")]
struct Cli {
    /// Data directory (defaults to ~/.slotswap)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Config file (defaults to <data dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Snapshot the live state under a profile name
    Capture {
        name: String,
        #[arg(long, default_value = "own")]
        namespace: Namespace,
        /// Also archive the auxiliary files
        #[arg(long)]
        extended: bool,
        /// Include opt-in auxiliary files
        #[arg(long)]
        include_opt_in: bool,
        #[arg(long)]
        relaunch: bool,
    },
    /// Put a stored profile into the live slot
    Restore {
        name: String,
        #[arg(long, default_value = "own")]
        namespace: Namespace,
        /// Only restore the primary file
        #[arg(long)]
        no_trees: bool,
        #[arg(long)]
        relaunch: bool,
    },
    /// List stored profiles
    List {
        #[arg(long)]
        namespace: Option<Namespace>,
        /// Show trashed profiles instead
        #[arg(long)]
        deleted: bool,
    },
    /// Read the identity of the live state
    Extract,
    /// Restore, launch and signal every filled slot of an event
    RunEvent {
        event_id: i64,
        #[arg(long)]
        no_trees: bool,
    },
    /// Open an add-friend link for a user id or shared link
    Link { target: String },
    /// Check root access and configuration
    Doctor,
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    Customer {
        #[command(subcommand)]
        command: CustomerCommand,
    },
    Event {
        #[command(subcommand)]
        command: EventCommand,
    },
    Team {
        #[command(subcommand)]
        command: TeamCommand,
    },
    /// Show recent activity
    Activity {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Point snapshot storage at another directory
    SetStorageRoot { path: PathBuf },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    /// Move a profile to the trash
    Delete {
        name: String,
        #[arg(long, default_value = "own")]
        namespace: Namespace,
    },
    /// Take a profile out of the trash
    Undelete {
        name: String,
        #[arg(long, default_value = "own")]
        namespace: Namespace,
    },
    /// Remove trashed profiles older than the given number of days
    Purge {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Show the stored record for a profile
    Show {
        name: String,
        #[arg(long, default_value = "own")]
        namespace: Namespace,
    },
    /// Record the game-side suspension state (0, 3, 7, perm)
    Suspend {
        name: String,
        status: SuspensionStatus,
        #[arg(long, default_value = "own")]
        namespace: Namespace,
    },
    /// Flag a profile as broken, or clear the flag
    Error {
        name: String,
        #[arg(long, default_value = "own")]
        namespace: Namespace,
        #[arg(long)]
        clear: bool,
    },
    /// Set the free-text note; omit the text to clear it
    Note {
        name: String,
        text: Option<String>,
        #[arg(long, default_value = "own")]
        namespace: Namespace,
    },
}

#[derive(Subcommand, Debug)]
enum CustomerCommand {
    Add {
        name: String,
        /// Shared add-friend link; the user id is taken from it
        #[arg(long)]
        link: Option<String>,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        slots: Option<u8>,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum EventCommand {
    Add {
        name: String,
        /// YYYY-MM-DD
        #[arg(long)]
        starts: Option<NaiveDate>,
        /// YYYY-MM-DD
        #[arg(long)]
        ends: Option<NaiveDate>,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum TeamCommand {
    Add {
        event_id: i64,
        name: String,
        #[arg(long)]
        customer: Option<i64>,
    },
    /// Put a profile into a slot (1-4), or clear it
    Assign {
        team_id: i64,
        slot: usize,
        /// Profile name; omit with --clear
        profile: Option<String>,
        #[arg(long, default_value = "own")]
        namespace: Namespace,
        #[arg(long, conflicts_with = "profile")]
        clear: bool,
    },
    List { event_id: i64 },
}

struct App {
    config: Config,
    config_path: PathBuf,
    db: Database,
    json: bool,
}

impl App {
    fn engine(&self) -> SwapEngine {
        let channel = Arc::new(ShellChannel::new(self.config.channel.clone()));
        SwapEngine::new(channel, self.config.target.clone(), self.config.layout())
            .with_settle(self.config.settle)
            .with_exclusivity(self.config.exclusivity)
            .with_recorder(Arc::new(ProfileStore::new(self.db.connection())))
    }

    fn profiles(&self) -> ProfileStore {
        ProfileStore::new(self.db.connection())
    }

    fn log_activity(&self, entry: ActivityEntry) {
        if let Err(e) = ActivityStore::new(self.db.connection()).append(&entry) {
            tracing::warn!(error = %e, kind = %entry.kind, "Failed to record activity");
        }
    }

    fn print<T: Serialize>(&self, value: &T, human: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human();
        }
        Ok(())
    }

    fn find_profile_id(&self, namespace: Namespace, name: &str) -> Result<i64> {
        match self.profiles().find_by_name(namespace, name)? {
            Some(profile) => Ok(profile.id),
            None => bail!("No profile '{}' in {}", name, namespace),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    // Initialize logging to file (~/.slotswap/logs/slotswap.log)
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .init();

    let (config, config_path) = match &cli.config {
        Some(path) => (Config::load_from(path)?, path.clone()),
        None => (Config::load()?, util::config_path()),
    };
    let db = Database::open_default().context("Failed to open database")?;
    let app = App {
        config,
        config_path,
        db,
        json: cli.json,
    };

    run(&app, cli.command).await
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Capture {
            name,
            namespace,
            extended,
            include_opt_in,
            relaunch,
        } => {
            let options = CaptureOptions {
                extended,
                include_opt_in,
                relaunch,
            };
            let report = app.engine().capture(namespace, &name, options).await?;
            let profile_id = app.find_profile_id(namespace, &name).ok();
            let mut entry = ActivityEntry::new(
                "capture",
                "profile",
                format!("Captured {}/{} ({} bytes)", namespace, name, report.size_bytes),
            );
            if let Some(id) = profile_id {
                entry = entry.for_profile(id);
            }
            app.log_activity(entry);
            app.print(&report, || {
                println!("Captured {}/{} -> {}", namespace, name, report.snapshot_path.display());
                println!("  sha256  {}", report.digest);
                if let Some(user_id) = &report.identity.user_id {
                    println!("  user id {}", user_id);
                }
                if let Some(archive) = &report.archive_path {
                    println!("  archive {}", archive.display());
                }
                if let Some(err) = &report.relaunch_error {
                    println!("  relaunch failed: {}", err);
                }
            })
        }
        Commands::Restore {
            name,
            namespace,
            no_trees,
            relaunch,
        } => {
            let options = RestoreOptions {
                trees: !no_trees,
                relaunch,
            };
            let report = app.engine().restore(namespace, &name, options).await?;
            let mut entry =
                ActivityEntry::new("restore", "profile", format!("Restored {}/{}", namespace, name));
            if let Ok(id) = app.find_profile_id(namespace, &name) {
                entry = entry.for_profile(id);
            }
            app.log_activity(entry);
            app.print(&report, || {
                println!("Restored {}/{}", namespace, name);
                if report.used_fallback_copy {
                    println!("  primary file copied with fallback");
                }
                for tree in &report.trees {
                    println!("  {:<28} {:?}", tree.name, tree.status);
                }
            })
        }
        Commands::List { namespace, deleted } => {
            if deleted {
                let trashed = app.profiles().list_deleted()?;
                return app.print(&trashed, || {
                    for p in &trashed {
                        println!("{}/{}", p.namespace, p.name);
                    }
                });
            }
            let engine = app.engine();
            let namespaces = match namespace {
                Some(ns) => vec![ns],
                None => Namespace::all().to_vec(),
            };
            let mut listing = Vec::new();
            for ns in namespaces {
                for name in engine.list_profiles(ns)? {
                    let record = app.profiles().find_by_name(ns, &name)?;
                    if record.as_ref().is_some_and(|p| p.is_deleted()) {
                        continue;
                    }
                    let kind = engine.layout().snapshot_kind(ns, &name);
                    listing.push((ns, name, kind, record));
                }
            }
            app.print(&listing, || {
                for (ns, name, kind, record) in &listing {
                    let user_id = record
                        .as_ref()
                        .and_then(|p| p.identity.user_id.clone())
                        .unwrap_or_else(|| "-".into());
                    let kind = match kind {
                        Some(SnapshotKind::Extended) => "extended",
                        Some(SnapshotKind::Simple) => "simple",
                        None => "-",
                    };
                    println!("{:<9} {:<24} {:<9} {}", ns, name, kind, user_id);
                }
            })
        }
        Commands::Extract => {
            let identity = app.engine().read_identity().await?;
            app.print(&identity, || {
                let show = |label: &str, value: &Option<String>| {
                    println!("{:<15} {}", label, value.as_deref().unwrap_or("-"));
                };
                show("user id", &identity.user_id);
                show("advertising id", &identity.advertising_id);
                show("install id", &identity.install_id);
                show("ssaid", &identity.ssaid);
                show("device token", &identity.device_token);
            })
        }
        Commands::RunEvent { event_id, no_trees } => {
            if EventStore::new(app.db.connection()).get(event_id)?.is_none() {
                bail!("Event {} not found", event_id);
            }
            let engine = Arc::new(app.engine());
            let directory = Arc::new(SqliteDirectory::new(app.db.connection()));
            let driver = Arc::new(AutomationDriver::new(engine, directory).with_trees(!no_trees));

            let mut handle = driver.spawn(event_id);
            let cancel = handle.cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            while let Some(event) = handle.events.recv().await {
                if app.json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    print_run_event(&event);
                }
            }
            let summary = handle.join.await?;
            app.log_activity(ActivityEntry::new(
                "run-event",
                "automation",
                format!(
                    "Event {}: {} completed, {} failed, {} skipped ({:?})",
                    event_id, summary.completed, summary.failed, summary.skipped, summary.state
                ),
            ));
            Ok(())
        }
        Commands::Link { target } => {
            let user_id = friend_link_user_id(&target).unwrap_or(target);
            app.engine().open_friend_link(&user_id).await?;
            app.log_activity(ActivityEntry::new(
                "link",
                "customer",
                format!("Opened friend link for {}", user_id),
            ));
            if !app.json {
                println!("Opened friend link for {}", user_id);
            }
            Ok(())
        }
        Commands::Doctor => doctor(app).await,
        Commands::Profile { command } => profile_command(app, command),
        Commands::Customer { command } => {
            let store = CustomerStore::new(app.db.connection());
            match command {
                CustomerCommand::Add {
                    name,
                    link,
                    user_id,
                    slots,
                } => {
                    let mut customer = Customer::new(name);
                    if let Some(user_id) = user_id {
                        customer = customer.with_user_id(user_id);
                    }
                    if let Some(link) = link {
                        customer = customer.with_friend_link(link);
                    }
                    if let Some(slots) = slots {
                        customer.slots = slots;
                    }
                    let customer = store.create(&customer)?;
                    app.log_activity(ActivityEntry::new(
                        "customer-add",
                        "customer",
                        format!("Added customer {}", customer.name),
                    ));
                    app.print(&customer, || {
                        println!("Added customer {} (id {})", customer.name, customer.id)
                    })
                }
                CustomerCommand::List => {
                    let customers = store.list()?;
                    app.print(&customers, || {
                        for c in &customers {
                            println!(
                                "{:>4}  {:<20} {}",
                                c.id,
                                c.name,
                                c.user_id.as_deref().unwrap_or("-")
                            );
                        }
                    })
                }
            }
        }
        Commands::Event { command } => {
            let store = EventStore::new(app.db.connection());
            match command {
                EventCommand::Add { name, starts, ends } => {
                    let event = store.create(&Event::new(name).with_dates(starts, ends))?;
                    app.log_activity(ActivityEntry::new(
                        "event-add",
                        "event",
                        format!("Added event {}", event.name),
                    ));
                    app.print(&event, || println!("Added event {} (id {})", event.name, event.id))
                }
                EventCommand::List => {
                    let events = store.list()?;
                    app.print(&events, || {
                        for e in &events {
                            println!("{:>4}  {}", e.id, e.name);
                        }
                    })
                }
            }
        }
        Commands::Team { command } => team_command(app, command),
        Commands::Config {
            command: ConfigCommand::SetStorageRoot { path },
        } => {
            save_storage_root(&app.config_path, &path)?;
            app.log_activity(ActivityEntry::new(
                "config",
                "settings",
                format!("Storage root set to {}", path.display()),
            ));
            println!("Storage root set to {}", path.display());
            Ok(())
        }
        Commands::Activity { limit } => {
            let entries = ActivityStore::new(app.db.connection()).recent(limit)?;
            app.print(&entries, || {
                for e in &entries {
                    println!(
                        "{}  {:<12} {}",
                        e.created_at.format("%Y-%m-%d %H:%M"),
                        e.kind,
                        e.description
                    );
                }
            })
        }
    }
}

fn profile_command(app: &App, command: ProfileCommand) -> Result<()> {
    let store = app.profiles();
    match command {
        ProfileCommand::Delete { name, namespace } => {
            let id = app.find_profile_id(namespace, &name)?;
            store.soft_delete(id)?;
            app.log_activity(
                ActivityEntry::new("delete", "profile", format!("Trashed {}/{}", namespace, name))
                    .for_profile(id),
            );
            println!("Moved {}/{} to the trash", namespace, name);
        }
        ProfileCommand::Undelete { name, namespace } => {
            let id = app.find_profile_id(namespace, &name)?;
            store.undelete(id)?;
            app.log_activity(
                ActivityEntry::new(
                    "undelete",
                    "profile",
                    format!("Restored {}/{} from the trash", namespace, name),
                )
                .for_profile(id),
            );
            println!("Restored {}/{} from the trash", namespace, name);
        }
        ProfileCommand::Purge { days } => {
            let removed = store.purge_deleted_before(Utc::now() - ChronoDuration::days(days))?;
            app.log_activity(ActivityEntry::new(
                "purge",
                "profile",
                format!("Purged {} trashed profiles", removed),
            ));
            println!("Purged {} profiles", removed);
        }
        ProfileCommand::Suspend {
            name,
            status,
            namespace,
        } => {
            let id = app.find_profile_id(namespace, &name)?;
            store.set_suspension(id, status)?;
            app.log_activity(
                ActivityEntry::new(
                    "suspension",
                    "profile",
                    format!("Set {}/{} suspension to {}", namespace, name, status),
                )
                .for_profile(id),
            );
            if let Some(profile) = store.get(id)? {
                println!(
                    "{}/{} suspension {} (suspended {} times)",
                    namespace, name, profile.suspension, profile.suspension_count
                );
            }
        }
        ProfileCommand::Show { name, namespace } => {
            let Some(profile) = store.find_by_name(namespace, &name)? else {
                bail!("No profile '{}' in {}", name, namespace);
            };
            let link = profile.friend_link(&app.config.target.link_scheme);
            let kind = app.config.layout().snapshot_kind(namespace, &name);
            return app.print(&profile, || {
                let show = |label: &str, value: Option<&str>| {
                    println!("{:<15} {}", label, value.unwrap_or("-"));
                };
                show("profile", Some(format!("{}/{}", namespace, name).as_str()));
                show("user id", profile.identity.user_id.as_deref());
                show("friend link", link.as_deref());
                show(
                    "snapshot",
                    kind.map(|k| match k {
                        SnapshotKind::Extended => "extended",
                        SnapshotKind::Simple => "simple",
                    }),
                );
                show(
                    "suspension",
                    Some(
                        format!("{} ({} times)", profile.suspension, profile.suspension_count)
                            .as_str(),
                    ),
                );
                show("error", profile.has_error.then_some("yes"));
                show("note", profile.note.as_deref());
                show(
                    "last played",
                    profile
                        .last_played
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .as_deref(),
                );
            });
        }
        ProfileCommand::Error {
            name,
            namespace,
            clear,
        } => {
            let id = app.find_profile_id(namespace, &name)?;
            store.set_error(id, !clear)?;
            let verb = if clear { "Cleared" } else { "Set" };
            app.log_activity(
                ActivityEntry::new(
                    "error-flag",
                    "profile",
                    format!("{} error flag on {}/{}", verb, namespace, name),
                )
                .for_profile(id),
            );
            println!("{} error flag on {}/{}", verb, namespace, name);
        }
        ProfileCommand::Note {
            name,
            text,
            namespace,
        } => {
            let id = app.find_profile_id(namespace, &name)?;
            let text = text.filter(|t| !t.trim().is_empty());
            store.set_note(id, text.as_deref())?;
            app.log_activity(
                ActivityEntry::new("note", "profile", format!("Updated note on {}/{}", namespace, name))
                    .for_profile(id),
            );
        }
    }
    Ok(())
}

fn team_command(app: &App, command: TeamCommand) -> Result<()> {
    let store = TeamStore::new(app.db.connection());
    match command {
        TeamCommand::Add {
            event_id,
            name,
            customer,
        } => {
            let mut team = Team::new(event_id, name);
            if let Some(customer_id) = customer {
                team = team.with_customer(customer_id);
            }
            let team = store.create(&team)?;
            app.log_activity(ActivityEntry::new(
                "team-add",
                "event",
                format!("Added team {} to event {}", team.name, event_id),
            ));
            app.print(&team, || println!("Added team {} (id {})", team.name, team.id))
        }
        TeamCommand::Assign {
            team_id,
            slot,
            profile,
            namespace,
            clear,
        } => {
            let profile_id = match (profile, clear) {
                (Some(name), _) => Some(app.find_profile_id(namespace, &name)?),
                (None, true) => None,
                (None, false) => bail!("Give a profile name or --clear"),
            };
            store.assign_slot(team_id, slot, profile_id)?;
            app.log_activity(ActivityEntry::new(
                "team-assign",
                "event",
                format!("Team {} slot {} -> {:?}", team_id, slot, profile_id),
            ));
            Ok(())
        }
        TeamCommand::List { event_id } => {
            let teams = store.list_for_event(event_id)?;
            app.print(&teams, || {
                for t in &teams {
                    let slots: Vec<String> = t
                        .slots
                        .iter()
                        .map(|s| s.map(|id| id.to_string()).unwrap_or_else(|| "-".into()))
                        .collect();
                    println!(
                        "{:>4}  {:<16} [{}] {}/{}",
                        t.id,
                        t.name,
                        slots.join(", "),
                        t.filled_slots(),
                        TEAM_SLOTS
                    );
                }
            })
        }
    }
}

async fn doctor(app: &App) -> Result<()> {
    let engine = app.engine();
    let target = engine.target();
    println!("config        {}", util::config_path().display());
    println!("database      {}", app.db.path.display());
    println!("storage root  {}", app.config.storage.root.display());
    println!("shell         {}", app.config.channel.program.display());

    match engine.channel().probe_root().await {
        Ok(true) => println!("root          ok"),
        Ok(false) => println!("root          shell opened but is not uid 0"),
        Err(e) => {
            println!("root          unavailable: {}", e);
            return Ok(());
        }
    }

    let check = format!(
        "[ -d {} ] && echo installed || echo missing",
        util::quote_path(&target.data_dir)
    );
    let outcome = engine.channel().execute(&check).await?;
    let installed = outcome.has_line("installed");
    println!(
        "package       {} ({})",
        target.package,
        if installed { "installed" } else { "not found" }
    );
    Ok(())
}

fn print_run_event(event: &RunEvent) {
    match event {
        RunEvent::RunStarted { teams, items, .. } => {
            println!("Running {} slots across {} teams", items, teams)
        }
        RunEvent::SlotSkipped { team_id, slot } => {
            println!("team {} slot {}: empty", team_id, slot)
        }
        RunEvent::ItemStarted {
            team_id,
            slot,
            profile_id,
        } => println!("team {} slot {}: profile {}", team_id, slot, profile_id),
        RunEvent::ItemProgress { .. } => {}
        RunEvent::ItemCompleted {
            team_id,
            slot,
            profile,
            user_id,
        } => println!(
            "team {} slot {}: {} sent friend link to {}",
            team_id, slot, profile, user_id
        ),
        RunEvent::ItemFailed {
            team_id,
            slot,
            error,
        } => println!("team {} slot {}: failed: {}", team_id, slot, error),
        RunEvent::TeamCompleted {
            name,
            completed,
            failed,
            ..
        } => println!("team {} done: {} ok, {} failed", name, completed, failed),
        RunEvent::RunFinished(summary) => println!(
            "Finished ({:?}): {} completed, {} failed, {} skipped",
            summary.state, summary.completed, summary.failed, summary.skipped
        ),
    }
}
