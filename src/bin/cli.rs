//! Quickdial CLI
//!
//! Pick contacts for the quick-action tray and inspect what is rendered.
//! Commands that touch the store run the startup reconcile pass first.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use quickdial::config::{default_config_path, load_toml_config, save_toml_config, TomlConfig};
use quickdial::notify::FileSink;
use quickdial::{Choice, ChoiceOutcome, ContactId, PassReport, QuickDial};

#[derive(Parser)]
#[command(name = "quickdial")]
#[command(about = "Quick call / text notifications for favourite contacts")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(short, long, env = "QUICKDIAL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List directory contacts, marking selected ones
    Contacts,

    /// List stored selections by slot
    List,

    /// Set the quick actions for a contact
    Pick {
        /// Contact (phone entry) ID
        contact: i64,

        #[arg(value_enum)]
        action: PickAction,
    },

    /// Run a reconcile pass and report what changed
    Reconcile,

    /// Show the rendered tray, top first
    Tray,

    /// Show the effective config
    Config {
        /// Write the effective config to the config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PickAction {
    Call,
    Text,
    Both,
    None,
}

impl From<PickAction> for Choice {
    fn from(action: PickAction) -> Self {
        match action {
            PickAction::Call => Choice::Call,
            PickAction::Text => Choice::Text,
            PickAction::Both => Choice::Both,
            PickAction::None => Choice::None,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_toml_config(&config_path);

    let filter = if cli.verbose {
        "quickdial=debug"
    } else {
        config.logging.filter.as_str()
    };
    quickdial::init_logging(filter);

    match run_command(cli, config, config_path).await {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run_command(cli: Cli, config: TomlConfig, config_path: PathBuf) -> Result<()> {
    match cli.command {
        Commands::Config { init } => {
            if init {
                save_toml_config(&config, &config_path)
                    .with_context(|| format!("writing {}", config_path.display()))?;
                println!("Wrote {}", config_path.display());
            }
            print_config(&config, cli.format)?;
        }

        Commands::Tray => {
            let sink = FileSink::new(config.tray.state_path());
            let tray = sink.read_tray().context("reading tray state")?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tray)?),
                OutputFormat::Text => {
                    if tray.notifications.is_empty() {
                        println!("Tray is empty");
                    }
                    for n in tray.stacked() {
                        println!("{:<4} {}  {}", n.slot.to_string(), n.headline(), n.uri);
                    }
                }
            }
        }

        Commands::Contacts => {
            let app = open_app(&config).await?;
            let entries = app.picker().context("reading contact directory")?;
            match cli.format {
                OutputFormat::Json => {
                    let rows: Vec<serde_json::Value> = entries
                        .iter()
                        .map(|e| {
                            serde_json::json!({
                                "contact": e.record,
                                "selected": e.selected,
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
                OutputFormat::Text => {
                    for e in &entries {
                        let mark = if e.selected { "*" } else { " " };
                        println!(
                            "{} {:<6} {:<24} {:<10} {}",
                            mark,
                            e.record.id.to_string(),
                            e.record.display_name,
                            e.record.type_label(),
                            e.record.number
                        );
                    }
                }
            }
            app.shutdown().await;
        }

        Commands::List => {
            let app = open_app(&config).await?;
            let selections = app.store().snapshot();
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&selections)?),
                OutputFormat::Text => {
                    println!(
                        "{} of {} slots in use",
                        selections.len(),
                        quickdial::POOL_SIZE
                    );
                    for s in &selections {
                        println!(
                            "{:<4} contact {:<6} {}",
                            s.slot.to_string(),
                            s.contact.to_string(),
                            s.action
                        );
                    }
                }
            }
            app.shutdown().await;
        }

        Commands::Pick { contact, action } => {
            let app = open_app(&config).await?;
            let outcome = app
                .choose(ContactId(contact), action.into())
                .context("updating selections")?;
            match outcome {
                ChoiceOutcome::Applied { slots, ticket } => {
                    let report = ticket.wait().await?;
                    let slots: Vec<String> = slots.iter().map(|s| s.to_string()).collect();
                    println!("Contact {} now holds {}", contact, slots.join(", "));
                    print_report(&report, cli.format)?;
                }
                ChoiceOutcome::Cleared { removed } => {
                    println!("Removed {} selection(s) for contact {}", removed, contact);
                }
                ChoiceOutcome::AtCapacity => {
                    anyhow::bail!(
                        "all {} slots are in use; clear a contact first",
                        quickdial::POOL_SIZE
                    );
                }
                ChoiceOutcome::TooMany {
                    requested,
                    available,
                } => {
                    anyhow::bail!(
                        "{} slot(s) needed but only {} available",
                        requested,
                        available
                    );
                }
            }
            app.shutdown().await;
        }

        Commands::Reconcile => {
            let app = open_app(&config).await?;
            let report = app.reconcile_now().wait().await?;
            print_report(&report, cli.format)?;
            app.shutdown().await;
        }
    }

    Ok(())
}

/// Open the store and wait for the startup pass
async fn open_app(config: &TomlConfig) -> Result<QuickDial> {
    let (app, startup) = QuickDial::open(config).context("opening selection store")?;
    if let Err(e) = startup.wait().await {
        tracing::warn!("Startup reconcile failed: {}", e);
    }
    Ok(app)
}

fn print_report(report: &PassReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            println!("Rendered {} notification(s)", report.rendered.len());
            for (contact, removed) in &report.pruned {
                println!("Pruned contact {} ({} selection(s))", contact, removed);
            }
            for failure in &report.render_failures {
                println!(
                    "Failed to render {} for contact {}: {}",
                    failure.slot, failure.contact, failure.reason
                );
            }
        }
    }
    Ok(())
}

fn print_config(config: &TomlConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => {
            println!("database:    {}", config.storage.database_path().display());
            println!("contacts:    {}", config.directory.contacts_path().display());
            println!("tray:        {}", config.tray.state_path().display());
            println!("log filter:  {}", config.logging.filter);
            println!("queue depth: {}", config.worker.queue_depth);
        }
    }
    Ok(())
}
