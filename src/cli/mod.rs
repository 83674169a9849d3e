//! Command-line interface parsing and handling
//!
//! The binary is a thin driver around [`ChatContext`]: it feeds chat lines from
//! stdin through the pipeline and exposes the configuration surface (checking,
//! listing, sharing) as subcommands.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use crate::core::config::Config;
use crate::core::context::{ChatContext, Delivery};
use crate::core::registry::Registries;
use crate::core::router::{Channel, ChannelId, Membership};
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "chatdeck")]
#[command(about = "Rule-driven chat filtering with tabs and a fading history")]
#[command(
    long_about = "Chatdeck runs incoming chat lines through an ordered list of filter rules, \
routes the result into tabs and keeps a bounded, fading history per tab.\n\n\
Input:\n\
  chatdeck run reads one chat line per input line on stdin and prints where\n\
  each line was delivered, followed by the visible window of the active tab.\n\n\
Environment Variables:\n\
  CHATDECK_LOG      Log filter (falls back to RUST_LOG, default: warn)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file to use instead of the per-user default
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Filter chat lines from stdin (default)
    Run {
        /// Tab to show at the end instead of the main tab
        #[arg(short = 't', long, value_name = "TAB")]
        tab: Option<String>,
    },
    /// Validate every rule and tab in the configuration
    Check,
    /// List tabs in display order
    Tabs,
    /// Show completions for partially typed input
    Suggest {
        #[arg(allow_hyphen_values = true)]
        input: String,
    },
    /// Print a shareable blob for one rule or tab
    Export {
        kind: ShareKind,
        /// Id or name of the rule or tab
        target: String,
    },
    /// Append a rule or tab from a shared blob and save the configuration
    Import { kind: ShareKind, blob: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShareKind {
    Rule,
    Tab,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config_path = resolve_config_path(args.config)?;
    let config = Config::load_from_path(&config_path)?;
    debug!(path = %config_path.display(), "configuration loaded");

    match args.command.unwrap_or(Commands::Run { tab: None }) {
        Commands::Run { tab } => {
            let context = ChatContext::new(&config);
            if let Some(tab) = tab {
                select_tab(&context, &tab);
            }
            let stdin = io::stdin();
            let stdout = io::stdout();
            run_stream(&context, stdin.lock(), &mut stdout.lock())?;
            Ok(())
        }
        Commands::Check => {
            let problems = check_config(&config, &mut io::stdout().lock())?;
            if problems > 0 {
                return Err(format!("{problems} problem(s) found in the configuration").into());
            }
            Ok(())
        }
        Commands::Tabs => {
            let context = ChatContext::new(&config);
            print_tabs(&context, &mut io::stdout().lock())?;
            Ok(())
        }
        Commands::Suggest { input } => {
            let context = ChatContext::new(&config);
            for suggestion in context.suggest(&input) {
                println!("{}", suggestion.apply_to(&input));
            }
            Ok(())
        }
        Commands::Export { kind, target } => {
            let context = ChatContext::new(&config);
            let blob = match kind {
                ShareKind::Rule => context.export_rule(&target),
                ShareKind::Tab => context.export_channel(&target),
            };
            match blob {
                Some(blob) => {
                    println!("{blob}");
                    Ok(())
                }
                None => Err(format!("No {} named '{target}'", kind.label()).into()),
            }
        }
        Commands::Import { kind, blob } => {
            let context = ChatContext::new(&config);
            let id = match kind {
                ShareKind::Rule => context.import_rule(&blob)?.to_string(),
                ShareKind::Tab => context.import_channel(&blob)?.to_string(),
            };
            context.to_config().save_to_path(&config_path)?;
            println!("✅ Imported {} as {id}", kind.label());
            Ok(())
        }
    }
}

impl ShareKind {
    fn label(self) -> &'static str {
        match self {
            ShareKind::Rule => "rule",
            ShareKind::Tab => "tab",
        }
    }
}

fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, Box<dyn Error>> {
    explicit
        .or_else(Config::default_path)
        .ok_or_else(|| "Could not determine a configuration directory; pass --config".into())
}

fn select_tab(context: &ChatContext, id_or_name: &str) {
    let target = context
        .channels()
        .into_iter()
        .find(|c| c.id.as_str() == id_or_name || c.name.eq_ignore_ascii_case(id_or_name))
        .map(|c| c.id)
        .unwrap_or_else(|| ChannelId::new(id_or_name));
    if !context.set_active(&target) {
        eprintln!("⚠️  Unknown tab '{id_or_name}', showing the main tab");
    }
}

/// Feed every line of `input` through the pipeline, then print the active
/// tab's visible window.
pub fn run_stream<R: BufRead, W: Write>(
    context: &ChatContext,
    input: R,
    out: &mut W,
) -> io::Result<()> {
    let side_chars = context.side_chars();
    for line in input.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if let Some(delivery) = context.receive(line) {
            let channels = context.channels();
            writeln!(out, "{}", format_delivery(&delivery, &channels, side_chars))?;
            for sound in &delivery.sounds {
                writeln!(out, "  ♪ {sound}")?;
            }
        }
    }

    let active = context.active_channel();
    writeln!(out, "── {} ──", active.name)?;
    for line in context.visible_active(Instant::now()) {
        if line.stack_count > 1 {
            writeln!(out, "{} (x{})", line.text.plain(), line.stack_count)?;
        } else {
            writeln!(out, "{}", line.text.plain())?;
        }
    }
    Ok(())
}

fn format_delivery(delivery: &Delivery, channels: &[Channel], side_chars: usize) -> String {
    let labels: Vec<String> = delivery
        .channels
        .iter()
        .map(|id| {
            channels
                .iter()
                .find(|c| &c.id == id)
                .map_or_else(|| id.to_string(), |c| c.display_abbreviation(side_chars))
        })
        .collect();
    format!("[{}] {}", labels.join(","), delivery.text.plain())
}

fn print_tabs<W: Write>(context: &ChatContext, out: &mut W) -> io::Result<()> {
    let side_chars = context.side_chars();
    let active = context.active_channel().id;
    for channel in context.channels() {
        let marker = if channel.id == active { "*" } else { " " };
        let membership = match &channel.membership {
            _ if channel.is_main => "everything unclaimed".to_string(),
            Membership::Hints => "routed only".to_string(),
            Membership::Rules { rule_ids } => {
                let ids: Vec<&str> = rule_ids.iter().map(|id| id.as_str()).collect();
                format!("rules: {}", ids.join(", "))
            }
            Membership::Pattern { pattern, .. } => format!("pattern: {pattern}"),
        };
        writeln!(
            out,
            "{marker} {:<width$}  {}  ({})  [{}]",
            channel.display_abbreviation(side_chars),
            channel.name,
            membership,
            channel.id,
            width = side_chars
        )?;
    }
    Ok(())
}

/// Report invalid rules, tabs and unknown registry ids; returns the number
/// of problems found.
fn check_config<W: Write>(config: &Config, out: &mut W) -> io::Result<usize> {
    let mut problems = 0;

    for rule in &config.rules {
        match rule.validate() {
            Ok(()) => writeln!(out, "✅ rule {} ({})", rule.id, rule.action.kind())?,
            Err(err) => {
                problems += 1;
                writeln!(out, "❌ rule {}: {err}", rule.id)?;
            }
        }
    }
    for channel in &config.channels {
        match channel.validate() {
            Ok(()) => writeln!(out, "✅ tab {}", channel.name)?,
            Err(err) => {
                problems += 1;
                writeln!(out, "❌ tab {}: {err}", channel.id)?;
            }
        }
    }
    if config.channels.iter().filter(|c| c.is_main).count() > 1 {
        problems += 1;
        writeln!(out, "❌ more than one main tab")?;
    }

    let builtin = Registries::builtin();
    for entry in &config.formatters {
        if !builtin.formatters().contains(&entry.id) {
            writeln!(out, "⚠️  unknown formatter '{}' will be ignored", entry.id)?;
        }
    }
    for entry in &config.suggestors {
        if !builtin.suggestors().contains(&entry.id) {
            writeln!(out, "⚠️  unknown suggestor '{}' will be ignored", entry.id)?;
        }
    }

    Ok(problems)
}
