//! `fieldscope` command line: drives a [`SelectionEngine`] over a JSON
//! dataset, keeping the selection in a state directory between runs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use fieldscope_core::EngineConfig;
use fieldscope_core::FileStore;
use fieldscope_core::MemoryBackend;
use fieldscope_core::SelectionEngine;
use fieldscope_core::SelectionState;
use fieldscope_protocol::Identity;
use fieldscope_protocol::Level;
use fieldscope_protocol::Role;
use owo_colors::OwoColorize;
use tracing::debug;

/// Browse and select analysts, clients and farms.
#[derive(Debug, Parser)]
#[command(name = "fieldscope", version)]
pub struct Cli {
    /// JSON dataset with `analysts`, `clients` and `farms` arrays.
    #[arg(long, value_name = "FILE", env = "FIELDSCOPE_DATA")]
    pub data: PathBuf,

    /// Directory holding the persisted selection.
    #[arg(long, value_name = "DIR", env = "FIELDSCOPE_STATE_DIR", default_value = ".fieldscope")]
    pub state_dir: PathBuf,

    /// Engine settings (TOML). Built-in defaults when omitted.
    #[arg(long, value_name = "FILE", env = "FIELDSCOPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Id of the signed-in caller.
    #[arg(long, default_value = "local")]
    pub user: String,

    /// Role of the signed-in caller: admin, manager or analyst.
    #[arg(long, default_value_t = Role::Manager)]
    pub role: Role,

    /// Print the resulting state as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the current selection and the loaded lists.
    Show,

    /// Select a record by id, or `none` to clear the level.
    Select {
        /// analyst, client or farm.
        level: Level,
        id: String,
    },

    /// Filter a level by name.
    Search { level: Level, term: String },

    /// Load the next page of a level.
    More { level: Level },

    /// Reload a level from the dataset.
    Refresh { level: Level },

    /// Forget the persisted selection.
    SignOut,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let engine = self.open_engine()?;
        let outcome = engine.start().await;
        debug!("startup validation: {outcome:?}");

        match &self.command {
            Command::Show => {}
            Command::Select { level, id } => {
                let id = match id.as_str() {
                    "none" => None,
                    id => Some(id),
                };
                engine.select(*level, id).await;
            }
            Command::Search { level, term } => engine.search(*level, term).await,
            Command::More { level } => engine.load_more(*level).await,
            Command::Refresh { level } => engine.refresh_level(*level).await,
            Command::SignOut => engine.sign_out().await,
        }
        engine.shutdown().await;

        let state = engine.snapshot();
        if self.json {
            println!("{}", serde_json::to_string_pretty(&state)?);
        } else if matches!(self.command, Command::SignOut) {
            println!("{} Signed out, selection cleared", "✓".bright_green());
        } else {
            print!("{}", render_state(&state));
        }
        Ok(())
    }

    fn open_engine(&self) -> Result<SelectionEngine> {
        let config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => EngineConfig::default(),
        };
        let backend = MemoryBackend::load(&self.data)
            .with_context(|| format!("failed to load dataset from {}", self.data.display()))?;
        let storage = FileStore::new(&self.state_dir);
        let identity = Identity::new(self.user.clone(), self.role);
        let engine = SelectionEngine::new(
            config,
            Arc::new(backend),
            Arc::new(storage),
            Some(identity),
        )?;
        Ok(engine)
    }
}

/// Human-readable view: the selected path, then each level's loaded rows with
/// the selected one marked.
pub fn render_state(state: &SelectionState) -> String {
    let mut out = String::new();
    for level in Level::ALL {
        let label = format!("{:<8}", level.noun());
        match state.selected(level) {
            Some(entity) => out.push_str(&format!(
                "{} {} ({})\n",
                label.bold(),
                entity.name(),
                entity.id()
            )),
            None => out.push_str(&format!("{} -\n", label.bold())),
        }
    }

    for level in Level::ALL {
        let list = state.list(level);
        let more = if list.has_more { ", more available" } else { "" };
        out.push_str(&format!(
            "\n{}s: {} loaded{more}\n",
            level.noun().bold(),
            list.items.len()
        ));
        if let Some(error) = &list.error {
            out.push_str(&format!("  {} {error}\n", "!".bright_red()));
        }
        let selected = state.selection().id(level);
        for item in &list.items {
            let marker = if Some(item.id()) == selected { "*" } else { " " };
            out.push_str(&format!(
                "  {} {}  {}\n",
                marker.bright_green(),
                item.name(),
                item.id().dimmed()
            ));
        }
    }
    out
}
