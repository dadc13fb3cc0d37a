//! Command-line arguments and the interactive line commands.

use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::input::read_input;
use crate::recipe::save_recipe;
use crate::session::Session;
use crate::step::StepKind;
use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Run a redaction pipeline over one input file.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "scrubchef", version, about = "Redaction pipeline runner")]
pub struct Args {
    /// Input file (.txt .log .json .yaml .yml)
    pub input: PathBuf,

    /// Recipe file to load the pipeline from
    #[arg(long, conflicts_with = "example")]
    pub recipe: Option<PathBuf>,

    /// Bundled example recipe, by name
    #[arg(long)]
    pub example: Option<String>,

    /// Inspect step N (1-based)
    #[arg(long, value_parser = step_number_arg)]
    pub inspect: Option<usize>,

    /// Write the redacted output and mapping files
    #[arg(long)]
    pub export: bool,

    /// Save the pipeline as a recipe file
    #[arg(long)]
    pub save_recipe: bool,

    /// Read line commands from stdin after the first run
    #[arg(long)]
    pub interactive: bool,

    /// Path to config.toml
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

fn step_number_arg(raw: &str) -> std::result::Result<usize, String> {
    step_number(raw).map_err(|e| e.to_string())
}

fn step_number(raw: &str) -> Result<usize> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => bail!("step numbers start at 1, got {:?}", raw),
    }
}

/// One interactive command. Step numbers are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(StepKind),
    Remove(usize),
    Toggle(usize),
    Move(usize, usize),
    Label(usize, Option<String>),
    Set { step: usize, key: String, value: Value },
    Inspect(Option<usize>),
    Input(PathBuf),
    Clear,
    Save,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let mut parts = rest.split_whitespace();

        let cmd = match word {
            "add" => {
                if rest.is_empty() {
                    bail!("add needs a step type");
                }
                Command::Add(StepKind::from_tag(rest))
            }
            "rm" => Command::Remove(step_number(rest)?),
            "toggle" => Command::Toggle(step_number(rest)?),
            "move" => {
                let from = step_number(parts.next().unwrap_or_default())?;
                let to = step_number(parts.next().unwrap_or_default())?;
                Command::Move(from, to)
            }
            "label" => {
                let (n, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let text = text.trim();
                Command::Label(step_number(n)?, (!text.is_empty()).then(|| text.to_string()))
            }
            "set" => {
                let step = step_number(parts.next().unwrap_or_default())?;
                let Some(key) = parts.next() else {
                    bail!("set needs a key");
                };
                let value = parts.collect::<Vec<_>>().join(" ");
                Command::Set {
                    step,
                    key: key.to_string(),
                    value: config_value(&value),
                }
            }
            "inspect" if rest.is_empty() => Command::Inspect(None),
            "inspect" => Command::Inspect(Some(step_number(rest)?)),
            "input" if !rest.is_empty() => Command::Input(PathBuf::from(rest)),
            "input" => bail!("input needs a file path"),
            "clear" => Command::Clear,
            "save" => Command::Save,
            "quit" | "exit" | "q" => Command::Quit,
            "" => bail!("empty command"),
            other => bail!("unknown command {:?}", other),
        };
        Ok(cmd)
    }
}

/// Booleans and numbers become JSON scalars; everything else stays text.
fn config_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Bool(_) | Value::Number(_))) => v,
        _ => Value::String(raw.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The desired state changed; a new view will follow.
    Edited,
    Saved(PathBuf),
    Quit,
}

fn id_at(session: &Session, n: usize) -> Result<String> {
    n.checked_sub(1)
        .and_then(|i| session.step_id_at(i))
        .map(str::to_string)
        .with_context(|| format!("no step {}", n))
}

pub fn apply(session: &mut Session, command: Command, config: &Config) -> Result<Outcome> {
    match command {
        Command::Add(kind) => {
            session.add_step(kind);
        }
        Command::Remove(n) => {
            let id = id_at(session, n)?;
            session.remove_step(&id);
        }
        Command::Toggle(n) => {
            let id = id_at(session, n)?;
            session.toggle_step(&id);
        }
        Command::Move(from, to) => {
            let moved = match (from.checked_sub(1), to.checked_sub(1)) {
                (Some(a), Some(b)) => session.move_step(a, b),
                _ => false,
            };
            if !moved {
                bail!("cannot move step {} to {}", from, to);
            }
        }
        Command::Label(n, label) => {
            let id = id_at(session, n)?;
            session.set_label(&id, label);
        }
        Command::Set { step, key, value } => {
            let id = id_at(session, step)?;
            let mut cfg = session
                .steps()
                .iter()
                .find(|s| s.id == id)
                .map(|s| s.config.clone())
                .unwrap_or_default();
            cfg.insert(key, value);
            session.set_config(&id, cfg);
        }
        Command::Inspect(None) => session.select(None),
        Command::Inspect(Some(n)) => {
            let id = id_at(session, n)?;
            session.select(Some(&id));
        }
        Command::Input(path) => {
            let loaded = read_input(&path)?;
            session.set_input(loaded.text, Some(loaded.name));
        }
        Command::Clear => session.clear_steps(),
        Command::Save => {
            let today = chrono::Local::now().date_naive();
            let path = save_recipe(
                Path::new(&config.export.output_dir),
                session.steps(),
                &config.export.recipe_name,
                today,
            )?;
            return Ok(Outcome::Saved(path));
        }
        Command::Quit => return Ok(Outcome::Quit),
    }
    Ok(Outcome::Edited)
}
