use anyhow::{bail, Context, Result};
use clap::Parser;
use scrubchef::canonical::{match_count, total_redactions};
use scrubchef::cli::{apply, Args, Command, Outcome};
use scrubchef::config::Config;
use scrubchef::coordinator::{EngineStatus, SessionView};
use scrubchef::engine::process::ProcessEngine;
use scrubchef::export::{write_export, ExportBundle};
use scrubchef::input::read_input;
use scrubchef::recipe;
use scrubchef::session::{settled, Session};
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let log_file = std::fs::File::create(&config.log.file)
        .with_context(|| format!("Failed to create log file: {}", config.log.file))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    let input = read_input(&args.input)?;
    let steps = match (&args.recipe, &args.example) {
        (Some(path), _) => recipe::load_recipe(path)?,
        (None, Some(name)) => recipe::load_example(name)
            .with_context(|| format!("no example recipe named {:?}", name))?,
        (None, None) => Vec::new(),
    };
    tracing::info!(input = %input.name, steps = steps.len(), "starting session");

    let (mut session, mut view_rx, coordinator) = Session::spawn(ProcessEngine::new(&config.engine));
    session.set_input(input.text, Some(input.name));
    session.load_steps(steps);
    if let Some(n) = args.inspect {
        let id = session
            .step_id_at(n - 1)
            .map(str::to_string)
            .with_context(|| format!("--inspect {}: pipeline has {} steps", n, session.steps().len()))?;
        session.select(Some(&id));
    }

    let view = settled(&mut view_rx, session.revision()).await?;
    print_view(&session, &view);
    if view.engine == EngineStatus::Failed {
        bail!("engine failed to initialize");
    }

    if args.export {
        export_view(&session, &view, &config)?;
    }
    if args.save_recipe {
        let path = recipe::save_recipe(
            Path::new(&config.export.output_dir),
            session.steps(),
            &config.export.recipe_name,
            chrono::Local::now().date_naive(),
        )?;
        println!("  Recipe saved to {}", path.display());
    }

    if args.interactive {
        interactive(&mut session, &mut view_rx, &config).await?;
    }

    drop(session);
    coordinator.await.context("coordinator task panicked")??;
    Ok(())
}

async fn interactive(
    session: &mut Session,
    view_rx: &mut tokio::sync::watch::Receiver<SessionView>,
    config: &Config,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            prompt();
            continue;
        }
        let command = match Command::parse(&line) {
            Ok(c) => c,
            Err(e) => {
                println!("  {}", e);
                prompt();
                continue;
            }
        };
        match apply(session, command, config) {
            Ok(Outcome::Quit) => break,
            Ok(Outcome::Saved(path)) => println!("  Recipe saved to {}", path.display()),
            Ok(Outcome::Edited) => {
                let view = settled(view_rx, session.revision()).await?;
                print_view(session, &view);
            }
            Err(e) => println!("  {:#}", e),
        }
        prompt();
    }
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_view(session: &Session, view: &SessionView) {
    if view.error.is_some() {
        println!("  {}", view.output);
        return;
    }

    println!();
    println!("{}", view.output);
    println!();
    println!("  {} redactions", total_redactions(&view.map));
    for (i, step) in session.steps().iter().enumerate() {
        let name = step.label.as_deref().unwrap_or_else(|| step.kind.display_name());
        let marker = match (step.enabled, session.selected() == Some(step.id.as_str())) {
            (_, true) => '>',
            (true, false) => '*',
            (false, false) => ' ',
        };
        println!(
            "  {} {:>2}. {:<28} {:>5}",
            marker,
            i + 1,
            name,
            match_count(&view.map, step.kind.tag())
        );
    }

    if view.inspected.is_some() {
        println!();
        println!("  --- before step");
        println!("{}", view.diff_original);
        println!("  +++ after step");
        println!("{}", view.diff_modified);
    }
}

fn export_view(session: &Session, view: &SessionView, config: &Config) -> Result<()> {
    let Some(bundle) = ExportBundle::from_view(view) else {
        println!("  Nothing to export");
        return Ok(());
    };
    let paths = write_export(
        Path::new(&config.export.output_dir),
        &bundle,
        session.input_name(),
        chrono::Local::now().naive_local(),
    )?;
    println!("  Exported {}", paths.redacted.display());
    println!("  Exported {}", paths.mapping.display());
    Ok(())
}
