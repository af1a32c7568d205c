use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::info;

use huddle::config::Config;
use huddle::engine::{Action, ActionContext, Engine, EngineError};
use huddle::log::{Actor, AppointmentEvent, Cursor};
use huddle::reminders::{run_reminder_poller, LogIndex, LogSender};
use huddle::store::FsBlobStore;

const USAGE: &str = "usage:
  huddle apply <group> <actions.json> [--as <personId>] [--tz <zone>]
  huddle preview <group> <actions.json> [--as <personId>] [--tz <zone>]
  huddle say <group> <appointment> <text> [--as <personId>]
  huddle log <group> <appointment> [limit] [cursor]
  huddle serve";

/// Positional arguments plus the `--as` / `--tz` flags.
struct Args {
    positional: Vec<String>,
    acting_as: Option<String>,
    timezone: Option<String>,
}

fn parse_args(raw: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut args = Args {
        positional: Vec::new(),
        acting_as: None,
        timezone: None,
    };
    let mut raw = raw.peekable();
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--as" => args.acting_as = Some(raw.next().ok_or("--as needs a person id")?),
            "--tz" => args.timezone = Some(raw.next().ok_or("--tz needs a zone")?),
            _ => args.positional.push(arg),
        }
    }
    Ok(args)
}

fn read_actions(path: &str) -> Result<Vec<Action>, Box<dyn Error>> {
    let body = std::fs::read(path)?;
    Ok(serde_json::from_slice(&body)?)
}

fn context(args: &Args, config: &Config) -> ActionContext {
    let mut ctx = ActionContext::new(args.timezone.clone().unwrap_or_else(|| config.default_timezone.clone()));
    ctx.max_active_people = config.max_active_people;
    match &args.acting_as {
        Some(id) => ctx.acting_as(id.clone()),
        None => ctx,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    huddle::observability::init(config.metrics_port)?;

    let mut raw = std::env::args().skip(1);
    let Some(command) = raw.next() else {
        eprintln!("{USAGE}");
        return Ok(ExitCode::from(2));
    };
    let args = parse_args(raw)?;

    let blobs = Arc::new(FsBlobStore::open(&config.data_dir)?);
    info!("data_dir: {}", config.data_dir.display());
    let engine = Arc::new(Engine::new(blobs, &config));

    match (command.as_str(), args.positional.as_slice()) {
        ("apply", [group, file]) => {
            let actions = read_actions(file)?;
            match engine.apply_actions(group, &actions, &context(&args, &config)).await {
                Ok(applied) => {
                    for line in &applied.result.effects {
                        println!("{line}");
                    }
                    if !applied.result.applied_all {
                        return Ok(ExitCode::from(1));
                    }
                }
                Err(EngineError::Conflict(key)) => {
                    eprintln!("{key} changed while the batch ran; nothing was saved, try again");
                    return Ok(ExitCode::from(3));
                }
                Err(e) => return Err(e.into()),
            }
        }
        ("preview", [group, file]) => {
            let actions = read_actions(file)?;
            let result = engine.preview_actions(group, &actions, &context(&args, &config)).await?;
            for line in &result.effects {
                println!("{line}");
            }
        }
        ("say", [group, appointment, text @ ..]) if !text.is_empty() => {
            let actor = match &args.acting_as {
                Some(id) => Actor::person(id.clone()),
                None => Actor::system(),
            };
            let event = AppointmentEvent::message(actor, &text.join(" "));
            let outcome = engine.append_event(group, appointment, event, None).await?;
            println!("appended to chunk {}", outcome.chunk_id);
        }
        ("log", [group, appointment, rest @ ..]) if rest.len() <= 2 => {
            let limit = match rest.first() {
                Some(n) => n.parse()?,
                None => 20,
            };
            let cursor = rest.get(1).map(|c| c.parse::<Cursor>()).transpose()?;
            let page = engine.recent_events(group, appointment, limit, cursor).await?;
            for event in &page.events {
                println!("{}", serde_json::to_string(event)?);
            }
            if let Some(next) = page.next_cursor {
                println!("next: {next}");
            }
        }
        ("serve", []) => {
            let poller = tokio::spawn(run_reminder_poller(
                engine.clone(),
                Arc::new(LogIndex::new(engine.clone())),
                Arc::new(LogSender),
                config.reminder_poll,
            ));
            info!("polling reminders every {:?}", config.reminder_poll);
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            poller.abort();
        }
        _ => {
            eprintln!("{USAGE}");
            return Ok(ExitCode::from(2));
        }
    }
    Ok(ExitCode::SUCCESS)
}
