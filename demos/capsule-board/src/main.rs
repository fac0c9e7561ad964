mod cli;
mod commands;
mod render;

use std::error::Error;
use std::sync::{Arc, Mutex};

use capsule::board::{Board, BoardEvent};
use capsule::clock::{Clock, ManualClock, SystemClock};
use capsule::draft::PostDraft;
use capsule::engagement::EngagementRecord;
use capsule::engine::{BoardEventHandler, BoardMsg, Engine};
use capsule::store::MemStore;
use clap::Parser;
use cli::Cli;
use commands::{Input, HELP};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc::{self, UnboundedSender};

const DEFAULT_SEED: &str = include_str!("../seed.json");

/// Prints a frame whenever it differs from the last one printed.
#[derive(Clone, Default)]
struct Printer {
    last: Arc<Mutex<String>>,
    draft: Arc<Mutex<PostDraft>>,
}

impl BoardEventHandler for Printer {
    fn on_snapshot(&self, board: &Board) {
        if let Ok(mut draft) = self.draft.lock() {
            *draft = board.post_draft().cloned().unwrap_or_default();
        }
        let frame = render::render(&board.view());
        let Ok(mut last) = self.last.lock() else { return };
        if *last != frame {
            println!("{frame}");
            *last = frame;
        }
    }

    fn on_exit(&self, board: &Board) {
        info!("[Board] closing with {} capsules loaded", board.pager().backing().len());
    }
}

/// Returns false once the user asked to leave.
fn handle_line(line: &str, tx: &UnboundedSender<BoardMsg>, draft: &Arc<Mutex<PostDraft>>) -> bool {
    let pending = draft.lock().map(|d| d.clone()).unwrap_or_default();
    let events = match commands::parse(line, &pending) {
        Ok(Input::Quit) => return false,
        Ok(Input::Help) => {
            println!("{HELP}");
            return true;
        }
        Ok(Input::Events(events)) => events,
        Ok(Input::Attach { kind, path }) => match std::fs::read(&path) {
            Ok(bytes) => vec![BoardEvent::AttachMedia { kind, bytes }],
            Err(err) => {
                println!("cannot read {}: {err}", path.display());
                return true;
            }
        },
        Err(err) => {
            println!("{err}");
            return true;
        }
    };
    for event in events {
        if tx.send(BoardMsg::Command(event)).is_err() {
            return false;
        }
    }
    true
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = cli.merge_into_config(cli.load_config()?);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    let store = match &cli.seed {
        Some(path) => MemStore::from_json(&std::fs::read_to_string(path)?)?,
        None => MemStore::from_json(DEFAULT_SEED)?,
    };
    let engagement = EngagementRecord::open(&config.engagement_path)?;
    let clock: Arc<dyn Clock> = match cli.now {
        Some(now) => Arc::new(ManualClock::new(now)),
        None => Arc::new(SystemClock),
    };
    info!("[Board] starting with page size {} and relock every {}s", config.page_size, config.relock_interval_secs);

    let (tx, rx) = mpsc::unbounded_channel();
    let mut engine = Engine::new(config, store.into_shared(), engagement, clock, rx)?;
    let printer = Printer::default();
    let draft = Arc::clone(&printer.draft);
    let engine_task = tokio::spawn(async move {
        engine.start(vec![printer]).await;
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_line(&line, &tx, &draft) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("[Board] reading input failed: {err}");
                    break;
                }
            },
            _ = signal::ctrl_c() => {
                info!("[Board] received shutdown signal");
                break;
            }
        }
    }

    let _ = tx.send(BoardMsg::Exit);
    engine_task.await?;
    Ok(())
}
