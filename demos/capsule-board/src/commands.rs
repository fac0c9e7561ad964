//! Line commands typed at the prompt.

use std::path::PathBuf;

use capsule::board::BoardEvent;
use capsule::draft::{CommentDraft, PostDraft, Schedule};
use capsule::model::Target;
use capsule::store::MediaKind;
use capsule::timeline::{FilterMode, SortMode};
use chrono::NaiveDate;

pub const HELP: &str = "\
commands:
  up <post>                  upvote a capsule
  upc <post> <comment>       upvote a comment
  past | future              load one more page
  open <post>                show or hide comments
  search [text]              filter by text (empty clears)
  filter all|today|locked    narrow the timeline
  sort time|top              chronological or most upvoted
  post <text>                publish now
  seal <date> <time> <text>  seal until date (YYYY-MM-DD) and time (HH:MM)
  backdate <date> <text>     file under an earlier day
  attach image|audio <file>  add media to the next capsule
  comment <post> <text>      reply to a capsule
  refresh | help | quit";

#[derive(Debug)]
pub enum Input {
    Events(Vec<BoardEvent>),
    Attach { kind: MediaKind, path: PathBuf },
    Help,
    Quit,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("bad date '{0}', expected YYYY-MM-DD")]
    Date(String),
}

fn split_first(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.trim();
    match rest.split_once(char::is_whitespace) {
        Some((head, tail)) => Some((head, tail.trim())),
        None if !rest.is_empty() => Some((rest, "")),
        None => None,
    }
}

fn draft_events(draft: PostDraft) -> Input {
    Input::Events(vec![BoardEvent::EditPost(draft), BoardEvent::SubmitPost])
}

pub fn parse(line: &str, pending: &PostDraft) -> Result<Input, CommandError> {
    let Some((cmd, rest)) = split_first(line) else {
        return Ok(Input::Events(Vec::new()));
    };
    let single = |event: BoardEvent| -> Result<Input, CommandError> { Ok(Input::Events(vec![event])) };
    match cmd {
        "quit" | "exit" => Ok(Input::Quit),
        "help" => Ok(Input::Help),
        "refresh" => single(BoardEvent::Refresh),
        "past" => single(BoardEvent::ExpandPast),
        "future" => single(BoardEvent::ExpandFuture),
        "up" if !rest.is_empty() => single(BoardEvent::Upvote { target: Target::Post, id: rest.to_string(), parent: None }),
        "up" => Err(CommandError::Usage("up <post>")),
        "upc" => match split_first(rest) {
            Some((post, comment)) if !comment.is_empty() => single(BoardEvent::Upvote {
                target: Target::Comment,
                id: comment.to_string(),
                parent: Some(post.to_string()),
            }),
            _ => Err(CommandError::Usage("upc <post> <comment>")),
        },
        "open" if !rest.is_empty() => single(BoardEvent::ToggleThread { parent: rest.to_string() }),
        "open" => Err(CommandError::Usage("open <post>")),
        "search" => single(BoardEvent::SetSearch(rest.to_string())),
        "filter" => match rest {
            "all" => single(BoardEvent::SetFilter(FilterMode::All)),
            "today" => single(BoardEvent::SetFilter(FilterMode::Today)),
            "locked" => single(BoardEvent::SetFilter(FilterMode::LockedOnly)),
            _ => Err(CommandError::Usage("filter all|today|locked")),
        },
        "sort" => match rest {
            "time" => single(BoardEvent::SetSort(SortMode::Chronological)),
            "top" => single(BoardEvent::SetSort(SortMode::Popularity)),
            _ => Err(CommandError::Usage("sort time|top")),
        },
        "post" => Ok(draft_events(PostDraft { content: rest.to_string(), schedule: Schedule::Publish, ..pending.clone() })),
        "seal" => {
            let usage = CommandError::Usage("seal <date> <time> <text>");
            let (date, rest) = split_first(rest).ok_or(usage.clone())?;
            let (time, text) = split_first(rest).ok_or(usage)?;
            let schedule = Schedule::UnlockAt { date: date.to_string(), time: time.to_string() };
            Ok(draft_events(PostDraft { content: text.to_string(), schedule, ..pending.clone() }))
        }
        "backdate" => {
            let (date, text) = split_first(rest).ok_or(CommandError::Usage("backdate <date> <text>"))?;
            let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| CommandError::Date(date.to_string()))?;
            Ok(draft_events(PostDraft { content: text.to_string(), backdate: Some(day), schedule: Schedule::Publish, ..pending.clone() }))
        }
        "attach" => {
            let (kind, path) = split_first(rest).ok_or(CommandError::Usage("attach image|audio <file>"))?;
            let kind = match kind {
                "image" => MediaKind::Image,
                "audio" => MediaKind::Audio,
                _ => return Err(CommandError::Usage("attach image|audio <file>")),
            };
            if path.is_empty() {
                return Err(CommandError::Usage("attach image|audio <file>"));
            }
            Ok(Input::Attach { kind, path: PathBuf::from(path) })
        }
        "comment" => match split_first(rest) {
            Some((post, text)) => {
                let parent = post.to_string();
                let draft = CommentDraft { content: text.to_string(), ..Default::default() };
                Ok(Input::Events(vec![
                    BoardEvent::EditComment { parent: parent.clone(), draft },
                    BoardEvent::SubmitComment { parent },
                ]))
            }
            None => Err(CommandError::Usage("comment <post> <text>")),
        },
        other => Err(CommandError::Unknown(other.to_string())),
    }
}
