use std::fmt::Write;

use capsule::board::BoardView;
use capsule::comments::ThreadView;
use capsule::notice::NoticeLevel;
use capsule::timeline::{CapsuleView, Timeline};

fn capsule_line(out: &mut String, view: &CapsuleView, indent: &str, upvoted: bool) {
    let mark = if upvoted { "*" } else { " " };
    match &view.content {
        Some(content) => {
            let _ = writeln!(out, "{indent}[{}] {} {}: {content}  ({}{mark} up)", view.id, view.post_time, view.author, view.upvotes);
            if let Some(original) = &view.original_date {
                let _ = writeln!(out, "{indent}    written on {original}");
            }
            for url in &view.image_urls {
                let _ = writeln!(out, "{indent}    image {url}");
            }
            if let Some(url) = &view.audio_url {
                let _ = writeln!(out, "{indent}    audio {url}");
            }
        }
        None => {
            let _ = writeln!(out, "{indent}[{}] sealed by {}, opens in {}  ({}{mark} up)", view.id, view.author, view.countdown, view.upvotes);
        }
    }
}

fn timeline_lines(out: &mut String, timeline: &Timeline, indent: &str, upvoted: &[String], counts: Option<&dyn Fn(&str) -> usize>) {
    for bucket in &timeline.buckets {
        let _ = writeln!(out, "{indent}-- {} --", bucket.date);
        for view in bucket.unlocked.iter().chain(bucket.locked.iter()) {
            capsule_line(out, view, indent, upvoted.iter().any(|id| id == &view.id));
            if let Some(count) = counts {
                let n = count(&view.id);
                if n > 0 {
                    let _ = writeln!(out, "{indent}    {n} comment(s)");
                }
            }
        }
    }
}

fn thread_lines(out: &mut String, thread: &ThreadView, upvoted: &[String]) {
    let _ = writeln!(out, "  comments on [{}] ({}, {} sealed)", thread.parent, thread.count, thread.locked);
    if thread.loading {
        let _ = writeln!(out, "    loading...");
    } else if thread.failed {
        let _ = writeln!(out, "    could not load comments");
    } else if thread.timeline.is_empty() {
        let _ = writeln!(out, "    no comments yet");
    }
    timeline_lines(out, &thread.timeline, "    ", upvoted, None);
}

/// Plain-text frame for the terminal.
pub fn render(view: &BoardView) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "== {} | {} capsules, {} sealed, {} upvotes ==",
        view.now.format("%Y-%m-%d %H:%M"),
        view.stats.total,
        view.stats.locked,
        view.stats.total_upvotes
    );
    if view.loading {
        let _ = writeln!(out, "loading...");
    }
    if let Some(featured) = &view.timeline.featured {
        let _ = writeln!(out, "featured: [{}] {} ({} up)", featured.id, featured.content.as_deref().unwrap_or_default(), featured.upvotes);
    }
    if view.has_past {
        let _ = writeln!(out, "   ^ more in the past ('past')");
    }
    let counts: &dyn Fn(&str) -> usize = &|id| view.comment_counts.get(id).copied().unwrap_or(0);
    timeline_lines(&mut out, &view.timeline, "", &view.upvoted_posts, Some(counts));
    if view.timeline.is_empty() && !view.loading {
        let _ = writeln!(out, "nothing to show");
    }
    if view.has_future {
        let _ = writeln!(out, "   v more in the future ('future')");
    }
    for thread in &view.threads {
        thread_lines(&mut out, thread, &view.upvoted_comments);
    }
    if let Some(draft) = &view.draft {
        let attached = draft.image_urls.len() + usize::from(draft.audio_url.is_some());
        if attached > 0 {
            let _ = writeln!(out, "draft has {attached} attachment(s)");
        }
    }
    for notice in &view.notices {
        let tag = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Error => "error",
        };
        let _ = writeln!(out, "({tag}) {}", notice.message);
    }
    out
}
