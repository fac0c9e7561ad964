use std::collections::HashSet;

use capsule::board::{Board, BoardEvent, Effect};
use capsule::comments::ThreadFetch;
use capsule::config::BoardConfig;
use capsule::lock::{self, Countdown};
use capsule::model::{Comment, Post, Target};
use capsule::pager::sort_by_anchor;
use capsule::store::StoreError;
use capsule::timeline::{self, FilterMode, TimelineQuery};
use integration_tests::support::{at, comment, fetch_generation, post, reload_with, sealed};
use itertools::Itertools;

fn board(page_size: usize, now: &str) -> Board {
    Board::new(BoardConfig { page_size, ..Default::default() }, at(now, "12:00"), HashSet::new(), HashSet::new())
}

fn loaded(page_size: usize, now: &str, posts: Vec<Post>) -> Board {
    reload_with(&board(page_size, now), at(now, "12:00"), posts)
}

fn upvote(id: &str) -> BoardEvent {
    BoardEvent::Upvote { target: Target::Post, id: id.to_string(), parent: None }
}

#[test]
fn sealed_and_open_capsules_from_the_same_day_split_across_buckets() {
    let items = vec![post("a", "2025-01-01", 0), sealed("b", "2025-01-01", "2099-01-01", "00:00")];
    let grouped = timeline::assemble(&items, &TimelineQuery::default(), at("2025-06-01", "00:00"));

    assert_eq!(grouped.buckets.len(), 2);
    assert_eq!(grouped.buckets[0].date, "2025-01-01");
    assert_eq!(grouped.buckets[0].unlocked.len(), 1);
    assert!(grouped.buckets[0].locked.is_empty());
    assert_eq!(grouped.buckets[1].date, "2099-01-01");
    assert_eq!(grouped.buckets[1].locked.len(), 1);
    assert!(grouped.buckets[1].unlocked.is_empty());
}

#[test]
fn double_upvote_only_counts_once() {
    let b = loaded(10, "2025-01-01", vec![post("x", "2025-01-01", 5)]);
    let (b, first) = b.apply(upvote("x"));
    let (b, second) = b.apply(upvote("x"));

    assert_eq!(b.post("x").unwrap().upvotes, 6);
    let patches = first.iter().chain(second.iter()).filter(|e| matches!(e, Effect::PatchUpvotes { .. })).count();
    assert_eq!(patches, 1);
    assert_eq!(b.ledger(Target::Post).engaged().len(), 1);
}

#[test]
fn a_year_and_a_day_reads_as_such() {
    let c = lock::countdown(Some("2026-01-02"), Some("00:00"), at("2025-01-01", "00:00"));
    assert_eq!(c, Countdown::YearsDays { years: 1, days: 1 });
    assert_eq!(c.to_string(), "1 year 1 day");
}

#[test]
fn once_open_a_capsule_stays_open() {
    let start = at("2025-03-01", "00:00");
    let mut seen_open = false;
    for hour in 0..(24 * 20) {
        let now = start + chrono::Duration::hours(hour);
        let open = lock::is_unlocked(Some("2025-03-10"), Some("13:30"), now);
        assert!(!(seen_open && !open), "lock state went backwards at {now}");
        seen_open |= open;
    }
    assert!(seen_open);
    for now in [start, at("1970-01-01", "00:00"), at("2999-12-31", "23:59")] {
        assert!(lock::is_unlocked(None, Some("10:00"), now));
        assert!(lock::is_unlocked(Some("2025-03-10"), None, now));
    }
}

#[test]
fn capsule_moves_buckets_when_it_opens() {
    let b = loaded(5, "2025-01-10", vec![post("p", "2024-12-30", 0), sealed("s", "2025-01-01", "2025-01-10", "13:00")]);
    let view = b.view();
    let bucket = view.timeline.bucket("2025-01-10").expect("sealed capsule files under its unlock day");
    assert_eq!(bucket.locked.len(), 1);
    assert!(bucket.locked[0].content.is_none());

    // The display tick already reveals the content.
    let (ticked, _) = b.apply(BoardEvent::Tick { now: at("2025-01-10", "13:00") });
    let view = ticked.view();
    assert!(view.timeline.buckets.iter().all(|bk| bk.locked.is_empty()));

    // The relock tick re-sorts it under its post date.
    let relocked = reload_with(&ticked, at("2025-01-10", "13:00"), vec![
        post("p", "2024-12-30", 0),
        sealed("s", "2025-01-01", "2025-01-10", "13:00"),
    ]);
    let view = relocked.view();
    let opened = view.timeline.bucket("2025-01-01").expect("open capsule files under its post day");
    assert_eq!(opened.unlocked[0].content.as_deref(), Some("capsule s"));
    assert_eq!(relocked.pager().backing().iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["p", "s"]);
}

#[test]
fn locked_flag_without_unlock_fields_is_shown() {
    let mut broken = post("b", "2025-01-01", 0);
    broken.is_locked = true;
    broken.unlock_date = Some("2099-01-01".to_string());
    let b = loaded(5, "2025-01-01", vec![broken]);
    let view = b.view();
    assert_eq!(view.stats.locked, 0);
    assert_eq!(view.timeline.buckets[0].unlocked[0].content.as_deref(), Some("capsule b"));
}

#[test]
fn malformed_unlock_is_invalid_but_readable() {
    let b = loaded(5, "2025-01-01", vec![sealed("m", "2025-01-01", "2025-02-30", "25:00")]);
    let view = b.view();
    let shown = &view.timeline.buckets[0].unlocked[0];
    assert_eq!(shown.countdown, Countdown::Invalid);
    assert!(shown.content.is_some());
}

#[test]
fn failed_upvote_after_refetch_keeps_server_count() {
    let b = loaded(5, "2025-01-01", vec![post("1", "2025-01-01", 3)]);
    let (b, effects) = b.apply(upvote("1"));
    let seq = effects
        .iter()
        .find_map(|e| match e {
            Effect::PatchUpvotes { seq, .. } => Some(*seq),
            _ => None,
        })
        .unwrap();
    assert_eq!(b.post("1").unwrap().upvotes, 4);

    let b = reload_with(&b, at("2025-01-01", "12:01"), vec![post("1", "2025-01-01", 10)]);
    let (b, effects) = b.apply(BoardEvent::UpvoteSettled {
        target: Target::Post,
        seq,
        result: Err(StoreError::Unavailable("timeout".to_string())),
    });
    assert_eq!(b.post("1").unwrap().upvotes, 10);
    assert!(!b.ledger(Target::Post).is_engaged("1"));
    assert_eq!(effects, vec![Effect::ForgetEngagement { target: Target::Post, id: "1".to_string() }]);
}

#[test]
fn rollbacks_are_released_in_issue_order() {
    let b = loaded(5, "2025-01-01", vec![post("1", "2025-01-01", 0), post("2", "2025-01-01", 0)]);
    let (b, _) = b.apply(upvote("1"));
    let (b, _) = b.apply(upvote("2"));
    let failed = || Err(StoreError::Unavailable("down".to_string()));

    let (b, early) = b.apply(BoardEvent::UpvoteSettled { target: Target::Post, seq: 2, result: failed() });
    assert!(early.is_empty(), "second settlement waits for the first");
    assert_eq!(b.post("2").unwrap().upvotes, 1);

    let (b, released) = b.apply(BoardEvent::UpvoteSettled { target: Target::Post, seq: 1, result: Ok(()) });
    assert_eq!(released, vec![Effect::ForgetEngagement { target: Target::Post, id: "2".to_string() }]);
    assert_eq!(b.post("1").unwrap().upvotes, 1);
    assert_eq!(b.post("2").unwrap().upvotes, 0);
}

#[test]
fn paging_never_skips_or_repeats() {
    let posts: Vec<Post> = (1..=50).map(|d| post(&d.to_string(), &format!("2025-03-{:02}", (d - 1) % 28 + 1), 0)).collect();
    let now = at("2025-03-14", "12:00");
    let mut expected = posts.clone();
    sort_by_anchor(&mut expected, now);

    let mut b = loaded(7, "2025-03-14", posts);
    let steps = [BoardEvent::ExpandPast, BoardEvent::ExpandFuture, BoardEvent::ExpandFuture, BoardEvent::ExpandPast];
    for step in steps.iter().cycle().take(24) {
        let (next, effects) = b.apply(step.clone());
        b = next;
        for effect in effects {
            if let Effect::LoadPage(expansion) = effect {
                b = b.apply(BoardEvent::PageReady { expansion }).0;
            }
        }
        let range = b.pager().window_range();
        let window: Vec<&str> = b.pager().window().iter().map(|p| p.id.as_str()).collect();
        let slice: Vec<&str> = expected[range.clone()].iter().map(|p| p.id.as_str()).collect();
        assert_eq!(window, slice);
        assert_eq!(window.iter().unique().count(), window.len());
        assert!(b.pager().window().iter().tuple_windows().all(|(a, c)| a.post_date <= c.post_date));
        assert_eq!(b.pager().has_past(), range.start > 0);
        assert_eq!(b.pager().has_future(), range.end < expected.len());
    }
    assert_eq!(b.pager().window().len(), 50);
}

#[test]
fn search_and_filters_apply_to_the_window() {
    let mut hello = post("1", "2025-01-01", 0);
    hello.content = "Hello world".to_string();
    let mut secret = sealed("2", "2025-01-01", "2025-01-01", "18:00");
    secret.content = "hello from the past".to_string();
    let b = loaded(5, "2025-01-01", vec![hello, secret, post("3", "2025-01-02", 0)]);

    let (b, _) = b.apply(BoardEvent::SetSearch("HELLO".to_string()));
    assert_eq!(b.view().timeline.matched, 1);

    let (b, _) = b.apply(BoardEvent::SetSearch(String::new()));
    let (b, _) = b.apply(BoardEvent::SetFilter(FilterMode::Today));
    let view = b.view();
    assert_eq!(view.timeline.matched, 2);
    assert_eq!(view.timeline.buckets.len(), 1);

    let (b, _) = b.apply(BoardEvent::SetFilter(FilterMode::LockedOnly));
    assert_eq!(b.view().timeline.matched, 1);
}

fn sealed_comment(id: &str, parent: &str, unlock_date: &str) -> Comment {
    Comment {
        is_locked: true,
        unlock_date: Some(unlock_date.to_string()),
        unlock_time: Some("00:00".to_string()),
        ..comment(id, parent)
    }
}

#[test]
fn sealed_comments_file_under_their_unlock_day() {
    let b = loaded(5, "2025-01-01", vec![post("p", "2025-01-01", 0)]);
    let (b, effects) = b.apply(BoardEvent::ToggleThread { parent: "p".to_string() });
    let [Effect::FetchThread(fetch)] = effects.as_slice() else { panic!("expected a thread fetch, got {effects:?}") };
    let fetch: ThreadFetch = fetch.clone();
    let (b, _) = b.apply(BoardEvent::ThreadLoaded { fetch, result: Ok(vec![comment("c1", "p"), sealed_comment("c2", "p", "2026-05-05")]) });

    let view = b.view();
    let thread = &view.threads[0];
    assert_eq!(thread.count, 2);
    assert_eq!(thread.locked, 1);
    let sealed_bucket = thread.timeline.bucket("2026-05-05").unwrap();
    assert!(sealed_bucket.locked[0].content.is_none());
    assert_eq!(thread.timeline.bucket("2025-01-01").unwrap().unlocked[0].id, "c1");
}

#[test]
fn thread_fetch_failure_keeps_board_usable() {
    let b = loaded(5, "2025-01-01", vec![post("p", "2025-01-01", 0)]);
    let (b, effects) = b.apply(BoardEvent::ToggleThread { parent: "p".to_string() });
    let Some(Effect::FetchThread(fetch)) = effects.into_iter().next() else { panic!("expected a thread fetch") };
    let (b, _) = b.apply(BoardEvent::ThreadLoaded { fetch, result: Err(StoreError::Unavailable("offline".to_string())) });
    assert!(b.view().threads[0].failed);

    let (b, _) = b.apply(BoardEvent::ToggleThread { parent: "p".to_string() });
    let (_, effects) = b.apply(BoardEvent::ToggleThread { parent: "p".to_string() });
    assert_eq!(effects.len(), 1, "reopening retries the fetch");
}

#[test]
fn relock_issues_fresh_generations() {
    let b = board(5, "2025-01-01");
    let (b, first) = b.apply(BoardEvent::Relock { now: at("2025-01-01", "12:00") });
    let (_, second) = b.apply(BoardEvent::Relock { now: at("2025-01-01", "12:01") });
    assert!(fetch_generation(&second) > fetch_generation(&first));
}
