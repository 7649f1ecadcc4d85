//! Session compaction tests.

use mcp_bridge::config::ContextConfig;
use mcp_bridge::session::compactor::compact_if_needed;
use mcp_bridge::session::context::TRIM_MARKER;
use mcp_bridge::session::model::{SessionState, Turn, TurnRole};

fn tiny_ceiling_config() -> ContextConfig {
    ContextConfig {
        context_turns: 6,
        session_ceiling_bytes: 64,
        summary_ceiling_bytes: 2000,
        summary_bullets: 5,
        ..ContextConfig::default()
    }
}

fn session_with_turns(count: usize) -> SessionState {
    let mut session = SessionState::new("compact-test");
    for n in 0..count {
        if n % 2 == 0 {
            session.record_host(format!("host message {n}"), None);
        } else {
            session.record_server(format!("server message {n}"), None);
        }
    }
    session
}

#[test]
fn under_ceiling_sessions_are_left_untouched() {
    let mut session = session_with_turns(4);
    let before = session.clone();

    let compacted = compact_if_needed(&mut session, &ContextConfig::default());
    assert!(!compacted);
    assert_eq!(session, before);
}

#[test]
fn overflow_retains_twice_the_context_turns() {
    let mut session = session_with_turns(14);

    let compacted = compact_if_needed(&mut session, &tiny_ceiling_config());
    assert!(compacted);
    assert_eq!(session.messages.len(), 12);
    assert_eq!(session.messages[0].text, "host message 2");
    assert_eq!(session.messages[11].text, "server message 13");
}

#[test]
fn evicted_turns_become_labeled_bullets() {
    let mut session = session_with_turns(14);

    compact_if_needed(&mut session, &tiny_ceiling_config());

    let expected = "- Host: host message 0\n- Server: server message 1";
    assert_eq!(session.summary, expected);
}

#[test]
fn only_the_last_bullets_worth_of_evictions_survive() {
    let mut session = session_with_turns(20);

    compact_if_needed(&mut session, &tiny_ceiling_config());

    assert_eq!(session.messages.len(), 12);
    // 8 turns evicted, 5 bullets kept: turns 0..=2 leave no trace.
    let bullets: Vec<&str> = session.summary.lines().collect();
    assert_eq!(bullets.len(), 5);
    assert_eq!(bullets[0], "- Server: server message 3");
    assert!(!session.summary.contains("message 0"));
    assert!(!session.summary.contains("message 2"));
    assert!(session.summary.contains("message 3"));
    assert!(session.summary.contains("message 7"));
}

#[test]
fn existing_summary_is_preserved_ahead_of_new_bullets() {
    let mut session = session_with_turns(14);
    session.summary = "- Host: earlier business".into();

    compact_if_needed(&mut session, &tiny_ceiling_config());

    assert!(session.summary.starts_with("- Host: earlier business\n"));
    assert!(session.summary.ends_with("- Server: server message 1"));
}

#[test]
fn combined_summary_is_trimmed_to_its_ceiling() {
    let mut session = session_with_turns(14);
    session.summary = "s".repeat(5_000);
    let cfg = ContextConfig {
        summary_ceiling_bytes: 200,
        ..tiny_ceiling_config()
    };

    compact_if_needed(&mut session, &cfg);

    assert!(session.summary.len() <= 200);
    assert!(session.summary.ends_with(TRIM_MARKER));
}

#[test]
fn bullet_text_is_whitespace_collapsed_and_capped() {
    let mut session = session_with_turns(12);
    let noisy = format!("  line one\n\n   line\ttwo {}", "x".repeat(300));
    session.messages.insert(0, Turn::new(TurnRole::Host, noisy));

    compact_if_needed(&mut session, &tiny_ceiling_config());

    let bullet = session.summary.lines().next().unwrap();
    assert!(bullet.starts_with("- Host: line one line two x"));
    assert!(!bullet.contains('\t'));
    // "- Host: " prefix plus a 160-char snippet.
    assert_eq!(bullet.len(), "- Host: ".len() + 160);
}

#[test]
fn bullets_prefer_preview_text() {
    let mut session = session_with_turns(12);
    let turn = Turn::new(TurnRole::Server, "very long raw payload".repeat(50))
        .with_preview("compact form");
    session.messages.insert(0, turn);

    compact_if_needed(&mut session, &tiny_ceiling_config());

    assert!(session.summary.starts_with("- Server: compact form"));
}
