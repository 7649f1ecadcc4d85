//! Session compaction — folds overflowing history into the rolling summary.
//!
//! Intentionally lossy: only the last few evicted turns survive as summary
//! bullets; older evictions leave no trace.

use tracing::info;

use crate::config::ContextConfig;
use crate::session::context::trim_by_bytes;
use crate::session::model::{SessionState, Turn};

/// Character cap for one summary bullet's text.
const BULLET_CHARS: usize = 160;

/// Compact `session` in place when its serialized size exceeds the ceiling.
///
/// Retains the most recent `2 × context_turns` turns verbatim. Of the
/// evicted turns, the last `summary_bullets` are rendered as
/// `- <Role>: <text>` lines, appended to any existing summary, and the
/// combined summary is re-trimmed to the summary ceiling. Returns whether
/// compaction ran; an under-ceiling session is left untouched.
pub fn compact_if_needed(session: &mut SessionState, cfg: &ContextConfig) -> bool {
    let raw_size = session.serialized_bytes();
    if raw_size <= cfg.session_ceiling_bytes {
        return false;
    }

    let keep_count = cfg.context_turns * 2;
    let cut = session.messages.len().saturating_sub(keep_count);
    let evicted: Vec<Turn> = session.messages.drain(..cut).collect();

    if !evicted.is_empty() {
        let start = evicted.len().saturating_sub(cfg.summary_bullets);
        let bullets = evicted[start..]
            .iter()
            .map(render_bullet)
            .collect::<Vec<_>>()
            .join("\n");

        let combined = if session.summary.is_empty() {
            bullets
        } else {
            format!("{}\n{bullets}", session.summary)
        };
        session.summary = trim_by_bytes(&combined, cfg.summary_ceiling_bytes);
    }

    info!(
        server_id = %session.server_id,
        size_kb = raw_size / 1024,
        retained = session.messages.len(),
        "session compacted"
    );
    true
}

/// Render one evicted turn as a summary bullet, whitespace-collapsed and
/// capped at [`BULLET_CHARS`] characters.
fn render_bullet(turn: &Turn) -> String {
    let collapsed = turn.content().split_whitespace().collect::<Vec<_>>().join(" ");
    let snippet: String = collapsed.chars().take(BULLET_CHARS).collect();
    format!("- {}: {snippet}", turn.role.label())
}
