//! Byte-budgeted context building for outbound text-generation calls.
//!
//! Emits an ordered sequence of parts — rolling summary first, then the
//! most recent turns chronologically — whose total encoded size never
//! exceeds the configured budget. Truncation is byte-exact but always cuts
//! on a character boundary, so multi-byte encodings survive intact.

use serde::Serialize;

use crate::session::model::{SessionState, TurnRole};

/// Marker appended to any part that was cut.
pub const TRIM_MARKER: &str = " …";

/// Smallest allotment handed to a single part, budget permitting.
pub const MIN_PART_BYTES: usize = 64;

/// Share of the budget reserved for pre-trimming the summary, in percent.
pub const SUMMARY_BUDGET_PERCENT: usize = 35;

/// Role of one outbound context part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextRole {
    /// Rolling summary of evicted history.
    System,
    /// Host-originated turn.
    Host,
    /// Worker-originated turn.
    Server,
}

/// One part of an outbound context payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextPart {
    /// Part role.
    pub role: ContextRole,
    /// Trimmed content.
    pub content: String,
}

/// Truncate `s` to at most `max_bytes` encoded bytes, cutting on a char
/// boundary and appending [`TRIM_MARKER`] when anything was removed.
///
/// The marker is counted inside `max_bytes`. Binary-searches the longest
/// prefix whose encoded size fits, so the cut never splits a multi-byte
/// character. Budgets too small to fit the marker fall back to a bare
/// prefix.
#[must_use]
pub fn trim_by_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }

    if max_bytes <= TRIM_MARKER.len() {
        return longest_prefix(s, max_bytes).to_owned();
    }

    let mut out = longest_prefix(s, max_bytes - TRIM_MARKER.len()).to_owned();
    out.push_str(TRIM_MARKER);
    out
}

/// Longest prefix of `s` whose encoded size is at most `max_bytes`, found
/// by binary search over char boundaries.
fn longest_prefix(s: &str, max_bytes: usize) -> &str {
    let boundaries: Vec<usize> = s
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(s.len()))
        .collect();

    let (mut lo, mut hi) = (0usize, boundaries.len() - 1);
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if boundaries[mid] <= max_bytes {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    &s[..boundaries[lo]]
}

/// Build the ordered, byte-bounded context for one outbound request.
///
/// 1. A non-empty rolling summary becomes the first part, pre-trimmed to
///    [`SUMMARY_BUDGET_PERCENT`] of `budget`.
/// 2. The most recent `context_turns` turns follow chronologically,
///    preview text preferred over full text.
/// 3. Each part's allotment is the remaining budget divided by the parts
///    not yet emitted, floored at [`MIN_PART_BYTES`] but never above what
///    remains, so the emitted total cannot exceed `budget`.
#[must_use]
pub fn build_context(
    session: &SessionState,
    context_turns: usize,
    budget: usize,
) -> Vec<ContextPart> {
    let mut staged: Vec<(ContextRole, String)> = Vec::new();

    if !session.summary.trim().is_empty() {
        let summary_cap = budget * SUMMARY_BUDGET_PERCENT / 100;
        staged.push((
            ContextRole::System,
            trim_by_bytes(&session.summary, summary_cap),
        ));
    }

    let skip = session.messages.len().saturating_sub(context_turns);
    for turn in &session.messages[skip..] {
        let role = match turn.role {
            TurnRole::Host => ContextRole::Host,
            TurnRole::Server => ContextRole::Server,
        };
        staged.push((role, turn.content().to_owned()));
    }

    let total = staged.len().max(1);
    let mut out = Vec::with_capacity(staged.len());
    let mut used = 0usize;

    for (role, content) in staged {
        let remaining = budget.saturating_sub(used);
        if remaining == 0 {
            break;
        }
        let left = total - out.len();
        let allowance = remaining.min(MIN_PART_BYTES.max(remaining / left));
        let trimmed = trim_by_bytes(&content, allowance);
        used += trimmed.len();
        out.push(ContextPart {
            role,
            content: trimmed,
        });
    }

    out
}
