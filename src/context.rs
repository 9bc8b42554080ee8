//! Token-budgeted conversational context store
//!
//! The window holds the items a turn reads from and writes to. Capacity is
//! enforced after every insertion by a greedy score-minimizing eviction:
//! importance is the dominant key, recency breaks ties. High-importance items
//! (system prompts) stay pinned as long as nothing more important arrives,
//! while filler content ages out first.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Default importance assigned when the caller does not provide one
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Classification of a context item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    System,
    User,
    Assistant,
    Knowledge,
    ToolResult,
    Other,
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ContextType::System => "system",
            ContextType::User => "user",
            ContextType::Assistant => "assistant",
            ContextType::Knowledge => "knowledge",
            ContextType::ToolResult => "tool_result",
            ContextType::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// One unit of conversational memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: Uuid,
    pub content: String,
    pub context_type: ContextType,
    /// Retention weight in `[0, 1]`; out-of-range input is clamped
    pub importance: f64,
    /// Deterministic approximation computed at insertion
    pub token_count: usize,
    /// Monotonic sequence number, not wall-clock
    pub inserted_at: u64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Point-in-time view of window occupancy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowStats {
    pub item_count: usize,
    pub current_tokens: usize,
    pub max_tokens: usize,
    pub utilization: f64,
}

/// Estimate token cost of a piece of content
///
/// Fixed monotonic approximation: one token per four characters, rounded up.
/// Empty content costs nothing.
pub fn estimate_tokens(content: &str) -> usize {
    content.chars().count().div_ceil(4)
}

struct WindowState {
    items: Vec<ContextItem>,
    current_tokens: usize,
    next_sequence: u64,
}

/// Bounded, importance-weighted store of conversational items
///
/// All operations take `&self`; a single internal lock makes each insertion
/// (including its eviction pass) atomic with respect to readers, so a reader
/// never observes the window over budget or a torn eviction.
pub struct ContextWindow {
    max_tokens: usize,
    state: Mutex<WindowState>,
}

impl ContextWindow {
    /// Create a window with the given immutable token capacity
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            state: Mutex::new(WindowState {
                items: Vec::new(),
                current_tokens: 0,
                next_sequence: 0,
            }),
        }
    }

    /// Append an item, then evict until the window is back within budget
    ///
    /// Always succeeds. Empty or whitespace-only content is accepted and
    /// costs its (minimal) estimated tokens.
    pub fn add(
        &self,
        content: impl Into<String>,
        context_type: ContextType,
        importance: f64,
        metadata: HashMap<String, serde_json::Value>,
    ) -> ContextItem {
        let content = content.into();
        let token_count = estimate_tokens(&content);

        let mut state = self.lock_state();
        let item = ContextItem {
            id: Uuid::new_v4(),
            content,
            context_type,
            importance: importance.clamp(0.0, 1.0),
            token_count,
            inserted_at: state.next_sequence,
            metadata,
        };
        state.next_sequence += 1;
        state.current_tokens += item.token_count;
        state.items.push(item.clone());

        if state.current_tokens > self.max_tokens {
            let evicted = Self::evict_to_budget(&mut state, self.max_tokens);
            debug!(
                evicted = evicted,
                current_tokens = state.current_tokens,
                max_tokens = self.max_tokens,
                "Context window evicted items to stay within budget"
            );
        }

        item
    }

    /// Append an item with default importance and no metadata
    pub fn add_default(&self, content: impl Into<String>, context_type: ContextType) -> ContextItem {
        self.add(content, context_type, DEFAULT_IMPORTANCE, HashMap::new())
    }

    /// Render an importance-ordered digest of live items
    ///
    /// Highest importance first, ties broken most-recent-first. Read-only.
    pub fn summary(&self, max_items: Option<usize>) -> String {
        let state = self.lock_state();

        let mut ordered: Vec<&ContextItem> = state.items.iter().collect();
        ordered.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(Ordering::Equal)
                .then(b.inserted_at.cmp(&a.inserted_at))
        });

        let limit = max_items.unwrap_or(usize::MAX);
        ordered
            .iter()
            .take(limit)
            .map(|item| format!("[{}] {}", item.context_type, item.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Snapshot of the live items in insertion order
    pub fn items(&self) -> Vec<ContextItem> {
        self.lock_state().items.clone()
    }

    /// Current occupancy counters
    pub fn stats(&self) -> WindowStats {
        let state = self.lock_state();
        let utilization = if self.max_tokens == 0 {
            0.0
        } else {
            state.current_tokens as f64 / self.max_tokens as f64
        };
        WindowStats {
            item_count: state.items.len(),
            current_tokens: state.current_tokens,
            max_tokens: self.max_tokens,
            utilization,
        }
    }

    /// Remove all items and reset the token counter
    ///
    /// Sequence numbers are not reset, so recency ordering stays well-defined
    /// across a clear.
    pub fn clear(&self) {
        let mut state = self.lock_state();
        state.items.clear();
        state.current_tokens = 0;
    }

    /// Immutable token capacity
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, WindowState> {
        // A poisoning panic cannot leave the counters inconsistent: every
        // mutation completes item bookkeeping before releasing the lock.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove lowest-scoring items until the window fits its budget
    ///
    /// Score is importance; ties are broken by recency (more recent wins),
    /// which with monotonic sequence numbers is also the final deterministic
    /// tiebreak. Whole items only. Returns the number of evictions.
    fn evict_to_budget(state: &mut WindowState, max_tokens: usize) -> usize {
        let mut evicted = 0;
        while state.current_tokens > max_tokens && !state.items.is_empty() {
            let victim = state
                .items
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    a.importance
                        .partial_cmp(&b.importance)
                        .unwrap_or(Ordering::Equal)
                        .then(a.inserted_at.cmp(&b.inserted_at))
                })
                .map(|(index, _)| index);

            match victim {
                Some(index) => {
                    let item = state.items.remove(index);
                    state.current_tokens -= item.token_count;
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}
