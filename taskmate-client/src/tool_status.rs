/// Tool-invocation indicator
///
/// The indicator normally follows the `toolCall` field of stream chunks.
/// Older servers instead embed `[TOOL:<name>]` in the assistant text, which
/// [`extract_tool_marker`] picks up. Either way the name is shown until the
/// reply finishes or the timeout passes.

use regex_lite::Regex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use taskmate_shared::chat::ToolName;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(
            r"\[TOOL:(createTaskTool|getTasksTool|deleteTaskTool|searchTaskByTitleTool|updateTaskTool)\]",
        )
        .unwrap_or_else(|e| unreachable!("marker pattern is valid: {}", e))
    })
}

/// First tool marker in `content`
pub fn extract_tool_marker(content: &str) -> Option<ToolName> {
    marker_regex()
        .captures(content)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// `content` without tool markers, for display and model context
pub fn strip_tool_markers(content: &str) -> String {
    marker_regex().replace_all(content, "").trim_end().to_string()
}

#[derive(Debug, Clone)]
pub struct ToolIndicator {
    active: Option<(ToolName, Instant)>,
    timeout: Duration,
}

impl Default for ToolIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

impl ToolIndicator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            active: None,
            timeout,
        }
    }

    pub fn show(&mut self, tool: ToolName, now: Instant) {
        self.active = Some((tool, now));
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    /// The tool to display at `now`, if any
    pub fn current(&self, now: Instant) -> Option<ToolName> {
        self.active
            .filter(|(_, since)| now.saturating_duration_since(*since) < self.timeout)
            .map(|(tool, _)| tool)
    }
}
