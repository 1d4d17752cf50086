/// Chat widget state machine
///
/// The widget owns everything the chat view shows: the loaded messages, the
/// input text, pagination state, the tool indicator and pending notices. It
/// performs no I/O. Callers ask it what to fetch ([`HistoryRequest`],
/// [`Submission`]) and feed results back through the `apply_*` methods.
///
/// # States
///
/// ```text
/// Closed ──open()──> Open(Idle) ──submit()──> Open(Submitting)
///                        ^                          │ first chunk
///                        │                          v
///                        └── complete / abort ── Open(Streaming)
/// ```
///
/// `fail()` returns any open state to `Idle`; `close()` returns to `Closed`
/// from anywhere.
///
/// Every submission gets a generation number. Chunks from an older
/// generation, or chunks arriving while no reply is expected, are dropped.

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use taskmate_shared::chat::{
    ChatChunk, ChatRole, CompletionMessage, CompletionRequest, HistoryPage, ToolName,
    DEFAULT_HISTORY_LIMIT,
};

use crate::messages::{ChatEntry, MessageKey};
use crate::scroll::{after_new_message, ScrollAction, ScrollMetrics};
use crate::tool_status::{extract_tool_marker, ToolIndicator, DEFAULT_TOOL_TIMEOUT};

/// Number of recent messages sent as context with each turn
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Request sent, no chunk received yet
    Submitting,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Closed,
    Open(Phase),
}

#[derive(Debug, Clone)]
pub struct WidgetOptions {
    pub history_window: usize,
    pub tool_timeout: Duration,
    /// IANA zone sent along with each completion request
    pub time_zone: Option<String>,
}

impl Default for WidgetOptions {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            time_zone: None,
        }
    }
}

/// A history page the caller should fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub cursor: Option<String>,
    pub limit: i64,
}

/// A completion the caller should start
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub generation: u64,
    pub request: CompletionRequest,
}

/// Something the user should be told about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error(String),
}

#[derive(Debug)]
pub struct ChatWidget {
    state: WidgetState,
    options: WidgetOptions,
    messages: Vec<ChatEntry>,
    input: String,
    cursor: Option<String>,
    has_more: bool,
    loading_history: bool,
    generation: u64,
    next_local_id: u64,
    pending_user: Option<MessageKey>,
    placeholder: Option<MessageKey>,
    tool: ToolIndicator,
    metrics: ScrollMetrics,
    notices: Vec<Notice>,
}

impl Default for ChatWidget {
    fn default() -> Self {
        Self::new(WidgetOptions::default())
    }
}

impl ChatWidget {
    pub fn new(options: WidgetOptions) -> Self {
        let tool = ToolIndicator::new(options.tool_timeout);
        Self {
            state: WidgetState::Closed,
            options,
            messages: Vec::new(),
            input: String::new(),
            cursor: None,
            has_more: true,
            loading_history: false,
            generation: 0,
            next_local_id: 0,
            pending_user: None,
            placeholder: None,
            tool,
            metrics: ScrollMetrics::default(),
            notices: Vec::new(),
        }
    }

    pub fn state(&self) -> WidgetState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, WidgetState::Open(_))
    }

    pub fn messages(&self) -> &[ChatEntry] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading_history(&self) -> bool {
        self.loading_history
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_tool(&self, now: Instant) -> Option<ToolName> {
        self.tool.current(now)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Opens the widget and asks for the newest history page
    ///
    /// Returns `None` if the widget was already open.
    pub fn open(&mut self) -> Option<HistoryRequest> {
        if self.is_open() {
            return None;
        }

        self.reset();
        self.state = WidgetState::Open(Phase::Idle);
        self.loading_history = true;

        Some(HistoryRequest {
            cursor: None,
            limit: DEFAULT_HISTORY_LIMIT,
        })
    }

    /// Closes the widget, discarding input, messages and pagination state
    pub fn close(&mut self) {
        self.reset();
        self.state = WidgetState::Closed;
    }

    fn reset(&mut self) {
        self.messages.clear();
        self.input.clear();
        self.cursor = None;
        self.has_more = true;
        self.loading_history = false;
        self.pending_user = None;
        self.placeholder = None;
        self.tool.clear();
        self.metrics = ScrollMetrics::default();
        // Anything still streaming for the old view is now stale
        self.generation += 1;
    }

    /// Installs the newest page fetched after [`open`](Self::open)
    pub fn apply_initial_page(&mut self, page: HistoryPage) -> ScrollAction {
        if !self.is_open() {
            return ScrollAction::Preserve {
                show_jump_button: false,
            };
        }

        self.loading_history = false;
        self.merge_page(page.messages.into_iter().map(ChatEntry::from).collect());
        self.has_more = page.has_more;
        self.cursor = page.next_cursor;

        ScrollAction::ScrollToBottom
    }

    /// Records the view position and asks for older messages near the top
    ///
    /// Returns `None` while a page is in flight, once history is exhausted,
    /// or when the view isn't close enough to the top.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> Option<HistoryRequest> {
        self.metrics = metrics;

        if !self.is_open() || !self.has_more || self.loading_history || !metrics.is_near_top() {
            return None;
        }

        self.loading_history = true;
        Some(HistoryRequest {
            cursor: self.cursor.clone(),
            limit: DEFAULT_HISTORY_LIMIT,
        })
    }

    /// Prepends an older page
    ///
    /// Messages already loaded are skipped. A page that adds nothing ends
    /// pagination.
    pub fn apply_older_page(&mut self, page: HistoryPage) -> ScrollAction {
        self.loading_history = false;
        if !self.is_open() {
            return ScrollAction::Anchor;
        }

        let added = self.merge_page(page.messages.into_iter().map(ChatEntry::from).collect());
        if added == 0 {
            self.has_more = false;
        } else {
            self.has_more = page.has_more;
            if page.next_cursor.is_some() {
                self.cursor = page.next_cursor;
            }
        }

        ScrollAction::Anchor
    }

    /// A history fetch failed
    pub fn load_failed(&mut self, error: impl fmt::Display) {
        self.loading_history = false;
        self.notices
            .push(Notice::Error(format!("Failed to load messages: {}", error)));
    }

    /// Prepends `incoming`, dropping known ids, and re-sorts by time
    fn merge_page(&mut self, incoming: Vec<ChatEntry>) -> usize {
        let mut known: HashSet<i32> = self
            .messages
            .iter()
            .filter_map(|m| m.key.server_id())
            .collect();

        let fresh: Vec<ChatEntry> = incoming
            .into_iter()
            .filter(|m| m.key.server_id().map_or(true, |id| known.insert(id)))
            .collect();
        let added = fresh.len();

        let existing = std::mem::take(&mut self.messages);
        self.messages = fresh;
        self.messages.extend(existing);
        // Stable, so equal timestamps keep their relative order
        self.messages.sort_by_key(|m| m.created_at);

        added
    }

    /// Sends a user turn
    ///
    /// Blank input, or input while the widget is closed or busy, is ignored.
    /// Otherwise a tentative user message is shown right away and the
    /// request to start is returned.
    pub fn submit(&mut self, input: &str) -> Option<Submission> {
        if self.state != WidgetState::Open(Phase::Idle) {
            return None;
        }

        let text = input.trim();
        if text.is_empty() {
            return None;
        }

        let mut entry = ChatEntry::local(self.next_local(), ChatRole::User, text);
        entry.tentative = true;
        self.pending_user = Some(entry.key);
        self.messages.push(entry);

        self.input.clear();
        self.tool.clear();
        self.generation += 1;
        self.state = WidgetState::Open(Phase::Submitting);

        Some(Submission {
            generation: self.generation,
            request: self.completion_request(),
        })
    }

    fn completion_request(&self) -> CompletionRequest {
        let context: Vec<CompletionMessage> = self
            .messages
            .iter()
            .filter(|m| !m.streaming)
            .map(|m| CompletionMessage {
                role: m.role,
                content: m.display_content(),
            })
            .filter(|m| !m.content.is_empty())
            .collect();

        let skip = context.len().saturating_sub(self.options.history_window.max(1));

        CompletionRequest {
            messages: context.into_iter().skip(skip).collect(),
            time_zone: self.options.time_zone.clone(),
        }
    }

    fn next_local(&mut self) -> u64 {
        self.next_local_id += 1;
        self.next_local_id
    }

    fn expects_chunks(&self, generation: u64) -> bool {
        generation == self.generation
            && matches!(
                self.state,
                WidgetState::Open(Phase::Submitting) | WidgetState::Open(Phase::Streaming)
            )
    }

    fn position(&self, key: MessageKey) -> Option<usize> {
        self.messages.iter().position(|m| m.key == key)
    }

    /// Applies one streamed chunk of the reply for `generation`
    ///
    /// Returns `false` if the chunk was dropped.
    pub fn apply_chunk(&mut self, generation: u64, chunk: ChatChunk, now: Instant) -> bool {
        if !self.expects_chunks(generation) {
            return false;
        }

        if let Some(id) = chunk.user_message_id {
            self.confirm_user(id);
        }

        // The server saved nothing for a failed reply, so partial text goes too
        if let Some(error) = chunk.error {
            if let Some(index) = self.placeholder.take().and_then(|key| self.position(key)) {
                self.messages.remove(index);
            }
            self.fail(error);
            return true;
        }

        if self.state == WidgetState::Open(Phase::Submitting) {
            let mut placeholder = ChatEntry::local(self.next_local(), ChatRole::Assistant, "");
            placeholder.streaming = true;
            self.placeholder = Some(placeholder.key);
            self.messages.push(placeholder);
            self.state = WidgetState::Open(Phase::Streaming);
        }

        let Some(index) = self.placeholder.and_then(|key| self.position(key)) else {
            return false;
        };
        self.messages[index].content = chunk.content;

        let tool = chunk
            .tool_call
            .map(|notice| notice.name)
            .or_else(|| extract_tool_marker(&self.messages[index].content));
        if let Some(tool) = tool {
            self.tool.show(tool, now);
        }

        if chunk.is_complete {
            if let Some(id) = chunk.assistant_message_id {
                self.messages[index].key = MessageKey::Server(id);
            }
            self.finalize();
        }

        true
    }

    fn confirm_user(&mut self, id: i32) {
        let Some(key) = self.pending_user.take() else {
            return;
        };
        if let Some(index) = self.position(key) {
            let entry = &mut self.messages[index];
            entry.key = MessageKey::Server(id);
            entry.tentative = false;
        }
    }

    /// Ends the current reply and returns to idle
    fn finalize(&mut self) {
        if let Some(last) = self.messages.last_mut() {
            last.streaming = false;
        }
        if let Some(key) = self.pending_user.take() {
            if let Some(index) = self.position(key) {
                self.messages[index].tentative = false;
            }
        }
        self.placeholder = None;
        self.tool.clear();
        self.state = WidgetState::Open(Phase::Idle);
    }

    /// The reply stream for `generation` ended
    ///
    /// A stream that ends without a single chunk counts as a failure.
    /// Returns `true` if the reply finished normally.
    pub fn finish_stream(&mut self, generation: u64) -> bool {
        if !self.expects_chunks(generation) {
            return false;
        }

        if self.state == WidgetState::Open(Phase::Submitting) {
            self.fail("the assistant did not respond");
            return false;
        }

        self.finalize();
        true
    }

    /// Stops the reply in progress
    ///
    /// Text received so far stays; an empty placeholder is removed. Later
    /// chunks of this reply are dropped.
    pub fn abort(&mut self) {
        if !matches!(
            self.state,
            WidgetState::Open(Phase::Submitting) | WidgetState::Open(Phase::Streaming)
        ) {
            return;
        }

        self.drop_empty_placeholder();
        self.finalize();
    }

    /// The send or the stream failed
    ///
    /// An unacknowledged user message is taken back and its text restored
    /// to the input.
    pub fn fail(&mut self, error: impl fmt::Display) {
        self.notices
            .push(Notice::Error(format!("Failed to send message: {}", error)));

        if !self.is_open() {
            return;
        }

        self.drop_empty_placeholder();

        if let Some(key) = self.pending_user.take() {
            if let Some(index) = self.position(key) {
                let entry = self.messages.remove(index);
                self.input = entry.content;
            }
        }

        self.finalize();
    }

    fn drop_empty_placeholder(&mut self) {
        let Some(key) = self.placeholder else {
            return;
        };
        if let Some(index) = self.position(key) {
            if self.messages[index].content.is_empty() {
                self.messages.remove(index);
            }
        }
        self.placeholder = None;
    }

    /// How the view should scroll after the newest message changed
    pub fn scroll_action(&self) -> ScrollAction {
        let own_message = self.messages.last().map_or(false, |m| m.is_user());
        after_new_message(&self.metrics, own_message)
    }
}
