/// Drives a [`ChatWidget`] against a [`ChatApi`]
///
/// The widget decides what to fetch; the session performs the calls and
/// feeds the results back. Sending races the reply stream against a
/// [`CancellationToken`], so an abort stops reading immediately and no
/// later chunk reaches the widget.

use futures::StreamExt;
use std::time::Instant;
use taskmate_shared::chat::HistoryPage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatApi;
use crate::scroll::{ScrollAction, ScrollMetrics};
use crate::widget::{ChatWidget, HistoryRequest};

/// How a send ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input, or the widget was closed or busy
    Rejected,
    Completed,
    Aborted,
    Failed,
}

pub struct ChatSession<A> {
    api: A,
    widget: ChatWidget,
}

impl<A: ChatApi> ChatSession<A> {
    pub fn new(api: A, widget: ChatWidget) -> Self {
        Self { api, widget }
    }

    pub fn widget(&self) -> &ChatWidget {
        &self.widget
    }

    pub fn widget_mut(&mut self) -> &mut ChatWidget {
        &mut self.widget
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Opens the widget and loads the newest page
    ///
    /// Returns `None` if the widget was already open or the load failed;
    /// failures are queued as notices.
    pub async fn open(&mut self) -> Option<ScrollAction> {
        let request = self.widget.open()?;

        match self.fetch(&request).await {
            Some(page) => Some(self.widget.apply_initial_page(page)),
            None => None,
        }
    }

    /// Loads older messages if the scroll position calls for it
    pub async fn load_older(&mut self, metrics: ScrollMetrics) -> Option<ScrollAction> {
        let request = self.widget.on_scroll(metrics)?;

        match self.fetch(&request).await {
            Some(page) => Some(self.widget.apply_older_page(page)),
            None => None,
        }
    }

    async fn fetch(&mut self, request: &HistoryRequest) -> Option<HistoryPage> {
        match self.api.history(request.cursor.as_deref(), request.limit).await {
            Ok(page) => {
                debug!(
                    messages = page.messages.len(),
                    has_more = page.has_more,
                    "History page loaded"
                );
                Some(page)
            }
            Err(e) => {
                warn!(error = %e, "Failed to load chat history");
                self.widget.load_failed(&e);
                None
            }
        }
    }

    /// Sends `input` and streams the reply into the widget
    ///
    /// `on_update` runs after every change to the widget while the reply
    /// streams. Cancelling `cancel` aborts the reply.
    pub async fn send<F>(
        &mut self,
        input: &str,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> SendOutcome
    where
        F: FnMut(&ChatWidget),
    {
        let Some(submission) = self.widget.submit(input) else {
            return SendOutcome::Rejected;
        };
        on_update(&self.widget);
        let generation = submission.generation;

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.api.complete(&submission.request) => Some(result),
        };

        let mut stream = match opened {
            None => {
                self.widget.abort();
                on_update(&self.widget);
                return SendOutcome::Aborted;
            }
            Some(Err(e)) => {
                warn!(error = %e, "Failed to start completion");
                self.widget.fail(&e);
                on_update(&self.widget);
                return SendOutcome::Failed;
            }
            Some(Ok(stream)) => stream,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(generation = generation, "Reply aborted");
                    self.widget.abort();
                    on_update(&self.widget);
                    return SendOutcome::Aborted;
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    let complete = chunk.is_complete;
                    if let Some(error) = chunk.error.as_deref() {
                        warn!(error = %error, "Assistant reply failed");
                    }
                    let failed = chunk.is_failure();
                    if self.widget.apply_chunk(generation, chunk, Instant::now()) {
                        on_update(&self.widget);
                    }
                    if failed {
                        return SendOutcome::Failed;
                    }
                    if complete {
                        return SendOutcome::Completed;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Completion stream failed");
                    self.widget.fail(&e);
                    on_update(&self.widget);
                    return SendOutcome::Failed;
                }
                None => {
                    let finished = self.widget.finish_stream(generation);
                    on_update(&self.widget);
                    return if finished {
                        SendOutcome::Completed
                    } else {
                        SendOutcome::Failed
                    };
                }
            }
        }
    }
}
