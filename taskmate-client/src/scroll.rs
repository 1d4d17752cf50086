/// Scroll decisions for the message list
///
/// All values are in pixels as reported by the view.

/// Distance from the top that triggers loading older messages
pub const LOAD_MORE_THRESHOLD: f64 = 100.0;

/// Distance from the bottom still counted as "at the bottom"
pub const NEAR_BOTTOM_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> f64 {
        self.scroll_height - self.scroll_top - self.client_height
    }

    pub fn is_near_bottom(&self) -> bool {
        self.distance_from_bottom() < NEAR_BOTTOM_THRESHOLD
    }

    pub fn is_near_top(&self) -> bool {
        self.scroll_top < LOAD_MORE_THRESHOLD
    }
}

/// What the view should do after the message list changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    /// Jump to the newest message
    ScrollToBottom,
    /// Keep the position; show the scroll-to-bottom button
    Preserve { show_jump_button: bool },
    /// Older messages were prepended; keep the previously visible message in place
    Anchor,
}

/// Decides how to react to new messages at the bottom
pub fn after_new_message(metrics: &ScrollMetrics, last_is_own_message: bool) -> ScrollAction {
    if last_is_own_message || metrics.is_near_bottom() {
        ScrollAction::ScrollToBottom
    } else {
        ScrollAction::Preserve {
            show_jump_button: true,
        }
    }
}
