//! Application state.
//!
//! [`App`] owns the feed pager, the notification inbox and everything the
//! UI shows.  It performs no I/O: actions that need the network queue an
//! [`Effect`], which the main loop hands to [`crate::poll::Background`].

use ratatui::widgets::ListState;
use tracing::debug;

use crate::channel::ChannelState;
use crate::inbox::Inbox;
use crate::pager::{Applied, PageRequest, Pager, QueryContext};
use crate::poll::AppMsg;
use crate::source::Post;
use crate::truncate::PreviewCache;

/// Side effects requested by the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Fetch(PageRequest),
    CancelFetch,
    MarkRead(String),
    MarkAllRead,
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Feed,
    Notifications,
}

pub struct App {
    pub pager: Pager<Post>,
    pub inbox: Inbox,
    pub panel: Panel,
    /// Selection/scroll state of the feed list.
    pub feed_state: ListState,
    /// Fitted post bodies, filled lazily by the UI.
    pub previews: PreviewCache,
    /// Selection/scroll state of the notification list.
    pub inbox_state: ListState,
    /// `Some` while the search prompt is open.
    pub search_input: Option<String>,
    pub channel_state: ChannelState,
    /// Whether the user has requested to quit.
    pub quit: bool,
    /// Last status message.
    pub status: String,
    /// Whether the end-of-list sentinel was on screen at the last draw.
    sentinel_visible: bool,
    /// Cleared when a load is issued; re-armed when the list changes or the
    /// sentinel leaves the viewport.  Keeps a failing fetch from retrying
    /// every tick.
    sentinel_armed: bool,
    effects: Vec<Effect>,
}

impl App {
    pub fn new(context: QueryContext, page_size: usize) -> Self {
        Self {
            pager: Pager::new(context, page_size),
            inbox: Inbox::new(),
            panel: Panel::Feed,
            feed_state: ListState::default(),
            previews: PreviewCache::new(),
            inbox_state: ListState::default(),
            search_input: None,
            channel_state: ChannelState::Disconnected,
            quit: false,
            status: "Starting…".into(),
            sentinel_visible: false,
            sentinel_armed: true,
            effects: Vec::new(),
        }
    }

    /// Hand over the queued effects.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // -- feed paging ---------------------------------------------------------

    /// Report whether the sentinel is in the viewport (called by the UI
    /// after each draw).
    pub fn set_sentinel_visible(&mut self, visible: bool) {
        if !visible {
            self.sentinel_armed = true;
        }
        self.sentinel_visible = visible;
    }

    #[cfg(test)]
    pub fn sentinel_visible(&self) -> bool {
        self.sentinel_visible
    }

    /// The visibility trigger: load the next page if the sentinel is shown.
    pub fn load_more_if_visible(&mut self) {
        if self.panel != Panel::Feed || !self.sentinel_visible || !self.sentinel_armed {
            return;
        }
        if let Some(request) = self.pager.load_more(false) {
            self.sentinel_armed = false;
            self.status = "Loading…".into();
            self.effects.push(Effect::Fetch(request));
        }
    }

    /// Explicit retry: fetch from the current cursor even if the feed looks
    /// exhausted or a request is outstanding.
    pub fn retry(&mut self) {
        if let Some(request) = self.pager.load_more(true) {
            self.status = "Loading…".into();
            self.effects.push(Effect::Fetch(request));
        }
    }

    /// Start the current feed over from the first page.
    pub fn refresh(&mut self) {
        self.pager.refresh();
        self.previews.clear();
        self.feed_state.select(None);
        self.sentinel_armed = true;
        self.effects.push(Effect::CancelFetch);
        self.status = format!("Refreshing {}", self.pager.context().label());
    }

    pub fn switch_context(&mut self, context: QueryContext) {
        if !self.pager.on_context_change(context) {
            return;
        }
        self.previews.clear();
        self.feed_state.select(None);
        *self.feed_state.offset_mut() = 0;
        self.sentinel_armed = true;
        self.panel = Panel::Feed;
        self.effects.push(Effect::CancelFetch);
        self.status = format!("Switched to {}", self.pager.context().label());
    }

    // -- search prompt -------------------------------------------------------

    pub fn begin_search(&mut self) {
        self.search_input = Some(String::new());
    }

    pub fn search_push(&mut self, c: char) {
        if let Some(input) = &mut self.search_input {
            input.push(c);
        }
    }

    pub fn search_backspace(&mut self) {
        if let Some(input) = &mut self.search_input {
            input.pop();
        }
    }

    pub fn cancel_search(&mut self) {
        self.search_input = None;
    }

    /// Close the prompt and switch to the search feed.  An empty term just
    /// closes the prompt.
    pub fn commit_search(&mut self) {
        let Some(term) = self.search_input.take() else {
            return;
        };
        let term = term.trim();
        if !term.is_empty() {
            self.switch_context(QueryContext::search(term));
        }
    }

    // -- notifications -------------------------------------------------------

    pub fn mark_selected_read(&mut self) {
        let Some(id) = self
            .inbox_state
            .selected()
            .and_then(|i| self.inbox.items().get(i))
            .map(|n| n.id.clone())
        else {
            return;
        };
        if self.inbox.mark_read(&id) {
            self.effects.push(Effect::MarkRead(id));
        }
    }

    pub fn mark_all_read(&mut self) {
        if self.inbox.mark_all_read() > 0 {
            self.effects.push(Effect::MarkAllRead);
        }
    }

    pub fn request_reconnect(&mut self) {
        self.effects.push(Effect::Reconnect);
    }

    pub fn set_channel_state(&mut self, state: ChannelState) {
        self.channel_state = state;
    }

    // -- background messages -------------------------------------------------

    pub fn apply(&mut self, msg: AppMsg) {
        match msg {
            AppMsg::Page { request, result } => match self.pager.complete(&request, result) {
                Applied::Replaced { count } => {
                    self.previews.clear();
                    self.sentinel_armed = true;
                    self.clamp_feed_selection();
                    self.status = format!("Loaded {count} posts");
                }
                Applied::Appended { added } => {
                    debug!(added, next = self.pager.cursor().as_str(), "page appended");
                    self.sentinel_armed = true;
                    self.status = format!("Loaded {added} more posts");
                }
                Applied::Stale => {}
                Applied::Failed(err) => self.status = err.user_message().to_string(),
            },
            AppMsg::Notification(notification) => {
                let message = notification.message.clone();
                if self.inbox.push(notification) {
                    // Keep the highlighted entry in place as new ones land on top.
                    if let Some(i) = self.inbox_state.selected() {
                        self.inbox_state.select(Some(i + 1));
                    }
                    self.status = format!("New notification: {message}");
                }
            }
            AppMsg::ChannelError(message) => {
                self.status = format!("Notifications: {message}");
            }
        }
    }

    fn clamp_feed_selection(&mut self) {
        let len = self.pager.items().len();
        match self.feed_state.selected() {
            Some(_) if len == 0 => self.feed_state.select(None),
            Some(i) if i > len => self.feed_state.select(Some(len)),
            _ => {}
        }
    }

    // -- navigation ----------------------------------------------------------

    pub fn toggle_panel(&mut self) {
        self.panel = match self.panel {
            Panel::Feed => Panel::Notifications,
            Panel::Notifications => Panel::Feed,
        };
    }

    /// The active list's state and entry count.  The feed's count excludes
    /// the sentinel row.
    fn active_list(&mut self) -> (&mut ListState, usize) {
        match self.panel {
            Panel::Feed => (&mut self.feed_state, self.pager.items().len()),
            Panel::Notifications => (&mut self.inbox_state, self.inbox.len()),
        }
    }

    /// Moving past the last post selects the sentinel row, which scrolls it
    /// into view.
    pub fn select_next(&mut self) {
        let on_feed = self.panel == Panel::Feed;
        let (state, len) = self.active_list();
        if len == 0 {
            return;
        }
        let last = if on_feed { len } else { len - 1 };
        let i = match state.selected() {
            Some(i) => (i + 1).min(last),
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn select_previous(&mut self) {
        let (state, len) = self.active_list();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn select_first(&mut self) {
        let (state, len) = self.active_list();
        if len > 0 {
            state.select(Some(0));
        }
    }

    pub fn select_last(&mut self) {
        let (state, len) = self.active_list();
        if len > 0 {
            state.select(Some(len - 1));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Notification;
    use crate::error::FetchError;
    use crate::pager::{Cursor, Page};

    fn post(id: usize) -> Post {
        Post {
            id: id.to_string(),
            author: "Ada".into(),
            headline: None,
            body: format!("post {id}"),
            created_at: None,
            likes: 0,
            comments: 0,
        }
    }

    fn page(range: std::ops::Range<usize>, next: Option<&str>) -> Page<Post> {
        Page {
            items: range.map(post).collect(),
            next_cursor: next.map(Cursor::new),
        }
    }

    fn note(id: &str) -> Notification {
        Notification {
            id: id.into(),
            kind: "comment".into(),
            actor: Some("Grace".into()),
            message: format!("message {id}"),
            read: false,
            created_at: None,
        }
    }

    fn app() -> App {
        App::new(QueryContext::home(), 5)
    }

    /// Simulate the sentinel being visible and take the issued request.
    fn trigger(app: &mut App) -> Option<PageRequest> {
        app.set_sentinel_visible(true);
        app.load_more_if_visible();
        app.take_effects().into_iter().find_map(|e| match e {
            Effect::Fetch(r) => Some(r),
            _ => None,
        })
    }

    fn deliver(app: &mut App, request: PageRequest, result: Result<Page<Post>, FetchError>) {
        app.apply(AppMsg::Page { request, result });
    }

    // -- construction --------------------------------------------------------

    #[test]
    fn new_app_starts_empty() {
        let app = app();
        assert!(app.pager.items().is_empty());
        assert!(!app.quit);
        assert_eq!(app.panel, Panel::Feed);
        assert!(app.feed_state.selected().is_none());
    }

    // -- visibility trigger --------------------------------------------------

    #[test]
    fn visible_sentinel_issues_one_fetch() {
        let mut app = app();
        let first = trigger(&mut app);
        assert!(first.is_some());
        // Still visible on the next ticks, but a request is outstanding.
        assert!(trigger(&mut app).is_none());
        assert!(trigger(&mut app).is_none());
    }

    #[test]
    fn hidden_sentinel_issues_nothing() {
        let mut app = app();
        app.set_sentinel_visible(false);
        app.load_more_if_visible();
        assert!(app.take_effects().is_empty());
    }

    #[test]
    fn two_pages_then_exhausted() {
        let mut app = app();
        let r1 = trigger(&mut app).unwrap();
        deliver(&mut app, r1, Ok(page(0..5, Some("5"))));
        assert_eq!(app.status, "Loaded 5 posts");

        let r2 = trigger(&mut app).unwrap();
        deliver(&mut app, r2, Ok(page(5..8, Some("8"))));
        assert_eq!(app.pager.items().len(), 8);
        assert_eq!(app.status, "Loaded 3 more posts");

        assert!(trigger(&mut app).is_none(), "short page ends the feed");
    }

    #[test]
    fn failure_is_reported_once_and_not_retried_automatically() {
        let mut app = app();
        let r = trigger(&mut app).unwrap();
        deliver(&mut app, r, Err(FetchError::transient("502")));
        assert_eq!(app.status, FetchError::transient("").user_message());

        assert!(trigger(&mut app).is_none(), "no retry loop while visible");

        // Scrolling away and back re-arms the trigger.
        app.set_sentinel_visible(false);
        assert!(trigger(&mut app).is_some());
    }

    #[test]
    fn authorization_failure_has_distinct_message() {
        let mut app = app();
        let r = trigger(&mut app).unwrap();
        deliver(&mut app, r, Err(FetchError::AuthorizationDenied));
        assert_eq!(app.status, FetchError::AuthorizationDenied.user_message());
    }

    #[test]
    fn retry_forces_a_fetch() {
        let mut app = app();
        let r = trigger(&mut app).unwrap();
        deliver(&mut app, r, Ok(page(0..2, None)));
        assert!(trigger(&mut app).is_none());

        app.retry();
        assert!(matches!(app.take_effects().as_slice(), [Effect::Fetch(_)]));
    }

    // -- context switching ---------------------------------------------------

    #[test]
    fn switching_context_cancels_and_drops_late_response() {
        let mut app = app();
        let old = trigger(&mut app).unwrap();

        app.switch_context(QueryContext::user(None));
        assert_eq!(app.take_effects(), vec![Effect::CancelFetch]);
        assert_eq!(app.status, "Switched to My posts");

        deliver(&mut app, old, Ok(page(0..5, Some("5"))));
        assert!(app.pager.items().is_empty(), "stale response ignored");

        let fresh = trigger(&mut app).unwrap();
        assert_eq!(fresh.context, QueryContext::user(None));
    }

    #[test]
    fn switching_to_same_context_is_a_noop() {
        let mut app = app();
        app.switch_context(QueryContext::home());
        assert!(app.take_effects().is_empty());
    }

    #[test]
    fn search_prompt_commits_to_search_context() {
        let mut app = app();
        app.begin_search();
        for c in "rustx".chars() {
            app.search_push(c);
        }
        app.search_backspace();
        app.commit_search();

        assert!(app.search_input.is_none());
        assert_eq!(app.pager.context(), &QueryContext::search("rust"));
    }

    #[test]
    fn empty_search_just_closes_prompt() {
        let mut app = app();
        app.begin_search();
        app.search_push(' ');
        app.commit_search();
        assert!(app.search_input.is_none());
        assert_eq!(app.pager.context(), &QueryContext::home());
    }

    #[test]
    fn refresh_restarts_feed() {
        let mut app = app();
        let r = trigger(&mut app).unwrap();
        deliver(&mut app, r, Ok(page(0..5, Some("5"))));

        app.refresh();
        assert!(app.pager.items().is_empty());
        assert_eq!(app.take_effects(), vec![Effect::CancelFetch]);
        let again = trigger(&mut app).unwrap();
        assert!(again.params.cursor.is_start());
    }

    // -- notifications -------------------------------------------------------

    #[test]
    fn pushed_notification_lands_in_inbox() {
        let mut app = app();
        app.apply(AppMsg::Notification(note("n1")));
        assert_eq!(app.inbox.unread(), 1);
        assert_eq!(app.status, "New notification: message n1");
    }

    #[test]
    fn selection_follows_entry_when_new_ones_arrive() {
        let mut app = app();
        app.apply(AppMsg::Notification(note("n1")));
        app.panel = Panel::Notifications;
        app.select_first();
        app.apply(AppMsg::Notification(note("n2")));
        assert_eq!(app.inbox_state.selected(), Some(1));
        assert_eq!(app.inbox.items()[1].id, "n1");
    }

    #[test]
    fn mark_selected_read_queues_effect_once() {
        let mut app = app();
        app.apply(AppMsg::Notification(note("n1")));
        app.panel = Panel::Notifications;
        app.select_first();

        app.mark_selected_read();
        app.mark_selected_read();
        assert_eq!(app.take_effects(), vec![Effect::MarkRead("n1".into())]);
        assert_eq!(app.inbox.unread(), 0);
    }

    #[test]
    fn mark_all_read_only_when_something_unread() {
        let mut app = app();
        app.mark_all_read();
        assert!(app.take_effects().is_empty());

        app.apply(AppMsg::Notification(note("a")));
        app.mark_all_read();
        assert_eq!(app.take_effects(), vec![Effect::MarkAllRead]);
    }

    #[test]
    fn channel_error_goes_to_status() {
        let mut app = app();
        app.apply(AppMsg::ChannelError("connect refused".into()));
        assert_eq!(app.status, "Notifications: connect refused");
    }

    // -- navigation ----------------------------------------------------------

    #[test]
    fn navigation_on_empty_is_noop() {
        let mut app = app();
        app.select_next();
        app.select_previous();
        app.select_first();
        app.select_last();
        assert!(app.feed_state.selected().is_none());
    }

    #[test]
    fn navigation_clamps_to_bounds() {
        let mut app = app();
        let r = trigger(&mut app).unwrap();
        deliver(&mut app, r, Ok(page(0..3, None)));

        app.select_next();
        assert_eq!(app.feed_state.selected(), Some(0));
        app.select_last();
        assert_eq!(app.feed_state.selected(), Some(2));
        app.select_next();
        assert_eq!(app.feed_state.selected(), Some(3), "sentinel row");
        app.select_next();
        assert_eq!(app.feed_state.selected(), Some(3));
        app.select_first();
        app.select_previous();
        assert_eq!(app.feed_state.selected(), Some(0));
    }

    #[test]
    fn navigation_follows_active_panel() {
        let mut app = app();
        app.apply(AppMsg::Notification(note("a")));
        app.apply(AppMsg::Notification(note("b")));
        app.toggle_panel();
        app.select_last();
        assert_eq!(app.inbox_state.selected(), Some(1));
        assert!(app.feed_state.selected().is_none());
    }
}
