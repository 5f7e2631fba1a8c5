//! Terminal UI rendering.
//!
//! All drawing logic lives here, separated from application state ([`App`])
//! and input handling ([`crate::input`]).
//!
//! ## For contributors
//!
//! * Layout: a one-line tab header, the active panel, and a one-line status
//!   bar (which doubles as the search prompt).
//! * The feed list ends in a sentinel row.  After each render we work out
//!   whether that row is inside the viewport and tell the app, which is what
//!   drives infinite scrolling.
//! * Post bodies are cut to [`BODY_ROWS`] rows with [`crate::truncate`].
//!   The fitted rows are cached in `App::previews`, so a frame only pays
//!   for posts it has not seen at the current width.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Tabs},
    Frame,
};

use crate::app::{App, Panel};
use crate::channel::ChannelState;
use crate::source::Post;
use crate::truncate::PreviewCache;

/// Rows of body text shown per post.
pub const BODY_ROWS: usize = 2;

/// Draw the complete UI for one frame.
pub fn draw(app: &mut App, frame: &mut Frame) {
    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_tabs(app, frame, header_area);
    match app.panel {
        Panel::Feed => draw_feed(app, frame, main_area),
        Panel::Notifications => draw_inbox(app, frame, main_area),
    }
    match &app.search_input {
        Some(input) => draw_search_prompt(input, frame, status_area),
        None => draw_status_bar(app, frame, status_area),
    }
}

fn draw_tabs(app: &App, frame: &mut Frame, area: Rect) {
    let unread = app.inbox.unread();
    let inbox_title = if unread > 0 {
        format!("Notifications ({unread})")
    } else {
        "Notifications".to_string()
    };
    let selected = match app.panel {
        Panel::Feed => 0,
        Panel::Notifications => 1,
    };
    let tabs = Tabs::new(vec![format!("Feed: {}", app.pager.context().label()), inbox_title])
        .select(selected)
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, area);
}

fn post_item<'a>(post: &'a Post, previews: &mut PreviewCache, width: usize) -> ListItem<'a> {
    let date_str = post
        .created_at
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();

    let mut header = vec![Span::styled(
        &post.author,
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )];
    if let Some(headline) = &post.headline {
        header.push(Span::styled(format!(" · {headline}"), Style::default().fg(Color::DarkGray)));
    }
    header.push(Span::raw("  "));
    header.push(Span::styled(date_str, Style::default().fg(Color::DarkGray)));

    let mut lines = vec![Line::from(header)];
    let body = previews.rows(&post.id, &post.body, width, BODY_ROWS);
    lines.extend(body.iter().map(|row| Line::from(row.clone())));
    lines.push(Line::from(Span::styled(
        format!("{} likes · {} comments", post.likes, post.comments),
        Style::default().fg(Color::Cyan),
    )));

    ListItem::new(Text::from(lines))
}

fn sentinel_item(app: &App) -> ListItem<'static> {
    let text = if app.pager.is_loading() {
        "Loading more…"
    } else if app.pager.has_more() {
        "Scroll for more"
    } else if app.pager.items().is_empty() {
        "No posts yet"
    } else {
        "You're all caught up"
    };
    ListItem::new(Line::from(Span::styled(text, Style::default().fg(Color::DarkGray))))
}

/// Render the post list and report sentinel visibility to the app.
fn draw_feed(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(format!(" {} ", app.pager.context().label()))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    // Leave room for the highlight symbol.
    let text_width = usize::from(inner.width.saturating_sub(2)).max(1);

    let previews = &mut app.previews;
    let mut items: Vec<ListItem> = app
        .pager
        .items()
        .iter()
        .map(|post| post_item(post, previews, text_width))
        .collect();
    items.push(sentinel_item(app));
    let heights: Vec<usize> = items.iter().map(ListItem::height).collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD).bg(Color::DarkGray))
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, area, &mut app.feed_state);

    let visible = last_item_visible(app.feed_state.offset(), &heights, usize::from(inner.height));
    app.set_sentinel_visible(visible);
}

fn draw_inbox(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(format!(" Notifications: {} unread ", app.inbox.unread()))
        .borders(Borders::ALL);
    if app.inbox.is_empty() {
        let empty = Paragraph::new(Span::styled("No notifications yet", Style::default().fg(Color::DarkGray)))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = app
        .inbox
        .items()
        .iter()
        .map(|n| {
            let marker = if n.read {
                Span::raw("  ")
            } else {
                Span::styled("● ", Style::default().fg(Color::Yellow))
            };
            let date_str = n
                .created_at
                .map(|d| d.format("%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let style = if n.read {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(Line::from(vec![
                marker,
                Span::styled(format!("{:<11}", date_str), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("[{}] ", n.kind), Style::default().fg(Color::Cyan)),
                Span::styled(n.message.as_str(), style),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD).bg(Color::DarkGray))
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, area, &mut app.inbox_state);
}

/// Whether the last of `heights` fits in `rows` rows when the list is
/// scrolled to `offset`.
pub fn last_item_visible(offset: usize, heights: &[usize], rows: usize) -> bool {
    if heights.is_empty() {
        return true;
    }
    if offset >= heights.len() {
        return false;
    }
    heights[offset..].iter().sum::<usize>() <= rows
}

fn channel_style(state: ChannelState) -> Style {
    match state {
        ChannelState::Authenticated => Style::default().fg(Color::Green),
        ChannelState::Disconnected => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::Yellow),
    }
}

/// Render the bottom status bar.
fn draw_status_bar(app: &App, frame: &mut Frame, area: Rect) {
    let status = Paragraph::new(Line::from(vec![
        Span::styled(" ", Style::default()),
        Span::styled(&app.status, Style::default().fg(Color::Yellow)),
        Span::raw("  "),
        Span::styled(
            format!("{} posts", app.pager.items().len()),
            Style::default().fg(Color::Green),
        ),
        Span::raw("  "),
        Span::styled(format!("[{}]", app.channel_state), channel_style(app.channel_state)),
        Span::raw("  q quit  Tab panel  1/2 feeds  / search  r retry  R refresh  m/M read  c reconnect"),
    ]));
    frame.render_widget(status, area);
}

fn draw_search_prompt(input: &str, frame: &mut Frame, area: Rect) {
    let prompt = Paragraph::new(Line::from(vec![
        Span::styled(" Search: ", Style::default().fg(Color::Cyan)),
        Span::raw(input),
        Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
        Span::styled("  Enter search  Esc cancel", Style::default().fg(Color::DarkGray)),
    ]));
    frame.render_widget(prompt, area);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
