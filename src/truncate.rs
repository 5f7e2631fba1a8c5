//! Fit text into a fixed number of terminal rows.
//!
//! Post bodies are shown as fixed-height previews.  [`fit_to_rows`] binary
//! searches for the longest prefix that, with an ellipsis appended, still
//! word-wraps into the allowed rows.  Widths are terminal columns, so wide
//! (CJK, emoji) characters count double.

use std::borrow::Cow;
use std::collections::HashMap;

use ratatui::text::Span;

pub const ELLIPSIS: &str = "…";

fn columns(s: &str) -> usize {
    Span::raw(s).width()
}

/// Greedy word wrap.  Words wider than `width` are split across rows.
/// Always returns at least one row.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    for line in text.split('\n') {
        let mut row = String::new();
        let mut used = 0;
        for word in line.split_whitespace() {
            let w = columns(word);
            let needed = if used == 0 { w } else { used + 1 + w };
            if needed <= width {
                if used > 0 {
                    row.push(' ');
                }
                row.push_str(word);
                used = needed;
                continue;
            }
            if used > 0 {
                rows.push(std::mem::take(&mut row));
            }
            used = 0;
            for ch in word.chars() {
                let cw = columns(ch.encode_utf8(&mut [0; 4]));
                if used + cw > width && used > 0 {
                    rows.push(std::mem::take(&mut row));
                    used = 0;
                }
                row.push(ch);
                used += cw;
            }
        }
        rows.push(row);
    }
    rows
}

pub fn wrapped_rows(text: &str, width: usize) -> usize {
    wrap(text, width).len()
}

/// Shorten `text` so it wraps into at most `max_rows` rows of `width`
/// columns, ending in [`ELLIPSIS`] when anything was cut.
pub fn fit_to_rows(text: &str, width: usize, max_rows: usize) -> Cow<'_, str> {
    if max_rows == 0 {
        return Cow::Borrowed("");
    }
    if wrapped_rows(text, width) <= max_rows {
        return Cow::Borrowed(text);
    }

    let fits = |prefix: &str| {
        let candidate = format!("{}{ELLIPSIS}", prefix.trim_end());
        wrapped_rows(&candidate, width) <= max_rows
    };

    // Byte offsets of every char boundary.  Invariant: a prefix of `lo`
    // chars fits, a prefix of `hi` chars does not.
    let bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let (mut lo, mut hi) = (0, bounds.len());
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if fits(&text[..bounds[mid]]) {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let prefix = &text[..bounds.get(lo).copied().unwrap_or(0)];
    Cow::Owned(format!("{}{ELLIPSIS}", prefix.trim_end()))
}

/// Wrapped previews keyed by item id, valid for one width and row limit.
///
/// The feed only ever grows while scrolling, so previews are fitted once
/// per post instead of once per frame.  A width or row change drops
/// everything.
#[derive(Debug, Default)]
pub struct PreviewCache {
    width: usize,
    max_rows: usize,
    entries: HashMap<String, Vec<String>>,
    #[cfg(test)]
    computed: usize,
}

impl PreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of `text` fitted into `max_rows` rows of `width` columns.
    /// Blank text has no rows.
    pub fn rows(&mut self, key: &str, text: &str, width: usize, max_rows: usize) -> &[String] {
        if width != self.width || max_rows != self.max_rows {
            self.entries.clear();
            self.width = width;
            self.max_rows = max_rows;
        }
        if !self.entries.contains_key(key) {
            let preview = fit_to_rows(text, width, max_rows);
            let rows = if preview.trim().is_empty() {
                Vec::new()
            } else {
                wrap(&preview, width)
            };
            #[cfg(test)]
            {
                self.computed += 1;
            }
            self.entries.insert(key.to_string(), rows);
        }
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// How many previews were fitted since creation.
    #[cfg(test)]
    pub fn computed(&self) -> usize {
        self.computed
    }
}
