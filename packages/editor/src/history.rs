//! Virtualised history list.
//!
//! Audit entries arrive oldest first and are shown newest first. Only the
//! rows near the viewport are materialised, so the work per scroll event
//! depends on the viewport, not on the number of entries.

/// Rows to materialise for one scroll position.
///
/// Indices refer to the reversed (newest first) sequence; both ends are
/// inclusive. An empty window has `start == end == 0` and `len() == 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryWindow {
    pub start: usize,
    pub end: usize,
    entry_count: usize,
    item_height: f64,
}

impl HistoryWindow {
    pub fn compute(
        entry_count: usize,
        item_height: f64,
        buffer: usize,
        scroll_offset: f64,
        viewport_height: f64,
    ) -> Self {
        if entry_count == 0 || !(item_height > 0.0) {
            return Self {
                start: 0,
                end: 0,
                entry_count,
                item_height: item_height.max(0.0),
            };
        }

        let last = entry_count - 1;
        let scroll_offset = scroll_offset.max(0.0);
        let viewport_height = viewport_height.max(0.0);

        let first_row = (scroll_offset / item_height).floor() as usize;
        let last_row = ((scroll_offset + viewport_height) / item_height).ceil() as usize;

        let end = last_row.saturating_add(buffer).min(last);
        let start = first_row.saturating_sub(buffer).min(end);

        Self {
            start,
            end,
            entry_count,
            item_height,
        }
    }

    /// Height of the whole scrollable list
    pub fn total_height(&self) -> f64 {
        self.entry_count as f64 * self.item_height
    }

    /// Offset of the first materialised row
    pub fn offset_px(&self) -> f64 {
        self.start as f64 * self.item_height
    }

    pub fn len(&self) -> usize {
        if self.entry_count == 0 || self.item_height <= 0.0 {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The rows of `entries` (oldest first) inside the window, newest first
    pub fn visible_entries<'a, T>(&self, entries: &'a [T]) -> Vec<&'a T> {
        if self.is_empty() {
            return Vec::new();
        }
        entries
            .iter()
            .rev()
            .skip(self.start)
            .take(self.len())
            .collect()
    }
}
