// SPDX-License-Identifier: MPL-2.0

//! Debounced subtitle overlay.
//!
//! Subtitle text lands in a `gtk::Label` stacked over the video. Every line
//! schedules its own clear: the longer the line, the longer it stays up, with
//! a floor of one second. A new line preempts the pending clear instead of
//! stacking another timer, and the label hides itself through a property
//! binding on its text.

use std::cell::RefCell;
use std::cmp;
use std::rc::Rc;
use std::time::Duration;

use gtk::glib;
use gtk::prelude::*;
use tracing::trace;

/// Display time added per character of subtitle text.
const MILLIS_PER_CHAR: u64 = 80;
/// Shortest time any subtitle stays on screen.
const MIN_DISPLAY: Duration = Duration::from_millis(1000);

/// How long `text` stays up before the overlay clears it.
fn clear_delay(text: &str) -> Duration {
    cmp::max(
        Duration::from_millis(text.chars().count() as u64 * MILLIS_PER_CHAR),
        MIN_DISPLAY,
    )
}

/// A subtitle label with a self-clearing timer.
pub struct SubtitleOverlay {
    label: gtk::Label,
    /// At most one clear is ever pending; a new line replaces it.
    pending_clear: RefCell<Option<glib::SourceId>>,
}

impl SubtitleOverlay {
    /// Wire the overlay around `label`, binding its visibility to its text.
    pub fn new(label: gtk::Label) -> Rc<Self> {
        // The binding outlives this handle; it is tied to the label itself.
        let _binding = label
            .bind_property("label", &label, "visible")
            .transform_to(|_, text: String| Some(!text.is_empty()))
            .sync_create()
            .build();

        Rc::new(Self {
            label,
            pending_clear: RefCell::new(None),
        })
    }

    /// Display `text` and restart the clear timer.
    ///
    /// Empty text empties the label (the binding hides it) without starting a
    /// new display cycle.
    pub fn push_text(self: &Rc<Self>, text: &str) {
        self.label.set_text(text);
        if text.is_empty() {
            return;
        }

        if let Some(pending) = self.pending_clear.take() {
            pending.remove();
        }

        let delay = clear_delay(text);
        trace!(?delay, chars = text.chars().count(), "subtitle shown");

        let overlay = Rc::downgrade(self);
        let source = glib::timeout_add_local_once(delay, move || {
            let Some(overlay) = overlay.upgrade() else {
                return;
            };
            overlay.pending_clear.take();
            if !overlay.label.text().is_empty() {
                overlay.label.set_text("");
            }
        });
        self.pending_clear.replace(Some(source));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_lines_use_the_floor() {
        assert_eq!(clear_delay(""), Duration::from_millis(1000));
        assert_eq!(clear_delay("hi"), Duration::from_millis(1000));
        // 12 characters sit just under the floor.
        assert_eq!(clear_delay("twelve chars"), Duration::from_millis(1000));
    }

    #[test]
    fn long_lines_scale_with_length() {
        // 13 characters is the first length past the floor.
        assert_eq!(clear_delay(&"x".repeat(13)), Duration::from_millis(1040));
        assert_eq!(clear_delay(&"x".repeat(50)), Duration::from_millis(4000));
    }

    #[test]
    fn delay_counts_characters_not_bytes() {
        // Two bytes per character in UTF-8.
        let line = "ä".repeat(20);
        assert_eq!(clear_delay(&line), Duration::from_millis(1600));
    }
}
