// SPDX-License-Identifier: MPL-2.0

//! Media playback embedded in the GTK scene graph.
//!
//! [`PlaybackSession`] owns a fixed `playbin` graph whose video output is a
//! `gtk4paintablesink` wrapped in `glsinkbin`, so decoded frames stay in GPU
//! memory all the way to the scene. The sink's `gdk::Paintable` is what a
//! `gtk::Picture` in the window renders. Subtitle text is pulled off the
//! pipeline by an `appsink` and handed to the UI through a bounded channel.
//!
//! # Module Structure
//!
//! - [`session`]: graph construction, start and teardown
//! - [`uri`]: input locator normalization

mod session;
mod uri;

pub use session::PlaybackSession;
pub use uri::normalize_uri;

#[cfg(test)]
mod tests;
