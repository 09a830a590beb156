// SPDX-License-Identifier: MPL-2.0

//! The playback session: a fixed `playbin` graph bound to the scene.

use eyre::{WrapErr, eyre};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gtk::prelude::*;
use gtk::{gdk, glib};
use tracing::{debug, error, info, warn};

/// Lifecycle of a session. There is no way back from `Stopped`.
///
/// A session value only exists once its graph is assembled; construction is
/// the `Unconfigured -> Configured` transition, so `Unconfigured` needs no
/// variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Configured,
    Playing,
    Stopped,
}

/// playbin flag set 0x57: video, audio, text, soft-volume, native-video.
///
/// Software video post-processing (deinterlacing, color balancing) stays
/// disabled so a saturated CPU on embedded platforms cannot cause stutter;
/// software audio post-processing stays enabled.
const PLAYBIN_FLAGS: &str = "video+audio+text+soft-volume+native-video";

/// One playback graph plus the renderer element the scene binds to.
pub struct PlaybackSession {
    playbin: gst::Element,
    /// Inner renderer, retained for binding to the scene. Ownership lies with
    /// the sink bin inside `playbin`; this is just another handle.
    paintable_sink: gst::Element,
    bound_picture: Option<glib::WeakRef<gtk::Picture>>,
    state: SessionState,
}

impl PlaybackSession {
    /// Build the playback graph for `uri`.
    ///
    /// Subtitle text decoded from the stream is forwarded through
    /// `subtitles`; the newest line wins and the producing side never blocks
    /// the pipeline.
    ///
    /// Every element creation step is checked. On failure the elements
    /// created so far are plain owned handles going out of scope, so nothing
    /// leaks and no partial session survives.
    pub fn setup(uri: &str, subtitles: async_channel::Sender<String>) -> eyre::Result<Self> {
        // playbin is a fully featured pipeline element of its own; it does
        // not need to be wrapped in an extra gst::Pipeline.
        let playbin = gst::ElementFactory::make("playbin")
            .build()
            .wrap_err("could not create playbin element")?;

        let paintable_sink = gst::ElementFactory::make("gtk4paintablesink")
            .build()
            .wrap_err("could not create gtk4paintablesink element")?;

        let video_sink = wrap_video_sink(&paintable_sink)?;
        let text_sink = subtitle_sink(subtitles);

        playbin.set_property("uri", uri);
        playbin.set_property_from_str("flags", PLAYBIN_FLAGS);
        playbin.set_property("video-sink", &video_sink);
        playbin.set_property("text-sink", text_sink.upcast_ref::<gst::Element>());

        debug!(uri, "playback graph assembled");

        Ok(Self {
            playbin,
            paintable_sink,
            bound_picture: None,
            state: SessionState::Configured,
        })
    }

    /// Bind the renderer to `picture` and take the graph to `Playing`.
    ///
    /// On a transition failure the session stays configured and the caller
    /// decides; this application treats it as fatal and quits gracefully.
    pub fn start(&mut self, picture: &gtk::Picture) -> eyre::Result<()> {
        debug_assert_eq!(self.state, SessionState::Configured);

        let paintable = self.paintable_sink.property::<gdk::Paintable>("paintable");
        picture.set_paintable(Some(&paintable));
        self.bound_picture = Some(picture.downgrade());

        self.playbin
            .set_state(gst::State::Playing)
            .wrap_err("could not set pipeline state to PLAYING")?;
        self.state = SessionState::Playing;
        info!("pipeline playing");
        Ok(())
    }

    /// Stop playback and detach the renderer from the scene.
    ///
    /// Must run before the window holding the bound picture is destroyed;
    /// the caller owns that ordering by calling this from the application
    /// shutdown handler.
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }

        if let Err(err) = self.playbin.set_state(gst::State::Null) {
            error!(?err, "could not set pipeline state to NULL");
        }

        // The scene must not keep rendering the paintable once the sink is
        // gone, so detach before the UI tears down.
        if let Some(picture) = self.bound_picture.take().and_then(|weak| weak.upgrade()) {
            picture.set_paintable(None::<&gdk::Paintable>);
        }

        self.state = SessionState::Stopped;
        debug!("playback session stopped");
    }

    /// The bus of the playback graph, for the caller's watch.
    pub fn bus(&self) -> Option<gst::Bus> {
        self.playbin.bus()
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        // Backstop for paths that never reach the shutdown handler. The
        // paintable_sink handle needs no separate release; the sink bin
        // inside playbin owns it.
        self.stop();
    }
}

/// Wrap the paintable sink for use as playbin's video sink.
///
/// With a GL context on the paintable the sink goes into `glsinkbin` and
/// decoded frames stay in GPU memory. Without one, fall back to a bin that
/// converts system-memory frames for the paintable.
fn wrap_video_sink(paintable_sink: &gst::Element) -> eyre::Result<gst::Element> {
    let paintable = paintable_sink.property::<gdk::Paintable>("paintable");

    if paintable
        .property::<Option<gdk::GLContext>>("gl-context")
        .is_some()
    {
        let glsinkbin = gst::ElementFactory::make("glsinkbin")
            .property("sink", paintable_sink)
            .build()
            .wrap_err("could not create glsinkbin element")?;
        Ok(glsinkbin)
    } else {
        warn!("paintable has no GL context, falling back to system-memory frames");

        let bin = gst::Bin::default();
        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .wrap_err("could not create videoconvert element")?;

        bin.add(&convert)?;
        bin.add(paintable_sink)?;
        convert.link(paintable_sink)?;

        let pad = convert
            .static_pad("sink")
            .ok_or_else(|| eyre!("videoconvert has no sink pad"))?;
        bin.add_pad(&gst::GhostPad::with_target(&pad)?)?;

        Ok(bin.upcast())
    }
}

/// Build the pull-based subtitle sink.
///
/// `max-buffers=1` with `drop=true` keeps at most one pending buffer and
/// sheds the rest. Stale subtitle text is worthless, so this sink must never
/// apply backpressure to audio/video delivery.
fn subtitle_sink(subtitles: async_channel::Sender<String>) -> gst_app::AppSink {
    let appsink = gst_app::AppSink::builder()
        .caps(
            &gst::Caps::builder("text/x-raw")
                .field("format", "utf8")
                .build(),
        )
        .sync(true)
        .max_buffers(1)
        .drop(true)
        .build();

    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |appsink| {
                // Runs on a streaming thread. Whatever happens, report
                // success downstream; a dropped subtitle is better than a
                // stalled pipeline.
                let sample = match appsink.pull_sample() {
                    Ok(sample) => sample,
                    Err(err) => {
                        warn!("subtitle pull_sample failed: {err:?}");
                        return Ok(gst::FlowSuccess::Ok);
                    }
                };
                let Some(buffer) = sample.buffer() else {
                    return Ok(gst::FlowSuccess::Ok);
                };
                let Ok(map) = buffer.map_readable() else {
                    return Ok(gst::FlowSuccess::Ok);
                };

                let text = String::from_utf8_lossy(map.as_slice()).into_owned();
                // Newest line replaces whatever the UI has not consumed yet.
                let _ = subtitles.force_send(text);

                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );

    appsink
}
