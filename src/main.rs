// SPDX-License-Identifier: MPL-2.0

//! Minimal example of embedding a hardware-accelerated GStreamer video sink
//! in a GTK4 scene, with a debounced subtitle overlay and graceful shutdown
//! on termination signals.

mod player;
mod signals;
mod subtitles;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use clap::Parser;
use eyre::{WrapErr, bail, eyre};
use gstreamer as gst;
use gtk::prelude::*;
use gtk::{gio, glib};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::player::PlaybackSession;
use crate::signals::SignalBridge;
use crate::subtitles::SubtitleOverlay;

/// Play a video with hardware acceleration inside a GTK4 scene.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Input file or URI to play
    #[arg(short, long)]
    input: String,

    /// Run the window in fullscreen mode
    #[arg(short, long)]
    fullscreen: bool,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    gst::init().wrap_err("could not initialize GStreamer")?;

    let args = Args::parse();

    // The sink element and its paintable type must exist in the registry
    // before the scene references them.
    gstgtk4::plugin_register_static().wrap_err("could not register the gtk4 sink plugin")?;

    let uri = player::normalize_uri(&args.input)?;
    info!(%uri, fullscreen = args.fullscreen, "starting playback");

    let app = gtk::Application::new(
        Some("org.example.gtkplay"),
        gio::ApplicationFlags::NON_UNIQUE,
    );

    let startup_failed = Rc::new(Cell::new(false));
    {
        let startup_failed = Rc::clone(&startup_failed);
        let fullscreen = args.fullscreen;
        app.connect_activate(move |app| {
            if let Err(err) = build_ui(app, &uri, fullscreen) {
                error!("startup failed: {err:#}");
                startup_failed.set(true);
                app.quit();
            }
        });
    }

    // Command-line arguments were consumed by clap already; GTK gets none.
    let exit = app.run_with_args::<&str>(&[]);

    // Deinitialize so the leaks tracer can present its results
    // (GST_TRACERS=leaks GST_DEBUG=GST_TRACER:7).
    unsafe {
        gst::deinit();
    }
    debug!("application finished");

    if startup_failed.get() || exit != glib::ExitCode::SUCCESS {
        bail!("exited with failure");
    }
    Ok(())
}

/// Assemble the scene and wire it to a playback session, the subtitle
/// overlay and the signal bridge.
fn build_ui(app: &gtk::Application, uri: &str, fullscreen: bool) -> eyre::Result<()> {
    let window = gtk::ApplicationWindow::new(app);
    window.set_title(Some("gtkplay"));
    window.set_default_size(1280, 720);

    let picture = gtk::Picture::new();
    picture.set_hexpand(true);
    picture.set_vexpand(true);

    let subtitle_label = gtk::Label::new(None);
    subtitle_label.set_wrap(true);
    subtitle_label.set_justify(gtk::Justification::Center);
    subtitle_label.set_halign(gtk::Align::Center);
    subtitle_label.set_valign(gtk::Align::End);
    subtitle_label.set_margin_bottom(32);

    let overlay = gtk::Overlay::new();
    overlay.set_child(Some(&picture));
    overlay.add_overlay(&subtitle_label);
    window.set_child(Some(&overlay));

    // Newest-wins hand-off from the streaming threads to the UI thread.
    let (subtitle_tx, subtitle_rx) = async_channel::bounded(1);

    let subtitles = SubtitleOverlay::new(subtitle_label);
    {
        let subtitles = Rc::clone(&subtitles);
        glib::MainContext::default().spawn_local(async move {
            while let Ok(text) = subtitle_rx.recv().await {
                subtitles.push_text(&text);
            }
        });
    }

    let session = PlaybackSession::setup(uri, subtitle_tx)?;

    // Install the signal handlers once the window exists; they ask it to
    // close, which in turn ends the application.
    let bridge = SignalBridge::install(&window)?;

    // Quit cleanly on stream errors and at end of stream.
    let bus = session
        .bus()
        .ok_or_else(|| eyre!("playback graph has no bus"))?;
    let app_weak = app.downgrade();
    let bus_watch = bus
        .add_watch_local(move |_, msg| {
            use gst::MessageView;

            let Some(app) = app_weak.upgrade() else {
                return glib::ControlFlow::Break;
            };

            match msg.view() {
                MessageView::Eos(..) => {
                    info!("end of stream");
                    app.quit();
                }
                MessageView::Error(err) => {
                    error!(
                        src = ?err.src().map(|s| s.path_string()),
                        debug = ?err.debug(),
                        "pipeline error: {}",
                        err.error()
                    );
                    app.quit();
                }
                _ => (),
            }

            glib::ControlFlow::Continue
        })
        .wrap_err("could not install bus watch")?;

    if fullscreen {
        window.fullscreen();
    }
    window.present();

    let session = Rc::new(RefCell::new(Some(session)));

    // The sink can only obtain its GL context once the scene is live, so
    // start the graph from the first frame clock tick instead of right away.
    {
        let session = Rc::clone(&session);
        let picture = picture.clone();
        let app_weak = app.downgrade();
        window.add_tick_callback(move |_window, _clock| {
            debug!("first frame rendered, starting pipeline");
            if let Some(session) = session.borrow_mut().as_mut() {
                if let Err(err) = session.start(&picture) {
                    error!("could not start pipeline, quitting: {err:#}");
                    if let Some(app) = app_weak.upgrade() {
                        app.quit();
                    }
                }
            }
            glib::ControlFlow::Break
        });
    }

    // Shutdown still has the scene alive: stop the graph and detach the
    // paintable first, then let the bridge restore signal dispositions.
    let bridge = RefCell::new(Some(bridge));
    let bus_watch = RefCell::new(Some(bus_watch));
    app.connect_shutdown(move |_| {
        if let Some(mut session) = session.borrow_mut().take() {
            session.stop();
        }
        drop(bus_watch.borrow_mut().take());
        drop(bridge.borrow_mut().take());
    });

    Ok(())
}
