use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use renderer::{backing_store_size, DrawError, WgpuBackend};
use ribbonconfig::{ParameterSet, TunerSettings};
use ribbonstore::{ConfigRemote, FileStorage, ProfileStore};
use tracing::{debug, error, info, warn};
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::window::WindowBuilder;

use crate::console::{self, UserEvent};
use crate::engine::{Engine, LogicalSurface, Reply};

#[derive(Debug, Clone)]
pub struct PreviewOptions {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub profile: Option<String>,
}

fn logical_surface(size: PhysicalSize<u32>, scale_factor: f64) -> LogicalSurface {
    let logical = size.to_logical::<f64>(scale_factor);
    LogicalSurface {
        width: logical.width,
        height: logical.height,
        scale_factor,
    }
}

/// Opens the preview window and runs the event loop until the window is
/// closed or `quit` is entered on the console.
pub fn run_preview(
    options: PreviewOptions,
    settings: &TunerSettings,
    profiles: ProfileStore<FileStorage>,
    remote: Option<Box<dyn ConfigRemote>>,
) -> Result<()> {
    let event_loop = EventLoopBuilder::<UserEvent>::with_user_event()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window = WindowBuilder::new()
        .with_title(options.title.as_str())
        .with_inner_size(LogicalSize::new(options.width, options.height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let surface = logical_surface(window.inner_size(), window.scale_factor());
    let initial_size = backing_store_size(
        surface.width,
        surface.height,
        surface.scale_factor,
        &ParameterSet::default().performance,
    );
    let backend = WgpuBackend::new(window.clone(), initial_size)
        .context("failed to initialise the GPU backend")?;
    let mut engine = Engine::new(backend, profiles, remote, settings, surface);

    if let Some(name) = options.profile.as_deref() {
        let message = engine.load_profile(name)?;
        info!("{message}");
    }

    console::spawn_reader(event_loop.create_proxy())?;
    println!("ribbontune ready; type 'help' for commands");
    engine.start();
    window.request_redraw();

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::UserEvent(UserEvent::Console(command)) => {
            match engine.execute(command, Instant::now()) {
                Reply::Text(text) => println!("{text}"),
                Reply::Quit => elwt.exit(),
            }
            window.request_redraw();
        }
        Event::UserEvent(UserEvent::ConsoleClosed) => {
            debug!("console input closed; the preview keeps running");
        }
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::Resized(size) => {
                engine.set_surface(logical_surface(size, window.scale_factor()));
                window.request_redraw();
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                engine.set_surface(logical_surface(window.inner_size(), scale_factor));
            }
            WindowEvent::CursorEntered { .. } => engine.pointer_enter(),
            WindowEvent::CursorLeft { .. } => engine.pointer_leave(),
            WindowEvent::Occluded(occluded) => {
                engine.set_visible(!occluded);
                if !occluded {
                    window.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => match engine.frame(Instant::now()) {
                Ok(_) => {}
                Err(DrawError::SurfaceLost) => {
                    debug!("surface reconfigured; retrying next frame");
                }
                Err(DrawError::Timeout) => warn!("surface timeout; retrying next frame"),
                Err(DrawError::OutOfMemory) => {
                    error!("GPU out of memory; closing the preview");
                    elwt.exit();
                }
                Err(err) => error!("frame failed: {err}"),
            },
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if engine.poll(now) {
                window.request_redraw();
            }
            if engine.is_running() {
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else if let Some(deadline) = engine.next_deadline() {
                elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
            } else {
                elwt.set_control_flow(ControlFlow::Wait);
            }
        }
        _ => {}
    });
    run_result.map_err(|err| anyhow!("preview event loop error: {err}"))
}
