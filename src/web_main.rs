//! wasm-bindgen entry point

use crate::app::{App, AppRequest};
use crate::error::{ExportError, TracerError, TracerResult};
use crate::export::{encode_png, timestamped_file_name};
use crate::gpu::shaders::ShaderSource;
use crate::web::{self, CANVAS_ID, SHADER_BASE_ATTRIBUTE};
use crate::{init_web_logging, TracerConfig};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use winit::dpi::PhysicalSize;
use winit::event::Event;
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::web::{EventLoopExtWebSys, WindowBuilderExtWebSys};
use winit::window::WindowBuilder;

#[wasm_bindgen(start)]
pub fn main() {
    init_web_logging();
    log::info!("=== Stellar Tracer ===");
    web::set_status("Initializing...");

    spawn_local(async {
        if let Err(e) = start().await {
            log::error!("{}", e);
            web::set_status(&e.to_string());
        }
    });
}

async fn start() -> TracerResult<()> {
    let canvas = web::find_canvas(CANVAS_ID)?;
    let (width, height) = web::fit_canvas(&canvas);

    let shader_source = canvas
        .get_attribute(SHADER_BASE_ATTRIBUTE)
        .map_or(ShaderSource::Embedded, ShaderSource::Url);

    let config = TracerConfig {
        width,
        height,
        shader_source,
        ..Default::default()
    };

    let event_loop = EventLoop::new().map_err(|e| TracerError::EventLoop(e.to_string()))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(&config.title)
            .with_canvas(Some(canvas))
            .with_inner_size(PhysicalSize::new(width, height))
            .build(&event_loop)
            .map_err(|e| TracerError::WindowCreation(e.to_string()))?,
    );

    let app = Rc::new(RefCell::new(App::new(window, config).await?));
    web::set_status("");
    log::info!("Starting render loop...");

    event_loop.spawn(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);

        match event {
            Event::WindowEvent { event, .. } => {
                let request = app.borrow_mut().handle_window_event(&event);
                match request {
                    AppRequest::Exit => elwt.exit(),
                    AppRequest::Benchmark => start_benchmark(&app),
                    AppRequest::Export => start_export(&app),
                    AppRequest::None => {}
                }
            }
            Event::DeviceEvent { event, .. } => app.borrow_mut().handle_device_event(&event),
            _ => {}
        }
    });
    Ok(())
}

/// The app is not borrowed while the queue drains, so events keep flowing
/// (and ticks halt) until the report arrives.
fn start_benchmark(app: &Rc<RefCell<App>>) {
    let Some(pending) = app.borrow_mut().start_benchmark() else {
        return;
    };
    let app = Rc::clone(app);
    spawn_local(async move {
        let report = pending.finish().await;
        app.borrow_mut().finish_benchmark(report);
    });
}

fn start_export(app: &Rc<RefCell<App>>) {
    let pending = match app.borrow().start_export() {
        Ok(pending) => pending,
        Err(e) => {
            log::error!("Export failed: {}", e);
            return;
        }
    };
    spawn_local(async move {
        let delivered = async {
            let image = pending.finish().await?;
            let png = encode_png(&image)?;
            web::download_png(&png, &timestamped_file_name()).map_err(ExportError::Delivery)
        };
        if let Err(e) = delivered.await {
            log::error!("Export failed: {}", e);
        }
    });
}
