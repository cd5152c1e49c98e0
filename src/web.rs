//! Browser helpers: canvas lookup, status text, fetch and downloads.
//!
//! Nothing here panics; missing DOM pieces are reported as errors so the
//! page can show a message instead of a dead canvas.

use crate::error::{TracerError, TracerResult};
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

/// Id of the canvas the tracer renders into
pub const CANVAS_ID: &str = "raytracer-canvas";
/// Id of the element that receives status and error messages
pub const STATUS_ID: &str = "status";
/// Canvas attribute naming a base URL to fetch shaders from
pub const SHADER_BASE_ATTRIBUTE: &str = "data-shader-base";

fn document() -> Option<web_sys::Document> {
    web_sys::window()?.document()
}

/// Look up the output canvas by id.
pub fn find_canvas(id: &str) -> TracerResult<web_sys::HtmlCanvasElement> {
    document()
        .and_then(|doc| doc.get_element_by_id(id))
        .and_then(|element| element.dyn_into::<web_sys::HtmlCanvasElement>().ok())
        .ok_or_else(|| TracerError::SurfaceMissing(id.to_string()))
}

/// Size the canvas backing store to its CSS box times the device pixel ratio.
/// Returns the physical size.
pub fn fit_canvas(canvas: &web_sys::HtmlCanvasElement) -> (u32, u32) {
    let dpr = web_sys::window()
        .map(|w| w.device_pixel_ratio())
        .unwrap_or(1.0);

    let css_width = canvas.client_width().max(1) as f64;
    let css_height = canvas.client_height().max(1) as f64;
    let width = ((css_width * dpr) as u32).max(1);
    let height = ((css_height * dpr) as u32).max(1);
    canvas.set_width(width);
    canvas.set_height(height);

    let style = canvas.style();
    let _ = style.set_property("display", "block");

    log::info!(
        "Canvas setup: {}x{} (CSS: {}x{}, DPR: {})",
        width,
        height,
        css_width as u32,
        css_height as u32,
        dpr
    );
    (width, height)
}

/// Show `message` in the status element, or log it when the page has none.
pub fn set_status(message: &str) {
    match document().and_then(|doc| doc.get_element_by_id(STATUS_ID)) {
        Some(element) => {
            element.set_text_content(Some(message));
            if let Ok(element) = element.dyn_into::<web_sys::HtmlElement>() {
                let display = if message.is_empty() { "none" } else { "block" };
                let _ = element.style().set_property("display", display);
            }
        }
        None if !message.is_empty() => log::warn!("{}", message),
        None => {}
    }
}

fn js_error(value: wasm_bindgen::JsValue) -> String {
    value
        .as_string()
        .unwrap_or_else(|| format!("{:?}", value))
}

/// GET `url` and return the body as text.
pub async fn fetch_text(url: &str) -> Result<String, String> {
    let window = web_sys::window().ok_or("no global window")?;
    let response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(js_error)?;
    let response: web_sys::Response = response.dyn_into().map_err(js_error)?;
    if !response.ok() {
        return Err(format!("HTTP {} for {}", response.status(), url));
    }

    let text = JsFuture::from(response.text().map_err(js_error)?)
        .await
        .map_err(js_error)?;
    text.as_string()
        .ok_or_else(|| format!("response body of {} is not text", url))
}

/// Hand `bytes` to the browser as a file download named `file_name`.
pub fn download_png(bytes: &[u8], file_name: &str) -> Result<(), String> {
    let document = document().ok_or("no document")?;

    let array = js_sys::Array::new();
    array.push(&js_sys::Uint8Array::from(bytes));
    let options = web_sys::BlobPropertyBag::new();
    options.set_type("image/png");
    let blob = web_sys::Blob::new_with_u8_array_sequence_and_options(&array, &options)
        .map_err(js_error)?;
    let url = web_sys::Url::create_object_url_with_blob(&blob).map_err(js_error)?;

    let anchor: web_sys::HtmlAnchorElement = document
        .create_element("a")
        .map_err(js_error)?
        .dyn_into()
        .map_err(|_| "failed to create anchor element".to_string())?;
    anchor.set_href(&url);
    anchor.set_download(file_name);
    anchor.click();

    web_sys::Url::revoke_object_url(&url).map_err(js_error)?;
    log::info!("Downloaded {} ({} bytes)", file_name, bytes.len());
    Ok(())
}
