pub mod browser;
pub mod data_url;
pub mod file_utils;
pub mod handler;
pub mod js_json;
pub mod logging;
pub mod schema;
mod viewer_bindings;

use wasm_bindgen::prelude::*;

pub use file_utils::{MemoryFile, PDF_MIME, SourceFile};
pub use handler::{Transport, UiContext, handle_file_selection};
pub use schema::{BackendResponse, EmbedMode, HandlerConfig, HandlerError};

/// Attaches the upload-and-preview handler to the page's file input.
///
/// `options_json` is an optional JSON object matching `HandlerConfig`; missing
/// fields take their defaults. Throws if the options are malformed or the
/// input element cannot be found.
///
/// ```javascript
/// import init, { attach_upload_handler } from "./pkg/pdf_upload_preview.js";
/// await init();
/// attach_upload_handler(JSON.stringify({ viewer_client_id: "<embed api key>" }));
/// ```
#[wasm_bindgen]
pub fn attach_upload_handler(options_json: Option<String>) -> Result<(), JsValue> {
    let config = HandlerConfig::from_options(options_json.as_deref())
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    logging::init(config.log_level.as_deref());
    browser::attach(config)
}
