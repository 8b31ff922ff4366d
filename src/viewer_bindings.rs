//! JavaScript bindings for the embedded PDF viewer
//!
//! The viewer is loaded by the page as a global script (`AdobeDC.View`), so
//! the actual calls live in a small JS bridge and take their arguments as JSON.

use wasm_bindgen::prelude::*;

#[wasm_bindgen(module = "/viewer_bridge.js")]
extern "C" {
    /// Construct the viewer from `setup_json` (`{clientId, divId}`) and call
    /// `previewFile` with the parsed file and options objects.
    /// Returns the promise `previewFile` returns.
    #[wasm_bindgen(catch)]
    pub fn preview_in_viewer(
        setup_json: &str,
        file_json: &str,
        options_json: &str,
    ) -> Result<js_sys::Promise, JsValue>;
}
