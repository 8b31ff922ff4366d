//! Browser implementations of the handler's seams, built on `web-sys`.
//!
//! - [`BrowserFile`]: a `File` from the input element's `FileList`
//! - [`BrowserUi`]: `alert`, the output element, and the viewer bridge
//! - [`FetchTransport`]: `window.fetch`
//!
//! [`attach`] wires them to the page's file input.

use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use tracing::{info, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use web_sys::{
    Event, File, FileReader, FormData, HtmlElement, HtmlInputElement, Request, RequestInit,
    Response, Window,
};

use crate::file_utils::SourceFile;
use crate::handler::{Transport, UiContext, handle_file_selection};
use crate::schema::{
    BackendResponse, HandlerConfig, HandlerError, PreviewFile, PreviewOptions, ViewerSetup,
};
use crate::viewer_bindings::preview_in_viewer;

/// Extracts a readable message from a thrown JS value.
pub fn js_error_message(value: &JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

pub struct BrowserFile(File);

impl SourceFile for BrowserFile {
    fn name(&self) -> String {
        self.0.name()
    }

    fn content_type(&self) -> String {
        self.0.type_()
    }

    async fn read_data_url(&self) -> Result<String, HandlerError> {
        read_as_data_url(&self.0)
            .await
            .map_err(|e| HandlerError::Preview(js_error_message(&e)))
    }
}

/// `FileReader.readAsDataURL` as a future.
///
/// Both handlers stay registered until one of them has fired, then are
/// detached and dropped together.
async fn read_as_data_url(file: &File) -> Result<String, JsValue> {
    let reader = FileReader::new()?;
    let (sender, receiver) = oneshot::channel::<bool>();
    let sender = Rc::new(RefCell::new(Some(sender)));

    let on_load = Closure::once(settle_with(&sender, true));
    let on_error = Closure::once(settle_with(&sender, false));
    reader.set_onload(Some(on_load.as_ref().unchecked_ref()));
    reader.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    let started = reader.read_as_data_url(file);
    let loaded = match started {
        Ok(()) => receiver.await.unwrap_or(false),
        Err(_) => false,
    };
    reader.set_onload(None);
    reader.set_onerror(None);
    drop((on_load, on_error));

    started?;
    if !loaded {
        return Err(JsValue::from_str("could not read the file"));
    }
    reader
        .result()?
        .as_string()
        .ok_or_else(|| JsValue::from_str("FileReader produced a non-text result"))
}

/// A callback that reports `loaded` through the shared sender. Only the
/// first callback to run sends; later ones find the slot empty.
fn settle_with(
    sender: &Rc<RefCell<Option<oneshot::Sender<bool>>>>,
    loaded: bool,
) -> impl FnOnce() + 'static {
    let sender = Rc::clone(sender);
    move || {
        if let Some(sender) = sender.borrow_mut().take() {
            let _ = sender.send(loaded);
        }
    }
}

/// The page as seen by one change event.
pub struct BrowserUi {
    window: Window,
    selected: Option<File>,
    output_id: String,
}

impl BrowserUi {
    pub fn new(window: Window, selected: Option<File>, output_id: &str) -> Self {
        Self {
            window,
            selected,
            output_id: output_id.to_string(),
        }
    }
}

impl UiContext for BrowserUi {
    type File = BrowserFile;

    fn selected_file(&self) -> Option<BrowserFile> {
        self.selected.clone().map(BrowserFile)
    }

    fn notify(&self, message: &str) {
        if let Err(e) = self.window.alert_with_message(message) {
            warn!(error = %js_error_message(&e), %message, "alert failed");
        }
    }

    fn render_output(&self, text: &str) {
        let element = self
            .window
            .document()
            .and_then(|d| d.get_element_by_id(&self.output_id))
            .and_then(|e| e.dyn_into::<HtmlElement>().ok());
        match element {
            Some(element) => element.set_inner_text(text),
            None => warn!(output_id = %self.output_id, "output element not found"),
        }
    }

    async fn show_preview(
        &self,
        setup: &ViewerSetup,
        file: &PreviewFile,
        options: &PreviewOptions,
    ) -> Result<(), HandlerError> {
        let to_json = |e: serde_json::Error| HandlerError::Preview(e.to_string());
        let setup_json = serde_json::to_string(setup).map_err(to_json)?;
        let file_json = serde_json::to_string(file).map_err(to_json)?;
        let options_json = serde_json::to_string(options).map_err(to_json)?;

        let viewer_error = |e: JsValue| HandlerError::Preview(js_error_message(&e));
        let promise =
            preview_in_viewer(&setup_json, &file_json, &options_json).map_err(viewer_error)?;
        JsFuture::from(promise).await.map_err(viewer_error)?;
        Ok(())
    }
}

pub struct FetchTransport {
    window: Window,
}

impl FetchTransport {
    pub fn new(window: Window) -> Self {
        Self { window }
    }
}

impl Transport<BrowserFile> for FetchTransport {
    /// The browser encodes the `FormData` body and sets its own
    /// `multipart/form-data` boundary, so the file is never copied into wasm.
    async fn post(
        &self,
        url: &str,
        field: &str,
        file: &BrowserFile,
    ) -> Result<BackendResponse, HandlerError> {
        let transport_error = |e: JsValue| HandlerError::Transport(js_error_message(&e));

        let form = FormData::new().map_err(transport_error)?;
        form.append_with_blob_and_filename(field, &file.0, &file.0.name())
            .map_err(transport_error)?;

        let init = RequestInit::new();
        init.set_method("POST");
        init.set_body(&form);
        let request = Request::new_with_str_and_init(url, &init).map_err(transport_error)?;

        let response: Response = JsFuture::from(self.window.fetch_with_request(&request))
            .await
            .map_err(transport_error)?
            .dyn_into()
            .map_err(transport_error)?;
        let status = response.status();

        let body_error = |e: JsValue| HandlerError::InvalidResponse(js_error_message(&e));
        let text = JsFuture::from(response.text().map_err(body_error)?)
            .await
            .map_err(body_error)?;

        Ok(BackendResponse {
            status,
            body: text.as_string().unwrap_or_default(),
        })
    }
}

/// Registers the change listener on the configured file input.
///
/// The listener lives for the rest of the page. Each event runs its own
/// handler invocation; earlier ones are not cancelled.
pub fn attach(config: HandlerConfig) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no global window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("window has no document"))?;
    let input: HtmlInputElement = document
        .get_element_by_id(&config.input_id)
        .ok_or_else(|| JsValue::from_str(&format!("no element with id `{}`", config.input_id)))?
        .dyn_into()
        .map_err(|_| JsValue::from_str(&format!("`{}` is not an input element", config.input_id)))?;

    let input_id = config.input_id.clone();
    let config = Rc::new(config);
    let listener = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        event.prevent_default();
        let selected = event
            .target()
            .and_then(|t| t.dyn_into::<HtmlInputElement>().ok())
            .and_then(|input| input.files())
            .and_then(|files| files.get(0));

        let config = Rc::clone(&config);
        let window = window.clone();
        spawn_local(async move {
            let ui = BrowserUi::new(window.clone(), selected, &config.output_id);
            let transport = FetchTransport::new(window);
            // already surfaced to the user by the handler
            let _ = handle_file_selection(&ui, &transport, &config).await;
        });
    });
    input.add_event_listener_with_callback("change", listener.as_ref().unchecked_ref())?;
    listener.forget();

    info!(%input_id, "upload handler attached");
    Ok(())
}
