//! # Upload-and-Preview Handler
//!
//! Runs once per file-selection event. After validating the selection it
//! starts two independent operations over the same file:
//!
//! - **preview**: read the file as a `data:` URL and hand it to the embedded
//!   viewer. Failures here are logged and otherwise ignored.
//! - **upload**: POST the file as `multipart/form-data`, then either render the
//!   JSON response or alert the user.
//!
//! Neither waits for the other and there is no cancellation: a second
//! selection while the first is in flight simply runs alongside it.
//!
//! The browser is reached only through [`UiContext`] and [`Transport`], so the
//! whole flow runs natively in tests.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::file_utils::{SourceFile, validate_selection};
use crate::js_json;
use crate::schema::{
    BackendResponse, HandlerConfig, HandlerError, PreviewFile, PreviewOptions, ViewerSetup,
};

static INVOCATIONS: AtomicU64 = AtomicU64::new(0);

/// The page the handler acts on.
#[allow(async_fn_in_trait)]
pub trait UiContext {
    type File: SourceFile;

    /// The file carried by the triggering event, if any.
    fn selected_file(&self) -> Option<Self::File>;

    /// Shows a blocking message to the user.
    fn notify(&self, message: &str);

    /// Replaces the text of the output region.
    fn render_output(&self, text: &str);

    /// Hands the file to the external viewer.
    async fn show_preview(
        &self,
        setup: &ViewerSetup,
        file: &PreviewFile,
        options: &PreviewOptions,
    ) -> Result<(), HandlerError>;
}

/// Sends the upload request for files of type `F`.
#[allow(async_fn_in_trait)]
pub trait Transport<F: SourceFile> {
    /// POSTs a `multipart/form-data` body carrying `file` under `field` to
    /// `url` and returns the response whatever its status.
    ///
    /// Only failures to get a response at all are errors, matching `fetch`.
    async fn post(&self, url: &str, field: &str, file: &F)
    -> Result<BackendResponse, HandlerError>;
}

/// Handles one file selection end to end.
///
/// Every error is surfaced through [`UiContext::notify`] before being
/// returned, except preview failures which are only logged. On success the
/// returned string is exactly the text rendered into the output region.
pub async fn handle_file_selection<U, T>(
    ui: &U,
    transport: &T,
    config: &HandlerConfig,
) -> Result<String, HandlerError>
where
    U: UiContext,
    T: Transport<U::File>,
{
    let invocation = INVOCATIONS.fetch_add(1, Ordering::Relaxed) + 1;
    let span = info_span!("file_selection", invocation);
    process_selection(ui, transport, config)
        .instrument(span)
        .await
}

async fn process_selection<U, T>(
    ui: &U,
    transport: &T,
    config: &HandlerConfig,
) -> Result<String, HandlerError>
where
    U: UiContext,
    T: Transport<U::File>,
{
    let file = match validate_selection(ui.selected_file()) {
        Ok(file) => file,
        Err(err) => {
            match &err {
                HandlerError::NotPdf { content_type } => {
                    warn!(%content_type, "rejected selection: not a PDF")
                }
                _ => warn!("rejected selection: no file"),
            }
            ui.notify(&err.to_string());
            return Err(err);
        }
    };

    info!(file_name = %file.name(), "processing selected file");

    let (preview, upload) = futures::join!(
        preview_file(ui, &file, config),
        upload_and_report(ui, transport, &file, config)
    );

    match preview {
        Ok(()) => debug!("viewer accepted the file"),
        Err(err) => warn!(%err, "preview did not complete"),
    }
    upload
}

async fn preview_file<U: UiContext>(
    ui: &U,
    file: &U::File,
    config: &HandlerConfig,
) -> Result<(), HandlerError> {
    let url = file.read_data_url().await?;
    if config.viewer_client_id.is_empty() {
        warn!("no viewer client id configured; the viewer will likely refuse to load");
    }
    let request = PreviewFile::new(url, file.name());
    ui.show_preview(&config.viewer_setup(), &request, &config.preview_options())
        .await
}

async fn upload_and_report<U, T>(
    ui: &U,
    transport: &T,
    file: &U::File,
    config: &HandlerConfig,
) -> Result<String, HandlerError>
where
    U: UiContext,
    T: Transport<U::File>,
{
    match upload_file(transport, file, config).await {
        Ok(text) => {
            ui.render_output(&text);
            Ok(text)
        }
        Err(err) => {
            warn!(%err, "upload failed");
            ui.notify(&err.to_string());
            Err(err)
        }
    }
}

async fn upload_file<F: SourceFile, T: Transport<F>>(
    transport: &T,
    file: &F,
    config: &HandlerConfig,
) -> Result<String, HandlerError> {
    debug!(endpoint = %config.endpoint, field = %config.upload_field, "posting file");
    let response = transport
        .post(&config.endpoint, &config.upload_field, file)
        .await?;
    info!(status = response.status, "backend responded");

    let data: Value = serde_json::from_str(&response.body)
        .map_err(|e| HandlerError::InvalidResponse(e.to_string()))?;
    if data.is_null() {
        return Err(HandlerError::InvalidResponse(
            "Cannot read properties of null (reading 'error')".into(),
        ));
    }

    if let Some(message) = error_indicator(&data) {
        return Err(HandlerError::Backend(message));
    }

    js_json::stringify_pretty(&data).map_err(|e| HandlerError::InvalidResponse(e.to_string()))
}

/// Returns the backend's error message when the response signals failure.
///
/// A response signals failure when it is an object whose `error` field is
/// truthy in the JavaScript sense. The message is the field converted the
/// way string concatenation would convert it.
pub fn error_indicator(data: &Value) -> Option<String> {
    let error = data.as_object()?.get("error")?;
    js_json::is_truthy(error).then(|| js_json::to_js_string(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_url::tests::decode;
    use crate::file_utils::{MemoryFile, PDF_MIME};
    use futures::channel::oneshot;
    use futures::executor::block_on;
    use serde_json::json;
    use std::cell::RefCell;

    const PREVIOUS_OUTPUT: &str = "(previous output)";

    struct MockUi {
        file: Option<MemoryFile>,
        alerts: RefCell<Vec<String>>,
        output: RefCell<String>,
        previews: RefCell<Vec<(ViewerSetup, PreviewFile, PreviewOptions)>>,
        preview_error: Option<HandlerError>,
        preview_gate: RefCell<Option<oneshot::Receiver<()>>>,
    }

    impl MockUi {
        fn new(file: Option<MemoryFile>) -> Self {
            Self {
                file,
                alerts: RefCell::new(Vec::new()),
                output: RefCell::new(PREVIOUS_OUTPUT.to_string()),
                previews: RefCell::new(Vec::new()),
                preview_error: None,
                preview_gate: RefCell::new(None),
            }
        }
    }

    impl UiContext for MockUi {
        type File = MemoryFile;

        fn selected_file(&self) -> Option<MemoryFile> {
            self.file.clone()
        }

        fn notify(&self, message: &str) {
            self.alerts.borrow_mut().push(message.to_string());
        }

        fn render_output(&self, text: &str) {
            *self.output.borrow_mut() = text.to_string();
        }

        async fn show_preview(
            &self,
            setup: &ViewerSetup,
            file: &PreviewFile,
            options: &PreviewOptions,
        ) -> Result<(), HandlerError> {
            let gate = self.preview_gate.borrow_mut().take();
            if let Some(gate) = gate {
                gate.await.map_err(|e| HandlerError::Preview(e.to_string()))?;
            }
            self.previews
                .borrow_mut()
                .push((setup.clone(), file.clone(), *options));
            match &self.preview_error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    /// One recorded POST: url, form field, and the file as it was appended.
    #[derive(Debug, Clone, PartialEq)]
    struct Upload {
        url: String,
        field: String,
        file: MemoryFile,
    }

    struct MockTransport {
        response: Result<BackendResponse, HandlerError>,
        uploads: RefCell<Vec<Upload>>,
        on_post: RefCell<Option<oneshot::Sender<()>>>,
    }

    impl MockTransport {
        fn replying(body: &str) -> Self {
            Self::with(Ok(BackendResponse {
                status: 200,
                body: body.to_string(),
            }))
        }

        fn with(response: Result<BackendResponse, HandlerError>) -> Self {
            Self {
                response,
                uploads: RefCell::new(Vec::new()),
                on_post: RefCell::new(None),
            }
        }
    }

    impl Transport<MemoryFile> for MockTransport {
        async fn post(
            &self,
            url: &str,
            field: &str,
            file: &MemoryFile,
        ) -> Result<BackendResponse, HandlerError> {
            self.uploads.borrow_mut().push(Upload {
                url: url.to_string(),
                field: field.to_string(),
                file: file.clone(),
            });
            if let Some(signal) = self.on_post.borrow_mut().take() {
                let _ = signal.send(());
            }
            self.response.clone()
        }
    }

    fn pdf_file() -> MemoryFile {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.extend((0..=255u8).cycle().take(1024));
        bytes.extend_from_slice(b"\n%%EOF\n");
        MemoryFile::new("invoice.pdf", PDF_MIME, bytes)
    }

    fn config() -> HandlerConfig {
        HandlerConfig {
            viewer_client_id: "test-client".into(),
            ..HandlerConfig::default()
        }
    }

    /// Runs one selection of `pdf_file()` against a backend replying `body`.
    fn run_with_body(body: &str) -> (MockUi, Result<String, HandlerError>) {
        let ui = MockUi::new(Some(pdf_file()));
        let transport = MockTransport::replying(body);
        let result = block_on(handle_file_selection(&ui, &transport, &config()));
        (ui, result)
    }

    #[test]
    fn test_no_file_alerts_once_and_does_nothing_else() {
        let ui = MockUi::new(None);
        let transport = MockTransport::replying("{}");

        let err = block_on(handle_file_selection(&ui, &transport, &config())).unwrap_err();

        assert_eq!(err, HandlerError::NoFileSelected);
        assert_eq!(*ui.alerts.borrow(), vec!["Please select a valid PDF file."]);
        assert!(transport.uploads.borrow().is_empty());
        assert!(ui.previews.borrow().is_empty());
        assert_eq!(*ui.output.borrow(), PREVIOUS_OUTPUT);
    }

    #[test]
    fn test_wrong_content_type_alerts_once_and_does_nothing_else() {
        for content_type in ["text/plain", "application/x-pdf", ""] {
            let file = MemoryFile::new("notes.pdf", content_type, b"%PDF-1.4".to_vec());
            let ui = MockUi::new(Some(file));
            let transport = MockTransport::replying("{}");

            let err = block_on(handle_file_selection(&ui, &transport, &config())).unwrap_err();

            assert!(matches!(err, HandlerError::NotPdf { .. }));
            assert_eq!(*ui.alerts.borrow(), vec!["Please select a valid PDF file."]);
            assert!(transport.uploads.borrow().is_empty());
            assert!(ui.previews.borrow().is_empty());
        }
    }

    #[test]
    fn test_viewer_receives_name_and_data_url_of_file() {
        let file = pdf_file();
        let ui = MockUi::new(Some(file.clone()));
        let transport = MockTransport::replying(r#"{"ok":true}"#);

        block_on(handle_file_selection(&ui, &transport, &config())).unwrap();

        let previews = ui.previews.borrow();
        assert_eq!(previews.len(), 1);
        let (setup, request, options) = &previews[0];
        assert_eq!(setup.client_id, "test-client");
        assert_eq!(setup.div_id, "adobe-dc-view");
        assert_eq!(request.file_name(), "invoice.pdf");
        assert_eq!(
            serde_json::to_value(options).unwrap(),
            json!({"embedMode": "SIZED_CONTAINER"})
        );
        let (mime, decoded) = decode(request.url()).unwrap();
        assert_eq!(mime, PDF_MIME);
        assert_eq!(decoded, file.bytes);
    }

    #[test]
    fn test_single_post_carries_file_under_file_field() {
        let file = pdf_file();
        let ui = MockUi::new(Some(file.clone()));
        let transport = MockTransport::replying(r#"{"ok":true}"#);

        block_on(handle_file_selection(&ui, &transport, &config())).unwrap();

        assert_eq!(
            *transport.uploads.borrow(),
            vec![Upload {
                url: "http://localhost:5000/upload".into(),
                field: "file".into(),
                file,
            }]
        );
    }

    #[test]
    fn test_configured_endpoint_and_field_are_used() {
        let ui = MockUi::new(Some(pdf_file()));
        let transport = MockTransport::replying("{}");
        let config = HandlerConfig {
            endpoint: "https://backend.test/api/upload".into(),
            upload_field: "document".into(),
            ..config()
        };

        block_on(handle_file_selection(&ui, &transport, &config)).unwrap();

        let uploads = transport.uploads.borrow();
        assert_eq!(uploads[0].url, "https://backend.test/api/upload");
        assert_eq!(uploads[0].field, "document");
    }

    #[test]
    fn test_backend_error_is_alerted_and_output_untouched() {
        let (ui, result) = run_with_body(r#"{"error": "corrupt file"}"#);

        assert_eq!(result, Err(HandlerError::Backend("corrupt file".into())));
        assert_eq!(*ui.alerts.borrow(), vec!["Error: corrupt file"]);
        assert_eq!(*ui.output.borrow(), PREVIOUS_OUTPUT);
    }

    #[test]
    fn test_success_renders_pretty_json_without_alert() {
        let (ui, result) = run_with_body(r#"{"pages": 3, "text": "hello"}"#);

        let expected = "{\n  \"pages\": 3,\n  \"text\": \"hello\"\n}";
        assert_eq!(result.unwrap(), expected);
        assert_eq!(*ui.output.borrow(), expected);
        assert!(ui.alerts.borrow().is_empty());
    }

    #[test]
    fn test_rendering_keeps_backend_key_order() {
        let (ui, _) = run_with_body(r#"{"title":"Doc","outline":[{"level":"H1","page":1}]}"#);

        assert_eq!(
            *ui.output.borrow(),
            "{\n  \"title\": \"Doc\",\n  \"outline\": [\n    {\n      \"level\": \"H1\",\n      \"page\": 1\n    }\n  ]\n}"
        );
    }

    #[test]
    fn test_null_body_is_alerted_as_send_failure() {
        let (ui, result) = run_with_body("null");

        assert!(matches!(result, Err(HandlerError::InvalidResponse(_))));
        assert_eq!(
            *ui.alerts.borrow(),
            vec!["Failed to send file: Cannot read properties of null (reading 'error')"]
        );
        assert_eq!(*ui.output.borrow(), PREVIOUS_OUTPUT);
    }

    #[test]
    fn test_integral_floats_render_without_fraction() {
        let (ui, _) = run_with_body(r#"{"pages": 3.0}"#);
        assert_eq!(*ui.output.borrow(), "{\n  \"pages\": 3\n}");
    }

    #[test]
    fn test_index_like_keys_render_first() {
        let (ui, _) = run_with_body(r#"{"b":1,"2":"x","1":"y"}"#);
        assert_eq!(
            *ui.output.borrow(),
            "{\n  \"1\": \"y\",\n  \"2\": \"x\",\n  \"b\": 1\n}"
        );
    }

    #[test]
    fn test_out_of_range_number_renders_null() {
        let (ui, _) = run_with_body("1e400");
        assert_eq!(*ui.output.borrow(), "null");
        assert!(ui.alerts.borrow().is_empty());

        let (ui, _) = run_with_body(r#"{"area": 1e400}"#);
        assert_eq!(*ui.output.borrow(), "{\n  \"area\": null\n}");
    }

    #[test]
    fn test_lone_surrogate_escape_is_alerted() {
        let (ui, result) = run_with_body(r#"{"s":"\ud800"}"#);

        assert!(matches!(result, Err(HandlerError::InvalidResponse(_))));
        let alerts = ui.alerts.borrow();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].starts_with("Failed to send file: "));
        assert_eq!(*ui.output.borrow(), PREVIOUS_OUTPUT);
    }

    #[test]
    fn test_non_object_bodies_are_rendered() {
        let (ui, _) = run_with_body(r#"["error"]"#);
        assert_eq!(*ui.output.borrow(), "[\n  \"error\"\n]");
        let (ui, _) = run_with_body("0");
        assert_eq!(*ui.output.borrow(), "0");
    }

    #[test]
    fn test_transport_failure_is_alerted_and_output_untouched() {
        let ui = MockUi::new(Some(pdf_file()));
        let transport = MockTransport::with(Err(HandlerError::Transport("Failed to fetch".into())));

        block_on(handle_file_selection(&ui, &transport, &config())).unwrap_err();

        assert_eq!(*ui.alerts.borrow(), vec!["Failed to send file: Failed to fetch"]);
        assert_eq!(*ui.output.borrow(), PREVIOUS_OUTPUT);
    }

    #[test]
    fn test_non_json_response_is_alerted() {
        let ui = MockUi::new(Some(pdf_file()));
        let transport = MockTransport::with(Ok(BackendResponse {
            status: 502,
            body: "<html>Bad Gateway</html>".into(),
        }));

        let err = block_on(handle_file_selection(&ui, &transport, &config())).unwrap_err();

        assert!(matches!(err, HandlerError::InvalidResponse(_)));
        let alerts = ui.alerts.borrow();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].starts_with("Failed to send file: "));
        assert_eq!(*ui.output.borrow(), PREVIOUS_OUTPUT);
    }

    #[test]
    fn test_error_status_with_json_body_is_still_rendered() {
        let ui = MockUi::new(Some(pdf_file()));
        let transport = MockTransport::with(Ok(BackendResponse {
            status: 500,
            body: r#"{"detail":"oops"}"#.into(),
        }));

        block_on(handle_file_selection(&ui, &transport, &config())).unwrap();

        assert_eq!(*ui.output.borrow(), "{\n  \"detail\": \"oops\"\n}");
    }

    #[test]
    fn test_repeated_runs_render_identical_output() {
        let ui = MockUi::new(Some(pdf_file()));
        let transport = MockTransport::replying(r#"{"pages": 3, "text": "hello"}"#);

        block_on(handle_file_selection(&ui, &transport, &config())).unwrap();
        let first = ui.output.borrow().clone();
        block_on(handle_file_selection(&ui, &transport, &config())).unwrap();

        assert_eq!(*ui.output.borrow(), first);
        let uploads = transport.uploads.borrow();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0], uploads[1]);
    }

    #[test]
    fn test_preview_failure_is_not_alerted() {
        let mut ui = MockUi::new(Some(pdf_file()));
        ui.preview_error = Some(HandlerError::Preview("viewer script missing".into()));
        let transport = MockTransport::replying(r#"{"pages": 1}"#);

        let rendered = block_on(handle_file_selection(&ui, &transport, &config())).unwrap();

        assert_eq!(rendered, "{\n  \"pages\": 1\n}");
        assert!(ui.alerts.borrow().is_empty());
    }

    #[test]
    fn test_preview_and_upload_run_concurrently() {
        // the preview only finishes after the upload has been sent
        let (signal, gate) = oneshot::channel();
        let ui = MockUi::new(Some(pdf_file()));
        *ui.preview_gate.borrow_mut() = Some(gate);
        let transport = MockTransport::replying(r#"{"pages": 2}"#);
        *transport.on_post.borrow_mut() = Some(signal);

        block_on(handle_file_selection(&ui, &transport, &config())).unwrap();

        assert_eq!(ui.previews.borrow().len(), 1);
        assert_eq!(transport.uploads.borrow().len(), 1);
    }

    #[test]
    fn test_error_indicator_follows_js_truthiness() {
        assert_eq!(error_indicator(&json!({"error": "bad"})), Some("bad".into()));
        assert_eq!(error_indicator(&json!({"error": true})), Some("true".into()));
        assert_eq!(error_indicator(&json!({"error": 42})), Some("42".into()));
        assert_eq!(
            error_indicator(&json!({"error": {"code": 1}})),
            Some("[object Object]".into())
        );
        assert_eq!(error_indicator(&json!({"error": ""})), None);
        assert_eq!(error_indicator(&json!({"error": null})), None);
        assert_eq!(error_indicator(&json!({"error": false})), None);
        assert_eq!(error_indicator(&json!({"error": 0})), None);
        assert_eq!(error_indicator(&json!({"pages": 3})), None);
        assert_eq!(error_indicator(&json!([{"error": "x"}])), None);
    }
}
