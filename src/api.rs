//! HTTP surface for DocQuest.
//!
//! - `POST /process` – Multipart upload (field `file`, `.pdf` or `.txt`). Extracts sections,
//!   chunks and embeds them, summarizes each section, and makes the document active.
//! - `POST /challenge/init` – Comprehension questions for a document or for re-sent chunks.
//! - `POST /challenge/evaluate` – Grade a reader's answer against the document.
//! - `POST /ask` – Retrieval-augmented answer with cited sources.
//! - `GET /document/info` – Statistics for the active (or a given) document.
//! - `GET /health`, `GET /metrics`, `GET /commands` – Liveness, counters, and a command catalog.
//!
//! Every error is returned as JSON: `{"error", "kind", "transient", "stage"?}`.

use crate::processing::{
    AskRequest, ChallengeRequest, DocQuestApi, DocumentUpload, EvaluationRequest,
    ProcessingError, QaFailure, QaStage, QueryError,
};
use crate::store::DocumentId;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use std::sync::Arc;

const UPLOAD_FIELD: &str = "file";

const AVAILABLE_ENDPOINTS: [&str; 8] = [
    "POST /process",
    "POST /ask",
    "POST /challenge/init",
    "POST /challenge/evaluate",
    "GET /document/info",
    "GET /health",
    "GET /metrics",
    "GET /commands",
];

/// Build the HTTP router exposing the DocQuest API surface.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: DocQuestApi + 'static,
{
    Router::new()
        .route("/process", post(process_document::<S>))
        .route("/challenge/init", post(init_challenge::<S>))
        .route("/challenge/evaluate", post(evaluate_answer::<S>))
        .route("/ask", post(ask_question::<S>))
        .route("/document/info", get(document_info::<S>))
        .route("/health", get(health::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Wraps a successful response with `"status": "success"`.
#[derive(Serialize)]
struct Success<T> {
    status: &'static str,
    #[serde(flatten)]
    body: T,
}

fn success<T>(body: T) -> Json<Success<T>> {
    Json(Success {
        status: "success",
        body,
    })
}

/// Accept an upload, run the document pipeline, and publish the result.
async fn process_document<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError>
where
    S: DocQuestApi,
{
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("uploaded file has no filename".into()))?;
        let bytes = field.bytes().await?;
        upload = Some(DocumentUpload {
            filename,
            bytes: bytes.to_vec(),
        });
        break;
    }
    let upload = upload.ok_or_else(|| {
        AppError::BadRequest(format!("multipart field '{UPLOAD_FIELD}' is required"))
    })?;

    let filename = upload.filename.clone();
    let outcome = service.process_document(upload).await?;
    tracing::info!(
        filename = %filename,
        document_id = %outcome.document_id,
        sections = outcome.sections.len(),
        chunks = outcome.chunks.len(),
        "Process request completed"
    );
    Ok(success(outcome))
}

/// Generate comprehension questions. The body is optional.
async fn init_challenge<S>(
    State(service): State<Arc<S>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError>
where
    S: DocQuestApi,
{
    let request: ChallengeRequest = parse_optional_json(&body)?;
    let outcome = service.generate_challenge(request).await?;
    Ok(success(outcome))
}

/// Grade a reader's answer to a quiz question.
async fn evaluate_answer<S>(
    State(service): State<Arc<S>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError>
where
    S: DocQuestApi,
{
    let request: EvaluationRequest = parse_optional_json(&body)?;
    let outcome = service.evaluate_answer(request).await?;
    Ok(success(outcome))
}

/// Answer a free-form question about a document.
async fn ask_question<S>(
    State(service): State<Arc<S>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError>
where
    S: DocQuestApi,
{
    let request: AskRequest = parse_optional_json(&body)?;
    let record = service.ask(request).await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct DocumentInfoQuery {
    #[serde(default)]
    document_id: Option<String>,
}

/// Report statistics for a retained document.
async fn document_info<S>(
    State(service): State<Arc<S>>,
    Query(query): Query<DocumentInfoQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: DocQuestApi,
{
    let id = query
        .document_id
        .filter(|value| !value.trim().is_empty())
        .map(|value| {
            value
                .parse::<DocumentId>()
                .map_err(|_| AppError::BadRequest(format!("invalid document_id '{value}'")))
        })
        .transpose()?;
    let info = service.document_info(id).await?;
    Ok(Json(info))
}

async fn health<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: DocQuestApi,
{
    Json(service.health().await)
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: DocQuestApi,
{
    Json(service.metrics_snapshot())
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Endpoint not found",
            "kind": "not_found",
            "transient": false,
            "available_endpoints": AVAILABLE_ENDPOINTS,
        })),
    )
        .into_response()
}

/// Empty bodies deserialize to the request's default; anything else must be valid JSON.
fn parse_optional_json<T>(body: &[u8]) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|error| AppError::BadRequest(format!("invalid JSON body: {error}")))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by clients.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "process",
                method: "POST",
                path: "/process",
                description: "Upload a PDF or text file as multipart field 'file'. Extracts sections, chunks and embeds them, summarizes each section, and makes the document active.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/ask",
                description: "Answer a question from the document with cited sources. Accepts 'question' (or 'query'), optional 'document_id' and 'top_k' (1-20).",
                request_example: Some(json!({
                    "question": "What were the main findings?",
                    "top_k": 5
                })),
            },
            CommandDescriptor {
                name: "challenge_init",
                method: "POST",
                path: "/challenge/init",
                description: "Generate comprehension questions per section of the active document, a given 'document_id', or re-sent 'chunks'.",
                request_example: Some(json!({
                    "count": 3,
                    "chunks": [{"section": "Results", "text": "Chunk text"}]
                })),
            },
            CommandDescriptor {
                name: "challenge_evaluate",
                method: "POST",
                path: "/challenge/evaluate",
                description: "Grade an answer to a quiz question against the document.",
                request_example: Some(json!({
                    "question": "What did the study measure?",
                    "answer": "Soil moisture"
                })),
            },
            CommandDescriptor {
                name: "document_info",
                method: "GET",
                path: "/document/info",
                description: "Statistics for the active document, or for '?document_id=<id>'.",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness, active document, and retained document count.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Processing and query counters.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    Upload(MultipartError),
    Processing(ProcessingError),
    Query(QueryError),
}

/// Status, machine-readable kind, transient flag, and failing stage for an error.
struct ErrorClass {
    status: StatusCode,
    kind: &'static str,
    transient: bool,
    stage: Option<QaStage>,
}

impl ErrorClass {
    const fn new(status: StatusCode, kind: &'static str) -> Self {
        Self {
            status,
            kind,
            transient: false,
            stage: None,
        }
    }

    fn upstream(kind: &'static str, transient: bool, timeout: bool) -> Self {
        let status = if timeout {
            StatusCode::GATEWAY_TIMEOUT
        } else if transient {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::BAD_GATEWAY
        };
        Self {
            status,
            kind,
            transient,
            stage: None,
        }
    }
}

impl AppError {
    fn classify(&self) -> ErrorClass {
        match self {
            Self::BadRequest(_) => ErrorClass::new(StatusCode::BAD_REQUEST, "invalid_request"),
            Self::Upload(error) => {
                let status = error.status();
                let kind = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "payload_too_large"
                } else {
                    "invalid_upload"
                };
                ErrorClass::new(status, kind)
            }
            Self::Processing(error) => match error {
                ProcessingError::InvalidDocument(_) => {
                    ErrorClass::new(StatusCode::BAD_REQUEST, "invalid_document")
                }
                ProcessingError::EmbeddingUnavailable(inner) => ErrorClass::upstream(
                    "embedding_unavailable",
                    inner.is_transient(),
                    inner.is_timeout(),
                ),
                ProcessingError::Chunking(_)
                | ProcessingError::Index(_)
                | ProcessingError::Internal(_) => {
                    ErrorClass::new(StatusCode::INTERNAL_SERVER_ERROR, "internal")
                }
            },
            Self::Query(error) => match error {
                QueryError::InvalidRequest(_) => {
                    ErrorClass::new(StatusCode::BAD_REQUEST, "invalid_request")
                }
                QueryError::NoDocumentProcessed => {
                    ErrorClass::new(StatusCode::BAD_REQUEST, "no_document_processed")
                }
                QueryError::DocumentNotFound(_) => {
                    ErrorClass::new(StatusCode::NOT_FOUND, "document_not_found")
                }
                QueryError::IndexStale(_) => ErrorClass::new(StatusCode::GONE, "index_stale"),
                QueryError::QuizUnavailable { transient, .. } => ErrorClass {
                    transient: *transient,
                    ..ErrorClass::new(StatusCode::BAD_GATEWAY, "quiz_unavailable")
                },
                QueryError::Qa(qa) => {
                    let class = match &qa.source {
                        QaFailure::Embedding(_) => ErrorClass::upstream(
                            "embedding_unavailable",
                            qa.is_transient(),
                            qa.is_timeout(),
                        ),
                        QaFailure::Generation(_) => ErrorClass::upstream(
                            "generation_unavailable",
                            qa.is_transient(),
                            qa.is_timeout(),
                        ),
                        QaFailure::Index(_) | QaFailure::NoRelevantChunks | QaFailure::Prompt(_) => {
                            ErrorClass::new(StatusCode::INTERNAL_SERVER_ERROR, "retrieval_failed")
                        }
                    };
                    ErrorClass {
                        stage: Some(qa.stage),
                        ..class
                    }
                }
            },
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(message) => message.clone(),
            Self::Upload(error) => error.body_text(),
            Self::Processing(error) => error.to_string(),
            Self::Query(error) => error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let class = self.classify();
        let message = self.message();
        if class.status.is_server_error() {
            tracing::error!(kind = class.kind, stage = ?class.stage, error = %message, "Request failed");
        } else {
            tracing::debug!(kind = class.kind, error = %message, "Request rejected");
        }

        let mut body = json!({
            "error": message,
            "kind": class.kind,
            "transient": class.transient,
        });
        if let Some(stage) = class.stage {
            body["stage"] = json!(stage);
        }
        (class.status, Json(body)).into_response()
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Upload(inner)
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self::Processing(inner)
    }
}

impl From<QueryError> for AppError {
    fn from(inner: QueryError) -> Self {
        Self::Query(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, create_router, get_commands};
    use crate::extract::ExtractionError;
    use crate::generation::GenerationClientError;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        AnswerRecord, AskRequest, ChallengeOutcome, ChallengeRequest, Confidence, DocQuestApi,
        DocumentInfo, DocumentStats, DocumentSummary, DocumentUpload, EvaluationOutcome,
        EvaluationRequest, HealthSnapshot, IndexInfo, ProcessOutcome, ProcessingError, QaError,
        QaStage, QueryError, SummaryStrategy,
    };
    use crate::store::DocumentId;
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
        response::IntoResponse,
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docquest-test-boundary";

    #[tokio::test]
    async fn commands_catalog_exposes_process_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let process = commands
            .iter()
            .find(|cmd| cmd.name == "process")
            .expect("process command present");

        assert_eq!(process.method, "POST");
        assert_eq!(process.path, "/process");
        assert!(commands.iter().any(|cmd| cmd.path == "/ask"));
    }

    #[tokio::test]
    async fn unknown_routes_list_available_endpoints() {
        let (status, json) = send(app(), Method::GET, "/nope", Body::empty(), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["kind"], "not_found");
        let endpoints = json["available_endpoints"].as_array().expect("endpoints");
        assert!(endpoints.iter().any(|endpoint| endpoint == "POST /process"));
    }

    #[tokio::test]
    async fn process_route_accepts_multipart_upload() {
        let service = Arc::new(StubService::default());
        let router = create_router(service.clone(), 1024 * 1024);
        let (status, json) = send(
            router,
            Method::POST,
            "/process",
            multipart_body("file", Some("notes.txt"), "Abstract\nBody text."),
            Some(&format!("multipart/form-data; boundary={BOUNDARY}")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["filename"], "notes.txt");
        let calls = service.uploads.lock().await.clone();
        assert_eq!(calls, vec![("notes.txt".to_string(), 19)]);
    }

    #[tokio::test]
    async fn process_route_requires_file_field() {
        let (status, json) = send(
            app(),
            Method::POST,
            "/process",
            multipart_body("document", Some("notes.txt"), "text"),
            Some(&format!("multipart/form-data; boundary={BOUNDARY}")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn invalid_documents_map_to_bad_request() {
        let (status, json) = send(
            app(),
            Method::POST,
            "/process",
            multipart_body("file", Some("slides.pptx"), "binary"),
            Some(&format!("multipart/form-data; boundary={BOUNDARY}")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "invalid_document");
        assert_eq!(json["transient"], false);
    }

    #[tokio::test]
    async fn ask_accepts_query_alias() {
        let service = Arc::new(StubService::default());
        let router = create_router(service.clone(), 1024);
        let (status, json) = send(
            router,
            Method::POST,
            "/ask",
            Body::from(json!({"query": "What changed?", "top_k": 2}).to_string()),
            Some("application/json"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["answer"], "Stub answer");
        assert_eq!(json["confidence"], "high");
        let questions = service.questions.lock().await.clone();
        assert_eq!(questions, vec![(Some("What changed?".to_string()), Some(2))]);
    }

    #[tokio::test]
    async fn ask_without_document_is_bad_request() {
        let (status, json) = send(
            app(),
            Method::POST,
            "/ask",
            Body::from(json!({"question": "no document"}).to_string()),
            Some("application/json"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "no_document_processed");
    }

    #[tokio::test]
    async fn generation_timeouts_report_stage() {
        let (status, json) = send(
            app(),
            Method::POST,
            "/ask",
            Body::from(json!({"question": "timeout"}).to_string()),
            Some("application/json"),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json["kind"], "generation_unavailable");
        assert_eq!(json["stage"], "generate");
        assert_eq!(json["transient"], true);
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let (status, json) = send(
            app(),
            Method::POST,
            "/ask",
            Body::from("{not json"),
            Some("application/json"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn challenge_body_is_optional() {
        let service = Arc::new(StubService::default());
        let router = create_router(service.clone(), 1024);
        let (status, json) = send(router, Method::POST, "/challenge/init", Body::empty(), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["total_questions"], 0);
        assert_eq!(*service.challenges.lock().await, 1);
    }

    #[tokio::test]
    async fn document_info_rejects_malformed_ids() {
        let (status, json) = send(
            app(),
            Method::GET,
            "/document/info?document_id=abc",
            Body::empty(),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn document_info_without_document_is_bad_request() {
        let (status, json) = send(app(), Method::GET, "/document/info", Body::empty(), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "no_document_processed");
    }

    #[tokio::test]
    async fn metrics_route_returns_counters() {
        let (status, json) = send(app(), Method::GET, "/metrics", Body::empty(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["documents_processed"], 0);
        assert!(json.get("last_chunk_count").is_none());
    }

    #[tokio::test]
    async fn store_errors_map_to_http_statuses() {
        let id = DocumentId::new();
        let stale = AppError::from(QueryError::IndexStale(id)).into_response();
        assert_eq!(stale.status(), StatusCode::GONE);
        let missing = AppError::from(QueryError::DocumentNotFound(id)).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let quiz = AppError::from(QueryError::QuizUnavailable {
            message: "model down".into(),
            transient: true,
        })
        .into_response();
        assert_eq!(quiz.status(), StatusCode::BAD_GATEWAY);
        let upstream = AppError::from(QueryError::Qa(QaError::new(
            QaStage::Generate,
            GenerationClientError::Unavailable("refused".into()),
        )))
        .into_response();
        assert_eq!(upstream.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    fn app() -> Router {
        create_router(Arc::new(StubService::default()), 1024 * 1024)
    }

    async fn send(
        router: Router,
        method: Method,
        uri: &str,
        body: Body,
        content_type: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(content_type) = content_type {
            request = request.header("content-type", content_type);
        }
        let response = router
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn multipart_body(field: &str, filename: Option<&str>, contents: &str) -> Body {
        let disposition = match filename {
            Some(filename) => format!("form-data; name=\"{field}\"; filename=\"{filename}\""),
            None => format!("form-data; name=\"{field}\""),
        };
        Body::from(format!(
            "--{BOUNDARY}\r\nContent-Disposition: {disposition}\r\nContent-Type: text/plain\r\n\r\n{contents}\r\n--{BOUNDARY}--\r\n"
        ))
    }

    fn summary() -> DocumentSummary {
        DocumentSummary {
            text: "Summary".into(),
            strategy: SummaryStrategy::Extractive,
        }
    }

    fn stats() -> DocumentStats {
        DocumentStats {
            page_count: 1,
            skipped_pages: 0,
            section_count: 0,
            chunk_count: 0,
            total_characters: 0,
            total_words: 0,
        }
    }

    fn index_info() -> IndexInfo {
        IndexInfo {
            embedding_model: "stub".into(),
            dimension: 4,
            entries: 0,
        }
    }

    #[derive(Default)]
    struct StubService {
        uploads: Mutex<Vec<(String, usize)>>,
        questions: Mutex<Vec<(Option<String>, Option<usize>)>>,
        challenges: Mutex<usize>,
    }

    #[async_trait]
    impl DocQuestApi for StubService {
        async fn process_document(
            &self,
            upload: DocumentUpload,
        ) -> Result<ProcessOutcome, ProcessingError> {
            if !upload.filename.ends_with(".txt") {
                return Err(ExtractionError::UnsupportedFormat(upload.filename).into());
            }
            self.uploads
                .lock()
                .await
                .push((upload.filename.clone(), upload.bytes.len()));
            Ok(ProcessOutcome {
                document_id: DocumentId::new(),
                filename: upload.filename,
                content_hash: "hash".into(),
                processed_at: "1970-01-01T00:00:00Z".into(),
                sections: Vec::new(),
                document_summary: summary(),
                chunks: Vec::new(),
                stats: stats(),
                index: index_info(),
            })
        }

        async fn generate_challenge(
            &self,
            _request: ChallengeRequest,
        ) -> Result<ChallengeOutcome, QueryError> {
            *self.challenges.lock().await += 1;
            Ok(ChallengeOutcome {
                document_id: None,
                questions: Vec::new(),
                failures: Vec::new(),
                total_questions: 0,
            })
        }

        async fn evaluate_answer(
            &self,
            request: EvaluationRequest,
        ) -> Result<EvaluationOutcome, QueryError> {
            Ok(EvaluationOutcome {
                document_id: DocumentId::new(),
                question: request.question.unwrap_or_default(),
                user_answer: request.answer.unwrap_or_default(),
                feedback: "Correct".into(),
                grounded: true,
                sources: Vec::new(),
            })
        }

        async fn ask(&self, request: AskRequest) -> Result<AnswerRecord, QueryError> {
            self.questions
                .lock()
                .await
                .push((request.question.clone(), request.top_k));
            match request.question.as_deref() {
                Some("no document") => Err(QueryError::NoDocumentProcessed),
                Some("timeout") => Err(QaError::new(QaStage::Generate, GenerationClientError::Timeout).into()),
                question => Ok(AnswerRecord {
                    document_id: DocumentId::new(),
                    question: question.unwrap_or_default().to_string(),
                    answer: "Stub answer".into(),
                    sources: Vec::new(),
                    confidence: Confidence::High,
                }),
            }
        }

        async fn document_info(&self, id: Option<DocumentId>) -> Result<DocumentInfo, QueryError> {
            match id {
                None => Err(QueryError::NoDocumentProcessed),
                Some(id) => Ok(DocumentInfo {
                    document_id: id,
                    filename: "notes.txt".into(),
                    content_hash: "hash".into(),
                    processed_at: "1970-01-01T00:00:00Z".into(),
                    active: true,
                    sections: Vec::new(),
                    stats: stats(),
                    index: index_info(),
                    document_summary: summary(),
                }),
            }
        }

        async fn health(&self) -> HealthSnapshot {
            HealthSnapshot {
                status: "healthy",
                active_document: None,
                retained_documents: 0,
                embedding_model: "stub".into(),
                generation_model: "stub".into(),
            }
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot::default()
        }
    }
}
