//! Document pipeline: chunking, summaries, quizzes, and retrieval-augmented answers.

pub mod chunking;
pub mod evaluate;
pub mod qa;
mod quiz;
mod service;
pub mod settings;
pub mod summarize;
mod text;
pub mod types;

pub use service::{DocQuestApi, DocQuestService, ServiceInitError};
pub use settings::PipelineSettings;
pub use types::{
    AnswerRecord, AskRequest, ChallengeOutcome, ChallengeRequest, ChunkInput, ChunkingError,
    Confidence, DocumentInfo, DocumentStats, DocumentSummary, DocumentUpload, EvaluationOutcome,
    EvaluationRequest, HealthSnapshot, IndexInfo, ProcessOutcome, ProcessingError, QaError,
    QaFailure, QaStage, QueryError, QuizItem, SectionReport, SectionSummary, SourceRef,
    SummaryStrategy, UnitFailure,
};
