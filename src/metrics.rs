use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_processed: AtomicU64,
    chunks_indexed: AtomicU64,
    last_chunk_count: AtomicU64,
    summary_failures: AtomicU64,
    questions_answered: AtomicU64,
    qa_failures: AtomicU64,
    quiz_questions_generated: AtomicU64,
    answers_evaluated: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed document, its chunk count, and how many section summaries failed.
    pub fn record_document(&self, chunk_count: u64, summary_failures: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_count.store(chunk_count, Ordering::Relaxed);
        self.summary_failures
            .fetch_add(summary_failures, Ordering::Relaxed);
    }

    /// Record the outcome of a question.
    pub fn record_answer(&self, succeeded: bool) {
        if succeeded {
            self.questions_answered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.qa_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record generated quiz questions.
    pub fn record_quiz(&self, questions: u64) {
        self.quiz_questions_generated
            .fetch_add(questions, Ordering::Relaxed);
    }

    /// Record a completed answer evaluation.
    pub fn record_evaluation(&self) {
        self.answers_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_chunk_count = self.last_chunk_count.load(Ordering::Relaxed);
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            last_chunk_count: (self.documents_processed.load(Ordering::Relaxed) > 0)
                .then_some(last_chunk_count),
            summary_failures: self.summary_failures.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            qa_failures: self.qa_failures.load(Ordering::Relaxed),
            quiz_questions_generated: self.quiz_questions_generated.load(Ordering::Relaxed),
            answers_evaluated: self.answers_evaluated.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents processed since startup.
    pub documents_processed: u64,
    /// Chunks indexed across all documents.
    pub chunks_indexed: u64,
    /// Chunk count of the most recent document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_count: Option<u64>,
    /// Section summaries that came back unavailable.
    pub summary_failures: u64,
    /// Questions answered successfully.
    pub questions_answered: u64,
    /// Questions that failed in the retrieval pipeline.
    pub qa_failures: u64,
    /// Quiz questions generated.
    pub quiz_questions_generated: u64,
    /// Reader answers evaluated.
    pub answers_evaluated: u64,
}
