//! Test doubles shared by unit tests
//!
//! Scripted collaborators: each records what it was asked and answers from
//! a queue or a fixed configuration.

use crate::calendar::{BusyInterval, CalendarError, CalendarProvider, MeetingRequest};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService, TextStream};
use crate::retrieval::{Embedder, EmbeddingTask, KnowledgeRetriever, Passage, RetrievalError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// UTC timestamp shorthand
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid test timestamp")
}

// ============================================================================
// LLM
// ============================================================================

/// Scripted language model. An empty queue fails the call.
#[derive(Default)]
pub struct MockLlm {
    completions: Mutex<VecDeque<Result<String, LlmError>>>,
    streams: Mutex<VecDeque<Vec<Result<String, LlmError>>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_completion(&self, text: &str) {
        self.completions
            .lock()
            .unwrap()
            .push_back(Ok(text.to_string()));
    }

    pub fn queue_stream(&self, fragments: &[&str]) {
        let items = fragments.iter().map(|f| Ok((*f).to_string())).collect();
        self.streams.lock().unwrap().push_back(items);
    }

    /// Stream that yields `fragments` and then fails
    pub fn queue_stream_failure(&self, fragments: &[&str]) {
        let mut items: Vec<_> = fragments.iter().map(|f| Ok((*f).to_string())).collect();
        items.push(Err(LlmError::network("connection reset")));
        self.streams.lock().unwrap().push_back(items);
    }

    /// Prompt text of every call, in order
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn record(&self, request: &LlmRequest) {
        self.prompts.lock().unwrap().push(request.prompt_text());
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.record(request);
        let next = self.completions.lock().unwrap().pop_front();
        match next {
            Some(result) => result.map(LlmResponse::text),
            None => Err(LlmError::server_error("no scripted completion")),
        }
    }

    async fn stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError> {
        self.record(request);
        let next = self.streams.lock().unwrap().pop_front();
        match next {
            Some(items) => Ok(futures::stream::iter(items).boxed()),
            None => Err(LlmError::server_error("no scripted stream")),
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Retrieval
// ============================================================================

/// Deterministic bag-of-words embedder: similar wording, similar vectors
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    const DIMENSIONS: usize = 64;

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; Self::DIMENSIONS];
        let lowered = text.to_lowercase();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let bucket = usize::try_from(hasher.finish() % Self::DIMENSIONS as u64).unwrap();
            vector[bucket] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, RetrievalError> {
        Ok(Self::vector_for(text))
    }

    fn model_id(&self) -> &str {
        "keyword"
    }
}

/// Retriever returning a fixed passage list, or a fixed failure
#[derive(Default)]
pub struct MockRetriever {
    passages: Mutex<Vec<Passage>>,
    failure: Mutex<Option<String>>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl MockRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_passages(&self, passages: Vec<Passage>) {
        *self.passages.lock().unwrap() = passages;
    }

    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock().unwrap() = Some(reason.to_string());
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl KnowledgeRetriever for MockRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        self.queries.lock().unwrap().push((query.to_string(), k));
        if let Some(reason) = self.failure.lock().unwrap().clone() {
            return Err(RetrievalError::Unavailable(reason));
        }
        Ok(self.passages.lock().unwrap().iter().take(k).cloned().collect())
    }
}

// ============================================================================
// Calendar
// ============================================================================

/// Calendar with a configurable busy list that records created events
#[derive(Default)]
pub struct MockCalendar {
    busy: Mutex<Vec<BusyInterval>>,
    busy_fails: Mutex<bool>,
    create_fails: Mutex<bool>,
    link: Mutex<Option<String>>,
    busy_queries: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    created: Mutex<Vec<MeetingRequest>>,
}

impl MockCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_busy(&self, busy: Vec<BusyInterval>) {
        *self.busy.lock().unwrap() = busy;
    }

    pub fn fail_busy(&self) {
        *self.busy_fails.lock().unwrap() = true;
    }

    pub fn fail_create(&self) {
        *self.create_fails.lock().unwrap() = true;
    }

    pub fn set_link(&self, link: Option<&str>) {
        *self.link.lock().unwrap() = link.map(String::from);
    }

    pub fn busy_queries(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.busy_queries.lock().unwrap().clone()
    }

    pub fn created_events(&self) -> Vec<MeetingRequest> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarProvider for MockCalendar {
    async fn list_busy(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        self.busy_queries.lock().unwrap().push((time_min, time_max));
        if *self.busy_fails.lock().unwrap() {
            return Err(CalendarError::Http("connection refused".to_string()));
        }
        Ok(self.busy.lock().unwrap().clone())
    }

    async fn create_event(&self, meeting: &MeetingRequest) -> Result<Option<String>, CalendarError> {
        if *self.create_fails.lock().unwrap() {
            return Err(CalendarError::Api {
                status: 403,
                message: "insufficient permissions".to_string(),
            });
        }
        self.created.lock().unwrap().push(meeting.clone());
        Ok(self.link.lock().unwrap().clone())
    }
}
