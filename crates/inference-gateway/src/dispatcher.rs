//! Inference dispatcher
//!
//! Resolves model → engine and invokes the engine. Lookup failures happen
//! before any I/O. Engine failures, including `Error` events inside a live
//! stream, are handed to the crash reporter and then passed on unchanged.

use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::crash::CrashReporter;
use crate::engine::{EngineCapability, EngineError, EngineRegistry};
use crate::models::{ModelRecord, ModelRepository};
use crate::types::{ChatRequest, EmbeddingRequest, InferenceOutput, StreamEvent, StreamMode};

/// Error types for dispatch
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("No engine found with name: {0}")]
    EngineNotFound(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Routes requests to the engine that owns the requested model
pub struct InferenceDispatcher {
    models: Arc<dyn ModelRepository>,
    registry: Arc<EngineRegistry>,
    crash_reporter: Arc<dyn CrashReporter>,
}

impl InferenceDispatcher {
    pub fn new(
        models: Arc<dyn ModelRepository>,
        registry: Arc<EngineRegistry>,
        crash_reporter: Arc<dyn CrashReporter>,
    ) -> Self {
        Self {
            models,
            registry,
            crash_reporter,
        }
    }

    /// Resolve a model id to its record and engine
    pub async fn resolve(
        &self,
        model_id: &str,
    ) -> Result<(ModelRecord, Arc<dyn EngineCapability>), DispatchError> {
        let model = self
            .models
            .find_one(model_id)
            .await
            .ok_or_else(|| DispatchError::ModelNotFound(model_id.to_string()))?;
        let engine = self
            .registry
            .find_one(&model.engine)
            .ok_or_else(|| DispatchError::EngineNotFound(model.engine.clone()))?;
        Ok((model, engine))
    }

    /// Run a chat completion on the engine that owns `request.model`
    pub async fn dispatch(
        &self,
        request: &ChatRequest,
        headers: &HeaderMap,
        mode: StreamMode,
    ) -> Result<InferenceOutput, DispatchError> {
        let (_, engine) = self.resolve(&request.model).await?;
        let source = format!("dispatch:{}", engine.name());
        log::debug!("Dispatching {} to {}", request.model, engine.name());

        match engine.inference(request, headers, mode).await {
            Ok(InferenceOutput::Stream(stream)) => {
                let reporter = self.crash_reporter.clone();
                let reported = stream.inspect(move |event| {
                    if let StreamEvent::Error(cause) = event {
                        reporter.report(&source, cause);
                    }
                });
                Ok(InferenceOutput::Stream(Box::pin(reported)))
            }
            Ok(output) => Ok(output),
            Err(e) => {
                self.crash_reporter.report(&source, &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Generate embeddings on the engine that owns `request.model`
    pub async fn dispatch_embeddings(
        &self,
        request: &EmbeddingRequest,
        headers: &HeaderMap,
    ) -> Result<Value, DispatchError> {
        let (_, engine) = self.resolve(&request.model).await?;
        engine.embeddings(request, headers).await.map_err(|e| {
            self.crash_reporter
                .report(&format!("embeddings:{}", engine.name()), &e.to_string());
            DispatchError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineDescriptor, EngineStatus};
    use crate::models::InMemoryModelRepository;
    use crate::types::ChatMessage;
    use async_trait::async_trait;
    use futures_util::stream;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingReporter {
        reports: Mutex<Vec<(String, String)>>,
    }

    impl CrashReporter for RecordingReporter {
        fn report(&self, source: &str, error: &str) {
            self.reports.lock().push((source.to_string(), error.to_string()));
        }
    }

    /// Engine whose behavior is picked by the model name
    #[derive(Default)]
    struct ScriptedEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EngineCapability for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn descriptor(&self) -> EngineDescriptor {
            EngineDescriptor {
                name: "scripted".into(),
                product_name: None,
                description: None,
                version: None,
                status: EngineStatus::Ready,
            }
        }

        async fn on_load(&self) {}

        async fn on_unload(&self) {}

        async fn inference(
            &self,
            request: &ChatRequest,
            _headers: &HeaderMap,
            _mode: StreamMode,
        ) -> Result<InferenceOutput, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match request.model.as_str() {
                "fails" => Err(EngineError::Upstream {
                    status: 500,
                    body: "boom".into(),
                }),
                "breaks-mid-stream" => Ok(InferenceOutput::Stream(Box::pin(stream::iter([
                    StreamEvent::Data("Hi".into()),
                    StreamEvent::Error("connection reset".into()),
                ])))),
                _ => Ok(InferenceOutput::Complete(serde_json::json!({"ok": true}))),
            }
        }
    }

    struct Fixture {
        dispatcher: InferenceDispatcher,
        engine: Arc<ScriptedEngine>,
        reporter: Arc<RecordingReporter>,
    }

    fn fixture() -> Fixture {
        let models = Arc::new(InMemoryModelRepository::with_models([
            ModelRecord::new("works", "scripted"),
            ModelRecord::new("fails", "scripted"),
            ModelRecord::new("breaks-mid-stream", "scripted"),
            ModelRecord::new("orphan", "missing-engine"),
        ]));
        let registry = Arc::new(EngineRegistry::new());
        let engine = Arc::new(ScriptedEngine::default());
        registry.register(engine.clone());
        let reporter = Arc::new(RecordingReporter::default());
        Fixture {
            dispatcher: InferenceDispatcher::new(models, registry, reporter.clone()),
            engine,
            reporter,
        }
    }

    fn request(model: &str) -> ChatRequest {
        ChatRequest::new(model, vec![ChatMessage::user("Hello!")])
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let f = fixture();
        let err = f
            .dispatcher
            .dispatch(&request("nope"), &HeaderMap::new(), StreamMode::Normalized)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ModelNotFound(id) if id == "nope"));
        assert_eq!(f.engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_engine_is_distinct_from_unknown_model() {
        let f = fixture();
        let err = f
            .dispatcher
            .dispatch(&request("orphan"), &HeaderMap::new(), StreamMode::Normalized)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::EngineNotFound(name) if name == "missing-engine"));
        assert_eq!(f.engine.calls.load(Ordering::SeqCst), 0);
        assert!(f.reporter.reports.lock().is_empty());
    }

    #[tokio::test]
    async fn test_engine_errors_are_reported_and_reraised() {
        let f = fixture();
        let err = f
            .dispatcher
            .dispatch(&request("fails"), &HeaderMap::new(), StreamMode::Normalized)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Engine(EngineError::Upstream { status: 500, .. })));

        let reports = f.reporter.reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "dispatch:scripted");
    }

    #[tokio::test]
    async fn test_stream_errors_are_reported_and_passed_on() {
        let f = fixture();
        let output = f
            .dispatcher
            .dispatch(
                &request("breaks-mid-stream"),
                &HeaderMap::new(),
                StreamMode::Normalized,
            )
            .await
            .unwrap();
        let InferenceOutput::Stream(stream) = output else {
            panic!("expected a stream");
        };
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.last(), Some(&StreamEvent::Error("connection reset".into())));
        assert_eq!(f.reporter.reports.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_embeddings_unsupported_by_engine() {
        let f = fixture();
        let request = EmbeddingRequest {
            model: "works".into(),
            input: crate::types::EmbeddingInput::Single("hi".into()),
            encoding_format: None,
        };
        let err = f
            .dispatcher
            .dispatch_embeddings(&request, &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Engine(EngineError::Unsupported { .. })));
        assert_eq!(f.reporter.reports.lock()[0].0, "embeddings:scripted");
    }
}
