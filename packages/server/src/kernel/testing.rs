//! Scripted generator for tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::stream;

use crate::kernel::jobs::job::JobRequest;
use crate::kernel::traits::{
    Fragment, FragmentStream, Generator, GeneratorCapabilities, ProviderError,
};

/// A generator driven by a script instead of a model.
///
/// Emits a fixed fragment sequence, optionally failing the first N calls,
/// or stalls forever to exercise timeouts and cancellation.
pub struct MockGenerator {
    fragments: Vec<String>,
    fail_remaining: AtomicU32,
    stall: bool,
    calls: AtomicU32,
}

impl MockGenerator {
    pub fn with_fragments(fragments: Vec<&str>) -> Self {
        Self {
            fragments: fragments.into_iter().map(String::from).collect(),
            fail_remaining: AtomicU32::new(0),
            stall: false,
            calls: AtomicU32::new(0),
        }
    }

    /// Fail the first `times` calls, then follow the script.
    pub fn failing_times(self, times: u32) -> Self {
        self.fail_remaining.store(times, Ordering::SeqCst);
        self
    }

    /// Never produce anything; the call hangs until canceled or timed out.
    pub fn stalled() -> Self {
        Self {
            fragments: Vec::new(),
            fail_remaining: AtomicU32::new(0),
            stall: true,
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin_call(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::Call("scripted failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn capabilities(&self) -> GeneratorCapabilities {
        GeneratorCapabilities { streaming: true }
    }

    async fn generate(&self, _request: &JobRequest) -> Result<String, ProviderError> {
        self.begin_call()?;
        if self.stall {
            return futures::future::pending().await;
        }
        Ok(self.fragments.join(""))
    }

    async fn generate_stream(&self, _request: &JobRequest) -> Result<FragmentStream, ProviderError> {
        self.begin_call()?;
        if self.stall {
            return Ok(Box::pin(stream::pending()));
        }
        let fragments: Vec<Result<Fragment, ProviderError>> = self
            .fragments
            .iter()
            .map(|text| Ok(Fragment::new(text.clone())))
            .collect();
        Ok(Box::pin(stream::iter(fragments)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use uuid::Uuid;

    fn request() -> JobRequest {
        JobRequest::builder()
            .project_id(Uuid::new_v4())
            .title("t")
            .build()
    }

    #[tokio::test]
    async fn scripted_fragments_in_order() {
        let generator = MockGenerator::with_fragments(vec!["a", "b"]);
        let mut stream = generator.generate_stream(&request()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().text, "a");
        assert_eq!(stream.next().await.unwrap().unwrap().text, "b");
        assert!(stream.next().await.is_none());
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn failures_run_out_then_script_resumes() {
        let generator = MockGenerator::with_fragments(vec!["ok"]).failing_times(1);
        assert!(generator.generate_stream(&request()).await.is_err());
        assert!(generator.generate_stream(&request()).await.is_ok());
    }
}
