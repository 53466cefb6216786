use async_trait::async_trait;
use crate::plugins::registry::{
    MediaResolver, ProgressSink, RawCollection, ResolveError, RetrieveJob, RetrievedMedia,
};

/// Resolver that is never available; forces the engine into demo mode.
pub struct OfflineResolver;

impl OfflineResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaResolver for OfflineResolver {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn enumerate(&self, _reference: &str) -> Result<RawCollection, ResolveError> {
        Err(ResolveError::Unavailable("offline mode".to_string()))
    }

    async fn retrieve(
        &self,
        _job: &RetrieveJob<'_>,
        _progress: &dyn ProgressSink,
    ) -> Result<RetrievedMedia, ResolveError> {
        Err(ResolveError::Unavailable("offline mode".to_string()))
    }
}
