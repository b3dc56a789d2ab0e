//! Custom tracing layers

use tracing::{Subscriber, span};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::context::{JobContextData, JobContextGuard};

/// Layer attaching the active job context to every new span
///
/// The context is stored as a [`JobContextExtension`] in the span's
/// extensions while a [`JobContextGuard`] is active on the creating thread.
#[derive(Debug, Default)]
pub struct JobContextLayer;

impl JobContextLayer {
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct JobContextExtension {
    pub data: JobContextData,
}

impl<S> Layer<S> for JobContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id)
            && let Some(job_ctx) = JobContextGuard::current()
        {
            span.extensions_mut()
                .insert(JobContextExtension { data: job_ctx });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::Event;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    use super::*;

    /// Records the job of the innermost tagged span for every event
    #[derive(Clone, Default)]
    struct JobCapture(Arc<Mutex<Vec<Option<String>>>>);

    impl<S> Layer<S> for JobCapture
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    {
        fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
            let job = ctx.event_scope(event).and_then(|scope| {
                scope
                    .into_iter()
                    .find_map(|span| span.extensions().get::<JobContextExtension>().map(|ext| ext.data.job.clone()))
            });
            self.0.lock().unwrap().push(job);
        }
    }

    #[test]
    fn test_spans_tagged_with_job() {
        let capture = JobCapture::default();
        let subscriber = Registry::default()
            .with(JobContextLayer::new())
            .with(capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            let untagged = tracing::info_span!("before");
            untagged.in_scope(|| tracing::info!("outside"));

            let _guard = JobContextGuard::new("security", "host1");
            let tagged = tracing::info_span!("import");
            tagged.in_scope(|| tracing::info!("inside"));
        });

        let seen = capture.0.lock().unwrap().clone();
        assert_eq!(seen, vec![None, Some("security".to_string())]);
    }
}
