use std::{fmt, sync::Arc};

use crate::{
    builder::{BuilderDelegate, NativeBuilder},
    metrics::Metrics,
};

/// A factory resolving the delegate an `EngineBuilder` forwards to.
pub type DelegateFactory = Arc<dyn Fn(&Context) -> Box<dyn BuilderDelegate> + Send + Sync>;

/// Application-scoped state an `EngineBuilder` is created from.
///
/// The context names the application (used for the default user agent),
/// carries the [`Metrics`] handle engines report into, and selects the
/// [`BuilderDelegate`] implementation. It holds nothing request-scoped, so
/// keeping a clone alive for the lifetime of an engine is cheap.
///
/// # Example
///
/// ```
/// use rquest_engine::{Context, EngineBuilder};
///
/// let context = Context::new("my-app", "1.2.0");
/// let builder = EngineBuilder::new(&context);
/// assert!(builder.default_user_agent().starts_with("my-app/1.2.0 "));
/// ```
#[derive(Clone)]
pub struct Context {
    application_name: String,
    application_version: String,
    metrics: Metrics,
    delegate_factory: Option<DelegateFactory>,
}

impl Context {
    /// Creates a context reporting into the process-wide [`Metrics::global`].
    pub fn new(application_name: impl Into<String>, application_version: impl Into<String>) -> Context {
        Context {
            application_name: application_name.into(),
            application_version: application_version.into(),
            metrics: Metrics::global(),
            delegate_factory: None,
        }
    }

    /// Uses `metrics` instead of the process-wide handle.
    pub fn with_metrics(mut self, metrics: Metrics) -> Context {
        self.metrics = metrics;
        self
    }

    /// Replaces the builder delegate implementation.
    ///
    /// By default builders forward to a [`NativeBuilder`].
    pub fn with_builder_delegate<F>(mut self, factory: F) -> Context
    where
        F: Fn(&Context) -> Box<dyn BuilderDelegate> + Send + Sync + 'static,
    {
        self.delegate_factory = Some(Arc::new(factory));
        self
    }

    /// The application name.
    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// The application version.
    pub fn application_version(&self) -> &str {
        &self.application_version
    }

    /// The metrics handle engines built from this context report into.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub(crate) fn load_delegate(&self) -> Box<dyn BuilderDelegate> {
        match self.delegate_factory {
            Some(ref factory) => factory(self),
            None => Box::new(NativeBuilder::new(self)),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("application_name", &self.application_name)
            .field("application_version", &self.application_version)
            .field("custom_delegate", &self.delegate_factory.is_some())
            .finish()
    }
}
