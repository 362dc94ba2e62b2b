pub mod content;
pub mod delegate;
pub mod server;

use rquest_engine::{Context, Engine, EngineBuilder, Executor, Metrics};

/// A context with its own metrics, so tests never observe each other.
#[allow(unused)]
pub fn context() -> Context {
    let _ = env_logger::try_init();
    Context::new("test-app", "0.0.1").with_metrics(Metrics::new())
}

#[allow(unused)]
pub fn engine() -> Engine {
    EngineBuilder::new(&context()).build().expect("engine")
}

/// Runs each callback task on a fresh thread.
#[allow(unused)]
pub fn thread_executor() -> impl Executor {
    |task: Box<dyn FnOnce() + Send>| {
        std::thread::spawn(task);
    }
}

/// Runs each callback task inline, on whichever thread submits it.
#[allow(unused)]
pub fn inline_executor() -> impl Executor {
    |task: Box<dyn FnOnce() + Send>| task()
}
