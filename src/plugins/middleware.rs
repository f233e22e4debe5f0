//! Continuation-passing middleware chains.
//!
//! Each middleware receives the event context and a [`Next`] continuation.
//! Running `next` executes the rest of the chain and finally the endpoint;
//! not running it short-circuits the event with the middleware's own value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::error;

/// Final handler run once every middleware has passed control on.
pub type Endpoint<'a> = &'a (dyn Fn() -> BoxFuture<'a, anyhow::Result<Value>> + Send + Sync);

/// Wraps the handling of one event.
pub trait Middleware: Send + Sync {
    fn handle<'a>(&'a self, ctx: &'a Value, next: Next<'a>) -> BoxFuture<'a, anyhow::Result<Value>>;
}

/// A middleware registered by a plugin.
#[derive(Clone)]
pub(crate) struct MiddlewareEntry {
    pub plugin: String,
    pub middleware: Arc<dyn Middleware>,
}

// == Next ==
/// Continuation handed to a middleware.
pub struct Next<'a> {
    event: &'a str,
    chain: &'a [MiddlewareEntry],
    ctx: &'a Value,
    endpoint: Endpoint<'a>,
    passed: Arc<AtomicBool>,
}

impl<'a> Next<'a> {
    /// Runs the remaining middlewares and the endpoint.
    pub fn run(self) -> BoxFuture<'a, anyhow::Result<Value>> {
        self.passed.store(true, Ordering::SeqCst);
        run_chain(self.event, self.chain, self.ctx, self.endpoint)
    }
}

/// Runs `chain` in order, ending with `endpoint`.
///
/// A middleware that fails before running its `next` is logged and skipped.
/// Errors that come back through `next` are returned unchanged.
pub(crate) fn run_chain<'a>(
    event: &'a str,
    chain: &'a [MiddlewareEntry],
    ctx: &'a Value,
    endpoint: Endpoint<'a>,
) -> BoxFuture<'a, anyhow::Result<Value>> {
    async move {
        let mut rest = chain;

        while let Some((entry, tail)) = rest.split_first() {
            let passed = Arc::new(AtomicBool::new(false));
            let next = Next {
                event,
                chain: tail,
                ctx,
                endpoint,
                passed: Arc::clone(&passed),
            };

            match entry.middleware.handle(ctx, next).await {
                Ok(value) => return Ok(value),
                Err(err) if passed.load(Ordering::SeqCst) => return Err(err),
                Err(err) => {
                    error!(
                        plugin = %entry.plugin,
                        event,
                        error = %err,
                        "Middleware failed, skipping"
                    );
                    rest = tail;
                }
            }
        }

        endpoint().await
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Appends its tag to the `trail` array of the result.
    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle<'a>(&'a self, _ctx: &'a Value, next: Next<'a>) -> BoxFuture<'a, anyhow::Result<Value>> {
            async move {
                let mut value = next.run().await?;
                if let Some(trail) = value["trail"].as_array_mut() {
                    trail.push(json!(self.0));
                }
                Ok(value)
            }
            .boxed()
        }
    }

    /// Fails without calling next.
    struct Broken;

    impl Middleware for Broken {
        fn handle<'a>(&'a self, _ctx: &'a Value, _next: Next<'a>) -> BoxFuture<'a, anyhow::Result<Value>> {
            async { Err(anyhow::anyhow!("broken")) }.boxed()
        }
    }

    /// Answers directly when the context asks for it.
    struct Gate;

    impl Middleware for Gate {
        fn handle<'a>(&'a self, ctx: &'a Value, next: Next<'a>) -> BoxFuture<'a, anyhow::Result<Value>> {
            async move {
                if ctx["blocked"].as_bool() == Some(true) {
                    return Ok(json!({"trail": ["gate"]}));
                }
                next.run().await
            }
            .boxed()
        }
    }

    fn entry(plugin: &str, middleware: impl Middleware + 'static) -> MiddlewareEntry {
        MiddlewareEntry {
            plugin: plugin.to_string(),
            middleware: Arc::new(middleware),
        }
    }

    #[tokio::test]
    async fn test_chain_runs_in_order_around_endpoint() {
        let chain = vec![entry("a", Tag("outer")), entry("b", Tag("inner"))];
        let ctx = json!({});
        let endpoint = || async { anyhow::Ok(json!({"trail": ["endpoint"]})) }.boxed();

        let value = run_chain("message", &chain, &ctx, &endpoint).await.unwrap();

        assert_eq!(value["trail"], json!(["endpoint", "inner", "outer"]));
    }

    #[tokio::test]
    async fn test_empty_chain_runs_endpoint() {
        let ctx = json!({});
        let endpoint = || async { anyhow::Ok(json!("done")) }.boxed();

        let value = run_chain("message", &[], &ctx, &endpoint).await.unwrap();

        assert_eq!(value, json!("done"));
    }

    #[tokio::test]
    async fn test_failure_before_next_is_skipped() {
        let chain = vec![entry("a", Tag("outer")), entry("b", Broken)];
        let ctx = json!({});
        let endpoint = || async { anyhow::Ok(json!({"trail": []})) }.boxed();

        let value = run_chain("message", &chain, &ctx, &endpoint).await.unwrap();

        assert_eq!(value["trail"], json!(["outer"]));
    }

    #[tokio::test]
    async fn test_endpoint_error_propagates() {
        let chain = vec![entry("a", Tag("outer"))];
        let ctx = json!({});
        let endpoint = || async { Err::<Value, _>(anyhow::anyhow!("endpoint failed")) }.boxed();

        let err = run_chain("message", &chain, &ctx, &endpoint).await.unwrap_err();

        assert_eq!(err.to_string(), "endpoint failed");
    }

    #[tokio::test]
    async fn test_short_circuit_skips_endpoint() {
        let chain = vec![entry("a", Gate), entry("b", Tag("never"))];
        let ctx = json!({"blocked": true});
        let endpoint = || async { anyhow::Ok(json!({"trail": ["endpoint"]})) }.boxed();

        let value = run_chain("message", &chain, &ctx, &endpoint).await.unwrap();

        assert_eq!(value["trail"], json!(["gate"]));
    }
}
