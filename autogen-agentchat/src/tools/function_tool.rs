//! Function tool implementation for wrapping Rust closures as tools.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;

use super::base_tool::{InvocationContext, ToolInvoker, ToolOutcome};
use super::marshal::TypedArgs;

/// Type alias for the async function a [`FunctionTool`] calls
pub type AsyncToolFunction =
    Box<dyn Fn(Map<String, Value>, InvocationContext) -> BoxFuture<'static, ToolOutcome> + Send + Sync>;

/// Adapts an async closure into a [`ToolInvoker`].
///
/// The closure receives the marshaled arguments rendered as a JSON object
/// (dates in ISO form) and the invocation context.
///
/// # Example
///
/// ```rust
/// use autogen_agentchat::tools::{FunctionTool, ToolOutcome};
/// use serde_json::json;
///
/// let add = FunctionTool::new(|args, _ctx| async move {
///     let a = args.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
///     let b = args.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
///     ToolOutcome::ok(json!(a + b))
/// });
/// # let _ = add;
/// ```
pub struct FunctionTool {
    function: AsyncToolFunction,
}

impl FunctionTool {
    /// Create a new function tool
    ///
    /// # Arguments
    /// * `function` - The async closure to run for each invocation
    pub fn new<F, Fut>(function: F) -> Self
    where
        F: Fn(Map<String, Value>, InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolOutcome> + Send + 'static,
    {
        Self {
            function: Box::new(move |args, ctx| function(args, ctx).boxed()),
        }
    }

    /// Create from an already boxed function
    pub fn from_boxed(function: AsyncToolFunction) -> Self {
        Self { function }
    }
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool").finish_non_exhaustive()
    }
}

#[async_trait]
impl ToolInvoker for FunctionTool {
    async fn invoke(&self, args: &TypedArgs, ctx: &InvocationContext) -> ToolOutcome {
        (self.function)(args.to_json_map(), ctx.clone()).await
    }
}
