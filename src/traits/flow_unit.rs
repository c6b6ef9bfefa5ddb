use async_trait::async_trait;
use serde_json::{Map, Value};

/// An externally provided activity or flow that the `activity` and `flow` services
/// adapt to.
#[async_trait]
pub trait FlowUnit: Send + Sync {
    /// Run with a flat map of named inputs and return a flat map of named outputs.
    async fn invoke(&self, inputs: Map<String, Value>) -> Result<Map<String, Value>, String>;
}
