use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::ServiceType;
use crate::errors::ServiceError;

/// A unit of work a step can invoke.
///
/// Requests are built up with `update_request` (fields not supplied keep their
/// previous values) and carried out with `execute`. The outcome is read through
/// `snapshot`, which the engine stores in the execution context under the service
/// name so later steps and responses can reference `${Name.response.field}`.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    fn service_type(&self) -> ServiceType;

    /// Merge new request fields into the current request.
    fn update_request(&mut self, values: &Map<String, Value>) -> Result<(), ServiceError>;

    async fn execute(&mut self) -> Result<(), ServiceError>;

    /// `{"request": ..., "response": ...}` as it stands now.
    fn snapshot(&self) -> Value;

    /// A fresh instance with default request and empty response that shares this
    /// instance's warm resources.
    fn fork(&self) -> Box<dyn Service>;
}
