use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tonic::transport::Channel;

/// A registered client stub for one `(protoName, serviceName)` pair.
///
/// Both operating modes go through `invoke_method`: `grpc-to-grpc` passes
/// `methodName` and `params`, `rest-to-grpc` passes the REST-shaped fields
/// (`headers`, `pathParams`, `queryParams`, `content`). Remote failures belong in
/// the returned map (conventionally under `error`), not in a panic.
#[async_trait]
pub trait GrpcClientStub: Send + Sync {
    async fn invoke_method(&self, request: Map<String, Value>) -> Map<String, Value>;
}

/// Builds a client stub on top of a dialed channel.
pub type GrpcClientFactory = Arc<dyn Fn(Channel) -> Box<dyn GrpcClientStub> + Send + Sync>;
