pub mod flow_unit;
pub mod grpc_client;
pub mod service;

pub use flow_unit::FlowUnit;
pub use grpc_client::{GrpcClientFactory, GrpcClientStub};
pub use service::Service;
