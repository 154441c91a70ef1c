//! Client for the security-operations gateway.

mod client;

pub use client::{
    ApiErrorBody, CreatedKey, GatewayClient, HealthResponse, KeyView, SdkError, ToolOutput, ToolRequest,
};
