pub mod bridge;
pub mod jsonrpc;
