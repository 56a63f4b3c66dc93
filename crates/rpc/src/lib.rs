//! JSON-RPC 2.0 front end for the stewardship engine.
//!
//! Requests arrive one per line on stdin and responses leave one per line
//! on stdout. Method names match the engine's operations; parameters and
//! results use the shapes in [`wire`], where collections travel as
//! `*_json` strings.
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine::Service;
//! use rpc::Server;
//!
//! # async fn example(service: Service) -> rpc::Result<()> {
//! let server = Arc::new(Server::new(service, "agent-7"));
//! server.serve_stdio(None).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod protocol;
pub mod server;
pub mod wire;

pub use error::{Error, Result};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use server::Server;
