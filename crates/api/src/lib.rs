//! RPC-facing service: authorization facade, request dispatch and wiring.

pub mod config;
pub mod context;
pub mod dto;
pub mod facade;
pub mod rpc;
pub mod server;
pub mod services;
pub mod status;

pub use config::ServiceConfig;
pub use context::Caller;
pub use facade::{AuthorizationFacade, LoginOutcome, LogoutOutcome};
pub use rpc::{RpcDispatcher, RpcRequest, RpcResponse};
pub use server::serve;
pub use services::{Backends, Services, assemble, build_services};
pub use status::{ErrorBody, StatusCode};
