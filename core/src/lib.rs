//! Async API client core for the food-ordering demo service.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network (host-does-IO pattern), and layers a session-aware
//! async `ApiClient` on top that executes them through a `Transport`.
//!
//! # Design
//! - `RequestBuilder` turns a path, method, query pairs and an optional JSON
//!   body into a complete request. No I/O.
//! - `FoodClient` is stateless: it holds only `base_url` and exposes one
//!   `build_*` / `parse_*` pair per endpoint.
//! - `ApiClient` owns the `Session`, propagates failures from `create_user`
//!   and degrades every other operation to `None`, reporting the cause on a
//!   broadcast failure channel.
//! - `IdentityStore` persists the session token and user id across runs.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod request;
pub mod store;
pub mod transport;
pub mod types;

pub use api::{ApiClient, Failure, Identity, IdentityError, Session};
pub use client::FoodClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, ErrorKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse, QueryValue};
pub use request::RequestBuilder;
pub use store::{FileStore, IdentityStore, MemoryStore, StoreError};
pub use transport::{ReqwestTransport, Transport};
pub use types::{Location, Menu, ResponseError, UpdateUser, User, UserResponse};
