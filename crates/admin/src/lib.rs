//! # keyrot admin
//!
//! The admin surface of keyrot: typed requests from the presentation layer
//! are gated by an operator session and routed onto versioned key stores.
//!
//! - **Console**: [`AdminConsole`] owns the session and rebuilds its gateway whenever the session
//!   token changes
//! - **Gateway**: [`AdminGateway`] maps [`AdminRequest`]s onto key store calls and shapes
//!   [`AdminResponse`] envelopes
//! - **Registry**: [`StoreRegistry`] maps resource names to key stores
//! - **Configuration**: [`ConsoleConfig`], loadable with serde or built with a builder
//!
//! ## Raw requests
//!
//! The presentation layer speaks in kind strings and JSON params:
//!
//! ```
//! use keyrot_admin::{AdminRequest, RequestKind};
//! use serde_json::json;
//!
//! let request = AdminRequest::from_raw("UPDATE", json!({"id": "4", "data": {"key": "K"}}))?;
//! assert_eq!(request.kind(), RequestKind::Update);
//!
//! assert!(AdminRequest::from_raw("EXPORT", json!({})).is_err());
//! # Ok::<(), keyrot_admin::AdminError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Console configuration.
pub mod config;
/// Session-gated console.
pub mod console;
/// Gateway error types.
pub mod error;
/// Request routing.
pub mod gateway;
/// Resource registry.
pub mod registry;
/// Typed and raw requests.
pub mod request;
/// Response envelopes.
pub mod response;
mod retry;

pub use config::{ConsoleConfig, CreateRetryConfig, DEFAULT_RESOURCE_NAME};
pub use console::{AdminConsole, BackendFactory, StaticBackendFactory};
pub use error::{AdminError, AdminResult};
pub use gateway::AdminGateway;
pub use registry::StoreRegistry;
pub use request::{
    AdminRequest, KeyInput, ListParams, Pagination, ReferenceParams, RequestKind, Sort, SortField,
    SortOrder,
};
pub use response::{AdminResponse, ResponseData};
