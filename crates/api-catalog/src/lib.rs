//! # api-catalog
//!
//! Compiles OpenAPI 3.x documents (and Postman collections) into a catalog of
//! operations that can describe themselves as oracle function specs and run
//! as authenticated HTTP calls.

mod types;
mod compiler;
mod security;
mod operation;
mod resolver;
mod error;
pub mod http;
pub mod postman;

pub use types::*;
pub use compiler::{SpecCompiler, SpecSource};
pub use security::SecurityScheme;
pub use operation::Operation;
pub use resolver::Dereferencer;
pub use http::{Exchange, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use error::{CatalogError, CatalogResult};
