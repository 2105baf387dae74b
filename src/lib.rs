//! Twirp request stubbing.
//!
//! A test double for protobuf RPC over HTTP. Tests register expected calls
//! to named procedures; an interception layer hands each outbound request to
//! a [`StubRegistry`], which decodes it against the known services, finds the
//! first matching stub, and synthesizes the response a real server would
//! have sent.
//!
//! # Features
//!
//! - **Target filters**: Match by base URL, client type, service, procedure
//! - **Body matching**: Exact messages, attribute inclusion, regex / kind /
//!   nested matchers, and predicate closures
//! - **Responses**: Default messages, field maps, typed errors, symbolic
//!   codes, HTTP statuses, sequences, and response functions
//! - **Diagnostics**: Unhandled-request reports with a stub snippet that
//!   would have matched
//! - **Configuration**: Declare schema, clients and stubs in YAML
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use twirp_stub::{
//!     Client, ClientType, FieldKind, MessageType, ProcedureRegistry, RpcStub,
//!     ServiceDefinition, StubRegistry,
//! };
//!
//! let request = MessageType::builder("EchoRequest")
//!     .field("msg", 1, FieldKind::String)
//!     .build();
//! let response = request.clone();
//! let service = ServiceDefinition::new("Echo").procedure("Echo", &request, &response);
//! let client_type = Arc::new(ClientType::new("EchoClient", Arc::new(service)));
//! let client = Client::new(client_type.clone(), "http://localhost/twirp");
//!
//! let stubs = StubRegistry::new(Arc::new(ProcedureRegistry::new().with_client(client_type)));
//! stubs.register(
//!     RpcStub::builder()
//!         .client(&client)
//!         .procedure("echo")
//!         .with_json(serde_json::json!({"msg": "hi"}))
//!         .to_return(serde_json::json!({"msg": "hello"}))
//!         .build()?,
//! );
//!
//! let input = request.new_message().with("msg", "hi")?;
//! let reply = stubs
//!     .on_intercepted_request(client.request("echo", &input)?)?
//!     .into_response()?;
//! assert!(reply.is_success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod interceptor;
pub mod matchers;
pub mod registry;
pub mod request;
pub mod response;
pub mod schema;
pub mod stub;
pub mod template;

#[cfg(test)]
mod testing;

pub use config::MockConfig;
pub use error::{NetConnectNotAllowed, Result, StubError};
pub use interceptor::{Interception, StubRegistry};
pub use matchers::{AttrMatcher, Attrs, ValueKind};
pub use registry::{Client, ClientType, ProcedureDescriptor, ProcedureRegistry, ServiceDefinition};
pub use request::{InterceptedRequest, RequestSignature};
pub use response::{ErrorCode, ResponseDescriptor, ResponseValue, TwirpError};
pub use schema::{EnumType, FieldKind, Message, MessageType, Value};
pub use stub::{RpcStub, StubBuilder};
