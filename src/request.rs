//! Intercepted requests.
//!
//! A [`RequestSignature`] wraps one outbound request handed over by the host
//! mocking layer. Whether it is a procedure call is decided once, from its
//! content type, when the signature is created. Resolution and decoding are
//! lazy and memoized for the lifetime of the signature, since every stub
//! evaluation consults the same request.

use crate::error::{Result, StubError};
use crate::registry::{ClientType, ProcedureDescriptor, ProcedureRegistry, ServiceDefinition};
use crate::schema::Message;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, Uri};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Content type of protobuf-encoded bodies.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/protobuf";

/// Content type of JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// An outbound HTTP request as seen by the host mocking layer.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl InterceptedRequest {
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| StubError::InvalidRequest(format!("invalid url {}: {}", url, e)))?;
        Ok(Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    /// A POST with a protobuf body, as a generated client would send it.
    pub fn protobuf(url: &str, body: impl Into<Bytes>) -> Result<Self> {
        Ok(Self::new(Method::POST, url)?
            .header(CONTENT_TYPE.as_str(), PROTOBUF_CONTENT_TYPE)?
            .body(body))
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| StubError::InvalidRequest(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| StubError::InvalidRequest(format!("invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> String {
        self.uri.to_string()
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Media type without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.body
    }
}

/// A request resolved to a procedure, with its decoded input message.
#[derive(Debug, Clone)]
pub struct DecodedRequest {
    /// Client type the call was attributed to, when resolved through the registry.
    pub client: Option<Arc<ClientType>>,
    pub procedure: Arc<ProcedureDescriptor>,
    pub message: Message,
}

/// A request under evaluation, tagged as procedure call or not.
pub struct RequestSignature {
    request: InterceptedRequest,
    procedure_call: bool,
    registry: Arc<ProcedureRegistry>,
    decoded: OnceCell<Option<Arc<DecodedRequest>>>,
    /// Decodes within a single service, keyed by procedure descriptor.
    pinned: Mutex<Vec<(Arc<ProcedureDescriptor>, Option<Arc<DecodedRequest>>)>>,
}

impl RequestSignature {
    pub fn new(request: InterceptedRequest, registry: Arc<ProcedureRegistry>) -> Self {
        let procedure_call = request.content_type().as_deref() == Some(PROTOBUF_CONTENT_TYPE);
        Self {
            request,
            procedure_call,
            registry,
            decoded: OnceCell::new(),
            pinned: Mutex::new(Vec::new()),
        }
    }

    pub fn request(&self) -> &InterceptedRequest {
        &self.request
    }

    /// True when the request carries a protobuf body.
    pub fn is_procedure_call(&self) -> bool {
        self.procedure_call
    }

    pub fn registry(&self) -> &Arc<ProcedureRegistry> {
        &self.registry
    }

    /// Resolve against the registry and decode, once.
    ///
    /// `None` when the request is not a procedure call, its target is
    /// unknown or ambiguous, or its body does not decode.
    pub fn decoded(&self) -> Option<Arc<DecodedRequest>> {
        self.decoded
            .get_or_init(|| {
                if !self.procedure_call {
                    return None;
                }
                let resolution = self.registry.resolve(self.request.path())?;
                self.decode(resolution.client, resolution.procedure)
                    .map(Arc::new)
            })
            .clone()
    }

    /// Resolve within one service's procedure table only, once per procedure.
    ///
    /// Reuses the memoized registry resolution when it landed on the same
    /// procedure.
    pub fn decoded_for(&self, service: &ServiceDefinition) -> Option<Arc<DecodedRequest>> {
        if !self.procedure_call {
            return None;
        }
        let procedure = service.resolve(self.request.path())?;

        if let Some(decoded) = self.decoded() {
            if Arc::ptr_eq(&decoded.procedure, &procedure) || *decoded.procedure == *procedure {
                return Some(decoded);
            }
        }

        let mut pinned = self.pinned.lock();
        if let Some((_, decoded)) = pinned.iter().find(|(p, _)| Arc::ptr_eq(p, &procedure)) {
            return decoded.clone();
        }
        let decoded = self.decode(None, procedure.clone()).map(Arc::new);
        pinned.push((procedure, decoded.clone()));
        decoded
    }

    fn decode(
        &self,
        client: Option<Arc<ClientType>>,
        procedure: Arc<ProcedureDescriptor>,
    ) -> Option<DecodedRequest> {
        match procedure.input_type.decode(&self.request.body) {
            Ok(message) => Some(DecodedRequest {
                client,
                procedure,
                message,
            }),
            Err(e) => {
                debug!(
                    url = %self.request.url(),
                    error = %e,
                    "Failed to decode request body"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for RequestSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSignature")
            .field("request", &self.request)
            .field("procedure_call", &self.procedure_call)
            .finish()
    }
}
