//! Registered expectations.
//!
//! An [`RpcStub`] narrows which procedure calls it applies to (the target
//! filter), optionally constrains the request body, and describes the
//! response to synthesize. Stubs are assembled with [`StubBuilder`], which
//! validates the combination before anything is registered, and are
//! read-only afterwards apart from their invocation counter.

use crate::error::{Result, StubError};
use crate::matchers::{includes, Attrs};
use crate::registry::{Client, ClientType, ServiceDefinition};
use crate::request::{DecodedRequest, RequestSignature};
use crate::response::{synthesize, ResponseDescriptor, ResponseValue};
use crate::schema::Message;
use http::Method;
use serde_json::Value as Json;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Boolean predicate over the decoded input message.
pub type RequestPredicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Produces a response value for a decoded request.
pub type ResponseGenerator = Arc<dyn Fn(&DecodedRequest) -> Result<ResponseValue> + Send + Sync>;

/// Narrows which requests a stub considers.
#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    pub base_url: Option<String>,
    pub client_type: Option<Arc<ClientType>>,
    pub service: Option<Arc<ServiceDefinition>>,
    /// Wire name when a service is pinned, otherwise as given.
    pub procedure: Option<String>,
}

impl TargetFilter {
    /// True if the filter accepts the request's URL and path segments.
    ///
    /// The path may carry the wire or the friendly procedure name. An
    /// unpinned procedure name is checked again after resolution.
    fn accepts_path(&self, url: &str, service: &str, procedure: &str) -> bool {
        if let Some(base_url) = &self.base_url {
            let prefix = format!("{}/", base_url);
            if !url.starts_with(&prefix) {
                return false;
            }
        }

        if let Some(pinned) = &self.service {
            if pinned.full_name() != service {
                return false;
            }
            if let Some(name) = &self.procedure {
                return pinned
                    .find_procedure(procedure)
                    .map_or(false, |p| p.procedure_name == *name);
            }
        }

        true
    }
}

/// How the request body is constrained.
#[derive(Debug, Clone, Default)]
pub enum BodyMatcher {
    #[default]
    Any,
    /// Byte-for-byte equal to this message's encoding.
    Exact(Message),
    /// Attribute inclusion over the decoded message.
    Attrs(Attrs),
}

#[derive(Clone)]
enum Responder {
    /// Returned in order; the last one repeats.
    Sequence(Vec<ResponseValue>),
    Generator(ResponseGenerator),
}

/// Builder for [`RpcStub`].
#[derive(Default)]
pub struct StubBuilder {
    id: Option<String>,
    filter: TargetFilter,
    client_instance: bool,
    explicit_base_url: bool,
    body: BodyMatcher,
    predicate: Option<RequestPredicate>,
    responses: Vec<ResponseValue>,
    generator: Option<ResponseGenerator>,
    error: Option<StubError>,
}

impl StubBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(mut self, error: StubError) -> Self {
        self.error.get_or_insert(error);
        self
    }

    /// Name used in logs.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Pin a client instance: its base URL and its client type.
    pub fn client(mut self, client: &Client) -> Self {
        self.client_instance = true;
        self.filter.base_url = Some(client.base_url().to_string());
        self.client_type(client.client_type().clone())
    }

    pub fn client_type(mut self, client_type: Arc<ClientType>) -> Self {
        self.filter.service = Some(client_type.service().clone());
        self.filter.client_type = Some(client_type);
        self
    }

    pub fn service(mut self, service: Arc<ServiceDefinition>) -> Self {
        self.filter.service = Some(service);
        self
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.explicit_base_url = true;
        self.filter.base_url = Some(crate::registry::normalize_base_url(base_url));
        self
    }

    /// Wire name (`Echo`) or friendly name (`echo`).
    pub fn procedure(mut self, name: impl Into<String>) -> Self {
        self.filter.procedure = Some(name.into());
        self
    }

    /// Require the body to be exactly this message.
    pub fn with(mut self, message: Message) -> Self {
        if matches!(self.body, BodyMatcher::Attrs(_)) {
            return self.fail(conflicting_body());
        }
        self.body = BodyMatcher::Exact(message);
        self
    }

    /// Require the decoded body to include these attributes.
    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        if matches!(self.body, BodyMatcher::Exact(_)) {
            return self.fail(conflicting_body());
        }
        self.body = BodyMatcher::Attrs(attrs);
        self
    }

    /// JSON form of [`StubBuilder::with_attrs`], accepting `$` matchers.
    pub fn with_json(self, attrs: Json) -> Self {
        match Attrs::from_json(&attrs) {
            Ok(attrs) => self.with_attrs(attrs),
            Err(reason) => self.fail(StubError::config(format!("invalid attributes: {}", reason))),
        }
    }

    /// Additional predicate, ANDed with any body matcher.
    pub fn with_fn<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        if self.predicate.is_some() {
            return self.fail(StubError::config("request predicate already given"));
        }
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Add a response. Several responses are returned in order, the last
    /// one repeating.
    pub fn to_return(mut self, response: impl Into<ResponseValue>) -> Self {
        self.responses.push(response.into());
        self
    }

    pub fn and_return(self, response: impl Into<ResponseValue>) -> Self {
        self.to_return(response)
    }

    /// Compute the response from the decoded input message.
    pub fn to_return_fn<F, R>(self, f: F) -> Self
    where
        F: Fn(&Message) -> R + Send + Sync + 'static,
        R: Into<ResponseValue>,
    {
        self.to_return_with(move |request: &DecodedRequest| Ok(f(&request.message).into()))
    }

    /// Compute the response from the whole decoded request.
    pub fn to_return_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&DecodedRequest) -> Result<ResponseValue> + Send + Sync + 'static,
    {
        if self.generator.is_some() {
            return self.fail(StubError::config("response function already given"));
        }
        self.generator = Some(Arc::new(f));
        self
    }

    /// JSON success bodies are not part of the wire contract.
    pub fn to_return_json(self, _body: Json) -> Result<Self> {
        Err(StubError::Unimplemented("to_return_json"))
    }

    pub fn build(mut self) -> Result<RpcStub> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        if self.client_instance && self.explicit_base_url {
            return Err(StubError::config(
                "specify a base url or a client instance, but not both",
            ));
        }

        if let (Some(client_type), Some(service)) = (&self.filter.client_type, &self.filter.service) {
            if client_type.service().full_name() != service.full_name() {
                return Err(StubError::config(format!(
                    "{} does not serve {}",
                    client_type,
                    service.full_name()
                )));
            }
        }

        if let (Some(service), Some(name)) = (&self.filter.service, &self.filter.procedure) {
            let rpc = service.find_procedure(name).ok_or_else(|| {
                StubError::config(format!("invalid rpc method: {}", name))
            })?;
            if let BodyMatcher::Exact(message) = &self.body {
                if *message.message_type() != rpc.input_type {
                    return Err(StubError::TypeMismatch {
                        expected: rpc.input_type.full_name().to_string(),
                        found: message.message_type().full_name().to_string(),
                    });
                }
            }
            self.filter.procedure = Some(rpc.procedure_name.clone());
        }

        let responder = match (self.generator, self.responses.is_empty()) {
            (Some(_), false) => {
                return Err(StubError::config(
                    "specify responses or a response function, but not both",
                ))
            }
            (Some(generator), true) => Responder::Generator(generator),
            (None, true) => Responder::Sequence(vec![ResponseValue::Default]),
            (None, false) => Responder::Sequence(self.responses),
        };

        Ok(RpcStub {
            id: self.id,
            filter: self.filter,
            body: self.body,
            predicate: self.predicate,
            responder,
            invocations: AtomicUsize::new(0),
        })
    }
}

fn conflicting_body() -> StubError {
    StubError::config("specify request or attrs, but not both")
}

/// A registered expectation.
pub struct RpcStub {
    id: Option<String>,
    filter: TargetFilter,
    body: BodyMatcher,
    predicate: Option<RequestPredicate>,
    responder: Responder,
    invocations: AtomicUsize,
}

impl RpcStub {
    pub fn builder() -> StubBuilder {
        StubBuilder::new()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn filter(&self) -> &TargetFilter {
        &self.filter
    }

    pub fn body(&self) -> &BodyMatcher {
        &self.body
    }

    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    /// Number of responses produced so far.
    pub fn times_invoked(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Does this stub apply to the request?
    ///
    /// Steps short-circuit in order: method and content type, target
    /// filter, resolution and decoding, then the body constraints.
    /// Returns the decoded request on a match.
    pub fn matches(&self, signature: &RequestSignature) -> Option<Arc<DecodedRequest>> {
        let request = signature.request();
        if *request.method() != Method::POST || !signature.is_procedure_call() {
            return None;
        }

        let (service, procedure) = crate::registry::split_rpc_path(request.path())?;
        if !self.filter.accepts_path(&request.url(), service, procedure) {
            return None;
        }

        let decoded = match &self.filter.service {
            Some(pinned) => signature.decoded_for(pinned)?,
            None => signature.decoded()?,
        };

        if self.filter.service.is_none() {
            if let Some(name) = &self.filter.procedure {
                if !decoded.procedure.is_named(name) {
                    return None;
                }
            }
        }

        let body_ok = match &self.body {
            BodyMatcher::Any => true,
            BodyMatcher::Exact(expected) => {
                *expected.message_type() == decoded.procedure.input_type
                    && request.raw_body().as_ref() == expected.encode().as_slice()
            }
            BodyMatcher::Attrs(attrs) => includes(&decoded.message, attrs),
        };
        if !body_ok {
            return None;
        }

        if let Some(predicate) = &self.predicate {
            if !predicate(&decoded.message) {
                return None;
            }
        }

        Some(decoded)
    }

    /// Synthesize the next response for a matched request.
    pub fn respond(&self, request: &DecodedRequest) -> Result<ResponseDescriptor> {
        let n = self.invocations.fetch_add(1, Ordering::SeqCst);
        let value = match &self.responder {
            Responder::Sequence(values) => {
                let index = n.min(values.len().saturating_sub(1));
                values.get(index).cloned().unwrap_or(ResponseValue::Default)
            }
            Responder::Generator(generator) => generator(request)?,
        };
        synthesize(&request.procedure.output_type, value)
    }
}

impl fmt::Debug for RpcStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcStub")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("body", &self.body)
            .field("predicate", &self.predicate.is_some())
            .field("times_invoked", &self.times_invoked())
            .finish()
    }
}
