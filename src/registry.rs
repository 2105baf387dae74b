//! Procedure registry and target resolution.
//!
//! Procedure calls are posted to `/<prefix>/<service-full-name>/<procedure>`.
//! The registry knows which client types exist, which service each one
//! talks to, and the input/output message types of every procedure.

use crate::error::{Result, StubError};
use crate::request::InterceptedRequest;
use crate::schema::{Message, MessageType};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One remote procedure of a service.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureDescriptor {
    pub service_full_name: String,
    /// Name used on the wire, e.g. `Echo`.
    pub procedure_name: String,
    /// Idiomatic alias, e.g. `echo`.
    pub friendly_name: String,
    pub input_type: MessageType,
    pub output_type: MessageType,
}

impl ProcedureDescriptor {
    /// Match by wire name or friendly name.
    pub fn is_named(&self, name: &str) -> bool {
        self.procedure_name == name || self.friendly_name == name
    }
}

/// A service and its procedure table.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    full_name: String,
    procedures: Vec<Arc<ProcedureDescriptor>>,
}

impl ServiceDefinition {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            procedures: Vec::new(),
        }
    }

    /// Add a procedure; its friendly name is the snake_case wire name.
    pub fn procedure(self, name: &str, input: &MessageType, output: &MessageType) -> Self {
        let alias = to_snake_case(name);
        self.procedure_with_alias(name, &alias, input, output)
    }

    pub fn procedure_with_alias(
        mut self,
        name: &str,
        alias: &str,
        input: &MessageType,
        output: &MessageType,
    ) -> Self {
        self.procedures.push(Arc::new(ProcedureDescriptor {
            service_full_name: self.full_name.clone(),
            procedure_name: name.to_string(),
            friendly_name: alias.to_string(),
            input_type: input.clone(),
            output_type: output.clone(),
        }));
        self
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn procedures(&self) -> &[Arc<ProcedureDescriptor>] {
        &self.procedures
    }

    /// Look up a procedure by wire or friendly name.
    pub fn find_procedure(&self, name: &str) -> Option<&Arc<ProcedureDescriptor>> {
        self.procedures
            .iter()
            .find(|p| p.procedure_name == name)
            .or_else(|| self.procedures.iter().find(|p| p.friendly_name == name))
    }

    /// Resolve a request path within this service only.
    pub fn resolve(&self, path: &str) -> Option<Arc<ProcedureDescriptor>> {
        let (service, procedure) = split_rpc_path(path)?;
        if service != self.full_name {
            return None;
        }
        self.find_procedure(procedure).cloned()
    }
}

/// A named client type bound to one service.
#[derive(Debug, Clone)]
pub struct ClientType {
    name: String,
    service: Arc<ServiceDefinition>,
}

impl ClientType {
    pub fn new(name: impl Into<String>, service: Arc<ServiceDefinition>) -> Self {
        Self {
            name: name.into(),
            service,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> &Arc<ServiceDefinition> {
        &self.service
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A client instance: a client type plus the base URL it posts to.
#[derive(Debug, Clone)]
pub struct Client {
    client_type: Arc<ClientType>,
    base_url: String,
}

impl Client {
    pub fn new(client_type: Arc<ClientType>, base_url: &str) -> Self {
        Self {
            client_type,
            base_url: normalize_base_url(base_url),
        }
    }

    pub fn client_type(&self) -> &Arc<ClientType> {
        &self.client_type
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the outbound request this client would send for a call.
    pub fn request(&self, procedure: &str, input: &Message) -> Result<InterceptedRequest> {
        let service = self.client_type.service();
        let rpc = service.find_procedure(procedure).ok_or_else(|| {
            StubError::config(format!(
                "invalid rpc method {} for {}",
                procedure, self.client_type
            ))
        })?;

        if *input.message_type() != rpc.input_type {
            return Err(StubError::TypeMismatch {
                expected: rpc.input_type.full_name().to_string(),
                found: input.message_type().full_name().to_string(),
            });
        }

        let url = format!(
            "{}/{}/{}",
            self.base_url,
            service.full_name(),
            rpc.procedure_name
        );
        InterceptedRequest::protobuf(&url, input.encode())
    }
}

/// The result of resolving a request path.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The client type the call was attributed to, if resolved through the registry.
    pub client: Option<Arc<ClientType>>,
    pub procedure: Arc<ProcedureDescriptor>,
}

/// Host-supplied registry of known client types.
///
/// Populated at setup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ProcedureRegistry {
    clients: Vec<Arc<ClientType>>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: Arc<ClientType>) -> Self {
        self.register(client);
        self
    }

    pub fn register(&mut self, client: Arc<ClientType>) {
        self.clients.push(client);
    }

    pub fn clients(&self) -> &[Arc<ClientType>] {
        &self.clients
    }

    pub fn client(&self, name: &str) -> Option<&Arc<ClientType>> {
        self.clients.iter().find(|c| c.name() == name)
    }

    /// Resolve a request path across all known clients.
    ///
    /// Several clients may share one service definition; that is not
    /// ambiguous and the first registered client is reported. Distinct
    /// definitions claiming the same service and procedure are ambiguous
    /// and resolve to nothing.
    pub fn resolve(&self, path: &str) -> Option<Resolution> {
        let (service, procedure) = split_rpc_path(path)?;

        let mut found: Option<Resolution> = None;
        for client in &self.clients {
            if client.service().full_name() != service {
                continue;
            }
            let Some(rpc) = client.service().find_procedure(procedure) else {
                continue;
            };

            match &found {
                None => {
                    found = Some(Resolution {
                        client: Some(client.clone()),
                        procedure: rpc.clone(),
                    });
                }
                Some(existing) if Arc::ptr_eq(&existing.procedure, rpc) => {}
                Some(_) => {
                    debug!(
                        service = %service,
                        procedure = %procedure,
                        "Ambiguous procedure, multiple definitions registered"
                    );
                    return None;
                }
            }
        }

        if found.is_none() {
            debug!(service = %service, procedure = %procedure, "Unknown procedure");
        }
        found
    }
}

/// Split a path into its last two segments: service full name and procedure.
pub fn split_rpc_path(path: &str) -> Option<(&str, &str)> {
    let mut segments = path.trim_end_matches('/').rsplit('/');
    let procedure = segments.next().filter(|s| !s.is_empty())?;
    let service = segments.next().filter(|s| !s.is_empty())?;
    Some((service, procedure))
}

/// Strip trailing slashes so base URLs compare consistently.
pub fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// `GetUserInfo` -> `get_user_info`, `HTTPStatus` -> `http_status`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.map(|n| n.is_lowercase()).unwrap_or(false),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, echo_client_type, echo_service, registry};

    #[test]
    fn test_split_rpc_path() {
        assert_eq!(split_rpc_path("/twirp/Echo/Echo"), Some(("Echo", "Echo")));
        assert_eq!(
            split_rpc_path("/a/b/example.Svc/Do/"),
            Some(("example.Svc", "Do"))
        );
        assert_eq!(split_rpc_path("/Echo"), None);
        assert_eq!(split_rpc_path(""), None);
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("Echo"), "echo");
        assert_eq!(to_snake_case("GetUserInfo"), "get_user_info");
        assert_eq!(to_snake_case("HTTPStatus"), "http_status");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_find_procedure_by_either_name() {
        let service = echo_service();
        assert_eq!(service.find_procedure("Echo").unwrap().friendly_name, "echo");
        assert_eq!(
            service.find_procedure("double").unwrap().procedure_name,
            "Double"
        );
        assert!(service.find_procedure("foo").is_none());
    }

    #[test]
    fn test_resolve_known_procedure() {
        let registry = registry();
        let resolution = registry.resolve("/twirp/Echo/Echo").unwrap();
        assert_eq!(resolution.client.unwrap().name(), "EchoClient");
        assert_eq!(resolution.procedure.procedure_name, "Echo");
        assert_eq!(resolution.procedure.input_type.full_name(), "EchoRequest");
    }

    #[test]
    fn test_resolve_unknown_is_none() {
        let registry = registry();
        assert!(registry.resolve("/twirp/Foo/foo").is_none());
        assert!(registry.resolve("/twirp/Echo/Nope").is_none());
    }

    #[test]
    fn test_shared_service_is_not_ambiguous() {
        let client = echo_client_type();
        let alias = Arc::new(ClientType::new("EchoAlias", client.service().clone()));
        let registry = ProcedureRegistry::new().with_client(client).with_client(alias);

        let resolution = registry.resolve("/twirp/Echo/Echo").unwrap();
        assert_eq!(resolution.client.unwrap().name(), "EchoClient");
    }

    #[test]
    fn test_distinct_definitions_are_ambiguous() {
        let registry = ProcedureRegistry::new()
            .with_client(echo_client_type())
            .with_client(echo_client_type());
        assert!(registry.resolve("/twirp/Echo/Echo").is_none());
    }

    #[test]
    fn test_client_request() {
        let client = testing::echo_client();
        let msg = testing::echo_request_type()
            .new_message()
            .with("msg", "woof")
            .unwrap();
        let request = client.request("echo", &msg).unwrap();
        assert_eq!(request.url(), "http://localhost/twirp/Echo/Echo");
        assert_eq!(request.raw_body().as_ref(), msg.encode().as_slice());

        assert!(client.request("foo", &msg).is_err());
    }

    #[test]
    fn test_trailing_slash_base_url() {
        let client = Client::new(echo_client_type(), "http://localhost/twirp/");
        assert_eq!(client.base_url(), "http://localhost/twirp");
    }
}
