//! Declarative configuration.
//!
//! A YAML file describes the message schema, the services and clients that
//! use it, the stubs to register, and interceptor settings.

use crate::interceptor::StubRegistry;
use crate::registry::{Client, ClientType, ProcedureRegistry, ServiceDefinition};
use crate::response::{ErrorCode, ResponseValue, TwirpError};
use crate::schema::{EnumType, FieldKind, MessageType};
use crate::stub::{RpcStub, StubBuilder};
use crate::template::TemplateEngine;
use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Base URL for clients that do not declare one.
pub const DEFAULT_BASE_URL: &str = "http://localhost/twirp";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    /// Message types, services and clients
    #[serde(default)]
    pub schema: SchemaDefinition,

    /// Stubs, in registration order
    #[serde(default)]
    pub stubs: Vec<StubDefinition>,

    /// Interceptor settings
    #[serde(default)]
    pub settings: Settings,
}

impl MockConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid configuration {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, stub) in self.stubs.iter().enumerate() {
            stub.validate()
                .map_err(|e| anyhow!("Stub {} ({}): {}", i, stub.id, e))?;
        }
        Ok(())
    }

    /// Build the procedure registry, client instances and stubs.
    pub fn build(&self) -> anyhow::Result<BuiltConfig> {
        let schema = self.schema.build()?;

        let mut stubs = Vec::new();
        for (i, def) in self.stubs.iter().enumerate() {
            if !def.enabled {
                continue;
            }
            let stub = def
                .build(&schema)
                .map_err(|e| anyhow!("Stub {} ({}): {}", i, def.id, e))?;
            stubs.push(stub);
        }

        Ok(BuiltConfig {
            procedures: Arc::new(schema.registry),
            clients: schema.clients,
            stubs,
            settings: self.settings.clone(),
        })
    }
}

/// Everything a configuration produces.
pub struct BuiltConfig {
    pub procedures: Arc<ProcedureRegistry>,
    pub clients: Vec<Client>,
    pub stubs: Vec<RpcStub>,
    pub settings: Settings,
}

impl BuiltConfig {
    pub fn client(&self, name: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.client_type().name() == name)
    }

    /// A stub registry with every stub registered in order.
    pub fn into_registry(self) -> StubRegistry {
        let registry = StubRegistry::with_settings(self.procedures, self.settings);
        for stub in self.stubs {
            registry.register(stub);
        }
        registry
    }
}

/// Schema section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub enums: Vec<EnumDefinition>,
    #[serde(default)]
    pub messages: Vec<MessageDefinition>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub clients: Vec<ClientDefinition>,
}

/// An enum; values are numbered in order from zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumDefinition {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDefinition {
    pub name: String,
    pub number: u32,
    /// Scalar type name, or the name of an enum or message
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub repeated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Full name, e.g. `example.hello_world.HelloWorld`
    pub name: String,
    pub procedures: Vec<ProcedureDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcedureDefinition {
    /// Wire name, e.g. `Hello`
    pub name: String,
    pub input: String,
    pub output: String,
    /// Friendly name; defaults to the snake_case wire name
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientDefinition {
    pub name: String,
    pub service: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Resolved schema.
struct BuiltSchema {
    registry: ProcedureRegistry,
    services: HashMap<String, Arc<ServiceDefinition>>,
    clients: Vec<Client>,
}

impl BuiltSchema {
    fn service(&self, name: &str) -> anyhow::Result<&Arc<ServiceDefinition>> {
        self.services
            .get(name)
            .ok_or_else(|| anyhow!("unknown service: {}", name))
    }
}

impl SchemaDefinition {
    fn build(&self) -> anyhow::Result<BuiltSchema> {
        let mut enums = HashMap::new();
        for def in &self.enums {
            let values = def.values.iter().zip(0..).map(|(name, n)| (name.clone(), n));
            enums.insert(def.name.clone(), EnumType::new(def.name.clone(), values));
        }

        let messages = self.build_messages(&enums)?;
        let message = |name: &str| {
            messages
                .get(name)
                .ok_or_else(|| anyhow!("unknown message type: {}", name))
        };

        let mut services = HashMap::new();
        for def in &self.services {
            let mut service = ServiceDefinition::new(def.name.clone());
            for rpc in &def.procedures {
                let input = message(&rpc.input)?;
                let output = message(&rpc.output)?;
                service = match &rpc.alias {
                    Some(alias) => service.procedure_with_alias(&rpc.name, alias, input, output),
                    None => service.procedure(&rpc.name, input, output),
                };
            }
            services.insert(def.name.clone(), Arc::new(service));
        }

        let mut registry = ProcedureRegistry::new();
        let mut clients = Vec::new();
        for def in &self.clients {
            let service = services
                .get(&def.service)
                .ok_or_else(|| anyhow!("client {}: unknown service {}", def.name, def.service))?;
            let client_type = Arc::new(ClientType::new(def.name.clone(), service.clone()));
            registry.register(client_type.clone());
            clients.push(Client::new(client_type, &def.base_url));
        }

        Ok(BuiltSchema {
            registry,
            services,
            clients,
        })
    }

    /// Build message types once every message they embed is built.
    fn build_messages(
        &self,
        enums: &HashMap<String, EnumType>,
    ) -> anyhow::Result<HashMap<String, MessageType>> {
        let mut built: HashMap<String, MessageType> = HashMap::new();
        let mut pending: Vec<&MessageDefinition> = self.messages.iter().collect();

        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();

            for def in pending {
                match resolve_fields(def, enums, &built)? {
                    Some(fields) => {
                        let mut builder = MessageType::builder(def.name.clone());
                        for (field, kind) in fields {
                            builder = if field.repeated {
                                builder.repeated(field.name.clone(), field.number, kind)
                            } else {
                                builder.field(field.name.clone(), field.number, kind)
                            };
                        }
                        built.insert(def.name.clone(), builder.build());
                    }
                    None => waiting.push(def),
                }
            }

            if waiting.len() == before {
                let names: Vec<&str> = waiting.iter().map(|d| d.name.as_str()).collect();
                bail!("unresolved or recursive message types: {}", names.join(", "));
            }
            pending = waiting;
        }

        Ok(built)
    }
}

/// Field kinds of a message, or `None` while an embedded message is unbuilt.
fn resolve_fields<'a>(
    def: &'a MessageDefinition,
    enums: &HashMap<String, EnumType>,
    built: &HashMap<String, MessageType>,
) -> anyhow::Result<Option<Vec<(&'a FieldDefinition, FieldKind)>>> {
    let mut fields = Vec::with_capacity(def.fields.len());
    for field in &def.fields {
        let kind = if let Some(kind) = FieldKind::scalar(&field.kind) {
            kind
        } else if let Some(kind) = enums.get(&field.kind) {
            FieldKind::Enum(kind.clone())
        } else if let Some(kind) = built.get(&field.kind) {
            FieldKind::Message(kind.clone())
        } else if field.kind == def.name {
            bail!("message {} embeds itself", def.name);
        } else {
            return Ok(None);
        };
        fields.push((field, kind));
    }
    Ok(Some(fields))
}

/// A single stub definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StubDefinition {
    /// Identifier used in logs
    pub id: String,

    #[serde(default)]
    pub target: TargetDefinition,

    /// Request body constraint
    #[serde(default)]
    pub with: Option<WithDefinition>,

    /// Single response
    #[serde(default)]
    pub response: Option<ResponseDefinition>,

    /// Responses returned in order, the last one repeating
    #[serde(default)]
    pub responses: Vec<ResponseDefinition>,

    /// Whether this stub is registered
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl StubDefinition {
    /// Validate the stub definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.is_empty() {
            bail!("Stub id cannot be empty");
        }
        if self.response.is_some() && !self.responses.is_empty() {
            bail!("specify response or responses, but not both");
        }
        if let Some(with) = &self.with {
            with.validate()?;
        }
        if let Some(response) = &self.response {
            response.validate()?;
        }
        for response in &self.responses {
            response.validate()?;
            if response.template {
                bail!("templates are only supported on a single response");
            }
        }
        Ok(())
    }

    fn build(&self, schema: &BuiltSchema) -> anyhow::Result<RpcStub> {
        let mut builder = RpcStub::builder().id(self.id.clone());
        let mut service = None;

        if let Some(name) = &self.target.client {
            let client_type = schema
                .registry
                .client(name)
                .ok_or_else(|| anyhow!("unknown client: {}", name))?;
            service = Some(client_type.service().clone());
            builder = builder.client_type(client_type.clone());
        }
        if let Some(name) = &self.target.service {
            let pinned = schema.service(name)?.clone();
            service = Some(pinned.clone());
            builder = builder.service(pinned);
        }
        if let Some(base_url) = &self.target.base_url {
            builder = builder.base_url(base_url);
        }
        if let Some(procedure) = &self.target.procedure {
            builder = builder.procedure(procedure.clone());
        }

        if let Some(with) = &self.with {
            builder = with.apply(builder, service.as_deref(), self.target.procedure.as_deref())?;
        }

        if let Some(response) = &self.response {
            builder = response.apply(builder);
        }
        for response in &self.responses {
            builder = response.apply(builder);
        }

        Ok(builder.build()?)
    }
}

/// Which requests a stub considers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TargetDefinition {
    #[serde(default)]
    pub base_url: Option<String>,
    /// Client type name
    #[serde(default)]
    pub client: Option<String>,
    /// Service full name
    #[serde(default)]
    pub service: Option<String>,
    /// Wire or friendly procedure name
    #[serde(default)]
    pub procedure: Option<String>,
}

/// Request body constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WithDefinition {
    /// Exact request message, as JSON
    #[serde(default)]
    pub message: Option<serde_json::Value>,

    /// Attribute matchers (`$regex`, `$anything`, `$kind`, `$including`)
    #[serde(default)]
    pub attrs: Option<serde_json::Value>,
}

impl WithDefinition {
    pub fn validate(&self) -> anyhow::Result<()> {
        match (&self.message, &self.attrs) {
            (Some(_), Some(_)) => bail!("specify request or attrs, but not both"),
            (None, None) => bail!("with needs a message or attrs"),
            (_, Some(attrs)) => crate::matchers::Attrs::from_json(attrs)
                .map(|_| ())
                .map_err(|e| anyhow!("invalid attrs: {}", e)),
            _ => Ok(()),
        }
    }

    fn apply(
        &self,
        builder: StubBuilder,
        service: Option<&ServiceDefinition>,
        procedure: Option<&str>,
    ) -> anyhow::Result<StubBuilder> {
        if let Some(attrs) = &self.attrs {
            return Ok(builder.with_json(attrs.clone()));
        }
        let Some(message) = &self.message else {
            return Ok(builder);
        };

        let rpc = match (service, procedure) {
            (Some(service), Some(name)) => service
                .find_procedure(name)
                .ok_or_else(|| anyhow!("invalid rpc method: {}", name))?,
            _ => bail!("with.message needs a pinned client or service and a procedure"),
        };
        let message = rpc.input_type.from_json(message)?;
        Ok(builder.with(message))
    }
}

/// Response definition. At most one of `attrs`, `error`, `code` and
/// `status`; none means a default-valued message.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// Output message fields
    #[serde(default)]
    pub attrs: Option<serde_json::Value>,

    /// Structured error
    #[serde(default)]
    pub error: Option<TwirpError>,

    /// Symbolic error code
    #[serde(default)]
    pub code: Option<String>,

    /// HTTP status mapped to an error code
    #[serde(default)]
    pub status: Option<u16>,

    /// Render string values in `attrs` as templates
    #[serde(default)]
    pub template: bool,
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        let given = [
            self.attrs.is_some(),
            self.error.is_some(),
            self.code.is_some(),
            self.status.is_some(),
        ]
        .iter()
        .filter(|x| **x)
        .count();
        if given > 1 {
            bail!("specify only one of attrs, error, code or status");
        }
        if let Some(code) = &self.code {
            code.parse::<ErrorCode>()?;
        }
        if let Some(status) = self.status {
            if ErrorCode::from_status(status).is_none() {
                bail!("invalid http error status: {}", status);
            }
        }
        if self.template && self.attrs.is_none() {
            bail!("template responses need attrs");
        }
        Ok(())
    }

    pub fn to_value(&self) -> ResponseValue {
        if let Some(attrs) = &self.attrs {
            ResponseValue::Attrs(attrs.clone())
        } else if let Some(error) = &self.error {
            ResponseValue::Error(error.clone())
        } else if let Some(code) = &self.code {
            ResponseValue::Code(code.clone())
        } else if let Some(status) = self.status {
            ResponseValue::Status(status)
        } else {
            ResponseValue::Default
        }
    }

    fn apply(&self, builder: StubBuilder) -> StubBuilder {
        match (&self.attrs, self.template) {
            (Some(attrs), true) => {
                let engine = TemplateEngine::new();
                let attrs = attrs.clone();
                builder.to_return_with(move |request| {
                    engine
                        .render_json(&attrs, request)
                        .map(ResponseValue::Attrs)
                        .map_err(|e| crate::error::StubError::Template(e.to_string()))
                })
            }
            _ => builder.to_return(self.to_value()),
        }
    }
}

/// Interceptor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Log matched requests
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Include a registration snippet in unhandled-request diagnostics
    #[serde(default = "default_true")]
    pub show_stubbing_instructions: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            show_stubbing_instructions: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::Interception;
    use http::StatusCode;
    use serde_json::json;
    use std::io::Write;

    const SCHEMA: &str = r#"
schema:
  enums:
    - name: DateType
      values: [DATE_DEFAULT, DATE_OTHER]
  messages:
    - name: EchoRequest
      fields:
        - { name: msg, number: 1, type: string }
        - { name: date, number: 2, type: Date }
    - name: Date
      fields:
        - { name: month, number: 1, type: int32 }
        - { name: day, number: 2, type: int32 }
        - { name: type, number: 3, type: DateType }
    - name: EchoResponse
      fields:
        - { name: msg, number: 1, type: string }
        - { name: tags, number: 2, type: string, repeated: true }
  services:
    - name: Echo
      procedures:
        - { name: Echo, input: EchoRequest, output: EchoResponse }
  clients:
    - { name: EchoClient, service: Echo }
"#;

    fn config(stubs: &str) -> MockConfig {
        MockConfig::from_yaml(&format!("{}\nstubs:\n{}", SCHEMA, stubs)).unwrap()
    }

    fn call(registry: &StubRegistry, built_client: &Client, input: serde_json::Value) -> Interception {
        let rpc = built_client.client_type().service().find_procedure("echo").unwrap();
        let message = rpc.input_type.from_json(&input).unwrap();
        let request = built_client.request("echo", &message).unwrap();
        registry.on_intercepted_request(request).unwrap()
    }

    fn run(stubs: &str, input: serde_json::Value) -> (Interception, MessageType) {
        let built = config(stubs).build().unwrap();
        let client = built.client("EchoClient").unwrap().clone();
        let output = client.client_type().service().find_procedure("Echo").unwrap().output_type.clone();
        let registry = built.into_registry();
        (call(&registry, &client, input), output)
    }

    #[test]
    fn test_parse_schema() {
        let built = config("  []").build().unwrap();
        let client = built.client("EchoClient").unwrap();
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);

        let rpc = client.client_type().service().find_procedure("echo").unwrap();
        let date = rpc.input_type.field("date").unwrap();
        assert!(matches!(date.kind, FieldKind::Message(_)));
        assert!(built.stubs.is_empty());
    }

    #[test]
    fn test_attrs_stub() {
        let stubs = r#"
  - id: hi
    target: { client: EchoClient, procedure: echo }
    with:
      attrs:
        msg: { $regex: "^h" }
        date: { $including: { month: 10 } }
    response:
      attrs: { msg: matched, tags: [a, b] }
"#;
        let (hit, output) = run(stubs, json!({"msg": "hi", "date": {"month": 10, "day": 1}}));
        let out = hit.into_response().unwrap().decode(&output).unwrap().unwrap();
        assert_eq!(out.to_json(), json!({"msg": "matched", "tags": ["a", "b"]}));

        let (miss, _) = run(stubs, json!({"msg": "bye"}));
        assert!(matches!(miss, Interception::Unhandled(_)));
    }

    #[test]
    fn test_exact_message_stub() {
        let stubs = r#"
  - id: exact
    target: { client: EchoClient, procedure: Echo }
    with:
      message: { msg: woof }
"#;
        let (hit, _) = run(stubs, json!({"msg": "woof"}));
        assert!(matches!(hit, Interception::Response(_)));
        let (miss, _) = run(stubs, json!({"msg": "woof", "date": {"day": 2}}));
        assert!(matches!(miss, Interception::Unhandled(_)));
    }

    #[test]
    fn test_error_responses() {
        let stubs = r#"
  - id: missing
    response: { code: not_found }
"#;
        let (resp, _) = run(stubs, json!({}));
        assert_eq!(resp.into_response().unwrap().status, StatusCode::NOT_FOUND);

        let stubs = r#"
  - id: denied
    response:
      error: { code: permission_denied, msg: nope, meta: { user: bob } }
"#;
        let (resp, output) = run(stubs, json!({}));
        let err = resp.into_response().unwrap().decode(&output).unwrap().unwrap_err();
        assert_eq!(err, TwirpError::new(ErrorCode::PermissionDenied, "nope").with_meta("user", "bob"));
    }

    #[test]
    fn test_response_sequence() {
        let stubs = r#"
  - id: flaky
    responses:
      - { status: 503 }
      - { attrs: { msg: ok } }
"#;
        let built = config(stubs).build().unwrap();
        let client = built.client("EchoClient").unwrap().clone();
        let registry = built.into_registry();

        let first = call(&registry, &client, json!({})).into_response().unwrap();
        assert_eq!(first.status, StatusCode::SERVICE_UNAVAILABLE);
        for _ in 0..2 {
            let next = call(&registry, &client, json!({})).into_response().unwrap();
            assert!(next.is_success());
        }
    }

    #[test]
    fn test_template_response() {
        let stubs = r#"
  - id: shout
    response:
      template: true
      attrs: { msg: "{{upper request.msg}}" }
"#;
        let (resp, output) = run(stubs, json!({"msg": "woof"}));
        let out = resp.into_response().unwrap().decode(&output).unwrap().unwrap();
        assert_eq!(out.to_json(), json!({"msg": "WOOF"}));
    }

    #[test]
    fn test_disabled_stub_is_skipped() {
        let stubs = r#"
  - id: off
    enabled: false
"#;
        let built = config(stubs).build().unwrap();
        assert!(built.stubs.is_empty());
    }

    #[test]
    fn test_invalid_configs() {
        let bad = [
            "  - id: x\n    with: { message: { msg: a }, attrs: { msg: a } }\n",
            "  - id: x\n    response: { code: boom }\n",
            "  - id: x\n    response: { status: 200 }\n",
            "  - id: x\n    response: { code: not_found, status: 404 }\n",
            "  - id: x\n    response: { template: true }\n",
            "  - id: x\n    response: {}\n    responses: [{}]\n",
            "  - id: x\n    bogus: 1\n",
            "  - id: ''\n",
        ];
        for stubs in bad {
            let yaml = format!("{}\nstubs:\n{}", SCHEMA, stubs);
            assert!(MockConfig::from_yaml(&yaml).is_err(), "accepted: {}", stubs);
        }
    }

    #[test]
    fn test_build_errors_name_the_stub() {
        let err = config("  - id: nope\n    target: { client: EchoClient, procedure: Nope }\n")
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("Stub 0 (nope):"));

        let err = config("  - id: who\n    target: { client: Ghost }\n")
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown client: Ghost"));

        let err = config("  - id: loose\n    with: { message: { msg: a } }\n")
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("with.message"));
    }

    #[test]
    fn test_recursive_message_rejected() {
        let yaml = r#"
schema:
  messages:
    - name: Node
      fields:
        - { name: next, number: 1, type: Node }
"#;
        assert!(MockConfig::from_yaml(yaml).unwrap().build().is_err());

        let yaml = r#"
schema:
  messages:
    - name: A
      fields:
        - { name: b, number: 1, type: Missing }
"#;
        let err = MockConfig::from_yaml(yaml).unwrap().build().err().unwrap();
        assert!(err.to_string().contains("A"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}\nsettings:\n  log_matches: false\n", SCHEMA).unwrap();

        let config = MockConfig::from_file(file.path()).unwrap();
        assert!(!config.settings.log_matches);
        assert!(config.settings.show_stubbing_instructions);
        assert_eq!(config.schema.messages.len(), 3);
    }

    #[test]
    fn test_default_config_builds() {
        let config = MockConfig::from_yaml(include_str!("../demos/default-config.yaml")).unwrap();
        let built = config.build().unwrap();
        assert_eq!(built.stubs.len(), 4);
        assert_eq!(built.clients.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        assert!(MockConfig::from_file(Path::new("/nonexistent/mock.yaml")).is_err());
    }
}
