//! Advisory text for requests no stub handled.
//!
//! Nothing here affects matching. When a request cannot be resolved the
//! renderings degrade to a generic `METHOD url` form instead of failing.

use crate::matchers::{AttrMatcher, Attrs};
use crate::request::RequestSignature;
use crate::schema::Message;
use crate::stub::{BodyMatcher, RpcStub};
use serde_json::{Map, Value as Json};
use std::fmt;
use std::sync::Arc;

const SEPARATOR_WIDTH: usize = 60;

/// One difference between a request body and a stub's attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffEntry {
    /// Expected by the stub, absent from the request.
    Added { path: String, expected: Json },
    Changed {
        path: String,
        actual: Json,
        expected: Json,
    },
    /// Present in the request, not mentioned by the stub.
    Removed { path: String, actual: Json },
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffEntry::Added { path, expected } => write!(f, "+ {}: {}", path, expected),
            DiffEntry::Changed {
                path,
                actual,
                expected,
            } => write!(f, "~ {}: {} -> {}", path, actual, expected),
            DiffEntry::Removed { path, actual } => write!(f, "- {}: {}", path, actual),
        }
    }
}

/// `EchoClient(http://localhost/twirp/Echo/Echo).echo(msg: "woof")`
pub fn render_request(signature: &RequestSignature) -> String {
    let request = signature.request();
    let Some(decoded) = signature.decoded() else {
        return format!("{} {}", request.method(), request.url());
    };

    let target = match &decoded.client {
        Some(client) => client.name().to_string(),
        None => decoded.procedure.service_full_name.clone(),
    };
    let params = render_params(&decoded.message);

    format!(
        "{}({}).{}({})",
        target,
        request.url(),
        decoded.procedure.friendly_name,
        if params.is_empty() { "{}" } else { &params }
    )
}

fn render_params(message: &Message) -> String {
    message
        .normalized()
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A registration that would have matched the request.
///
/// `None` when the request does not resolve to a known client.
pub fn stubbing_instructions(signature: &RequestSignature) -> Option<String> {
    let decoded = signature.decoded()?;
    decoded.client.as_ref()?;

    let mut out = String::from("You can stub this request with the following snippet:\n\n");
    out.push_str("RpcStub::builder()");
    out.push_str(&format!(
        "\n    .procedure({:?})",
        decoded.procedure.friendly_name
    ));

    let normalized = decoded.message.normalized();
    if !normalized.is_empty() {
        out.push_str(&format!("\n    .with_json({})", render_json_object(&normalized, 1)));
    }

    out.push_str("\n    .to_return(...)");
    Some(out)
}

fn render_json_object(map: &Map<String, Json>, depth: usize) -> String {
    let indent = "    ".repeat(depth + 1);
    let closing = "    ".repeat(depth);
    let mut out = String::from("json!({\n");
    for (key, value) in map {
        out.push_str(&format!("{}{:?}: {},\n", indent, key, value));
    }
    out.push_str(&closing);
    out.push_str("})");
    out
}

/// How a registered stub was declared.
pub fn stub_snippet(stub: &RpcStub) -> String {
    let filter = stub.filter();
    let mut out = String::from("RpcStub::builder()");

    if let Some(client_type) = &filter.client_type {
        out.push_str(&format!(".client_type({})", client_type.name()));
    } else if let Some(service) = &filter.service {
        out.push_str(&format!(".service({:?})", service.full_name()));
    }
    if let Some(base_url) = &filter.base_url {
        out.push_str(&format!(".base_url({:?})", base_url));
    }
    if let Some(procedure) = &filter.procedure {
        out.push_str(&format!(".procedure({:?})", procedure));
    }

    match stub.body() {
        BodyMatcher::Any => {}
        BodyMatcher::Exact(message) => out.push_str(&format!(".with({})", message)),
        BodyMatcher::Attrs(attrs) => {
            let rendered = match attrs.to_json() {
                Json::Object(map) => render_json_object(&map, 0),
                other => other.to_string(),
            };
            out.push_str(&format!(".with_json({})", rendered));
        }
    }
    if stub.has_predicate() {
        out.push_str(".with_fn({ ... })");
    }

    out
}

/// Differences between the decoded request and the stub's attributes.
///
/// `None` unless the request decodes and the stub matches on attributes.
pub fn body_diff(signature: &RequestSignature, stub: &RpcStub) -> Option<Vec<DiffEntry>> {
    let BodyMatcher::Attrs(attrs) = stub.body() else {
        return None;
    };
    let decoded = signature.decoded()?;

    let mut entries = Vec::new();
    diff_message(&decoded.message, attrs, "", true, &mut entries);
    Some(entries)
}

fn diff_message(
    message: &Message,
    attrs: &Attrs,
    prefix: &str,
    report_extra: bool,
    out: &mut Vec<DiffEntry>,
) {
    let normalized = message.normalized();
    let path_of = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", prefix, name)
        }
    };

    for (name, matcher) in attrs.iter() {
        let path = path_of(name);
        let Some(field) = message.message_type().field(name) else {
            out.push(DiffEntry::Added {
                path,
                expected: matcher.to_json(),
            });
            continue;
        };

        let actual = message.field_value(field);
        if matcher.matches_field(field, &actual) {
            continue;
        }

        match (matcher, actual.as_message()) {
            (AttrMatcher::Including(nested), Some(inner)) => {
                diff_message(inner, nested, &path, false, out);
            }
            (AttrMatcher::Fields(nested), Some(inner)) if !inner.is_empty() => {
                diff_message(inner, nested, &path, true, out);
            }
            _ if !normalized.contains_key(name) => out.push(DiffEntry::Added {
                path,
                expected: matcher.to_json(),
            }),
            _ => out.push(DiffEntry::Changed {
                path,
                actual: field.value_to_json(&actual),
                expected: matcher.to_json(),
            }),
        }
    }

    if report_extra {
        for (name, value) in &normalized {
            if attrs.get(name).is_none() {
                out.push(DiffEntry::Removed {
                    path: path_of(name),
                    actual: value.clone(),
                });
            }
        }
    }
}

/// Snippets of every registered stub, with body diffs where available.
pub fn registered_stubs(signature: &RequestSignature, stubs: &[Arc<RpcStub>]) -> Option<String> {
    if stubs.is_empty() {
        return None;
    }

    let snippets: Vec<String> = stubs
        .iter()
        .map(|stub| {
            let mut snippet = stub_snippet(stub);
            if let Some(diff) = body_diff(signature, stub).filter(|d| !d.is_empty()) {
                snippet.push_str("\n\nBody diff:");
                for entry in diff {
                    snippet.push_str(&format!("\n  {}", entry));
                }
            }
            snippet
        })
        .collect();

    Some(format!(
        "registered request stubs:\n\n{}",
        snippets.join("\n\n")
    ))
}

/// The message a host shows when it refuses an unhandled request.
pub fn unhandled_message(
    signature: &RequestSignature,
    stubs: &[Arc<RpcStub>],
    show_stubbing_instructions: bool,
) -> String {
    let instructions = if show_stubbing_instructions {
        stubbing_instructions(signature)
    } else {
        None
    };

    [
        Some("Real RPC connections are disabled. Unregistered request:".to_string()),
        Some(render_request(signature)),
        instructions,
        registered_stubs(signature, stubs),
        Some("=".repeat(SEPARATOR_WIDTH)),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::InterceptedRequest;
    use crate::testing::{
        complex_client_type, complex_message_type, echo_client, echo_client_type,
        echo_request_type, registry,
    };
    use crate::registry::Client;
    use http::Method;
    use serde_json::json;

    fn echo_signature(input: Message) -> RequestSignature {
        RequestSignature::new(echo_client().request("echo", &input).unwrap(), registry())
    }

    fn woof() -> Message {
        echo_request_type().new_message().with("msg", "woof").unwrap()
    }

    #[test]
    fn test_render_request() {
        assert_eq!(
            render_request(&echo_signature(woof())),
            r#"EchoClient(http://localhost/twirp/Echo/Echo).echo(msg: "woof")"#
        );
        assert_eq!(
            render_request(&echo_signature(echo_request_type().new_message())),
            "EchoClient(http://localhost/twirp/Echo/Echo).echo({})"
        );
    }

    #[test]
    fn test_render_generic_request() {
        let request = InterceptedRequest::new(Method::GET, "http://example.com/").unwrap();
        let sig = RequestSignature::new(request, registry());
        assert_eq!(render_request(&sig), "GET http://example.com/");
        assert!(stubbing_instructions(&sig).is_none());
    }

    #[test]
    fn test_stubbing_instructions() {
        let text = stubbing_instructions(&echo_signature(woof())).unwrap();
        assert_eq!(
            text,
            "You can stub this request with the following snippet:\n\n\
             RpcStub::builder()\n    \
             .procedure(\"echo\")\n    \
             .with_json(json!({\n        \"msg\": \"woof\",\n    }))\n    \
             .to_return(...)"
        );
    }

    #[test]
    fn test_stubbing_instructions_without_params() {
        let text = stubbing_instructions(&echo_signature(echo_request_type().new_message())).unwrap();
        assert!(text.ends_with("RpcStub::builder()\n    .procedure(\"echo\")\n    .to_return(...)"));
    }

    #[test]
    fn test_stub_snippets() {
        let stub = RpcStub::builder().build().unwrap();
        assert_eq!(stub_snippet(&stub), "RpcStub::builder()");

        let stub = RpcStub::builder().procedure("echo").build().unwrap();
        assert_eq!(stub_snippet(&stub), "RpcStub::builder().procedure(\"echo\")");

        let stub = RpcStub::builder()
            .client_type(echo_client_type())
            .procedure("echo")
            .build()
            .unwrap();
        assert_eq!(
            stub_snippet(&stub),
            "RpcStub::builder().client_type(EchoClient).procedure(\"Echo\")"
        );

        let stub = RpcStub::builder().client(&echo_client()).build().unwrap();
        assert_eq!(
            stub_snippet(&stub),
            "RpcStub::builder().client_type(EchoClient).base_url(\"http://localhost/twirp\")"
        );
    }

    #[test]
    fn test_stub_snippet_with_body() {
        let stub = RpcStub::builder()
            .with_json(json!({"msg": "woof"}))
            .build()
            .unwrap();
        assert_eq!(
            stub_snippet(&stub),
            "RpcStub::builder().with_json(json!({\n    \"msg\": \"woof\",\n}))"
        );

        let stub = RpcStub::builder().with(woof()).build().unwrap();
        assert_eq!(
            stub_snippet(&stub),
            "RpcStub::builder().with(<EchoRequest: {\"msg\":\"woof\"}>)"
        );

        let stub = RpcStub::builder().with_fn(|_| true).build().unwrap();
        assert_eq!(stub_snippet(&stub), "RpcStub::builder().with_fn({ ... })");
    }

    #[test]
    fn test_body_diff_missing_attribute() {
        let stub = RpcStub::builder().with_json(json!({"msg": "Hi"})).build().unwrap();
        let diff = body_diff(&echo_signature(echo_request_type().new_message()), &stub).unwrap();
        assert_eq!(
            diff,
            vec![DiffEntry::Added {
                path: "msg".into(),
                expected: json!("Hi")
            }]
        );
    }

    #[test]
    fn test_body_diff_changed_attribute() {
        let stub = RpcStub::builder().with_json(json!({"msg": "Hi"})).build().unwrap();
        let bye = echo_request_type().new_message().with("msg", "bye").unwrap();
        let diff = body_diff(&echo_signature(bye), &stub).unwrap();
        assert_eq!(
            diff[0],
            DiffEntry::Changed {
                path: "msg".into(),
                actual: json!("bye"),
                expected: json!("Hi")
            }
        );
        assert_eq!(diff[0].to_string(), r#"~ msg: "bye" -> "Hi""#);
    }

    #[test]
    fn test_body_diff_extra_attribute() {
        let stub = RpcStub::builder().with_json(json!({"msg": "woof"})).build().unwrap();
        let input = woof().with("count", 2).unwrap();
        let diff = body_diff(&echo_signature(input), &stub).unwrap();
        assert_eq!(
            diff,
            vec![DiffEntry::Removed {
                path: "count".into(),
                actual: json!(2)
            }]
        );
    }

    #[test]
    fn test_body_diff_nested() {
        let client = Client::new(complex_client_type(), "http://localhost/twirp");
        let input = complex_message_type()
            .from_json(&json!({"date": {"month": 10, "day": 16}}))
            .unwrap();
        let sig = RequestSignature::new(client.request("echo", &input).unwrap(), registry());
        let stub = RpcStub::builder()
            .with_json(json!({"date": {"$including": {"month": 11}}}))
            .build()
            .unwrap();
        let diff = body_diff(&sig, &stub).unwrap();
        assert_eq!(
            diff,
            vec![DiffEntry::Changed {
                path: "date.month".into(),
                actual: json!(10),
                expected: json!(11)
            }]
        );
    }

    #[test]
    fn test_body_diff_requires_attrs() {
        let stub = RpcStub::builder().build().unwrap();
        assert!(body_diff(&echo_signature(woof()), &stub).is_none());
    }

    #[test]
    fn test_unhandled_message() {
        let stub = Arc::new(RpcStub::builder().procedure("double").build().unwrap());
        let text = unhandled_message(&echo_signature(woof()), &[stub], true);

        assert!(text.starts_with("Real RPC connections are disabled. Unregistered request:\n\n"));
        assert!(text.contains(r#"EchoClient(http://localhost/twirp/Echo/Echo).echo(msg: "woof")"#));
        assert!(text.contains("You can stub this request with the following snippet:"));
        assert!(text.contains("registered request stubs:\n\nRpcStub::builder().procedure(\"double\")"));
        assert!(text.ends_with(&"=".repeat(60)));
    }

    #[test]
    fn test_unhandled_message_without_instructions() {
        let text = unhandled_message(&echo_signature(woof()), &[], false);
        assert!(!text.contains("snippet"));
        assert!(!text.contains("registered request stubs"));
    }
}
