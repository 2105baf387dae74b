//! Template engine for dynamic responses.
//!
//! Uses Handlebars to render string values of a response attribute map
//! against the decoded request.

use crate::request::DecodedRequest;
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{Map, Value as Json};

/// Template engine for rendering dynamic responses.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

/// Context for template rendering.
#[derive(Debug, Serialize)]
pub struct TemplateContext {
    /// Decoded input message, in normalized form
    pub request: Map<String, Json>,
    /// Service full name
    pub service: String,
    /// Wire procedure name
    pub procedure: String,
    /// Friendly procedure name
    pub method: String,
    /// Client type the call was attributed to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

impl TemplateContext {
    pub fn from_request(request: &DecodedRequest) -> Self {
        Self {
            request: request.message.normalized(),
            service: request.procedure.service_full_name.clone(),
            procedure: request.procedure.procedure_name.clone(),
            method: request.procedure.friendly_name.clone(),
            client: request.client.as_ref().map(|c| c.name().to_string()),
        }
    }
}

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("random", Box::new(random_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));

        // Output lands in message fields, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Render a template string against a decoded request.
    pub fn render(
        &self,
        template: &str,
        request: &DecodedRequest,
    ) -> Result<String, handlebars::RenderError> {
        let ctx = TemplateContext::from_request(request);
        self.handlebars.render_template(template, &ctx)
    }

    /// Render every templated string inside a JSON value.
    pub fn render_json(
        &self,
        json: &Json,
        request: &DecodedRequest,
    ) -> Result<Json, handlebars::RenderError> {
        let ctx = TemplateContext::from_request(request);
        self.render_json_value(json, &ctx)
    }

    fn render_json_value(
        &self,
        value: &Json,
        ctx: &TemplateContext,
    ) -> Result<Json, handlebars::RenderError> {
        match value {
            Json::String(s) if s.contains("{{") => {
                Ok(Json::String(self.handlebars.render_template(s, ctx)?))
            }
            Json::Array(arr) => arr
                .iter()
                .map(|v| self.render_json_value(v, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
            Json::Object(obj) => {
                let mut rendered = Map::new();
                for (k, v) in obj {
                    rendered.insert(k.clone(), self.render_json_value(v, ctx)?);
                }
                Ok(Json::Object(rendered))
            }
            _ => Ok(value.clone()),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Custom Handlebars helpers

fn json_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|v| v.value()).unwrap_or(&Json::Null);
    out.write(&value.to_string())?;
    Ok(())
}

fn now_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use chrono::Utc;

    let format = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .unwrap_or("%Y-%m-%dT%H:%M:%S%.3fZ");

    out.write(&Utc::now().format(format).to_string())?;
    Ok(())
}

fn random_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;

    let min = h.param(0).and_then(|v| v.value().as_i64()).unwrap_or(0);
    let max = h.param(1).and_then(|v| v.value().as_i64()).unwrap_or(100);

    let value = rand::thread_rng().gen_range(min..=max.max(min));
    out.write(&value.to_string())?;
    Ok(())
}

fn default_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|v| v.value());
    let default = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

    match value {
        Some(Json::String(s)) if !s.is_empty() => out.write(s)?,
        Some(Json::String(_)) | Some(Json::Null) | None => out.write(default)?,
        Some(other) => out.write(&other.to_string())?,
    }
    Ok(())
}

fn upper_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_uppercase())?;
    Ok(())
}

fn lower_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_lowercase())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{complex_message_type, echo_client, echo_request_type, registry};
    use crate::registry::Client;
    use crate::request::RequestSignature;
    use crate::schema::Message;
    use serde_json::json;
    use std::sync::Arc;

    fn decoded(msg: &str) -> Arc<DecodedRequest> {
        let input = echo_request_type().new_message().with("msg", msg).unwrap();
        let sig = RequestSignature::new(echo_client().request("echo", &input).unwrap(), registry());
        sig.decoded().unwrap()
    }

    #[test]
    fn test_simple_template() {
        let engine = TemplateEngine::new();
        let result = engine.render("Said: {{request.msg}}", &decoded("woof")).unwrap();
        assert_eq!(result, "Said: woof");
    }

    #[test]
    fn test_procedure_context() {
        let engine = TemplateEngine::new();
        let result = engine
            .render("{{client}} {{service}}/{{procedure}} {{method}}", &decoded("woof"))
            .unwrap();
        assert_eq!(result, "EchoClient Echo/Echo echo");
    }

    #[test]
    fn test_nested_request_fields() {
        let input: Message = complex_message_type()
            .from_json(&json!({"date": {"month": 10}, "tags": ["a"]}))
            .unwrap();
        let client = Client::new(crate::testing::complex_client_type(), crate::testing::BASE_URL);
        let sig = RequestSignature::new(client.request("echo", &input).unwrap(), registry());

        let engine = TemplateEngine::new();
        let result = engine
            .render("{{request.date.month}} {{json request.tags}}", &sig.decoded().unwrap())
            .unwrap();
        assert_eq!(result, r#"10 ["a"]"#);
    }

    #[test]
    fn test_default_helper() {
        let engine = TemplateEngine::new();
        let result = engine
            .render("Count: {{default request.count \"none\"}}", &decoded("woof"))
            .unwrap();
        assert_eq!(result, "Count: none");
    }

    #[test]
    fn test_upper_lower_helpers() {
        let engine = TemplateEngine::new();
        let result = engine
            .render(
                "Upper: {{upper request.msg}}, Lower: {{lower request.msg}}",
                &decoded("Woof"),
            )
            .unwrap();
        assert_eq!(result, "Upper: WOOF, Lower: woof");
    }

    #[test]
    fn test_random_helper() {
        let engine = TemplateEngine::new();
        let result = engine.render("{{random 5 5}}", &decoded("woof")).unwrap();
        assert_eq!(result, "5");
    }

    #[test]
    fn test_render_json() {
        let engine = TemplateEngine::new();
        let json = json!({
            "msg": "{{upper request.msg}}!",
            "count": "{{random 3 3}}",
            "static": "no template",
            "list": ["{{request.msg}}"]
        });

        let result = engine.render_json(&json, &decoded("woof")).unwrap();
        assert_eq!(result["msg"], "WOOF!");
        assert_eq!(result["count"], "3");
        assert_eq!(result["static"], "no template");
        assert_eq!(result["list"][0], "woof");
    }
}
