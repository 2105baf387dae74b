//! Shared fixtures for unit tests.

use crate::registry::{Client, ClientType, ProcedureRegistry, ServiceDefinition};
use crate::schema::{EnumType, FieldKind, MessageType};
use std::sync::Arc;

pub const BASE_URL: &str = "http://localhost/twirp";
pub const OTHER_BASE_URL: &str = "http://otherhost/twirp";

pub fn echo_request_type() -> MessageType {
    MessageType::builder("EchoRequest")
        .field("msg", 1, FieldKind::String)
        .field("count", 2, FieldKind::Int32)
        .build()
}

pub fn echo_response_type() -> MessageType {
    MessageType::builder("EchoResponse")
        .field("msg", 1, FieldKind::String)
        .field("count", 2, FieldKind::Int32)
        .build()
}

pub fn echo_service() -> Arc<ServiceDefinition> {
    let req = echo_request_type();
    let resp = echo_response_type();
    Arc::new(
        ServiceDefinition::new("Echo")
            .procedure("Echo", &req, &resp)
            .procedure("Double", &req, &resp),
    )
}

pub fn echo_client_type() -> Arc<ClientType> {
    Arc::new(ClientType::new("EchoClient", echo_service()))
}

pub fn echo_client() -> Client {
    Client::new(echo_client_type(), BASE_URL)
}

pub fn hello_world_client_type() -> Arc<ClientType> {
    let req = MessageType::builder("HelloRequest")
        .field("name", 1, FieldKind::String)
        .field("count", 2, FieldKind::Int32)
        .build();
    let resp = MessageType::builder("HelloResponse")
        .repeated("message", 1, FieldKind::String)
        .build();
    let service = ServiceDefinition::new("example.hello_world.HelloWorld").procedure(
        "Hello",
        &req,
        &resp,
    );
    Arc::new(ClientType::new("HelloWorldClient", Arc::new(service)))
}

pub fn date_type() -> MessageType {
    let kind = EnumType::new("DateType", [("DATE_DEFAULT", 0), ("DATE_OTHER", 1)]);
    MessageType::builder("Date")
        .field("month", 1, FieldKind::Int32)
        .field("day", 2, FieldKind::Int32)
        .field("year", 3, FieldKind::Int32)
        .field("type", 4, FieldKind::Enum(kind))
        .build()
}

pub fn complex_message_type() -> MessageType {
    let kind = EnumType::new("ComplexType", [("ECHO_DEFAULT", 0), ("ECHO_DOUBLE", 1)]);
    MessageType::builder("ComplexMessage")
        .field("msg", 1, FieldKind::Message(echo_request_type()))
        .field("uid", 2, FieldKind::Int64)
        .field("date", 3, FieldKind::Message(date_type()))
        .field("type", 4, FieldKind::Enum(kind))
        .repeated("tags", 5, FieldKind::String)
        .field("ratio", 6, FieldKind::Float)
        .repeated("scores", 7, FieldKind::Int32)
        .field("payload", 8, FieldKind::Bytes)
        .build()
}

pub fn complex_client_type() -> Arc<ClientType> {
    let complex = complex_message_type();
    let service = ServiceDefinition::new("Complex").procedure("Echo", &complex, &complex);
    Arc::new(ClientType::new("ComplexClient", Arc::new(service)))
}

/// Registry with the Echo, HelloWorld and Complex clients.
pub fn registry() -> Arc<ProcedureRegistry> {
    Arc::new(
        ProcedureRegistry::new()
            .with_client(echo_client_type())
            .with_client(hello_world_client_type())
            .with_client(complex_client_type()),
    )
}
