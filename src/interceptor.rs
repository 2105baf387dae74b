//! Entry point for the host mocking layer.

use crate::config::Settings;
use crate::diagnostics;
use crate::error::{NetConnectNotAllowed, Result};
use crate::registry::ProcedureRegistry;
use crate::request::{InterceptedRequest, RequestSignature};
use crate::response::ResponseDescriptor;
use crate::stub::RpcStub;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one intercepted request.
#[derive(Debug)]
pub enum Interception {
    /// A stub matched; hand this back instead of touching the network.
    Response(ResponseDescriptor),
    /// No stub matched; the host should refuse the request.
    Unhandled(UnhandledRequest),
}

impl Interception {
    pub fn into_response(self) -> std::result::Result<ResponseDescriptor, NetConnectNotAllowed> {
        match self {
            Interception::Response(response) => Ok(response),
            Interception::Unhandled(unhandled) => Err(unhandled.into()),
        }
    }
}

/// A request no registered stub handled.
#[derive(Debug)]
pub struct UnhandledRequest {
    signature: RequestSignature,
    stubs: Vec<Arc<RpcStub>>,
    show_stubbing_instructions: bool,
}

impl UnhandledRequest {
    pub fn signature(&self) -> &RequestSignature {
        &self.signature
    }

    /// Diagnostic text for the refusal.
    pub fn message(&self) -> String {
        diagnostics::unhandled_message(
            &self.signature,
            &self.stubs,
            self.show_stubbing_instructions,
        )
    }
}

impl From<UnhandledRequest> for NetConnectNotAllowed {
    fn from(unhandled: UnhandledRequest) -> Self {
        NetConnectNotAllowed {
            message: unhandled.message(),
        }
    }
}

/// Request counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestStats {
    pub total: u64,
    pub matched: u64,
    pub unmatched: u64,
}

/// Result of [`StubRegistry::expect_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallExpectation {
    pub times_invoked: usize,
}

impl CallExpectation {
    pub fn was_called(&self) -> bool {
        self.times_invoked > 0
    }

    pub fn failure_message(&self) -> &'static str {
        "expected an RPC request but received none"
    }

    pub fn failure_message_when_negated(&self) -> &'static str {
        "did not expect an RPC request, but received one"
    }
}

/// The ordered set of active stubs.
///
/// Stubs are evaluated in registration order and the first match wins.
/// There is no ranking by specificity: register narrow stubs before broad
/// ones when they overlap.
pub struct StubRegistry {
    procedures: Arc<ProcedureRegistry>,
    settings: Settings,
    stubs: RwLock<Vec<Arc<RpcStub>>>,
    requests_total: AtomicU64,
    requests_matched: AtomicU64,
    requests_unmatched: AtomicU64,
}

impl StubRegistry {
    pub fn new(procedures: Arc<ProcedureRegistry>) -> Self {
        Self::with_settings(procedures, Settings::default())
    }

    pub fn with_settings(procedures: Arc<ProcedureRegistry>, settings: Settings) -> Self {
        Self {
            procedures,
            settings,
            stubs: RwLock::new(Vec::new()),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    pub fn procedures(&self) -> &Arc<ProcedureRegistry> {
        &self.procedures
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Append a stub; returns the handle used to remove it.
    pub fn register(&self, stub: RpcStub) -> Arc<RpcStub> {
        let stub = Arc::new(stub);
        self.stubs.write().push(stub.clone());
        debug!(stub_id = ?stub.id(), "Registered stub");
        stub
    }

    /// Remove a previously registered stub. Returns false if it was not registered.
    pub fn remove(&self, stub: &Arc<RpcStub>) -> bool {
        let mut stubs = self.stubs.write();
        let before = stubs.len();
        stubs.retain(|s| !Arc::ptr_eq(s, stub));
        before != stubs.len()
    }

    /// Active stubs in registration order.
    pub fn list(&self) -> Vec<Arc<RpcStub>> {
        self.stubs.read().clone()
    }

    pub fn clear(&self) {
        self.stubs.write().clear();
    }

    pub fn stats(&self) -> RequestStats {
        RequestStats {
            total: self.requests_total.load(Ordering::Relaxed),
            matched: self.requests_matched.load(Ordering::Relaxed),
            unmatched: self.requests_unmatched.load(Ordering::Relaxed),
        }
    }

    /// Find the first stub matching the request and synthesize its response.
    ///
    /// Errors only when the matching stub's response cannot be built.
    pub fn on_intercepted_request(&self, request: InterceptedRequest) -> Result<Interception> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        // Snapshot so response functions may register or remove stubs.
        let stubs = self.list();
        let signature = RequestSignature::new(request, self.procedures.clone());

        for stub in &stubs {
            let Some(decoded) = stub.matches(&signature) else {
                continue;
            };

            if self.settings.log_matches {
                info!(
                    stub_id = ?stub.id(),
                    service = %decoded.procedure.service_full_name,
                    procedure = %decoded.procedure.procedure_name,
                    "Request matched stub"
                );
            }

            // A stub whose response cannot be built counts toward the total only.
            let response = stub.respond(&decoded)?;
            self.requests_matched.fetch_add(1, Ordering::Relaxed);
            return Ok(Interception::Response(response));
        }

        self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
        if self.settings.log_unmatched {
            warn!(
                method = %signature.request().method(),
                url = %signature.request().url(),
                "No matching stub found"
            );
        }

        Ok(Interception::Unhandled(UnhandledRequest {
            signature,
            stubs,
            show_stubbing_instructions: self.settings.show_stubbing_instructions,
        }))
    }

    /// Register `stub` for the duration of `f` and report whether it fired.
    ///
    /// The stub is removed even if `f` panics.
    pub fn expect_call<F>(&self, stub: RpcStub, f: F) -> CallExpectation
    where
        F: FnOnce(),
    {
        let registration = Registration {
            registry: self,
            stub: self.register(stub),
        };
        f();
        CallExpectation {
            times_invoked: registration.stub.times_invoked(),
        }
    }
}

/// Removes its stub when dropped.
struct Registration<'a> {
    registry: &'a StubRegistry,
    stub: Arc<RpcStub>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.stub);
    }
}

impl std::fmt::Debug for StubRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubRegistry")
            .field("stubs", &self.stubs.read().len())
            .field("stats", &self.stats())
            .finish()
    }
}
