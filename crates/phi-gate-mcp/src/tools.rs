// crates/phi-gate-mcp/src/tools.rs
// ============================================================================
// Module: MCP Tool Router
// Description: Tool dispatch for the PHI Gate JSON-RPC server.
// Purpose: Authenticate, authorize, fetch, redact, and audit each tool call.
// Dependencies: phi-gate-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! [`ToolRouter::call_tool`] is the mediation state machine. Each call moves
//! through authentication, tool lookup, argument checks, the tool-level role
//! check, the resource-level decision, the bounded record fetch, and (for
//! PHI-bearing tools) redaction.
//!
//! ## Invariants
//! - No record fetch happens before both authorization checks pass.
//! - Every path past a recognized `tools.call` ends in exactly one audit
//!   write, except an unknown tool name presented with a valid token.
//! - Identity is passed explicitly; nothing is stored between calls.
//! - Internal failures reach the caller only as a generic message.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use phi_gate_core::AccessDecision;
use phi_gate_core::Action;
use phi_gate_core::AuditAction;
use phi_gate_core::AuditInput;
use phi_gate_core::DataScope;
use phi_gate_core::FetchResult;
use phi_gate_core::Identity;
use phi_gate_core::RecordQuery;
use phi_gate_core::RecordSource;
use phi_gate_core::RowContext;
use phi_gate_core::SubjectId;
use phi_gate_core::ToolDefinition;
use phi_gate_core::ToolName;
use phi_gate_core::authorize;
use phi_gate_core::authorize_tool;
use phi_gate_core::is_access_denied_marker;
use phi_gate_core::redact;
use phi_gate_core::string_argument;
use phi_gate_core::tool_catalog;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::audit::AuditWriter;
use crate::auth::AuthError;
use crate::auth::Authenticator;
use crate::auth::RequestContext;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Protocol-level tool call failures.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name not in the catalog.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// Missing or invalid credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Role not permitted to call the tool.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Missing or malformed arguments.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    /// Fetch failure or timeout; never shown to callers verbatim.
    #[error("internal error: {0}")]
    Internal(String),
}

// ============================================================================
// SECTION: Tool Router
// ============================================================================

/// Shared router state.
struct RouterInner {
    /// Bearer credential verification.
    authenticator: Arc<dyn Authenticator>,
    /// Record fetch collaborator.
    source: Arc<dyn RecordSource>,
    /// Audit recording.
    audit: AuditWriter,
    /// Bound on each blocking source call.
    fetch_timeout: Duration,
}

/// Tool router for MCP requests.
#[derive(Clone)]
pub struct ToolRouter {
    /// Shared state.
    inner: Arc<RouterInner>,
}

/// Resolved lookup for an authorized call.
struct CallPlan {
    /// Action checked against the permission matrix.
    action: Action,
    /// Row relationship for the decision.
    row: RowContext,
    /// Lookup to run once allowed.
    query: RecordQuery,
    /// Requested view for redaction.
    scope: DataScope,
    /// Identifier recorded in the audit trail.
    record_id: Option<String>,
}

/// Per-call state threaded through the dispatch steps.
struct Call<'a> {
    /// Transport metadata.
    ctx: &'a RequestContext,
    /// Verified caller.
    identity: Identity,
    /// Tool being invoked.
    definition: &'static ToolDefinition,
    /// Arguments as supplied.
    arguments: Value,
    /// Dispatch start.
    started: Instant,
}

impl ToolRouter {
    /// Builds a router over the given collaborators.
    #[must_use]
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        source: Arc<dyn RecordSource>,
        audit: AuditWriter,
        fetch_timeout: Duration,
    ) -> Self {
        Self { inner: Arc::new(RouterInner { authenticator, source, audit, fetch_timeout }) }
    }

    /// Returns the published tool catalog.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Value> {
        tool_catalog().iter().map(ToolDefinition::descriptor).collect()
    }

    /// Dispatches one tool call.
    ///
    /// Resource-level denials are returned as `Ok` with a structured denial
    /// payload; protocol failures are returned as [`ToolError`].
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] for unauthenticated callers, unknown tools,
    /// invalid arguments, tool-level role denials, and fetch failures.
    pub async fn call_tool(
        &self,
        ctx: &RequestContext,
        name: &str,
        arguments: Value,
    ) -> Result<Value, ToolError> {
        let started = Instant::now();
        let tool = ToolName::parse(name);
        let identity = match self.inner.authenticator.authenticate(ctx) {
            Ok(identity) => identity,
            Err(err) => {
                tracing::info!(
                    target: "phi_gate::server",
                    tool = name,
                    request_id = request_label(ctx),
                    error = %err,
                    "tool call unauthenticated"
                );
                let definition = tool.map(ToolName::definition);
                let mut input =
                    AuditInput::new(SubjectId::anonymous(), AuditAction::AuthFailed, false);
                input.tool = tool;
                input.resource = definition.map(|definition| definition.resource);
                input.is_phi_access = definition.is_some_and(|definition| definition.is_phi);
                input.tool_args = Some(arguments);
                input.denial_reason = Some(err.to_string());
                self.finish(ctx, input, started).await;
                let AuthError::Unauthenticated(reason) = err;
                return Err(ToolError::Unauthenticated(reason));
            }
        };
        let Some(tool) = tool else {
            tracing::debug!(
                target: "phi_gate::server",
                tool = name,
                request_id = request_label(ctx),
                "unknown tool requested"
            );
            return Err(ToolError::UnknownTool(name.to_string()));
        };
        let call = Call { ctx, identity, definition: tool.definition(), arguments, started };
        self.dispatch(call).await
    }

    /// Runs the authorized part of the state machine.
    async fn dispatch(&self, call: Call<'_>) -> Result<Value, ToolError> {
        let args = match &call.arguments {
            Value::Object(args) => args.clone(),
            Value::Null => Map::new(),
            _ => {
                return self.reject_invalid(&call, "arguments must be an object".to_string()).await;
            }
        };
        if let Some(missing) = call.definition.missing_argument(&args) {
            return self
                .reject_invalid(&call, format!("missing required argument '{missing}'"))
                .await;
        }

        let role = call.identity.role();
        let tool_decision = authorize_tool(call.definition, role);
        if !tool_decision.allowed {
            let reason = denial_reason(tool_decision);
            self.audit_denial(&call, None, reason.clone()).await;
            return Err(ToolError::Unauthorized(reason));
        }

        let plan = match plan_call(call.definition, &call.identity, &args) {
            Ok(plan) => plan,
            Err(message) => return self.reject_invalid(&call, message).await,
        };
        let caller_key = match self.caller_key(&call).await {
            Ok(key) => key,
            Err(err) => return self.fail(&call, plan.record_id, err).await,
        };
        let decision =
            authorize(call.definition.resource, plan.action, role, &caller_key, &plan.row);
        if !decision.allowed {
            let reason = denial_reason(decision);
            self.audit_denial(&call, plan.record_id, reason.clone()).await;
            return Ok(structured_denial(&reason));
        }

        let fetched = match self.run_query(plan.query).await {
            Ok(fetched) => fetched,
            Err(err) => return self.fail(&call, plan.record_id, err).await,
        };
        let count = fetched.len();
        let is_single = matches!(fetched, FetchResult::Single(_));
        let is_empty = fetched.is_empty();
        let mut data = fetched.into_value();
        if call.definition.is_phi && !is_empty {
            data = redact(&data, role, plan.scope);
            if is_single && is_access_denied_marker(&data) {
                let reason = data
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("access denied")
                    .to_string();
                self.audit_denial(&call, plan.record_id, reason.clone()).await;
                return Ok(structured_denial(&reason));
            }
        }

        let message = if is_empty {
            "No matching records found".to_string()
        } else {
            format!("Retrieved {count} record(s)")
        };
        let mut input = audit_input(&call, AuditAction::success(call.definition.is_phi), true);
        input.record_id = plan.record_id;
        input.result_summary = Some(message.clone());
        self.finish(call.ctx, input, call.started).await;
        Ok(json!({ "data": data, "message": message, "is_empty": is_empty }))
    }

    /// Resolves the identifier compared against row owners.
    ///
    /// Shift rows are owned by staff ids, so callers linked to a staff
    /// record are compared by that id; everyone else by subject id.
    async fn caller_key(&self, call: &Call<'_>) -> Result<SubjectId, ToolError> {
        let subject = call.identity.subject_id().clone();
        if call.definition.name != ToolName::GetShifts {
            return Ok(subject);
        }
        let source = Arc::clone(&self.inner.source);
        let lookup = subject.clone();
        let staff_id = self.blocking(move || source.staff_id_for_subject(&lookup)).await?;
        Ok(staff_id.map_or(subject, SubjectId::new))
    }

    /// Runs an authorized lookup.
    async fn run_query(&self, query: RecordQuery) -> Result<FetchResult, ToolError> {
        let source = Arc::clone(&self.inner.source);
        self.blocking(move || query.run(source.as_ref())).await
    }

    /// Runs a blocking source call under the fetch timeout.
    async fn blocking<T, E>(
        &self,
        f: impl FnOnce() -> Result<T, E> + Send + 'static,
    ) -> Result<T, ToolError>
    where
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.inner.fetch_timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(ToolError::Internal(err.to_string())),
            Ok(Err(err)) => Err(ToolError::Internal(err.to_string())),
            Err(_) => Err(ToolError::Internal("record fetch timed out".to_string())),
        }
    }

    /// Audits a malformed call and returns the params error.
    async fn reject_invalid(&self, call: &Call<'_>, message: String) -> Result<Value, ToolError> {
        tracing::debug!(
            target: "phi_gate::server",
            tool = call.definition.name.as_str(),
            request_id = request_label(call.ctx),
            error = %message,
            "tool call rejected"
        );
        let mut input = audit_input(call, AuditAction::InvalidRequest, false);
        input.denial_reason = Some(message.clone());
        self.finish(call.ctx, input, call.started).await;
        Err(ToolError::InvalidParams(message))
    }

    /// Audits a fetch failure and returns the internal error.
    async fn fail(
        &self,
        call: &Call<'_>,
        record_id: Option<String>,
        err: ToolError,
    ) -> Result<Value, ToolError> {
        tracing::warn!(
            target: "phi_gate::server",
            tool = call.definition.name.as_str(),
            request_id = request_label(call.ctx),
            error = %err,
            "tool execution failed"
        );
        let mut input = audit_input(call, AuditAction::ToolFailure, true);
        input.record_id = record_id;
        input.result_summary = Some("record fetch failed".to_string());
        self.finish(call.ctx, input, call.started).await;
        Err(err)
    }

    /// Audits a tool or resource denial.
    async fn audit_denial(&self, call: &Call<'_>, record_id: Option<String>, reason: String) {
        tracing::info!(
            target: "phi_gate::server",
            tool = call.definition.name.as_str(),
            role = call.identity.role().as_str(),
            request_id = request_label(call.ctx),
            reason = %reason,
            "tool call denied"
        );
        let mut input = audit_input(call, AuditAction::denied(call.definition.is_phi), false);
        input.record_id = record_id;
        input.denial_reason = Some(reason);
        self.finish(call.ctx, input, call.started).await;
    }

    /// Attaches request metadata and writes the record.
    async fn finish(&self, ctx: &RequestContext, mut input: AuditInput, started: Instant) {
        input.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
        input.ip = ctx.peer_ip.map(|ip| ip.to_string());
        input.user_agent.clone_from(&ctx.user_agent);
        self.inner.audit.record(input).await;
    }
}

// ============================================================================
// SECTION: Planning
// ============================================================================

/// Maps a tool and its arguments onto an action, row context, and lookup.
fn plan_call(
    definition: &ToolDefinition,
    identity: &Identity,
    args: &Map<String, Value>,
) -> Result<CallPlan, String> {
    let patient = || string_argument(args, "patient_id").unwrap_or_default();
    let read = |query: RecordQuery, record_id: String| CallPlan {
        action: Action::Read,
        row: RowContext::none(),
        query,
        scope: DataScope::Full,
        record_id: Some(record_id),
    };
    let plan = match definition.name {
        ToolName::GetPatientOverview => {
            read(RecordQuery::PatientOverview { patient_id: patient() }, patient())
        }
        ToolName::GetAdmissions => read(RecordQuery::Admissions { patient_id: patient() }, patient()),
        ToolName::GetAppointments => {
            read(RecordQuery::Appointments { patient_id: patient() }, patient())
        }
        ToolName::GetPatientPhi => {
            let scope = match args.get("scope") {
                None | Some(Value::Null) => DataScope::Full,
                Some(Value::String(label)) => DataScope::parse_requested(label)
                    .ok_or_else(|| format!("invalid scope '{label}'"))?,
                Some(_) => return Err("scope must be a string".to_string()),
            };
            let action = match identity.role().scope_ceiling() {
                DataScope::Full | DataScope::Minimal => Action::Read,
                DataScope::Clinical => Action::ReadClinical,
                DataScope::Insurance => Action::ReadInsurance,
            };
            CallPlan {
                action,
                row: RowContext::none(),
                query: RecordQuery::PatientPhi { patient_id: patient() },
                scope,
                record_id: Some(patient()),
            }
        }
        ToolName::GetMedicalRecords => CallPlan {
            scope: DataScope::Clinical,
            ..read(RecordQuery::MedicalRecords { patient_id: patient() }, patient())
        },
        ToolName::GetShifts => {
            let staff_id = string_argument(args, "staff_id").unwrap_or_default();
            CallPlan {
                row: RowContext::owned_by(staff_id.clone()),
                ..read(RecordQuery::ShiftsForStaff { staff_id: staff_id.clone() }, staff_id)
            }
        }
        ToolName::GetMyShifts => {
            let subject = identity.subject_id().clone();
            CallPlan {
                row: RowContext::owned_by(subject.as_str()),
                record_id: Some(subject.as_str().to_string()),
                ..read(RecordQuery::ShiftsForSubject { subject }, String::new())
            }
        }
        ToolName::GetStaffRoster => {
            let department = string_argument(args, "department");
            CallPlan {
                record_id: department.clone(),
                ..read(RecordQuery::StaffRoster { department }, String::new())
            }
        }
    };
    Ok(plan)
}

/// Builds an audit input for an authenticated call.
fn audit_input(call: &Call<'_>, action: AuditAction, granted: bool) -> AuditInput {
    let mut input = AuditInput::new(call.identity.subject_id().clone(), action, granted);
    input.role = Some(call.identity.role());
    input.tool = Some(call.definition.name);
    input.resource = Some(call.definition.resource);
    input.tool_args = Some(call.arguments.clone());
    input.is_phi_access = call.definition.is_phi;
    input
}

/// Returns the request identifier for diagnostics, or `-` when absent.
fn request_label(ctx: &RequestContext) -> &str {
    ctx.request_id.as_deref().unwrap_or("-")
}

/// Builds the structured denial payload.
fn structured_denial(reason: &str) -> Value {
    json!({ "data": null, "access_denied": true, "error": reason })
}

/// Extracts the reason from a denial.
fn denial_reason(decision: AccessDecision) -> String {
    decision.reason.unwrap_or_else(|| "access denied".to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
