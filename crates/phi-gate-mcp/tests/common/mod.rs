// crates/phi-gate-mcp/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared fixtures for PHI Gate MCP integration tests.
// Purpose: Build routers, tokens, and record sources deterministically.
// Dependencies: phi-gate-core, phi-gate-mcp
// ============================================================================

//! ## Overview
//! Fixtures mint real HS256 tokens against an inline secret and serve a
//! small hospital from an in-memory record source. Wrappers count fetches,
//! delay them, or make the audit store fail so dispatch invariants can be
//! observed from outside the router.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use phi_gate_core::AuditRecord;
use phi_gate_core::AuditStore;
use phi_gate_core::AuditStoreError;
use phi_gate_core::InMemoryAuditStore;
use phi_gate_core::InMemoryRecordSource;
use phi_gate_core::Record;
use phi_gate_core::RecordSource;
use phi_gate_core::Role;
use phi_gate_core::SourceError;
use phi_gate_core::SubjectId;
use phi_gate_mcp::AuditWriter;
use phi_gate_mcp::RequestContext;
use phi_gate_mcp::TokenValidator;
use phi_gate_mcp::ToolRouter;
use phi_gate_mcp::config::AuthConfig;
use phi_gate_mcp::mint_token;
use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Tokens
// ============================================================================

/// Shared secret used by every fixture token.
pub const SECRET: &str = "phi-gate-test-secret-0123456789abcdef";

/// Auth settings with an inline secret.
#[must_use]
pub fn auth_config() -> AuthConfig {
    AuthConfig { secret: Some(SECRET.to_string()), ..AuthConfig::default() }
}

/// Mints a one-hour token for `subject`.
#[must_use]
pub fn token(subject: &str, role: Role) -> String {
    mint_token(&auth_config(), subject, role, 3600).expect("mint token")
}

/// HTTP request context presenting `token` from a loopback address.
#[must_use]
pub fn ctx(token: &str) -> RequestContext {
    RequestContext::http(
        Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        Some(format!("Bearer {token}")),
        Some("phi-gate-tests/1.0".to_string()),
    )
}

/// Request context for a freshly minted token.
#[must_use]
pub fn ctx_for(subject: &str, role: Role) -> RequestContext {
    ctx(&token(subject, role))
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Converts a JSON object literal into a row.
#[must_use]
pub fn row(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture row must be an object, got {other}"),
    }
}

/// Builds the fixture hospital.
#[must_use]
pub fn hospital() -> InMemoryRecordSource {
    let source = InMemoryRecordSource::new();
    source
        .insert_overview(row(json!({
            "patient_id": "P-1001",
            "first_name": "Mara",
            "last_name": "Quinn",
            "date_of_birth": "1984-02-11",
            "ward": "Cardiology",
        })))
        .unwrap();
    source
        .insert_phi(row(json!({
            "patient_id": "P-1001",
            "first_name": "Mara",
            "last_name": "Quinn",
            "date_of_birth": "1984-02-11",
            "blood_type": "O+",
            "allergies": "penicillin",
            "ssn": "123-45-6789",
            "address": "12 Harbour Road",
            "phone": "+1-555-0100",
            "email": "mara@example.org",
            "emergency_contact": "Ivo Quinn",
            "insurance_provider": "Acme Health",
            "insurance_number": "AC-99812",
        })))
        .unwrap();
    source
        .insert_phi(row(json!({
            "patient_id": "P-2002",
            "ssn": "987-65-4321",
            "address": "4 Mill Lane",
        })))
        .unwrap();
    source
        .push_admission(row(json!({
            "admission_id": "A-1",
            "patient_id": "P-1001",
            "admitted_at": "2026-09-30T08:15:00Z",
            "ward": "Cardiology",
        })))
        .unwrap();
    source
        .push_appointment(row(json!({
            "appointment_id": "AP-1",
            "patient_id": "P-1001",
            "scheduled_for": "2026-10-20T10:00:00Z",
        })))
        .unwrap();
    source
        .push_medical_record(row(json!({
            "record_id": "MR-1",
            "patient_id": "P-1001",
            "diagnosis": "atrial fibrillation",
            "treatment": "anticoagulation",
            "visit_date": "2026-09-30",
            "phone": "+1-555-0100",
        })))
        .unwrap();
    for (shift_id, staff_id, department) in
        [("SH-1", "S-100", "ICU"), ("SH-2", "S-100", "ICU"), ("SH-3", "S-200", "ER")]
    {
        source
            .push_shift(row(json!({
                "shift_id": shift_id,
                "staff_id": staff_id,
                "department": department,
                "starts_at": "2026-10-16T07:00:00Z",
            })))
            .unwrap();
    }
    source.link_staff(&SubjectId::new("nurse-1"), "S-100").unwrap();
    source.link_staff(&SubjectId::new("doctor-1"), "S-200").unwrap();
    source
}

// ============================================================================
// SECTION: Record Source Wrappers
// ============================================================================

/// Record source that counts lookups and can delay them.
pub struct ObservedSource {
    /// Wrapped fixtures.
    inner: InMemoryRecordSource,
    /// Lookups served, including staff links.
    calls: AtomicUsize,
    /// Delay applied before each lookup.
    delay: Duration,
    /// Whether every lookup fails.
    fail: bool,
}

impl ObservedSource {
    /// Wraps `inner` with no delay.
    #[must_use]
    pub fn new(inner: InMemoryRecordSource) -> Self {
        Self { inner, calls: AtomicUsize::new(0), delay: Duration::ZERO, fail: false }
    }

    /// Wraps `inner`, sleeping `delay` before each lookup.
    #[must_use]
    pub fn slow(inner: InMemoryRecordSource, delay: Duration) -> Self {
        Self { inner, calls: AtomicUsize::new(0), delay, fail: false }
    }

    /// Source whose every lookup fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            inner: InMemoryRecordSource::new(),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: true,
        }
    }

    /// Number of lookups served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Records one call and applies the configured delay or failure.
    fn observe(&self) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(SourceError::Unavailable("connection refused: db-7.internal".to_string()));
        }
        Ok(())
    }
}

impl RecordSource for ObservedSource {
    fn patient_overview(&self, patient_id: &str) -> Result<Option<Record>, SourceError> {
        self.observe()?;
        self.inner.patient_overview(patient_id)
    }

    fn patient_phi(&self, patient_id: &str) -> Result<Option<Record>, SourceError> {
        self.observe()?;
        self.inner.patient_phi(patient_id)
    }

    fn admissions(&self, patient_id: &str) -> Result<Vec<Record>, SourceError> {
        self.observe()?;
        self.inner.admissions(patient_id)
    }

    fn appointments(&self, patient_id: &str) -> Result<Vec<Record>, SourceError> {
        self.observe()?;
        self.inner.appointments(patient_id)
    }

    fn medical_records(&self, patient_id: &str) -> Result<Vec<Record>, SourceError> {
        self.observe()?;
        self.inner.medical_records(patient_id)
    }

    fn shifts_for_staff(&self, staff_id: &str) -> Result<Vec<Record>, SourceError> {
        self.observe()?;
        self.inner.shifts_for_staff(staff_id)
    }

    fn staff_roster(&self, department: Option<&str>) -> Result<Vec<Record>, SourceError> {
        self.observe()?;
        self.inner.staff_roster(department)
    }

    fn staff_id_for_subject(&self, subject: &SubjectId) -> Result<Option<String>, SourceError> {
        self.observe()?;
        self.inner.staff_id_for_subject(subject)
    }
}

// ============================================================================
// SECTION: Audit Stores
// ============================================================================

/// Audit store that rejects every operation.
pub struct FailingAuditStore;

impl AuditStore for FailingAuditStore {
    fn append(&self, _record: &AuditRecord) -> Result<(), AuditStoreError> {
        Err(AuditStoreError::Unavailable("disk full".to_string()))
    }

    fn known_countries(&self, _subject: &SubjectId) -> Result<BTreeSet<String>, AuditStoreError> {
        Err(AuditStoreError::Unavailable("disk full".to_string()))
    }

    fn denials_since(
        &self,
        _subject: &SubjectId,
        _since: OffsetDateTime,
    ) -> Result<u32, AuditStoreError> {
        Err(AuditStoreError::Unavailable("disk full".to_string()))
    }
}

// ============================================================================
// SECTION: Routers
// ============================================================================

/// Router over `source` writing audit records to `store`.
#[must_use]
pub fn router_with(
    source: Arc<dyn RecordSource>,
    store: Arc<dyn AuditStore>,
    fetch_timeout: Duration,
) -> ToolRouter {
    let validator = TokenValidator::from_config(&auth_config()).expect("validator");
    ToolRouter::new(Arc::new(validator), source, AuditWriter::with_store(store), fetch_timeout)
}

/// Router over the fixture hospital with an observable source and store.
#[must_use]
pub fn fixture_router() -> (ToolRouter, Arc<ObservedSource>, InMemoryAuditStore) {
    let source = Arc::new(ObservedSource::new(hospital()));
    let store = InMemoryAuditStore::new();
    let router = router_with(source.clone(), Arc::new(store.clone()), Duration::from_secs(5));
    (router, source, store)
}

/// Minimal arguments accepted by each tool.
#[must_use]
pub fn arguments_for(tool: &str) -> Value {
    match tool {
        "get_shifts" => json!({ "staff_id": "S-100" }),
        "get_my_shifts" | "get_staff_roster" => json!({}),
        _ => json!({ "patient_id": "P-1001" }),
    }
}
