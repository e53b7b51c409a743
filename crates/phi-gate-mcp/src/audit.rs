// crates/phi-gate-mcp/src/audit.rs
// ============================================================================
// Module: Audit Writer
// Description: Risk-scored, best-effort audit recording and a JSONL store.
// Purpose: Append exactly one sealed record per mediated outcome.
// Dependencies: phi-gate-core, serde_json, time, tokio, tracing
// ============================================================================

//! ## Overview
//! [`AuditWriter::record`] never fails. It resolves the caller location
//! under a short timeout, reads the subject's history for the risk signals,
//! seals the record, and appends it. Any failure along the way is logged to
//! the diagnostic channel and dropped. The write runs on its own task so a
//! caller that goes away mid-request does not cancel it.
//!
//! [`JsonlAuditStore`] is an append-only JSON-lines [`AuditStore`]; the risk
//! indices it answers from are rebuilt when the file is opened.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use phi_gate_core::AuditInput;
use phi_gate_core::AuditRecord;
use phi_gate_core::AuditStore;
use phi_gate_core::AuditStoreError;
use phi_gate_core::GeoLocation;
use phi_gate_core::RiskPolicy;
use phi_gate_core::RiskSignals;
use phi_gate_core::SubjectId;
use time::OffsetDateTime;

use crate::geo::GeoLocator;
use crate::geo::NoopGeoLocator;
use crate::geo::is_local_address;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Denial timestamps retained per subject by the JSONL index.
const MAX_DENIAL_STAMPS: usize = 1024;

// ============================================================================
// SECTION: Audit Writer
// ============================================================================

/// Clock used to timestamp records.
pub type AuditClock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// Shared writer state.
struct WriterInner {
    /// Append-only store.
    store: Arc<dyn AuditStore>,
    /// Location lookup.
    geo: Arc<dyn GeoLocator>,
    /// Risk thresholds.
    policy: RiskPolicy,
    /// Bound on each location lookup.
    geo_timeout: Duration,
    /// Timestamp source.
    clock: AuditClock,
}

/// Best-effort audit writer.
#[derive(Clone)]
pub struct AuditWriter {
    /// Shared state moved onto each write task.
    inner: Arc<WriterInner>,
}

impl AuditWriter {
    /// Creates a writer over `store` with geolocation and risk policy.
    #[must_use]
    pub fn new(
        store: Arc<dyn AuditStore>,
        geo: Arc<dyn GeoLocator>,
        policy: RiskPolicy,
        geo_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                store,
                geo,
                policy,
                geo_timeout,
                clock: Arc::new(OffsetDateTime::now_utc),
            }),
        }
    }

    /// Creates a writer with no geolocation and the default risk policy.
    #[must_use]
    pub fn with_store(store: Arc<dyn AuditStore>) -> Self {
        Self::new(store, Arc::new(NoopGeoLocator), RiskPolicy::default(), Duration::from_secs(2))
    }

    /// Returns a copy that timestamps records with `clock`.
    #[must_use]
    pub fn with_clock(self, clock: AuditClock) -> Self {
        let inner = &self.inner;
        Self {
            inner: Arc::new(WriterInner {
                store: Arc::clone(&inner.store),
                geo: Arc::clone(&inner.geo),
                policy: inner.policy.clone(),
                geo_timeout: inner.geo_timeout,
                clock,
            }),
        }
    }

    /// Records one outcome. Never fails; errors go to the diagnostic log.
    pub async fn record(&self, input: AuditInput) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.write(input).await });
        if let Err(err) = task.await {
            tracing::error!(target: "phi_gate::audit", error = %err, "audit write task failed");
        }
    }
}

impl WriterInner {
    /// Enriches, scores, seals, and appends one record.
    async fn write(&self, input: AuditInput) {
        let location = self.locate(input.ip.as_deref()).await;
        let store = Arc::clone(&self.store);
        let policy = self.policy.clone();
        let timestamp = (self.clock)();
        let result = tokio::task::spawn_blocking(move || {
            let signals = risk_signals(store.as_ref(), &policy, &input, &location, timestamp);
            let risk = policy.assess(&signals);
            let record = AuditRecord::seal(input, timestamp, location, risk);
            store.append(&record).map(|()| record)
        })
        .await;
        match result {
            Ok(Ok(record)) => {
                if record.is_suspicious {
                    tracing::warn!(
                        target: "phi_gate::audit",
                        subject = %record.subject_id,
                        action = record.action.as_str(),
                        risk_score = record.risk_score,
                        "suspicious access recorded"
                    );
                }
            }
            Ok(Err(err)) => {
                tracing::error!(target: "phi_gate::audit", error = %err, "audit append failed");
            }
            Err(err) => {
                tracing::error!(target: "phi_gate::audit", error = %err, "audit append panicked");
            }
        }
    }

    /// Resolves the caller location, falling back to an empty location.
    async fn locate(&self, ip: Option<&str>) -> GeoLocation {
        let Some(ip) = ip.and_then(|ip| ip.parse::<IpAddr>().ok()) else {
            return GeoLocation::default();
        };
        if is_local_address(ip) {
            return GeoLocation::local();
        }
        match tokio::time::timeout(self.geo_timeout, self.geo.locate(ip)).await {
            Ok(Ok(location)) => location,
            Ok(Err(err)) => {
                tracing::debug!(target: "phi_gate::geo", %ip, error = %err, "geolocation failed");
                GeoLocation::default()
            }
            Err(_) => {
                tracing::warn!(target: "phi_gate::geo", %ip, "geolocation timed out");
                GeoLocation::default()
            }
        }
    }
}

/// Gathers the risk signals for one record from the subject's history.
fn risk_signals(
    store: &dyn AuditStore,
    policy: &RiskPolicy,
    input: &AuditInput,
    location: &GeoLocation,
    now: OffsetDateTime,
) -> RiskSignals {
    let subject = &input.subject_id;
    let local_country = GeoLocation::local().country;
    let new_region = match &location.country {
        Some(country) if Some(country) != local_country.as_ref() => {
            match store.known_countries(subject) {
                Ok(mut known) => {
                    if let Some(local) = &local_country {
                        known.remove(local);
                    }
                    !known.is_empty() && !known.contains(country)
                }
                Err(err) => {
                    tracing::warn!(target: "phi_gate::audit", error = %err, "country history unavailable");
                    false
                }
            }
        }
        _ => false,
    };
    let since = now - policy.denial_window;
    let recent_denials = store.denials_since(subject, since).unwrap_or_else(|err| {
        tracing::warn!(target: "phi_gate::audit", error = %err, "denial history unavailable");
        0
    });
    RiskSignals {
        is_phi_access: input.is_phi_access,
        hour_utc: now.to_offset(time::UtcOffset::UTC).hour(),
        new_region,
        recent_denials,
        sensitive_tool: policy.is_sensitive(input.tool),
    }
}

// ============================================================================
// SECTION: JSONL Store
// ============================================================================

/// Mutable state of the JSONL store.
struct JsonlState {
    /// Append handle.
    file: File,
    /// Countries seen per subject.
    countries: BTreeMap<SubjectId, BTreeSet<String>>,
    /// Most recent denial timestamps per subject, oldest first.
    denials: BTreeMap<SubjectId, VecDeque<OffsetDateTime>>,
    /// Number of records in the file.
    count: usize,
}

impl JsonlState {
    /// Folds one record into the risk indices.
    fn index(&mut self, record: &AuditRecord) {
        if let Some(country) = record.location.country.as_ref().filter(|c| !c.is_empty()) {
            self.countries.entry(record.subject_id.clone()).or_default().insert(country.clone());
        }
        if record.action.is_denial() {
            let stamps = self.denials.entry(record.subject_id.clone()).or_default();
            if stamps.len() >= MAX_DENIAL_STAMPS {
                stamps.pop_front();
            }
            stamps.push_back(record.timestamp);
        }
        self.count = self.count.saturating_add(1);
    }

    /// Drops `subject`'s denials older than `since` and counts the rest.
    fn prune_denials(&mut self, subject: &SubjectId, since: OffsetDateTime) -> usize {
        let Some(stamps) = self.denials.get_mut(subject) else {
            return 0;
        };
        stamps.retain(|stamp| *stamp >= since);
        let count = stamps.len();
        if count == 0 {
            self.denials.remove(subject);
        }
        count
    }
}

/// Append-only JSON-lines audit store.
pub struct JsonlAuditStore {
    /// File handle and indices.
    state: Mutex<JsonlState>,
}

impl JsonlAuditStore {
    /// Opens or creates the log at `path` and rebuilds its indices.
    ///
    /// # Errors
    ///
    /// Returns [`AuditStoreError`] when the file cannot be read or opened.
    pub fn open(path: &Path) -> Result<Self, AuditStoreError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| AuditStoreError::Io(err.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| AuditStoreError::Io(err.to_string()))?;
        let mut state = JsonlState {
            file,
            countries: BTreeMap::new(),
            denials: BTreeMap::new(),
            count: 0,
        };
        let reader =
            BufReader::new(File::open(path).map_err(|err| AuditStoreError::Io(err.to_string()))?);
        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| AuditStoreError::Io(err.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(&line) {
                Ok(record) => state.index(&record),
                Err(err) => tracing::warn!(
                    target: "phi_gate::audit",
                    line = number.saturating_add(1),
                    error = %err,
                    "skipping unreadable audit line"
                ),
            }
        }
        Ok(Self { state: Mutex::new(state) })
    }

    /// Returns the number of records indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.count).unwrap_or_default()
    }

    /// Returns true when the log holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` against the locked state.
    fn with_state<T>(&self, f: impl FnOnce(&mut JsonlState) -> T) -> Result<T, AuditStoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AuditStoreError::Unavailable("audit log mutex poisoned".to_string()))?;
        Ok(f(&mut state))
    }
}

impl AuditStore for JsonlAuditStore {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditStoreError> {
        let payload =
            serde_json::to_string(record).map_err(|err| AuditStoreError::Rejected(err.to_string()))?;
        self.with_state(|state| {
            writeln!(state.file, "{payload}")
                .and_then(|()| state.file.flush())
                .map_err(|err| AuditStoreError::Io(err.to_string()))?;
            state.index(record);
            Ok(())
        })?
    }

    fn known_countries(&self, subject: &SubjectId) -> Result<BTreeSet<String>, AuditStoreError> {
        self.with_state(|state| state.countries.get(subject).cloned().unwrap_or_default())
    }

    fn denials_since(
        &self,
        subject: &SubjectId,
        since: OffsetDateTime,
    ) -> Result<u32, AuditStoreError> {
        self.with_state(|state| {
            u32::try_from(state.prune_denials(subject, since)).unwrap_or(u32::MAX)
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
