//! Quotations, their expiration, and the bills issued against them.
//!
//! Quotations are never deleted: expiry only flips the state and drops the id
//! from the per-process active index, so a job started before the deadline can
//! still be billed after it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::error::OrchestratorError;
use crate::core::process::QuoteEstimate;
use crate::core::sweeper::ExpirationSweeper;
use crate::runtime::TokioSpawner;
use crate::util::{BillId, ExecuteOptions, JobId, QuotationId};

/// Lifecycle of a quotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotationState {
    /// Can be looked up and executed.
    Active,
    /// Past its TTL; params are retained for billing.
    Expired,
}

/// A time-bounded estimate for running a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    /// Quotation identifier.
    pub id: QuotationId,
    /// Quoted process.
    pub process_id: String,
    /// Request payload replayed on execution.
    pub params: Value,
    /// Options replayed on execution.
    pub options: ExecuteOptions,
    /// Billable attributes returned by the descriptor.
    pub estimate: QuoteEstimate,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Deadline after which the quotation is expired.
    pub expires_at: DateTime<Utc>,
    /// Current state.
    pub state: QuotationState,
}

/// Record that a quotation was consumed by a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    /// Bill identifier.
    pub id: BillId,
    /// Consumed quotation.
    pub quotation_id: QuotationId,
    /// Job that consumed it.
    pub job_id: JobId,
    /// Quoted process.
    pub process_id: String,
    /// Snapshot of the quotation's billable attributes.
    pub estimate: QuoteEstimate,
    /// Issue time.
    pub created_at: DateTime<Utc>,
}

type QuotationRef = Arc<Mutex<Quotation>>;

/// State shared between the registry and the sweeper callback.
#[derive(Default)]
struct QuotationBook {
    quotations: RwLock<HashMap<QuotationId, QuotationRef>>,
    active_by_process: RwLock<HashMap<String, HashSet<QuotationId>>>,
    bills: RwLock<HashMap<BillId, Bill>>,
    bills_by_job: RwLock<HashMap<JobId, BillId>>,
}

impl QuotationBook {
    fn entry(&self, quotation_id: QuotationId) -> Result<QuotationRef, OrchestratorError> {
        self.quotations
            .read()
            .get(&quotation_id)
            .cloned()
            .ok_or(OrchestratorError::QuotationNotFound(quotation_id))
    }

    fn expire(&self, quotation_id: QuotationId) -> bool {
        let Ok(entry) = self.entry(quotation_id) else {
            debug!(quotation_id = %quotation_id, "expiry for unknown quotation ignored");
            return false;
        };
        let mut quotation = entry.lock();
        if quotation.state == QuotationState::Expired {
            return false;
        }
        quotation.state = QuotationState::Expired;
        let mut active = self.active_by_process.write();
        if let Some(ids) = active.get_mut(&quotation.process_id) {
            ids.remove(&quotation_id);
            if ids.is_empty() {
                active.remove(&quotation.process_id);
            }
        }
        info!(quotation_id = %quotation_id, process_id = %quotation.process_id, "quotation expired");
        true
    }
}

/// Registry of quotations and bills.
pub struct QuotationRegistry {
    book: Arc<QuotationBook>,
    sweeper: ExpirationSweeper,
}

impl QuotationRegistry {
    /// Create a registry whose expiration loop runs on `spawner`.
    #[must_use]
    pub fn new(spawner: &TokioSpawner) -> Self {
        let book = Arc::new(QuotationBook::default());
        let swept = Arc::clone(&book);
        let sweeper = ExpirationSweeper::start(spawner, move |id| {
            swept.expire(id);
        });
        Self { book, sweeper }
    }

    /// Create an active quotation and schedule its expiration.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Validation`] for a zero or unrepresentable TTL.
    pub fn create(
        &self,
        process_id: &str,
        params: Value,
        options: ExecuteOptions,
        estimate: QuoteEstimate,
        ttl: Duration,
    ) -> Result<Quotation, OrchestratorError> {
        if ttl.is_zero() {
            return Err(OrchestratorError::Validation(
                "quotation ttl must be positive".into(),
            ));
        }
        let lifetime = chrono::Duration::from_std(ttl)
            .map_err(|e| OrchestratorError::Validation(format!("quotation ttl: {e}")))?;
        let created_at = Utc::now();
        let quotation = Quotation {
            id: QuotationId::new(),
            process_id: process_id.to_string(),
            params,
            options,
            estimate,
            created_at,
            expires_at: created_at + lifetime,
            state: QuotationState::Active,
        };

        self.book
            .quotations
            .write()
            .insert(quotation.id, Arc::new(Mutex::new(quotation.clone())));
        self.book
            .active_by_process
            .write()
            .entry(quotation.process_id.clone())
            .or_default()
            .insert(quotation.id);
        self.sweeper
            .schedule(quotation.id, tokio::time::Instant::now() + ttl);

        info!(
            quotation_id = %quotation.id,
            process_id,
            expires_at = %quotation.expires_at,
            "quotation created"
        );
        Ok(quotation)
    }

    /// An active quotation.
    ///
    /// A quotation past its deadline is expired here even if the sweeper has
    /// not fired yet.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::QuotationNotFound`] if never created,
    /// [`OrchestratorError::Expired`] if past its TTL.
    pub fn get(&self, quotation_id: QuotationId) -> Result<Quotation, OrchestratorError> {
        let entry = self.book.entry(quotation_id)?;
        {
            let quotation = entry.lock();
            if quotation.state == QuotationState::Expired {
                return Err(OrchestratorError::Expired(quotation_id));
            }
            if Utc::now() < quotation.expires_at {
                return Ok(quotation.clone());
            }
        }
        self.book.expire(quotation_id);
        Err(OrchestratorError::Expired(quotation_id))
    }

    /// A quotation in any state.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::QuotationNotFound`] if never created.
    pub fn lookup(&self, quotation_id: QuotationId) -> Result<Quotation, OrchestratorError> {
        Ok(self.book.entry(quotation_id)?.lock().clone())
    }

    /// Retained params and options of a quotation, available after expiry.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::QuotationNotFound`] if never created.
    pub fn get_params_for_execute(
        &self,
        quotation_id: QuotationId,
    ) -> Result<(String, Value, ExecuteOptions), OrchestratorError> {
        let entry = self.book.entry(quotation_id)?;
        let quotation = entry.lock();
        Ok((
            quotation.process_id.clone(),
            quotation.params.clone(),
            quotation.options,
        ))
    }

    /// Move a quotation from active to expired. Returns `false` if unknown or
    /// already expired.
    pub fn expire(&self, quotation_id: QuotationId) -> bool {
        self.book.expire(quotation_id)
    }

    /// Issue the bill for `job_id`. A repeated call for the same job returns
    /// the bill issued first.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::QuotationNotFound`] if the quotation was never created.
    pub fn add_bill(
        &self,
        quotation_id: QuotationId,
        job_id: JobId,
    ) -> Result<Bill, OrchestratorError> {
        let (process_id, estimate) = {
            let entry = self.book.entry(quotation_id)?;
            let quotation = entry.lock();
            (quotation.process_id.clone(), quotation.estimate.clone())
        };

        let mut by_job = self.book.bills_by_job.write();
        if let Some(existing) = by_job.get(&job_id) {
            if let Some(bill) = self.book.bills.read().get(existing) {
                debug!(job_id = %job_id, bill_id = %bill.id, "bill already issued");
                return Ok(bill.clone());
            }
        }
        let bill = Bill {
            id: BillId::new(),
            quotation_id,
            job_id,
            process_id,
            estimate,
            created_at: Utc::now(),
        };
        self.book.bills.write().insert(bill.id, bill.clone());
        by_job.insert(job_id, bill.id);
        info!(bill_id = %bill.id, job_id = %job_id, quotation_id = %quotation_id, "bill created");
        Ok(bill)
    }

    /// A bill by id.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::BillNotFound`] for unknown ids.
    pub fn get_bill(&self, bill_id: BillId) -> Result<Bill, OrchestratorError> {
        self.book
            .bills
            .read()
            .get(&bill_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::BillNotFound(bill_id.to_string()))
    }

    /// The bill issued for a job.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::BillNotFound`] when the job has no bill.
    pub fn get_bill_for_job(&self, job_id: JobId) -> Result<Bill, OrchestratorError> {
        let bill_id = self
            .book
            .bills_by_job
            .read()
            .get(&job_id)
            .copied()
            .ok_or_else(|| OrchestratorError::BillNotFound(format!("job {job_id}")))?;
        self.get_bill(bill_id)
    }

    /// Active quotations of a process, oldest first.
    #[must_use]
    pub fn list_active(&self, process_id: &str) -> Vec<Quotation> {
        let ids: Vec<QuotationId> = self
            .book
            .active_by_process
            .read()
            .get(process_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        let mut active: Vec<Quotation> = ids
            .into_iter()
            .filter_map(|id| self.get(id).ok())
            .collect();
        active.sort_by_key(|q| q.created_at);
        active
    }

    /// Deadlines not yet fired by the sweeper.
    #[must_use]
    pub fn pending_expirations(&self) -> usize {
        self.sweeper.pending()
    }

    /// Stop the expiration loop.
    pub fn shutdown(&self) {
        self.sweeper.shutdown();
    }
}
