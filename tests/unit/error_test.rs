//! Tests for error types

use anyhow::Context;
use process_orchestrator::core::{AppResult, JobStatus, OrchestratorError};
use process_orchestrator::util::{ExecutionMode, JobId, QuotationId};

#[test]
fn test_error_display() {
    let job_id = JobId::new();
    let err = OrchestratorError::Timeout {
        job_id,
        timeout_secs: 30,
    };
    assert_eq!(err.to_string(), format!("job {job_id} did not finish within 30s"));

    let err = OrchestratorError::Unsupported {
        process_id: "render".into(),
        mode: ExecutionMode::Sync,
    };
    assert_eq!(err.to_string(), "process render does not support sync execution");

    let err = OrchestratorError::NotReady {
        job_id,
        status: JobStatus::Paused,
    };
    assert!(err.to_string().ends_with("(status PAUSED)"));
}

#[test]
fn test_exception_codes() {
    let job_id = JobId::new();
    let cases = [
        (OrchestratorError::Validation("x".into()), "InvalidParameterValue"),
        (OrchestratorError::ProcessNotFound("p".into()), "NoSuchProcess"),
        (OrchestratorError::JobNotFound(job_id), "NoSuchJob"),
        (OrchestratorError::QuotationNotFound(QuotationId::new()), "NoSuchQuotation"),
        (OrchestratorError::BillNotFound("b".into()), "NoSuchBill"),
        (OrchestratorError::Expired(QuotationId::new()), "QuotationExpired"),
        (OrchestratorError::Execution("boom".into()), "ExecutionFailed"),
        (OrchestratorError::Shutdown, "ServerBusy"),
        (OrchestratorError::Store("io".into()), "InternalError"),
        (
            OrchestratorError::NotDismissable {
                job_id,
                reason: "finished".into(),
            },
            "NotDismissable",
        ),
    ];
    for (err, code) in cases {
        assert_eq!(err.code(), code, "{err}");
    }
}

#[test]
fn test_not_found_variants() {
    assert!(OrchestratorError::QuotationNotFound(QuotationId::new()).is_not_found());
    assert!(OrchestratorError::BillNotFound("job".into()).is_not_found());
    assert!(!OrchestratorError::Expired(QuotationId::new()).is_not_found());
    assert!(!OrchestratorError::Validation("x".into()).is_not_found());
}

#[test]
fn test_app_result_wraps_orchestrator_errors() {
    fn lookup() -> AppResult<()> {
        Err(OrchestratorError::ProcessNotFound("echo".into())).context("loading catalog")?;
        Ok(())
    }
    let err = lookup().unwrap_err();
    assert_eq!(err.to_string(), "loading catalog");
    let root = err.downcast_ref::<OrchestratorError>().unwrap();
    assert_eq!(root, &OrchestratorError::ProcessNotFound("echo".into()));
}
