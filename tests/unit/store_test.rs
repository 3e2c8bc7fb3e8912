//! Tests for result store backends

use std::sync::Arc;

use process_orchestrator::core::{JobRegistry, JobSnapshot, JobStatus, ResultStore};
use process_orchestrator::infra::{FileResultStore, InMemoryResultStore};
use process_orchestrator::util::JobId;
use serde_json::json;

/// Registers a job and walks it to success, returning each recorded snapshot.
fn lifecycle(job_id: JobId) -> Vec<JobSnapshot> {
    let jobs = JobRegistry::new();
    vec![
        jobs.add_job("render", job_id, JobStatus::Accepted, None)
            .unwrap()
            .unwrap(),
        jobs.add_job("render", job_id, JobStatus::Running, None)
            .unwrap()
            .unwrap(),
        jobs.complete(job_id, json!({ "frames": 3 })).unwrap().unwrap(),
    ]
}

#[tokio::test]
async fn test_memory_store_keeps_history() {
    let store = InMemoryResultStore::new();
    assert!(store.is_empty());

    let job_id = JobId::new();
    for snapshot in lifecycle(job_id) {
        store.persist(job_id, &snapshot).await.unwrap();
    }

    let history = store.history(job_id);
    let statuses: Vec<JobStatus> = history.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        [JobStatus::Accepted, JobStatus::Running, JobStatus::Succeeded]
    );
    let latest = store.latest(job_id).unwrap();
    assert!(latest.has_result);
    assert_eq!(latest.progress, 100);
    assert_eq!(store.len(), 1);
    assert!(store.latest(JobId::new()).is_none());
    assert!(store.history(JobId::new()).is_empty());
}

#[tokio::test]
async fn test_file_store_overwrites_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileResultStore::new(dir.path().join("jobs")).unwrap();
    assert!(store.dir().is_dir());

    let job_id = JobId::new();
    assert!(store.load(job_id).await.unwrap().is_none());

    let snapshots = lifecycle(job_id);
    for snapshot in &snapshots {
        store.persist(job_id, snapshot).await.unwrap();
    }

    let loaded = store.load(job_id).await.unwrap().unwrap();
    assert_eq!(&loaded, snapshots.last().unwrap());

    let files: Vec<_> = std::fs::read_dir(store.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(files, [format!("{job_id}.json")]);
}

#[tokio::test]
async fn test_file_store_reports_corrupt_documents() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileResultStore::new(dir.path()).unwrap();
    let job_id = JobId::new();
    std::fs::write(dir.path().join(format!("{job_id}.json")), b"{ truncated").unwrap();

    let err = store.load(job_id).await.unwrap_err();
    assert_eq!(err.code(), "InternalError");
}

#[tokio::test]
async fn test_file_store_behind_trait_object() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ResultStore> = Arc::new(FileResultStore::new(dir.path()).unwrap());
    let job_id = JobId::new();
    let first = lifecycle(job_id).remove(0);
    store.persist(job_id, &first).await.unwrap();
    assert!(dir.path().join(format!("{job_id}.json")).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_file_store_concurrent_writes_leave_one_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileResultStore::new(dir.path()).unwrap());
    let job_id = JobId::new();
    let snapshots = lifecycle(job_id);

    let writers: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            let snapshot = snapshots[i % snapshots.len()].clone();
            tokio::spawn(async move { store.persist(job_id, &snapshot).await })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    let loaded = store.load(job_id).await.unwrap().unwrap();
    assert!(snapshots.contains(&loaded));
    let files: Vec<_> = std::fs::read_dir(store.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(files, [format!("{job_id}.json")]);
}
