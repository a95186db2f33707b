use std::sync::{Mutex, Once};
use std::thread;

use genqueue_core::{
    AdmissionScheduler, Artifact, GenerationRequest, Job, JobPatch, JobStatus, JobStore,
    WorkspaceView,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(genqueue_logging::initialize_for_tests);
}

fn enqueue(store: &mut JobStore, prompt: &str) -> Job {
    let job = Job::new(GenerationRequest::new(prompt));
    store.insert(job.clone()).unwrap();
    job
}

#[test]
fn first_job_is_promoted_immediately() {
    init_logging();
    let scheduler = AdmissionScheduler::new(2);
    let mut store = JobStore::new("ws");
    let j1 = enqueue(&mut store, "j1");

    let promoted = scheduler.tick(&mut store).expect("promotion");
    assert_eq!(promoted.id, j1.id);
    assert_eq!(promoted.status, JobStatus::Generating);
    assert_eq!(store.get(j1.id).unwrap().status, JobStatus::Generating);
}

#[test]
fn third_job_waits_until_a_slot_frees() {
    init_logging();
    let scheduler = AdmissionScheduler::new(2);
    let mut store = JobStore::new("ws");
    let j1 = enqueue(&mut store, "j1");
    let j2 = enqueue(&mut store, "j2");
    let j3 = enqueue(&mut store, "j3");

    assert_eq!(scheduler.tick(&mut store).map(|j| j.id), Some(j1.id));
    assert_eq!(scheduler.tick(&mut store).map(|j| j.id), Some(j2.id));
    assert!(scheduler.tick(&mut store).is_none());
    assert_eq!(store.get(j3.id).unwrap().status, JobStatus::Queued);

    store.update(
        j1.id,
        JobPatch::completed(vec![Artifact::new("r1", b"b".to_vec())]),
    );
    assert_eq!(scheduler.tick(&mut store).map(|j| j.id), Some(j3.id));
    assert_eq!(store.count_with_status(JobStatus::Generating), 2);
}

#[test]
fn tick_advances_at_most_one_job() {
    init_logging();
    let scheduler = AdmissionScheduler::new(4);
    let mut store = JobStore::new("ws");
    enqueue(&mut store, "a");
    enqueue(&mut store, "b");

    scheduler.tick(&mut store);
    assert_eq!(store.count_with_status(JobStatus::Generating), 1);
    assert_eq!(store.count_with_status(JobStatus::Queued), 1);
}

#[test]
fn repeated_ticks_never_exceed_cap_and_keep_fifo() {
    init_logging();
    let scheduler = AdmissionScheduler::new(2);
    let mut store = JobStore::new("ws");
    let jobs: Vec<Job> = (0..6).map(|i| enqueue(&mut store, &format!("job {i}"))).collect();

    let mut promoted = Vec::new();
    for round in 0..jobs.len() {
        while let Some(job) = scheduler.tick(&mut store) {
            promoted.push(job.id);
            assert!(store.count_with_status(JobStatus::Generating) <= 2);
        }
        // Finish the oldest running job to free a slot.
        if let Some(running) = promoted.get(round) {
            store.update(*running, JobPatch::failed("done"));
        }
    }

    let expected: Vec<_> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(promoted, expected);
}

#[test]
fn zero_cap_is_raised_to_one() {
    let scheduler = AdmissionScheduler::new(0);
    assert_eq!(scheduler.max_concurrent(), 1);
}

#[test]
fn workspace_view_counts_statuses() {
    init_logging();
    let scheduler = AdmissionScheduler::new(1);
    let mut store = JobStore::new("ws");
    let a = enqueue(&mut store, "a");
    enqueue(&mut store, "b");
    scheduler.tick(&mut store);

    let view = WorkspaceView::from_store(&store);
    assert_eq!(view.workspace, "ws");
    assert_eq!(view.generating, 1);
    assert_eq!(view.queued, 1);
    assert!(view.is_busy());

    store.update(a.id, JobPatch::failed("x"));
    let view = WorkspaceView::from_store(&store);
    assert_eq!(view.failed, 1);
    assert_eq!(view.jobs.len(), 2);
}

#[test]
fn concurrent_ticks_never_exceed_the_cap() {
    init_logging();
    const THREADS: usize = 8;
    const TICKS_PER_THREAD: usize = 5;

    for _ in 0..50 {
        let scheduler = AdmissionScheduler::new(2);
        let mut store = JobStore::new("ws");
        for n in 0..6 {
            enqueue(&mut store, &format!("j{n}"));
        }
        let store = Mutex::new(store);

        let promoted: usize = thread::scope(|scope| {
            let workers: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        (0..TICKS_PER_THREAD)
                            .filter(|_| scheduler.tick(&mut store.lock().unwrap()).is_some())
                            .count()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).sum()
        });

        let store = store.into_inner().unwrap();
        assert_eq!(promoted, 2);
        assert_eq!(store.count_with_status(JobStatus::Generating), 2);
        assert_eq!(store.count_with_status(JobStatus::Queued), 4);
    }
}
