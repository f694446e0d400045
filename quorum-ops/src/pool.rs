use std::{future::Future, sync::Arc};

use tokio::sync::Semaphore;

use crate::{
    node::{NodeReport, NodeSlot},
    remote::Transport,
};

/// Runs "f" once per slot with at most "workers" slots in flight.
/// Reports come back in slot order regardless of completion order.
/// A panicking task is reported as a failed step of its own node.
pub async fn for_each_slot<T, F, Fut>(
    slots: &[NodeSlot],
    workers: usize,
    transport: Arc<T>,
    f: F,
) -> Vec<NodeReport>
where
    T: Transport + 'static,
    F: Fn(Arc<T>, NodeSlot) -> Fut,
    Fut: Future<Output = NodeReport> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));

    let mut handles = Vec::with_capacity(slots.len());
    for slot in slots.iter() {
        let fut = f(transport.clone(), slot.clone());
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            // the semaphore is never closed
            let _permit = semaphore.acquire_owned().await;
            fut.await
        }));
    }

    let mut reports = Vec::with_capacity(slots.len());
    for (slot, handle) in slots.iter().zip(handles) {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                let mut report = NodeReport::new(slot);
                report.record(
                    "worker",
                    Err(crate::errors::Error::Remote {
                        message: format!("failed await on JoinHandle {}", e),
                    }),
                );
                reports.push(report);
            }
        }
    }
    reports
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- pool::test_for_each_slot --exact --show-output
#[test]
fn test_for_each_slot() {
    use std::{path::PathBuf, sync::atomic::Ordering};

    use crate::{node::test_record, remote::fake::Recorder};

    let _ = env_logger::builder().is_test(true).try_init();

    let slots: Vec<NodeSlot> = (0..8)
        .map(|i| NodeSlot {
            index: i,
            node: test_record(
                "us-west-1",
                &format!("i-{}", i),
                "running",
                "Quorum-cluster",
                None,
            ),
            address: format!("10.1.0.{}", i),
            static_node: String::new(),
            node_key_path: PathBuf::new(),
        })
        .collect();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    let transport = Arc::new(Recorder::delayed(50));
    let work = |t: Arc<Recorder>, slot: NodeSlot| async move {
        let mut report = NodeReport::new(&slot);
        if slot.index == 5 {
            panic!("worker for node 5 died");
        }
        let ret = t.execute(&slot.address, "true").await;
        report.record("noop", ret.map(|_| ()));
        report
    };
    let reports = rt.block_on(for_each_slot(&slots, 2, transport.clone(), work));

    assert_eq!(reports.len(), 8);
    for (i, r) in reports.iter().enumerate() {
        assert_eq!(r.index, i);
    }
    assert!(reports[5].steps[0].step == "worker" && !reports[5].is_ok());
    assert_eq!(reports.iter().filter(|r| r.is_ok()).count(), 7);
    assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(transport.calls().len(), 7);
}
