use std::sync::Arc;

use crate::{
    geth,
    istanbul::{Bundle, GENESIS_FILE},
    node::{NodeReport, NodeSlot},
    pool,
    remote::Transport,
    spec::Spec,
};

/// Remote paths and commands shared by every node.
#[derive(Debug, Clone)]
struct Plan {
    bundle: Bundle,
    data_dir: String,
    reset_cmd: String,
    init_cmd: String,
}

/// Pushes the bundle to every slot and initializes its chain store.
///
/// Per node, in order: reset the data directory, upload the static nodes,
/// upload the genesis, run "geth init", upload the node key. Each step is
/// attempted and logged even if an earlier step or another node failed.
pub async fn bootstrap<T>(
    spec: &Spec,
    bundle: &Bundle,
    slots: &[NodeSlot],
    transport: Arc<T>,
) -> Vec<NodeReport>
where
    T: Transport + 'static,
{
    let data_dir = spec.remote.data_dir.clone();
    let plan = Arc::new(Plan {
        bundle: bundle.clone(),
        reset_cmd: format!("rm -rf {data_dir};mkdir {data_dir}"),
        init_cmd: geth::init_command(&spec.remote.geth_bin, &data_dir),
        data_dir,
    });
    log::info!(
        "bootstrapping {} nodes with {} workers",
        slots.len(),
        spec.workers
    );

    pool::for_each_slot(slots, spec.workers, transport, move |transport, slot| {
        let plan = plan.clone();
        async move { bootstrap_node(&plan, &slot, transport.as_ref()).await }
    })
    .await
}

async fn bootstrap_node<T>(plan: &Plan, slot: &NodeSlot, transport: &T) -> NodeReport
where
    T: Transport + ?Sized,
{
    let host = slot.address.as_str();
    let mut report = NodeReport::new(slot);

    let ret = transport.execute(host, &plan.reset_cmd).await;
    report.record("data directory reset", ret.map(|_| ()));

    let ret = transport
        .copy(&plan.bundle.static_nodes_path(), host, &plan.data_dir)
        .await;
    report.record("static-nodes.json upload", ret);

    let ret = transport
        .copy(&plan.bundle.genesis_path(), host, &plan.data_dir)
        .await;
    report.record(&format!("{} upload", GENESIS_FILE), ret);

    let ret = transport.execute(host, &plan.init_cmd).await;
    report.record("data directory init", ret.map(|_| ()));

    let key_dir = format!("{}/geth", plan.data_dir);
    let ret = transport.copy(&slot.node_key_path, host, &key_dir).await;
    report.record("nodekey upload", ret);

    report
}

#[cfg(test)]
fn test_slots(n: usize, dir: &str) -> Vec<NodeSlot> {
    use crate::node::test_record;

    let bundle = Bundle::new(dir);
    (0..n)
        .map(|i| {
            let ip = format!("10.0.0.{}", i + 1);
            NodeSlot {
                index: i,
                node: test_record(
                    "us-east-1",
                    &format!("i-{}", i),
                    "running",
                    "Quorum-cluster-t",
                    Some(&ip),
                ),
                static_node: format!("enode://k{}@{}:30303", i, ip),
                address: ip,
                node_key_path: bundle.node_key_path(i),
            }
        })
        .collect()
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- bootstrap::test_bootstrap --exact --show-output
#[test]
fn test_bootstrap() {
    use crate::remote::fake::Recorder;

    let _ = env_logger::builder().is_test(true).try_init();

    macro_rules! ab {
        ($e:expr) => {
            tokio_test::block_on($e)
        };
    }

    let spec = Spec::default_aws();
    let bundle = Bundle::new("/tmp/quorum-cluster");
    let slots = test_slots(2, "/tmp/quorum-cluster");

    let transport = Arc::new(Recorder::default());
    let reports = ab!(bootstrap(&spec, &bundle, &slots, transport.clone()));
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_ok()));

    let calls = transport.calls();
    assert_eq!(calls.len(), 10);
    let node0: Vec<&String> = calls.iter().filter(|c| c.contains("10.0.0.1")).collect();
    assert_eq!(
        node0,
        vec![
            "execute 10.0.0.1 rm -rf /home/ubuntu/data;mkdir /home/ubuntu/data",
            "copy /tmp/quorum-cluster/static-nodes.json 10.0.0.1:/home/ubuntu/data",
            "copy /tmp/quorum-cluster/genesis.json 10.0.0.1:/home/ubuntu/data",
            "execute 10.0.0.1 /home/ubuntu/bin/geth --datadir /home/ubuntu/data init /home/ubuntu/data/genesis.json",
            "copy /tmp/quorum-cluster/0/nodekey 10.0.0.1:/home/ubuntu/data/geth",
        ]
    );
    let node1_key = "copy /tmp/quorum-cluster/1/nodekey 10.0.0.2:/home/ubuntu/data/geth";
    assert!(calls.iter().any(|c| c == node1_key));
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- bootstrap::test_bootstrap_isolation --exact --show-output
#[test]
fn test_bootstrap_isolation() {
    use crate::remote::fake::Recorder;

    let _ = env_logger::builder().is_test(true).try_init();

    macro_rules! ab {
        ($e:expr) => {
            tokio_test::block_on($e)
        };
    }

    let spec = Spec::default_aws();
    let bundle = Bundle::new("/tmp/quorum-cluster");
    let slots = test_slots(3, "/tmp/quorum-cluster");

    // genesis uploads fail everywhere, node 2 is unreachable
    let transport = Arc::new(Recorder::failing(&["genesis.json 10.0.0", "10.0.0.2"]));
    let reports = ab!(bootstrap(&spec, &bundle, &slots, transport.clone()));

    assert_eq!(reports.len(), 3);
    for r in reports.iter() {
        // every step is still attempted
        assert_eq!(r.steps.len(), 5);
    }
    assert_eq!(reports[0].failed_steps(), 1);
    assert_eq!(reports[1].address, "10.0.0.2");
    assert_eq!(reports[1].failed_steps(), 5);
    assert_eq!(reports[2].failed_steps(), 1);
    assert_eq!(reports[2].steps[4].step, "nodekey upload");
    assert!(reports[2].steps[4].error.is_none());
    assert_eq!(transport.calls().len(), 15);
}
