use std::{
    io::{self, stdout},
    sync::Arc,
};

use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use tokio::time::Duration;

use crate::{
    bootstrap,
    errors::{Error, Result},
    fleet::Fleet,
    geth, istanbul,
    node::{NodeRecord, NodeReport, NodeSlot},
    region,
    remote::Transport,
    spec::Spec,
    wait, workdir,
};

/// Parameters of one "start" invocation.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Total number of nodes across all regions.
    pub count: usize,
    pub cluster_name: String,
    /// Skips provisioning and targets the fleet that already exists.
    pub current_ec2: bool,
}

/// What a "start" pipeline did to every node.
#[derive(Debug, Clone)]
pub struct StartReport {
    pub slots: Vec<NodeSlot>,
    pub bootstrap: Vec<NodeReport>,
    pub launch: Vec<NodeReport>,
}

impl StartReport {
    /// Number of nodes with at least one failed bootstrap or launch step.
    pub fn failed_nodes(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| {
                self.bootstrap
                    .iter()
                    .chain(self.launch.iter())
                    .any(|r| r.index == s.index && !r.is_ok())
            })
            .count()
    }
}

/// Provisions (unless "current_ec2"), generates, distributes and launches
/// the cluster. Holds the working directory lock for the whole pipeline.
///
/// Fatal errors (invalid spec, count drift, tool failure) abort before
/// anything is uploaded. Per-node remote failures are only reported.
pub async fn start<F, T>(
    spec: &Spec,
    fleet: &F,
    transport: Arc<T>,
    opts: &StartOptions,
) -> Result<StartReport>
where
    F: Fleet + ?Sized,
    T: Transport + 'static,
{
    spec.validate()?;

    let mut lock = workdir::open_lock(&spec.working_dir)?;
    let _guard = lock
        .try_write()
        .map_err(|_| workdir::busy(&spec.working_dir))?;

    if opts.current_ec2 {
        step(&format!("check {} existing cluster instances", opts.count))?;
        let nodes = fleet.inventory(false).await?;
        if nodes.len() != opts.count {
            return Err(Error::Consistency {
                message: format!(
                    "expected {} running cluster instances, found {}",
                    opts.count,
                    nodes.len()
                ),
            });
        }
    } else {
        let regions = spec.regions.join(", ");
        step(&format!("create {} instances in {}", opts.count, regions))?;
        let counts = region::partition(opts.count, &spec.regions);
        for r in spec.regions.iter() {
            let n = counts.get(r).copied().unwrap_or(0);
            if n == 0 {
                log::info!("no instance assigned to {}", r);
                continue;
            }
            let profile = region::resolve(r, &spec.region_profiles)?;
            let created = fleet.provision(r, profile, n, &opts.cluster_name).await?;
            if created.len() < n {
                log::warn!("only {} of {} instances created in {}", created.len(), n, r);
            }
        }

        step("wait for instances")?;
        wait::wait_for_instances(Duration::from_secs(spec.wait_seconds)).await?;
    }

    step("generate node identities and genesis")?;
    workdir::reset(&spec.working_dir)?;
    let (bundle, slots) = istanbul::generate(spec, fleet, opts.count).await?;

    step("bootstrap nodes")?;
    let bootstrap = bootstrap::bootstrap(spec, &bundle, &slots, transport.clone()).await;

    step("launch blockchain network")?;
    let nodes = fleet.inventory(false).await?;
    verify_slots(opts.count, &slots, &nodes)?;
    let launch = geth::launch(spec, &slots, transport).await?;

    let report = StartReport {
        slots,
        bootstrap,
        launch,
    };
    log::info!(
        "started cluster '{}' with {} nodes ({} with failed steps)",
        opts.cluster_name,
        report.slots.len(),
        report.failed_nodes()
    );
    Ok(report)
}

/// Fails if the live fleet no longer holds "count" nodes or no longer
/// matches the slots position by position.
pub fn verify_slots(count: usize, slots: &[NodeSlot], nodes: &[NodeRecord]) -> Result<()> {
    if nodes.len() != count {
        return Err(Error::Consistency {
            message: format!(
                "launch count mismatch: {} requested nodes, {} in fleet",
                count,
                nodes.len()
            ),
        });
    }
    if slots.len() != count {
        return Err(Error::Consistency {
            message: format!(
                "launch count mismatch: {} requested nodes, {} configured",
                count,
                slots.len()
            ),
        });
    }
    for (slot, node) in slots.iter().zip(nodes) {
        if slot.node.instance_id != node.instance_id {
            return Err(Error::Consistency {
                message: format!(
                    "node {} was {} but the fleet now reports {}",
                    slot.index, slot.node.instance_id, node.instance_id
                ),
            });
        }
    }
    Ok(())
}

/// Prints every live cluster member.
pub async fn list<F>(fleet: &F) -> Result<Vec<NodeRecord>>
where
    F: Fleet + ?Sized,
{
    let nodes = fleet.inventory(false).await?;
    for n in nodes.iter() {
        println!("{}", n);
    }
    log::info!("listed {} cluster instances", nodes.len());
    Ok(nodes)
}

/// Sends a stop request to every live cluster member and prints them.
pub async fn stop<F>(fleet: &F) -> Result<Vec<NodeRecord>>
where
    F: Fleet + ?Sized,
{
    let nodes = fleet.inventory(true).await?;
    for n in nodes.iter() {
        println!("{}", n);
    }
    log::info!("requested stop for {} cluster instances", nodes.len());
    Ok(nodes)
}

/// Wipes the working directory under the lock.
pub fn reset(spec: &Spec) -> Result<()> {
    let mut lock = workdir::open_lock(&spec.working_dir)?;
    let _guard = lock
        .try_write()
        .map_err(|_| workdir::busy(&spec.working_dir))?;
    workdir::reset(&spec.working_dir)
}

fn step(msg: &str) -> io::Result<()> {
    execute!(
        stdout(),
        SetForegroundColor(Color::Green),
        Print(format!("\n\n\nSTEP: {}\n", msg)),
        ResetColor
    )
}

#[cfg(test)]
fn test_spec(dir: &std::path::Path) -> Spec {
    let mut spec = Spec::default_aws();
    spec.working_dir = dir.join("cluster").to_str().unwrap().to_string();
    spec.istanbul_bin = istanbul::fake_setup_tool(dir);
    spec.wait_seconds = 0;
    spec
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- orchestrator::test_start --exact --show-output
#[test]
fn test_start() {
    use crate::{fleet::fake::Memory, node::test_record, remote::fake::Recorder};

    let _ = env_logger::builder().is_test(true).try_init();

    macro_rules! ab {
        ($e:expr) => {
            tokio_test::block_on($e)
        };
    }

    let tmp = tempfile::tempdir().unwrap();
    let spec = test_spec(tmp.path());

    // a non-member instance never becomes a node
    let fleet = Memory::new(
        "Quorum-cluster",
        vec![test_record(
            "us-east-1",
            "i-blockscout",
            "running",
            "blockscout",
            Some("9.9.9.9"),
        )],
    );
    let transport = Arc::new(Recorder::default());
    let opts = StartOptions {
        count: 3,
        cluster_name: String::from("test"),
        current_ec2: false,
    };

    let report = ab!(start(&spec, &fleet, transport.clone(), &opts)).unwrap();
    assert_eq!(
        *fleet.provisioned.lock().unwrap(),
        vec![
            (String::from("us-east-1"), 2),
            (String::from("us-west-1"), 1)
        ]
    );
    assert_eq!(report.slots.len(), 3);
    assert_eq!(report.failed_nodes(), 0);
    assert_eq!(*fleet.inventory_calls.lock().unwrap(), 2);

    let addresses: Vec<&str> = report.slots.iter().map(|s| s.address.as_str()).collect();
    assert_eq!(addresses, vec!["10.0.0.2", "10.0.0.3", "10.0.0.4"]);
    assert_eq!(
        report.slots[1].static_node,
        "enode://key1@10.0.0.3:30303?discport=0"
    );
    assert_eq!(
        report.slots[2].node.name,
        "Quorum-cluster-test-us-west-1-T01"
    );

    let bundle = istanbul::Bundle::new(&spec.working_dir);
    let entries = bundle.read_static_nodes().unwrap();
    assert_eq!(entries[0], "enode://key0@10.0.0.2:30303?discport=0");

    let calls = transport.calls();
    assert_eq!(calls.len(), 3 * 5 + 3);
    let launch_cmd = "execute 10.0.0.4 PRIVATE_CONFIG=ignore nohup";
    assert!(calls.iter().any(|c| c.starts_with(launch_cmd)));
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- orchestrator::test_start_mismatch --exact --show-output
#[test]
fn test_start_mismatch() {
    use crate::{fleet::fake::Memory, node::test_record, remote::fake::Recorder};

    let _ = env_logger::builder().is_test(true).try_init();

    macro_rules! ab {
        ($e:expr) => {
            tokio_test::block_on($e)
        };
    }

    let tmp = tempfile::tempdir().unwrap();
    let spec = test_spec(tmp.path());
    let existing = vec![
        test_record(
            "us-east-1",
            "i-1",
            "running",
            "Quorum-cluster-old-us-east-1-T01",
            Some("1.1.1.1"),
        ),
        test_record(
            "us-west-1",
            "i-2",
            "running",
            "Quorum-cluster-old-us-west-1-T01",
            Some("2.2.2.2"),
        ),
    ];

    // current fleet is smaller than requested: fails before generating
    let fleet = Memory::new("Quorum-cluster", existing.clone());
    let transport = Arc::new(Recorder::default());
    let opts = StartOptions {
        count: 3,
        cluster_name: String::from("old"),
        current_ec2: true,
    };
    let ret = ab!(start(&spec, &fleet, transport.clone(), &opts));
    assert!(matches!(ret, Err(Error::Consistency { .. })));
    assert!(fleet.provisioned.lock().unwrap().is_empty());
    assert!(!istanbul::Bundle::new(&spec.working_dir)
        .static_nodes_path()
        .exists());
    assert!(transport.calls().is_empty());

    // leftover members from another cluster inflate the inventory:
    // the generated bundle no longer matches and nothing is uploaded
    let fleet = Memory::new("Quorum-cluster", existing);
    let opts = StartOptions {
        count: 2,
        cluster_name: String::from("new"),
        current_ec2: false,
    };
    let ret = ab!(start(&spec, &fleet, transport.clone(), &opts));
    assert!(matches!(ret, Err(Error::Consistency { .. })));
    assert_eq!(fleet.provisioned.lock().unwrap().len(), 2);
    assert!(transport.calls().is_empty());

    // the setup tool fails: aborted before the inventory is read
    let mut broken = spec.clone();
    broken.istanbul_bin = String::from("/bin/false");
    let fleet = Memory::new("Quorum-cluster", Vec::new());
    let opts = StartOptions {
        count: 0,
        cluster_name: String::from("x"),
        current_ec2: true,
    };
    let ret = ab!(start(&broken, &fleet, transport.clone(), &opts));
    assert!(matches!(ret, Err(Error::Tool { .. })));
    assert_eq!(*fleet.inventory_calls.lock().unwrap(), 1);
    assert!(transport.calls().is_empty());
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- orchestrator::test_verify_slots --exact --show-output
#[test]
fn test_verify_slots() {
    use crate::node::test_record;

    let _ = env_logger::builder().is_test(true).try_init();

    let nodes = vec![
        test_record(
            "us-east-1",
            "i-1",
            "running",
            "Quorum-cluster-a-us-east-1-T01",
            Some("1.1.1.1"),
        ),
        test_record(
            "us-west-1",
            "i-2",
            "running",
            "Quorum-cluster-a-us-west-1-T01",
            Some("2.2.2.2"),
        ),
    ];
    let slots: Vec<NodeSlot> = nodes
        .iter()
        .enumerate()
        .map(|(index, n)| NodeSlot {
            index,
            node: n.clone(),
            address: n.public_ipv4.clone().unwrap(),
            static_node: String::new(),
            node_key_path: std::path::PathBuf::new(),
        })
        .collect();

    assert!(verify_slots(2, &slots, &nodes).is_ok());
    assert!(matches!(
        verify_slots(2, &slots, &nodes[..1]),
        Err(Error::Consistency { .. })
    ));

    // slots and fleet agree with each other but not with the requested count
    assert!(matches!(
        verify_slots(3, &slots, &nodes),
        Err(Error::Consistency { .. })
    ));
    assert!(verify_slots(1, &slots[..1], &nodes[..1]).is_ok());

    let mut reordered = nodes.clone();
    reordered.swap(0, 1);
    assert!(matches!(
        verify_slots(2, &slots, &reordered),
        Err(Error::Consistency { .. })
    ));
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- orchestrator::test_list_stop_reset --exact --show-output
#[test]
fn test_list_stop_reset() {
    use crate::{fleet::fake::Memory, node::test_record};

    let _ = env_logger::builder().is_test(true).try_init();

    macro_rules! ab {
        ($e:expr) => {
            tokio_test::block_on($e)
        };
    }

    let fleet = Memory::new(
        "Quorum-cluster",
        vec![
            test_record(
                "us-east-1",
                "i-1",
                "running",
                "Quorum-cluster-a-us-east-1-T01",
                Some("1.1.1.1"),
            ),
            test_record(
                "us-east-1",
                "i-2",
                "stopped",
                "Quorum-cluster-a-us-east-1-T02",
                None,
            ),
            test_record(
                "us-west-1",
                "i-3",
                "pending",
                "Quorum-cluster-a-us-west-1-T01",
                None,
            ),
        ],
    );

    let listed = ab!(list(&fleet)).unwrap();
    assert_eq!(listed.len(), 2);
    assert!(fleet.stopped.lock().unwrap().is_empty());

    let stopped = ab!(stop(&fleet)).unwrap();
    assert_eq!(stopped, listed);
    assert_eq!(
        *fleet.stopped.lock().unwrap(),
        vec![String::from("i-1"), String::from("i-3")]
    );

    let tmp = tempfile::tempdir().unwrap();
    let mut spec = Spec::default_aws();
    spec.working_dir = tmp.path().join("missing").to_str().unwrap().to_string();
    reset(&spec).unwrap();
    assert!(tmp.path().join("missing").is_dir());

    // a concurrent invocation holding the lock makes reset fail fast
    let mut held = workdir::open_lock(&spec.working_dir).unwrap();
    let _guard = held.try_write().unwrap();
    assert!(matches!(reset(&spec), Err(Error::Io { .. })));
}
