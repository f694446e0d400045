use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Builds the "Name" tag of an instance: "[prefix]-[cluster]-[region]-T[ordinal]".
/// The ordinal is 1-based and counted per region.
pub fn instance_name(prefix: &str, cluster_name: &str, region: &str, ordinal: usize) -> String {
    format!("{}-{}-{}-T{:02}", prefix, cluster_name, region, ordinal)
}

/// Defines the EC2 instance lifecycle state.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Unknown(String),
}

impl From<&str> for State {
    fn from(s: &str) -> Self {
        match s {
            "pending" => State::Pending,
            "running" => State::Running,
            "shutting-down" => State::ShuttingDown,
            "terminated" => State::Terminated,
            "stopping" => State::Stopping,
            "stopped" => State::Stopped,
            other => State::Unknown(other.to_owned()),
        }
    }
}

impl State {
    pub fn as_str(&self) -> &str {
        match self {
            State::Pending => "pending",
            State::Running => "running",
            State::ShuttingDown => "shutting-down",
            State::Terminated => "terminated",
            State::Stopping => "stopping",
            State::Stopped => "stopped",
            State::Unknown(s) => s.as_ref(),
        }
    }

    /// Only running and pending instances are part of the live cluster.
    pub fn is_live(&self) -> bool {
        matches!(self, State::Running | State::Pending)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents one provider-reported instance.
/// Never cached; always re-fetched from the fleet inventory.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct NodeRecord {
    pub region: String,
    pub instance_id: String,
    pub state: State,
    /// Value of the "Name" tag, empty if untagged.
    pub name: String,
    /// Only assigned once the instance is running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ipv4: Option<String>,
}

impl NodeRecord {
    /// Returns true if the instance is live and carries the cluster naming prefix.
    pub fn is_cluster_member(&self, prefix: &str) -> bool {
        self.state.is_live() && self.name.contains(prefix)
    }
}

impl fmt::Display for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Instance: {}, {}, {}, {}",
            self.instance_id,
            self.state,
            self.name,
            self.public_ipv4.as_deref().unwrap_or("-"),
        )
    }
}

/// Binds one inventoried node to its generated config, by position.
/// Built once per "start" so the bootstrapper and launcher never
/// re-derive the ordering from separate sources.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct NodeSlot {
    pub index: usize,
    pub node: NodeRecord,
    /// Public address the node is reached on.
    pub address: String,
    /// Rewritten static-nodes entry for this node.
    pub static_node: String,
    /// Local path to the node's private key file.
    pub node_key_path: PathBuf,
}

/// Outcome of one remote step on one node.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct StepOutcome {
    pub step: String,
    /// Error message if the step failed.
    pub error: Option<String>,
}

/// Per-node result of a bootstrap or launch pass.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct NodeReport {
    pub index: usize,
    pub instance_id: String,
    pub address: String,
    pub steps: Vec<StepOutcome>,
}

impl NodeReport {
    pub fn new(slot: &NodeSlot) -> Self {
        Self {
            index: slot.index,
            instance_id: slot.node.instance_id.clone(),
            address: slot.address.clone(),
            steps: Vec::new(),
        }
    }

    /// Logs and records the step result; failures never stop later steps.
    pub fn record(&mut self, step: &str, ret: Result<()>) {
        let error = match ret {
            Ok(_) => {
                log::info!("[{}] {} done", self.address, step);
                None
            }
            Err(e) => {
                log::warn!(
                    "[{}] {} failed for node {} ({}): {}",
                    self.address,
                    step,
                    self.index,
                    self.instance_id,
                    e
                );
                Some(e.message())
            }
        };
        self.steps.push(StepOutcome {
            step: step.to_string(),
            error,
        });
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn is_ok(&self) -> bool {
        self.failed_steps() == 0
    }
}

#[cfg(test)]
pub(crate) fn test_record(
    region: &str,
    id: &str,
    state: &str,
    name: &str,
    ip: Option<&str>,
) -> NodeRecord {
    NodeRecord {
        region: region.to_string(),
        instance_id: id.to_string(),
        state: State::from(state),
        name: name.to_string(),
        public_ipv4: ip.map(|s| s.to_string()),
    }
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- node::test_instance_name --exact --show-output
#[test]
fn test_instance_name() {
    let _ = env_logger::builder().is_test(true).try_init();

    let name = instance_name("Quorum-cluster", "demo", "us-east-1", 1);
    assert_eq!(name, "Quorum-cluster-demo-us-east-1-T01");
    let name = instance_name("Quorum-cluster", "demo", "us-west-1", 12);
    assert_eq!(name, "Quorum-cluster-demo-us-west-1-T12");
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- node::test_cluster_member --exact --show-output
#[test]
fn test_cluster_member() {
    let _ = env_logger::builder().is_test(true).try_init();

    let prefix = "Quorum-cluster";
    let cases = [
        ("running", "Quorum-cluster-a-us-east-1-T01", true),
        ("pending", "Quorum-cluster-a-us-east-1-T02", true),
        ("stopped", "Quorum-cluster-a-us-east-1-T03", false),
        ("stopping", "Quorum-cluster-a-us-east-1-T04", false),
        ("terminated", "Quorum-cluster-a-us-east-1-T05", false),
        ("running", "blockscout", false),
        ("running", "", false),
    ];
    for (state, name, expected) in cases {
        let r = test_record("us-east-1", "i-1", state, name, None);
        assert_eq!(r.is_cluster_member(prefix), expected, "{} {}", state, name);
    }

    assert_eq!(State::from("shutting-down"), State::ShuttingDown);
    assert_eq!(
        State::from("rebooting"),
        State::Unknown(String::from("rebooting"))
    );
    assert_eq!(State::Unknown(String::from("x")).as_str(), "x");
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- node::test_report --exact --show-output
#[test]
fn test_report() {
    let _ = env_logger::builder().is_test(true).try_init();

    let slot = NodeSlot {
        index: 3,
        node: test_record(
            "us-west-1",
            "i-3",
            "running",
            "Quorum-cluster-x",
            Some("1.2.3.4"),
        ),
        address: String::from("1.2.3.4"),
        static_node: String::from("enode://c@1.2.3.4:30303"),
        node_key_path: PathBuf::from("/tmp/quorum-cluster/3/nodekey"),
    };
    let mut report = NodeReport::new(&slot);
    report.record("reset data dir", Ok(()));
    report.record(
        "upload genesis",
        Err(crate::errors::Error::Remote {
            message: String::from("connection refused"),
        }),
    );
    report.record("init", Ok(()));

    assert_eq!(report.steps.len(), 3);
    assert_eq!(report.failed_steps(), 1);
    assert!(!report.is_ok());
    assert_eq!(report.steps[1].error.as_deref(), Some("connection refused"));
}
