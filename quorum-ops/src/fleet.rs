use async_trait::async_trait;

use crate::{errors::Result, node::NodeRecord, region::RegionProfile};

/// Provider-side view of the cluster.
/// The provider is the only authority on which nodes exist.
#[async_trait]
pub trait Fleet: Send + Sync {
    /// Creates "count" instances in the region, one request per instance,
    /// and returns the ids of the instances that were created and tagged.
    /// A failed instance is logged and skipped.
    async fn provision(
        &self,
        region: &str,
        profile: &RegionProfile,
        count: usize,
        cluster_name: &str,
    ) -> Result<Vec<String>>;

    /// Lists live cluster members across all regions in a stable order.
    /// If "stop" is true, each member is also sent a stop request; stop
    /// failures are logged and the member is still returned.
    async fn inventory(&self, stop: bool) -> Result<Vec<NodeRecord>>;
}

/// Keeps the live instances carrying the prefix, preserving order.
pub fn select_members(records: Vec<NodeRecord>, prefix: &str) -> Vec<NodeRecord> {
    records
        .into_iter()
        .filter(|r| r.is_cluster_member(prefix))
        .collect()
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{select_members, Fleet};
    use crate::{
        errors::Result,
        node::{instance_name, test_record, NodeRecord},
        region::RegionProfile,
    };

    /// In-memory fleet: provisioned instances become running members with
    /// sequential addresses; "extra" records are mixed into every listing.
    pub struct Memory {
        pub prefix: String,
        pub records: Mutex<Vec<NodeRecord>>,
        pub provisioned: Mutex<Vec<(String, usize)>>,
        pub stopped: Mutex<Vec<String>>,
        pub inventory_calls: Mutex<usize>,
    }

    impl Memory {
        pub fn new(prefix: &str, records: Vec<NodeRecord>) -> Self {
            Self {
                prefix: prefix.to_string(),
                records: Mutex::new(records),
                provisioned: Mutex::new(Vec::new()),
                stopped: Mutex::new(Vec::new()),
                inventory_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Fleet for Memory {
        async fn provision(
            &self,
            region: &str,
            _profile: &RegionProfile,
            count: usize,
            cluster_name: &str,
        ) -> Result<Vec<String>> {
            self.provisioned
                .lock()
                .unwrap()
                .push((region.to_string(), count));

            let mut records = self.records.lock().unwrap();
            let mut ids = Vec::new();
            for i in 0..count {
                let n = records.len() + 1;
                let id = format!("i-{:04}", n);
                let ip = format!("10.0.0.{}", n);
                records.push(test_record(
                    region,
                    &id,
                    "running",
                    &instance_name(&self.prefix, cluster_name, region, i + 1),
                    Some(&ip),
                ));
                ids.push(id);
            }
            Ok(ids)
        }

        async fn inventory(&self, stop: bool) -> Result<Vec<NodeRecord>> {
            *self.inventory_calls.lock().unwrap() += 1;
            let members = select_members(self.records.lock().unwrap().clone(), &self.prefix);
            if stop {
                let mut stopped = self.stopped.lock().unwrap();
                for m in members.iter() {
                    stopped.push(m.instance_id.clone());
                }
            }
            Ok(members)
        }
    }
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- fleet::test_select_members --exact --show-output
#[test]
fn test_select_members() {
    use crate::node::test_record;

    let _ = env_logger::builder().is_test(true).try_init();

    let records = vec![
        test_record(
            "us-east-1",
            "i-1",
            "running",
            "Quorum-cluster-a-us-east-1-T01",
            Some("1.1.1.1"),
        ),
        test_record("us-east-1", "i-2", "running", "blockscout", Some("1.1.1.2")),
        test_record(
            "us-east-1",
            "i-3",
            "pending",
            "Quorum-cluster-a-us-east-1-T02",
            None,
        ),
        test_record(
            "us-west-1",
            "i-4",
            "stopped",
            "Quorum-cluster-a-us-west-1-T01",
            None,
        ),
        test_record(
            "us-west-1",
            "i-5",
            "running",
            "Quorum-cluster-a-us-west-1-T02",
            Some("2.2.2.2"),
        ),
    ];

    let members = select_members(records.clone(), "Quorum-cluster");
    let ids: Vec<&str> = members.iter().map(|m| m.instance_id.as_str()).collect();
    assert_eq!(ids, vec!["i-1", "i-3", "i-5"]);

    // filtering does not depend on the input order
    let mut reversed = records;
    reversed.reverse();
    let members = select_members(reversed, "Quorum-cluster");
    let ids: Vec<&str> = members.iter().map(|m| m.instance_id.as_str()).collect();
    assert_eq!(ids, vec!["i-5", "i-3", "i-1"]);
}
