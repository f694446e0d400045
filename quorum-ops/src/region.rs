use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Immutable provisioning profile shared by every region of one family.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct RegionProfile {
    /// Matched as a substring of the region id
    /// (e.g., "east" resolves "us-east-1" and "us-east-2").
    pub family: String,
    /// AMI to launch.
    pub image_id: String,
    /// EC2 key pair name installed on the instance for SSH access.
    pub key_name: String,
    /// Attached in the listed order.
    /// MUST BE NON-EMPTY.
    #[serde(default)]
    pub security_group_ids: Vec<String>,
}

/// Returns the built-in "west" and "east" profiles.
/// "west" is matched first.
pub fn default_profiles() -> Vec<RegionProfile> {
    vec![
        RegionProfile {
            family: String::from("west"),
            image_id: String::from("ami-0647199721088964c"),
            key_name: String::from("Tradove | ED25519 | dev"),
            security_group_ids: vec![
                String::from("sg-07409fa2af10a693b"), // ping
                String::from("sg-00226ca88cb8a403b"), // quorum
                String::from("sg-0cd62803f0920b1ac"), // ssh
                String::from("sg-09f35cf807118c573"), // blockscout
            ],
        },
        RegionProfile {
            family: String::from("east"),
            image_id: String::from("ami-05389a60399ebe46e"),
            key_name: String::from("Tradove Check | ED25519"),
            security_group_ids: vec![
                String::from("sg-03c8000a6a670ee66"),
                String::from("sg-02a7c0b3d9b7d647e"),
                String::from("sg-0fa2bb781e968ff1d"),
                String::from("sg-007ff1d1aaa989776"),
            ],
        },
    ]
}

/// Resolves the region id to the first profile whose family it contains.
/// An unmatched region is a configuration bug, never a runtime condition.
pub fn resolve<'a>(region: &str, profiles: &'a [RegionProfile]) -> Result<&'a RegionProfile> {
    profiles
        .iter()
        .find(|p| !p.family.is_empty() && region.contains(p.family.as_str()))
        .ok_or_else(|| Error::Config {
            message: format!("unknown region: {}", region),
        })
}

/// Splits "total" instances across "regions" in round-robin order:
/// instance i goes to regions[i % regions.len()].
/// Every region is present in the output, zero counts included.
///
/// Panics if "regions" is empty; "Spec::validate" rejects that.
pub fn partition(total: usize, regions: &[String]) -> HashMap<String, usize> {
    assert!(
        !regions.is_empty(),
        "partition requires at least one region"
    );

    let mut counts: HashMap<String, usize> =
        regions.iter().map(|r| (r.clone(), 0_usize)).collect();
    for i in 0..total {
        let region = &regions[i % regions.len()];
        *counts.entry(region.clone()).or_insert(0) += 1;
    }
    counts
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- region::test_partition --exact --show-output
#[test]
fn test_partition() {
    let _ = env_logger::builder().is_test(true).try_init();

    let regions = vec![String::from("us-east-1"), String::from("us-west-1")];

    let counts = partition(4, &regions);
    assert_eq!(counts["us-east-1"], 2);
    assert_eq!(counts["us-west-1"], 2);

    // index 0 is assigned first, so east takes the remainder
    let counts = partition(5, &regions);
    assert_eq!(counts["us-east-1"], 3);
    assert_eq!(counts["us-west-1"], 2);

    let counts = partition(0, &regions);
    assert_eq!(counts.len(), 2);
    assert!(counts.values().all(|c| *c == 0));

    let three = vec![
        String::from("us-east-1"),
        String::from("us-west-1"),
        String::from("us-west-2"),
    ];
    for rs in [&regions, &three] {
        for total in 0..50 {
            let counts = partition(total, rs);
            assert_eq!(counts.values().sum::<usize>(), total);

            let max = counts.values().max().copied().unwrap();
            let min = counts.values().min().copied().unwrap();
            assert!(max - min <= 1, "uneven split {:?}", counts);
        }
    }
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- region::test_resolve --exact --show-output
#[test]
fn test_resolve() {
    let _ = env_logger::builder().is_test(true).try_init();

    let profiles = default_profiles();

    let east = resolve("us-east-1", &profiles).unwrap();
    assert_eq!(east.image_id, "ami-05389a60399ebe46e");
    assert_eq!(east.security_group_ids.len(), 4);
    assert_eq!(resolve("us-east-2", &profiles).unwrap(), east);
    assert_eq!(resolve("us-east-1", &profiles).unwrap(), east);

    let west = resolve("us-west-1", &profiles).unwrap();
    assert_eq!(west.key_name, "Tradove | ED25519 | dev");
    assert_eq!(resolve("us-west-1", &profiles).unwrap(), west);

    // families match by substring
    assert_eq!(resolve("ap-northeast-2", &profiles).unwrap(), east);

    for unknown in ["eu-central-1", "ap-south-1", ""] {
        let ret = resolve(unknown, &profiles);
        assert!(matches!(ret, Err(Error::Config { .. })), "{}", unknown);
    }
}
