use aws_sdk_ec2::{
    error::SdkError,
    types::{Filter, Instance, InstanceType, Tag},
    Client,
};

use crate::{
    errors::{Error::API, Result},
    node::{NodeRecord, State},
    region::RegionProfile,
};

/// Creates exactly one instance and returns its id.
/// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_RunInstances.html>
pub async fn run_instance(
    cli: &Client,
    profile: &RegionProfile,
    instance_type: &str,
) -> Result<String> {
    let resp = cli
        .run_instances()
        .image_id(profile.image_id.clone())
        .instance_type(InstanceType::from(instance_type))
        .key_name(profile.key_name.clone())
        .set_security_group_ids(Some(profile.security_group_ids.clone()))
        .min_count(1)
        .max_count(1)
        .send()
        .await
        .map_err(|e| API {
            message: format!("failed run_instances {}", e),
            is_retryable: is_err_retryable(&e),
        })?;

    let instance_id = resp
        .instances()
        .and_then(|instances| instances.first())
        .and_then(|inst| inst.instance_id())
        .ok_or_else(|| API {
            message: String::from("empty instance from run_instances response"),
            is_retryable: false,
        })?;
    Ok(instance_id.to_string())
}

/// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_CreateTags.html>
pub async fn create_name_tag(cli: &Client, instance_id: &str, name: &str) -> Result<()> {
    cli.create_tags()
        .resources(instance_id.to_string())
        .tags(
            Tag::builder()
                .key(String::from("Name"))
                .value(name.to_string())
                .build(),
        )
        .send()
        .await
        .map_err(|e| API {
            message: format!("failed create_tags {}", e),
            is_retryable: is_err_retryable(&e),
        })?;
    Ok(())
}

/// Lists running and pending instances in provider page order.
/// Drains every page before returning.
/// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_DescribeInstances.html>
pub async fn describe_live_instances(cli: &Client, region: &str) -> Result<Vec<NodeRecord>> {
    let filter = Filter::builder()
        .set_name(Some(String::from("instance-state-name")))
        .set_values(Some(vec![String::from("running"), String::from("pending")]))
        .build();

    let mut records = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let resp = cli
            .describe_instances()
            .set_filters(Some(vec![filter.clone()]))
            .set_next_token(next_token.clone())
            .send()
            .await
            .map_err(|e| API {
                message: format!("failed describe_instances in {} {}", region, e),
                is_retryable: is_err_retryable(&e),
            })?;

        for rsv in resp.reservations().unwrap_or_default() {
            for inst in rsv.instances().unwrap_or_default() {
                records.push(to_record(region, inst));
            }
        }

        match resp.next_token() {
            Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
            _ => break,
        }
    }
    Ok(records)
}

/// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_StopInstances.html>
pub async fn stop_instance(cli: &Client, instance_id: &str) -> Result<()> {
    cli.stop_instances()
        .instance_ids(instance_id.to_string())
        .send()
        .await
        .map_err(|e| API {
            message: format!("failed stop_instances {}", e),
            is_retryable: is_err_retryable(&e),
        })?;
    Ok(())
}

/// Converts the SDK instance into a node record.
/// Untagged instances get an empty name and are never cluster members.
pub fn to_record(region: &str, inst: &Instance) -> NodeRecord {
    let state = inst
        .state()
        .and_then(|s| s.name())
        .map(|n| State::from(n.as_str()))
        .unwrap_or_else(|| State::Unknown(String::from("unknown")));

    let name = inst
        .tags()
        .unwrap_or_default()
        .iter()
        .find(|t| t.key() == Some("Name"))
        .and_then(|t| t.value())
        .unwrap_or_default()
        .to_string();

    let public_ipv4 = inst
        .public_ip_address()
        .filter(|ip| !ip.is_empty())
        .map(|ip| ip.to_string());

    NodeRecord {
        region: region.to_string(),
        instance_id: inst.instance_id().unwrap_or_default().to_string(),
        state,
        name,
        public_ipv4,
    }
}

#[inline]
pub fn is_err_retryable<E, R>(e: &SdkError<E, R>) -> bool {
    match e {
        SdkError::TimeoutError(_) | SdkError::ResponseError(_) => true,
        SdkError::DispatchFailure(e) => e.is_timeout() || e.is_io(),
        _ => false,
    }
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- aws::ec2::test_to_record --exact --show-output
#[test]
fn test_to_record() {
    use aws_sdk_ec2::types::{InstanceState, InstanceStateName};

    let _ = env_logger::builder().is_test(true).try_init();

    let inst = Instance::builder()
        .instance_id("i-0abc")
        .state(
            InstanceState::builder()
                .name(InstanceStateName::Running)
                .build(),
        )
        .tags(Tag::builder().key("env").value("dev").build())
        .tags(
            Tag::builder()
                .key("Name")
                .value("Quorum-cluster-a-us-east-1-T01")
                .build(),
        )
        .public_ip_address("54.1.2.3")
        .build();
    let record = to_record("us-east-1", &inst);
    assert_eq!(record.instance_id, "i-0abc");
    assert_eq!(record.state, State::Running);
    assert_eq!(record.name, "Quorum-cluster-a-us-east-1-T01");
    assert_eq!(record.public_ipv4.as_deref(), Some("54.1.2.3"));
    assert!(record.is_cluster_member("Quorum-cluster"));

    let pending = Instance::builder()
        .instance_id("i-0def")
        .state(
            InstanceState::builder()
                .name(InstanceStateName::Pending)
                .build(),
        )
        .build();
    let record = to_record("us-west-1", &pending);
    assert_eq!(record.state, State::Pending);
    assert!(record.name.is_empty());
    assert!(record.public_ipv4.is_none());
    assert!(!record.is_cluster_member("Quorum-cluster"));
}
