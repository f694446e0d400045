pub mod ec2;

use std::time::Duration;

use async_trait::async_trait;
use aws_manager::ec2 as ec2_manager;

use crate::{
    errors::Result,
    fleet::{select_members, Fleet},
    node::{instance_name, NodeRecord},
    region::RegionProfile,
    spec::Spec,
};

/// EC2-backed fleet; opens a fresh session per region on every call.
#[derive(Debug, Clone)]
pub struct AwsFleet {
    pub instance_prefix: String,
    pub regions: Vec<String>,
    pub instance_type: String,
}

impl AwsFleet {
    pub fn new(spec: &Spec) -> Self {
        Self {
            instance_prefix: spec.instance_prefix.clone(),
            regions: spec.regions.clone(),
            instance_type: spec.instance_type.clone(),
        }
    }

    async fn manager(&self, region: &str) -> ec2_manager::Manager {
        let shared_config = aws_manager::load_config(
            Some(region.to_string()),
            None,
            Some(Duration::from_secs(30)),
        )
        .await;
        ec2_manager::Manager::new(&shared_config)
    }
}

#[async_trait]
impl Fleet for AwsFleet {
    async fn provision(
        &self,
        region: &str,
        profile: &RegionProfile,
        count: usize,
        cluster_name: &str,
    ) -> Result<Vec<String>> {
        log::info!(
            "creating {} '{}' instances in {} with image {}",
            count,
            self.instance_type,
            region,
            profile.image_id
        );
        let manager = self.manager(region).await;
        let cli = &manager.cli;

        let mut created = Vec::with_capacity(count);
        for i in 0..count {
            let name = instance_name(&self.instance_prefix, cluster_name, region, i + 1);

            let ret = ec2::run_instance(cli, profile, &self.instance_type).await;
            let instance_id = match ret {
                Ok(id) => id,
                Err(e) => {
                    log::warn!("could not create instance '{}' ({})", name, e);
                    continue;
                }
            };
            log::info!("created instance {}", instance_id);

            if let Err(e) = ec2::create_name_tag(cli, &instance_id, &name).await {
                log::warn!("could not create tags for instance {} ({})", instance_id, e);
                continue;
            }
            log::info!("tagged instance {} as '{}'", instance_id, name);
            created.push(instance_id);
        }

        log::info!(
            "created {} of {} instances in {}",
            created.len(),
            count,
            region
        );
        Ok(created)
    }

    async fn inventory(&self, stop: bool) -> Result<Vec<NodeRecord>> {
        let mut members = Vec::new();
        for region in self.regions.iter() {
            let manager = self.manager(region).await;

            let records = ec2::describe_live_instances(&manager.cli, region).await?;
            let found = select_members(records, &self.instance_prefix);
            log::info!("found {} cluster instances in {}", found.len(), region);

            if stop {
                for m in found.iter() {
                    match ec2::stop_instance(&manager.cli, &m.instance_id).await {
                        Ok(_) => log::info!("stopping instance {}", m.instance_id),
                        Err(e) => log::warn!("could not stop instance {} ({})", m.instance_id, e),
                    }
                }
            }
            members.extend(found);
        }
        Ok(members)
    }
}
