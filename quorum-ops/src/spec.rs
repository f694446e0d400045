use std::{
    fs::{self, File},
    io::Write,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    geth,
    region::{self, RegionProfile},
};

pub const DEFAULT_INSTANCE_PREFIX: &str = "Quorum-cluster";
pub const DEFAULT_WORKING_DIR: &str = "/tmp/quorum-cluster";
pub const DEFAULT_KEY_ENV: &str = "QUORUM_CLUSTER_ED25519";
pub const DEFAULT_WAIT_SECONDS: u64 = 3 * 60;
pub const DEFAULT_WORKERS: usize = 4;

/// Cluster configuration, passed explicitly into every pipeline.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Spec {
    /// Every instance "Name" tag starts with this prefix.
    /// The inventory matches on it, so it defines cluster membership.
    /// MUST BE NON-EMPTY.
    pub instance_prefix: String,

    /// Regions in provisioning and inventory order.
    /// MUST BE NON-EMPTY.
    pub regions: Vec<String>,
    /// Profiles matched against region ids by family.
    pub region_profiles: Vec<RegionProfile>,
    #[serde(default)]
    pub instance_type: String,

    /// Local directory holding the generated config bundle.
    /// Wiped on every "start" and "reset".
    pub working_dir: String,
    /// Grace period after provisioning before nodes are contacted.
    pub wait_seconds: u64,
    /// Maximum nodes bootstrapped or launched concurrently.
    pub workers: usize,

    /// Name of the config-generation tool binary.
    pub istanbul_bin: String,

    pub remote: Remote,
    pub geth_flags: geth::Flags,
}

/// Defines how the nodes are reached and laid out.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Remote {
    /// Environment variable holding the path to the SSH private key.
    pub key_env: String,
    pub user: String,
    pub data_dir: String,
    pub geth_bin: String,
}

impl Default for Remote {
    fn default() -> Self {
        Self {
            key_env: String::from(DEFAULT_KEY_ENV),
            user: String::from("ubuntu"),
            data_dir: String::from("/home/ubuntu/data"),
            geth_bin: String::from("/home/ubuntu/bin/geth"),
        }
    }
}

impl Spec {
    /// Creates a default spec with the built-in regions and profiles.
    pub fn default_aws() -> Self {
        Self {
            instance_prefix: String::from(DEFAULT_INSTANCE_PREFIX),

            regions: vec![String::from("us-east-1"), String::from("us-west-1")],
            region_profiles: region::default_profiles(),
            instance_type: String::from("t2.micro"),

            working_dir: String::from(DEFAULT_WORKING_DIR),
            wait_seconds: DEFAULT_WAIT_SECONDS,
            workers: DEFAULT_WORKERS,

            istanbul_bin: String::from("istanbul"),

            remote: Remote::default(),
            geth_flags: geth::Flags::default(),
        }
    }

    /// Converts to string in YAML format.
    pub fn encode_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self).map_err(|e| Error::Io {
            message: format!("failed to serialize Spec to YAML {}", e),
        })
    }

    /// Saves the current spec to disk
    /// and overwrites the file.
    pub fn sync(&self, file_path: &str) -> Result<()> {
        log::info!("syncing Spec to '{}'", file_path);
        let path = Path::new(file_path);
        if let Some(parent_dir) = path.parent() {
            fs::create_dir_all(parent_dir)?;
        }

        let d = self.encode_yaml()?;
        let mut f = File::create(file_path)?;
        f.write_all(d.as_bytes())?;

        Ok(())
    }

    pub fn load(file_path: &str) -> Result<Self> {
        log::info!("loading Spec from {}", file_path);

        if !Path::new(file_path).exists() {
            return Err(Error::Io {
                message: format!("file {} does not exists", file_path),
            });
        }

        let f = File::open(file_path).map_err(|e| Error::Io {
            message: format!("failed to open {} ({})", file_path, e),
        })?;
        serde_yaml::from_reader(f).map_err(|e| Error::Config {
            message: format!("invalid YAML: {}", e),
        })
    }

    /// Validates the spec.
    pub fn validate(&self) -> Result<()> {
        log::info!("validating Spec");

        if self.instance_prefix.is_empty() {
            return Err(invalid("'instance_prefix' cannot be empty"));
        }
        if self.regions.is_empty() {
            return Err(invalid("'regions' cannot be empty"));
        }
        if self.working_dir.is_empty() || self.working_dir == "/" {
            return Err(invalid(&format!(
                "'working_dir' {:?} is not allowed",
                self.working_dir
            )));
        }
        if self.workers == 0 {
            return Err(invalid("'workers' must be >0"));
        }
        if self.istanbul_bin.is_empty() {
            return Err(invalid("'istanbul_bin' cannot be empty"));
        }
        if self.remote.key_env.is_empty() {
            return Err(invalid("'remote.key_env' cannot be empty"));
        }

        for p in self.region_profiles.iter() {
            if p.family.is_empty() {
                return Err(invalid("'region_profiles[].family' cannot be empty"));
            }
            if p.security_group_ids.is_empty() {
                return Err(invalid(&format!(
                    "region profile '{}' has no security groups",
                    p.family
                )));
            }
        }

        // catch unknown regions before any provider call
        for r in self.regions.iter() {
            region::resolve(r, &self.region_profiles)?;
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> Error {
    Error::Config {
        message: msg.to_string(),
    }
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- spec::test_spec --exact --show-output
#[test]
fn test_spec() {
    let _ = env_logger::builder().is_test(true).try_init();

    let contents = r#"

instance_prefix: Quorum-test
regions:
- us-west-2
- us-east-2
region_profiles:
- family: west
  image_id: ami-west
  key_name: west-key
  security_group_ids:
  - sg-1
- family: east
  image_id: ami-east
  key_name: east-key
  security_group_ids:
  - sg-2
  - sg-3
instance_type: t3.large
working_dir: /tmp/quorum-test
wait_seconds: 30
workers: 2
istanbul_bin: /usr/local/bin/istanbul
remote:
  key_env: MY_KEY
  user: admin
  data_dir: /data
  geth_bin: /usr/bin/geth
geth_flags:
  network_id: 99
  block_period: 1
  max_peers: 5
  txpool_account_slots: 1
  txpool_global_slots: 2
  txpool_account_queue: 3
  txpool_global_queue: 4
  http_api: [eth, net]
  ws_api: [eth]
  ws_port: 9546
  verbosity: 4

"#;
    let mut f = tempfile::NamedTempFile::new().unwrap();
    let ret = f.write_all(contents.as_bytes());
    assert!(ret.is_ok());
    let spec_path = f.path().to_str().unwrap();

    let spec = Spec::load(spec_path).unwrap();
    spec.validate().expect("unexpected validate failure");

    assert_eq!(spec.instance_prefix, "Quorum-test");
    assert_eq!(spec.regions, vec!["us-west-2", "us-east-2"]);
    assert_eq!(
        spec.region_profiles[1].security_group_ids,
        vec!["sg-2", "sg-3"]
    );
    assert_eq!(spec.workers, 2);
    assert_eq!(spec.remote.user, "admin");
    assert_eq!(spec.geth_flags.network_id, 99);
    assert_eq!(spec.geth_flags.http_api, vec!["eth", "net"]);

    let ret = spec.sync(spec_path);
    assert!(ret.is_ok());
    let reloaded = Spec::load(spec_path).unwrap();
    assert_eq!(spec, reloaded);

    let dir = tempfile::tempdir().unwrap();
    let default_path = dir.path().join("nested").join("default.yaml");
    let default_path = default_path.to_str().unwrap();
    let orig = Spec::default_aws();
    orig.validate().expect("unexpected validate failure");
    orig.sync(default_path).unwrap();
    assert_eq!(Spec::load(default_path).unwrap(), orig);

    assert!(matches!(
        Spec::load("/definitely/not/here.yaml"),
        Err(Error::Io { .. })
    ));
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- spec::test_validate --exact --show-output
#[test]
fn test_validate() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut spec = Spec::default_aws();
    spec.regions.push(String::from("eu-central-1"));
    assert!(matches!(spec.validate(), Err(Error::Config { .. })));

    let mut spec = Spec::default_aws();
    spec.regions.clear();
    assert!(spec.validate().is_err());

    let mut spec = Spec::default_aws();
    spec.workers = 0;
    assert!(spec.validate().is_err());

    let mut spec = Spec::default_aws();
    spec.working_dir = String::from("/");
    assert!(spec.validate().is_err());

    let mut spec = Spec::default_aws();
    spec.region_profiles[0].security_group_ids.clear();
    assert!(spec.validate().is_err());
}
