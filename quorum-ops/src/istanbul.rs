use std::{
    fs::{self, File},
    path::PathBuf,
};

use tokio::process::Command;

use crate::{
    errors::{Error, Result},
    fleet::Fleet,
    node::{NodeRecord, NodeSlot},
    spec::Spec,
};

pub const STATIC_NODES_FILE: &str = "static-nodes.json";
pub const GENESIS_FILE: &str = "genesis.json";
pub const NODE_KEY_FILE: &str = "nodekey";

/// Address written by the setup tool in every static-nodes entry.
pub const PLACEHOLDER_ADDRESS: &str = "0.0.0.0";

/// Files produced by "istanbul setup" in the working directory.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Bundle {
    pub dir: PathBuf,
}

impl Bundle {
    pub fn new(dir: &str) -> Self {
        Self {
            dir: PathBuf::from(dir),
        }
    }

    pub fn static_nodes_path(&self) -> PathBuf {
        self.dir.join(STATIC_NODES_FILE)
    }

    pub fn genesis_path(&self) -> PathBuf {
        self.dir.join(GENESIS_FILE)
    }

    /// Key directories are named by node index.
    pub fn node_key_path(&self, index: usize) -> PathBuf {
        self.dir.join(index.to_string()).join(NODE_KEY_FILE)
    }

    pub fn read_static_nodes(&self) -> Result<Vec<String>> {
        let path = self.static_nodes_path();
        let f = File::open(&path).map_err(|e| Error::Io {
            message: format!("failed to open {} ({})", path.display(), e),
        })?;
        serde_json::from_reader(f).map_err(|e| Error::Io {
            message: format!("invalid static nodes JSON {} ({})", path.display(), e),
        })
    }

    pub fn write_static_nodes(&self, entries: &[String]) -> Result<()> {
        let path = self.static_nodes_path();
        let d = serde_json::to_vec(entries).map_err(|e| Error::Io {
            message: format!("failed to serialize static nodes {}", e),
        })?;
        fs::write(&path, d).map_err(|e| Error::Io {
            message: format!("failed to write {} ({})", path.display(), e),
        })
    }
}

/// Runs "istanbul setup" for "count" nodes inside the bundle directory.
pub async fn run_setup(istanbul_bin: &str, bundle: &Bundle, count: usize) -> Result<()> {
    log::info!(
        "generating {} node identities with '{}' in {}",
        count,
        istanbul_bin,
        bundle.dir.display()
    );

    let out = Command::new(istanbul_bin)
        .args(["setup", "--num", &count.to_string()])
        .args(["--nodes", "--quorum", "--save", "--verbose"])
        .current_dir(&bundle.dir)
        .output()
        .await
        .map_err(|e| Error::Tool {
            message: format!("failed to spawn '{}' ({})", istanbul_bin, e),
        })?;
    if !out.status.success() {
        return Err(Error::Tool {
            message: format!(
                "'{} setup' exited with {}: {}",
                istanbul_bin,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ),
        });
    }
    log::debug!("istanbul output:\n{}", String::from_utf8_lossy(&out.stdout));

    Ok(())
}

/// Replaces the placeholder of entry i with address i.
/// Only the first placeholder occurrence is touched.
pub fn substitute_addresses(entries: &[String], addresses: &[String]) -> Result<Vec<String>> {
    if entries.len() != addresses.len() {
        return Err(Error::Consistency {
            message: format!(
                "static nodes replacement mismatch: {} nodes in fleet, {} static nodes",
                addresses.len(),
                entries.len()
            ),
        });
    }
    Ok(entries
        .iter()
        .zip(addresses)
        .map(|(entry, addr)| entry.replacen(PLACEHOLDER_ADDRESS, addr, 1))
        .collect())
}

/// Binds the inventoried nodes to the generated bundle by position and
/// persists the rewritten static nodes.
/// Fails without touching the file if the counts disagree or a node has
/// no public address yet.
pub fn assign_slots(bundle: &Bundle, nodes: Vec<NodeRecord>) -> Result<Vec<NodeSlot>> {
    let entries = bundle.read_static_nodes()?;
    if entries.len() != nodes.len() {
        return Err(Error::Consistency {
            message: format!(
                "static nodes replacement mismatch: {} nodes in fleet, {} static nodes",
                nodes.len(),
                entries.len()
            ),
        });
    }

    let mut addresses = Vec::with_capacity(nodes.len());
    for n in nodes.iter() {
        match &n.public_ipv4 {
            Some(ip) if !ip.is_empty() => addresses.push(ip.clone()),
            _ => {
                return Err(Error::Consistency {
                    message: format!(
                        "instance {} ({}) has no public address yet",
                        n.instance_id, n.state
                    ),
                })
            }
        }
    }

    let rewritten = substitute_addresses(&entries, &addresses)?;
    bundle.write_static_nodes(&rewritten)?;

    println!("Static nodes:");
    for entry in rewritten.iter() {
        println!("{}", entry);
    }

    Ok(nodes
        .into_iter()
        .zip(addresses)
        .zip(rewritten)
        .enumerate()
        .map(|(index, ((node, address), static_node))| NodeSlot {
            index,
            node,
            address,
            static_node,
            node_key_path: bundle.node_key_path(index),
        })
        .collect())
}

/// Generates the config bundle for "count" nodes and binds it to the
/// live inventory. The working directory must already be reset.
pub async fn generate<F>(spec: &Spec, fleet: &F, count: usize) -> Result<(Bundle, Vec<NodeSlot>)>
where
    F: Fleet + ?Sized,
{
    let bundle = Bundle::new(&spec.working_dir);
    run_setup(&spec.istanbul_bin, &bundle, count).await?;

    let nodes = fleet.inventory(false).await?;
    let slots = assign_slots(&bundle, nodes)?;
    Ok((bundle, slots))
}

/// Writes a stand-in for "istanbul" that lays out a bundle like the real tool.
#[cfg(test)]
pub(crate) fn fake_setup_tool(dir: &std::path::Path) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("istanbul");
    fs::write(
        &path,
        r#"#!/bin/sh
n=$3
printf '[' > static-nodes.json
i=0
while [ "$i" -lt "$n" ]; do
  if [ "$i" -gt 0 ]; then printf ',' >> static-nodes.json; fi
  printf '"enode://key%d@0.0.0.0:30303?discport=0"' "$i" >> static-nodes.json
  mkdir -p "$i"
  echo "nodekey$i" > "$i/nodekey"
  i=$((i+1))
done
printf ']' >> static-nodes.json
echo '{"config":{"chainId":10}}' > genesis.json
"#,
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_str().unwrap().to_string()
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- istanbul::test_substitute_addresses --exact --show-output
#[test]
fn test_substitute_addresses() {
    let _ = env_logger::builder().is_test(true).try_init();

    let entries = vec![
        String::from("enode://a@0.0.0.0:30303"),
        String::from("enode://b@0.0.0.0:30303"),
    ];
    let addresses = vec![String::from("1.2.3.4"), String::from("5.6.7.8")];
    let out = substitute_addresses(&entries, &addresses).unwrap();
    assert_eq!(
        out,
        vec![
            String::from("enode://a@1.2.3.4:30303"),
            String::from("enode://b@5.6.7.8:30303"),
        ]
    );

    // only the first placeholder changes, nothing else does
    let entries = vec![String::from("enode://0.0.0.0@0.0.0.0:30303?raftport=0")];
    let out = substitute_addresses(&entries, &[String::from("9.9.9.9")]).unwrap();
    assert_eq!(out[0], "enode://9.9.9.9@0.0.0.0:30303?raftport=0");

    let ret = substitute_addresses(&entries, &addresses);
    assert!(matches!(ret, Err(Error::Consistency { .. })));

    assert!(substitute_addresses(&[], &[]).unwrap().is_empty());
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- istanbul::test_assign_slots --exact --show-output
#[test]
fn test_assign_slots() {
    use crate::node::test_record;

    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    let bundle = Bundle::new(dir.path().to_str().unwrap());
    let entries = vec![
        String::from("enode://a@0.0.0.0:30303"),
        String::from("enode://b@0.0.0.0:30303"),
    ];
    bundle.write_static_nodes(&entries).unwrap();

    let nodes = vec![
        test_record(
            "us-east-1",
            "i-1",
            "running",
            "Quorum-cluster-x",
            Some("1.2.3.4"),
        ),
        test_record(
            "us-west-1",
            "i-2",
            "running",
            "Quorum-cluster-y",
            Some("5.6.7.8"),
        ),
    ];

    // one node short: nothing is rewritten
    let ret = assign_slots(&bundle, nodes[..1].to_vec());
    assert!(matches!(ret, Err(Error::Consistency { .. })));
    assert_eq!(bundle.read_static_nodes().unwrap(), entries);

    // pending node without an address
    let mut pending = nodes.clone();
    pending[1].public_ipv4 = None;
    let ret = assign_slots(&bundle, pending);
    assert!(matches!(ret, Err(Error::Consistency { .. })));
    assert_eq!(bundle.read_static_nodes().unwrap(), entries);

    let slots = assign_slots(&bundle, nodes).unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].index, 0);
    assert_eq!(slots[0].address, "1.2.3.4");
    assert_eq!(slots[0].static_node, "enode://a@1.2.3.4:30303");
    assert_eq!(slots[1].node.instance_id, "i-2");
    assert_eq!(slots[1].node_key_path, dir.path().join("1").join("nodekey"));
    assert_eq!(
        bundle.read_static_nodes().unwrap(),
        vec![
            String::from("enode://a@1.2.3.4:30303"),
            String::from("enode://b@5.6.7.8:30303"),
        ]
    );
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- istanbul::test_generate --exact --show-output
#[test]
fn test_generate() {
    use crate::{fleet::fake::Memory, node::test_record};

    let _ = env_logger::builder().is_test(true).try_init();

    macro_rules! ab {
        ($e:expr) => {
            tokio_test::block_on($e)
        };
    }

    let tools = tempfile::tempdir().unwrap();
    let dir = tempfile::tempdir().unwrap();

    let mut spec = Spec::default_aws();
    spec.working_dir = dir.path().to_str().unwrap().to_string();
    spec.istanbul_bin = fake_setup_tool(tools.path());

    let fleet = Memory::new(
        &spec.instance_prefix,
        vec![
            test_record(
                "us-east-1",
                "i-1",
                "running",
                "Quorum-cluster-a-us-east-1-T01",
                Some("1.1.1.1"),
            ),
            test_record("us-east-1", "i-9", "running", "other", Some("9.9.9.9")),
            test_record(
                "us-west-1",
                "i-2",
                "running",
                "Quorum-cluster-a-us-west-1-T01",
                Some("2.2.2.2"),
            ),
        ],
    );

    let (bundle, slots) = ab!(generate(&spec, &fleet, 2)).unwrap();
    assert!(bundle.genesis_path().exists());
    assert_eq!(slots.len(), 2);
    assert_eq!(
        slots[0].static_node,
        "enode://key0@1.1.1.1:30303?discport=0"
    );
    assert_eq!(
        slots[1].static_node,
        "enode://key1@2.2.2.2:30303?discport=0"
    );
    assert_eq!(
        fs::read_to_string(&slots[1].node_key_path).unwrap().trim(),
        "nodekey1"
    );

    // three identities against a two-node fleet
    crate::workdir::reset(&spec.working_dir).unwrap();
    let ret = ab!(generate(&spec, &fleet, 3));
    assert!(matches!(ret, Err(Error::Consistency { .. })));

    // failing tool is surfaced, inventory is never read
    crate::workdir::reset(&spec.working_dir).unwrap();
    let calls_before = *fleet.inventory_calls.lock().unwrap();
    spec.istanbul_bin = tools.path().join("missing").to_str().unwrap().to_string();
    let ret = ab!(generate(&spec, &fleet, 2));
    assert!(matches!(ret, Err(Error::Tool { .. })));
    assert_eq!(*fleet.inventory_calls.lock().unwrap(), calls_before);
}
