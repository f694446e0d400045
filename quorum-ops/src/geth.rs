use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    errors::Result,
    node::{NodeReport, NodeSlot},
    pool,
    remote::Transport,
    spec::Spec,
};

/// Runtime flags passed to every "geth" process of the cluster.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Flags {
    pub network_id: u32,
    /// Istanbul block period in seconds.
    pub block_period: u32,
    pub max_peers: u32,

    pub txpool_account_slots: u64,
    pub txpool_global_slots: u64,
    pub txpool_account_queue: u64,
    pub txpool_global_queue: u64,

    #[serde(default)]
    pub http_api: Vec<String>,
    #[serde(default)]
    pub ws_api: Vec<String>,
    pub ws_port: u16,

    pub verbosity: u32,
}

pub const DEFAULT_NETWORK_ID: u32 = 10;

const DEFAULT_APIS: [&str; 12] = [
    "admin", "db", "eth", "debug", "miner", "net", "shh", "txpool", "personal", "web3", "quorum",
    "istanbul",
];

impl Default for Flags {
    fn default() -> Self {
        let apis: Vec<String> = DEFAULT_APIS.iter().map(|s| s.to_string()).collect();
        Self {
            network_id: DEFAULT_NETWORK_ID,
            block_period: 5,
            max_peers: 20,

            txpool_account_slots: 5000,
            txpool_global_slots: 100000,
            txpool_account_queue: 5000,
            txpool_global_queue: 100000,

            http_api: apis.clone(),
            ws_api: apis,
            ws_port: 8546,

            verbosity: 3,
        }
    }
}

impl Flags {
    /// Encodes the flags in the command-line order "geth" expects.
    pub fn encode(&self) -> String {
        format!(
            "--nodiscover --istanbul.blockperiod {} --syncmode full --mine --minerthreads 1 \
--networkid {} --maxpeers {} --http --http.addr 0.0.0.0 \
--txpool.accountslots {} --txpool.globalslots {} \
--txpool.accountqueue {} --txpool.globalqueue {} \
--http.api {} --emitcheckpoints --ws --ws.addr 0.0.0.0 --ws.port {} --ws.origins '*' \
--ws.api {} --verbosity {}",
            self.block_period,
            self.network_id,
            self.max_peers,
            self.txpool_account_slots,
            self.txpool_global_slots,
            self.txpool_account_queue,
            self.txpool_global_queue,
            self.http_api.join(","),
            self.ws_port,
            self.ws_api.join(","),
            self.verbosity,
        )
    }
}

/// Remote command that materializes the local chain store from the genesis file.
pub fn init_command(geth_bin: &str, data_dir: &str) -> String {
    format!("{geth_bin} --datadir {data_dir} init {data_dir}/genesis.json")
}

/// Remote command that starts "geth" detached from the SSH session,
/// with its output redirected to log files in the remote home directory.
pub fn start_command(geth_bin: &str, data_dir: &str, flags: &Flags) -> String {
    format!(
        "PRIVATE_CONFIG=ignore nohup {geth_bin} --datadir {data_dir} {} > geth.log 2> geth.err < /dev/null &",
        flags.encode()
    )
}

/// Starts the blockchain process on every slot.
/// Only transport errors are observed; process health is not checked.
pub async fn launch<T>(
    spec: &Spec,
    slots: &[NodeSlot],
    transport: Arc<T>,
) -> Result<Vec<NodeReport>>
where
    T: Transport + 'static,
{
    let cmd = Arc::new(start_command(
        &spec.remote.geth_bin,
        &spec.remote.data_dir,
        &spec.geth_flags,
    ));
    log::info!("launching {} nodes with '{}'", slots.len(), cmd);

    let reports = pool::for_each_slot(slots, spec.workers, transport, move |transport, slot| {
        let cmd = cmd.clone();
        async move {
            let mut report = NodeReport::new(&slot);
            let ret = transport.execute(&slot.address, &cmd).await;
            report.record("start geth", ret.map(|_| ()));
            if report.is_ok() {
                println!("[{}] blockchain node is up!", slot.address);
            }
            report
        }
    })
    .await;

    Ok(reports)
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- geth::test_start_command --exact --show-output
#[test]
fn test_start_command() {
    let _ = env_logger::builder().is_test(true).try_init();

    let flags = Flags::default();
    let cmd = start_command("/home/ubuntu/bin/geth", "/home/ubuntu/data", &flags);
    log::info!("{}", cmd);

    assert!(cmd.starts_with(
        "PRIVATE_CONFIG=ignore nohup /home/ubuntu/bin/geth --datadir /home/ubuntu/data --nodiscover"
    ));
    assert!(cmd.ends_with("--verbosity 3 > geth.log 2> geth.err < /dev/null &"));
    assert!(cmd.contains("--networkid 10 --maxpeers 20"));
    assert!(cmd.contains("--txpool.globalqueue 100000"));
    assert!(cmd.contains("--ws.port 8546 --ws.origins '*'"));
    assert!(cmd.contains(
        "--http.api admin,db,eth,debug,miner,net,shh,txpool,personal,web3,quorum,istanbul"
    ));
    assert!(!cmd.contains("  "));

    let mut custom = Flags::default();
    custom.network_id = 2023;
    custom.ws_api = vec![String::from("eth")];
    let cmd = start_command("geth", "/data", &custom);
    assert!(cmd.contains("--networkid 2023"));
    assert!(cmd.contains("--ws.api eth --verbosity"));

    assert_eq!(
        init_command("/home/ubuntu/bin/geth", "/home/ubuntu/data"),
        "/home/ubuntu/bin/geth --datadir /home/ubuntu/data init /home/ubuntu/data/genesis.json"
    );
}
