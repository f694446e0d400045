mod default_spec;
mod list;
mod reset;
mod start;
mod stop;

use std::io;

use clap::{crate_version, Arg, Command};
use quorum_ops::{errors::Result, Spec};

const APP_NAME: &str = "quorumup-aws";

/// Every invocation re-derives the cluster from the live EC2 inventory;
/// nothing is persisted between runs except the generated bundle.
#[tokio::main]
async fn main() -> io::Result<()> {
    let matches = Command::new(APP_NAME)
        .version(crate_version!())
        .about("Quorum cluster control plane on AWS")
        .subcommands(vec![
            default_spec::command(),
            start::command(),
            list::command(),
            stop::command(),
            reset::command(),
        ])
        .get_matches();

    match matches.subcommand() {
        Some((default_spec::NAME, sub_matches)) => {
            let ret = default_spec::execute(
                &log_level(sub_matches),
                sub_matches.get_one::<String>("SPEC_FILE_PATH").unwrap(),
            );
            check(default_spec::NAME, ret);
        }
        Some((start::NAME, sub_matches)) => {
            let opts = quorum_ops::orchestrator::StartOptions {
                count: *sub_matches.get_one::<usize>("COUNT").unwrap(),
                cluster_name: sub_matches
                    .get_one::<String>("CLUSTER_NAME")
                    .unwrap()
                    .clone(),
                current_ec2: sub_matches.get_flag("CURRENT_EC2"),
            };
            let ret = start::execute(
                &log_level(sub_matches),
                sub_matches.get_one::<String>("SPEC_FILE_PATH"),
                opts,
                sub_matches.get_flag("SKIP_PROMPT"),
            )
            .await;
            check(start::NAME, ret);
        }
        Some((list::NAME, sub_matches)) => {
            let ret = list::execute(
                &log_level(sub_matches),
                sub_matches.get_one::<String>("SPEC_FILE_PATH"),
            )
            .await;
            check(list::NAME, ret);
        }
        Some((stop::NAME, sub_matches)) => {
            let ret = stop::execute(
                &log_level(sub_matches),
                sub_matches.get_one::<String>("SPEC_FILE_PATH"),
                sub_matches.get_flag("SKIP_PROMPT"),
            )
            .await;
            check(stop::NAME, ret);
        }
        Some((reset::NAME, sub_matches)) => {
            let ret = reset::execute(
                &log_level(sub_matches),
                sub_matches.get_one::<String>("SPEC_FILE_PATH"),
            );
            check(reset::NAME, ret);
        }
        _ => unreachable!("unknown subcommand"),
    }
    Ok(())
}

/// Fatal errors abort the process with a non-zero exit.
/// Anything scoped to a single node is only logged.
fn check(subcommand: &str, ret: Result<()>) {
    if let Err(e) = ret {
        if e.is_fatal() {
            panic!("failed to execute '{}' ({})", subcommand, e);
        }
        log::warn!("'{}' finished with node errors ({})", subcommand, e);
    }
}

fn log_level(sub_matches: &clap::ArgMatches) -> String {
    sub_matches
        .get_one::<String>("LOG_LEVEL")
        .unwrap_or(&String::from("info"))
        .clone()
}

fn log_level_arg() -> Arg {
    Arg::new("LOG_LEVEL")
        .long("log-level")
        .short('l')
        .help("Sets the log level")
        .required(false)
        .num_args(1)
        .value_parser(["debug", "info"])
        .default_value("info")
}

fn spec_file_path_arg() -> Arg {
    Arg::new("SPEC_FILE_PATH")
        .long("spec-file-path")
        .short('s')
        .help("The spec file to load (built-in defaults if not set)")
        .required(false)
        .num_args(1)
}

fn skip_prompt_arg() -> Arg {
    Arg::new("SKIP_PROMPT")
        .long("skip-prompt")
        .short('y')
        .help("Skips prompt mode")
        .required(false)
        .num_args(0)
}

fn init_logger(log_level: &str) {
    // ref. <https://github.com/env-logger-rs/env_logger/issues/47>
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    );
}

/// Loads the spec file if given, otherwise the built-in defaults.
fn load_spec(spec_file_path: Option<&String>) -> Result<Spec> {
    let spec = match spec_file_path {
        Some(p) => Spec::load(p)?,
        None => {
            log::info!("no spec file, using built-in defaults");
            Spec::default_aws()
        }
    };
    spec.validate()?;
    Ok(spec)
}

/// RUST_LOG=debug cargo test --package quorumup-aws --bin quorumup-aws -- test_check --exact --show-output
#[test]
fn test_check() {
    use quorum_ops::errors::Error;

    let _ = env_logger::builder().is_test(true).try_init();

    check("list", Ok(()));
    check(
        "start",
        Err(Error::Remote {
            message: String::from("ssh to 10.0.0.1 exited with 255"),
        }),
    );

    let ret = std::panic::catch_unwind(|| {
        check(
            "start",
            Err(Error::Consistency {
                message: String::from("3 nodes in fleet, 2 static nodes"),
            }),
        )
    });
    assert!(ret.is_err());
}
