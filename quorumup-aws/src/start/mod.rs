use std::{io::stdout, sync::Arc};

use clap::{value_parser, Arg, Command};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use dialoguer::{theme::ColorfulTheme, Select};
use quorum_ops::{
    aws::AwsFleet,
    errors::Result,
    orchestrator::{self, StartOptions},
    remote::Ssh,
};

pub const NAME: &str = "start";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Creates the instances and starts the Quorum network")
        .arg(crate::log_level_arg())
        .arg(crate::spec_file_path_arg())
        .arg(crate::skip_prompt_arg())
        .arg(
            Arg::new("COUNT")
                .long("count")
                .short('c')
                .help("Sets the total number of nodes across all regions")
                .required(true)
                .num_args(1)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("CLUSTER_NAME")
                .long("name")
                .short('n')
                .help("Sets the cluster name used in the instance names")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("CURRENT_EC2")
                .long("current-ec2")
                .help("Skips instance creation and uses the running cluster instances")
                .required(false)
                .num_args(0),
        )
}

pub async fn execute(
    log_level: &str,
    spec_file_path: Option<&String>,
    opts: StartOptions,
    skip_prompt: bool,
) -> Result<()> {
    crate::init_logger(log_level);

    let spec = crate::load_spec(spec_file_path)?;

    // fails before anything is created if the key is not set
    let ssh = Ssh::from_env(&spec.remote.key_env, &spec.remote.user)?;

    execute!(
        stdout(),
        SetForegroundColor(Color::Blue),
        Print(format!(
            "\nLoaded spec: '{}'\n",
            spec_file_path.map(|s| s.as_str()).unwrap_or("(default)")
        )),
        ResetColor
    )?;
    println!("{}\n", spec.encode_yaml()?);

    if !skip_prompt {
        let prompt = if opts.current_ec2 {
            format!(
                "Select your 'start' option ({} existing nodes, cluster '{}')",
                opts.count, opts.cluster_name
            )
        } else {
            format!(
                "Select your 'start' option (creates {} '{}' instances, cluster '{}')",
                opts.count, spec.instance_type, opts.cluster_name
            )
        };
        let options = &[
            "No, I am not ready to start the cluster.",
            "Yes, let's start the cluster.",
        ];
        let selected = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(&options[..])
            .default(0)
            .interact()?;
        if selected == 0 {
            return Ok(());
        }
    }

    let fleet = AwsFleet::new(&spec);
    let report = orchestrator::start(&spec, &fleet, Arc::new(ssh), &opts).await?;

    execute!(
        stdout(),
        SetForegroundColor(Color::Blue),
        Print(format!(
            "\nStarted cluster '{}': {} nodes, {} with failed steps\n",
            opts.cluster_name,
            report.slots.len(),
            report.failed_nodes()
        )),
        ResetColor
    )?;
    for r in report.bootstrap.iter().chain(report.launch.iter()) {
        for s in r.steps.iter().filter(|s| s.error.is_some()) {
            println!(
                "[{}] {} ({}) failed: {}",
                r.address,
                s.step,
                r.instance_id,
                s.error.as_deref().unwrap_or_default()
            );
        }
    }
    println!();
    println!("# run the following to check the instances");
    execute!(
        stdout(),
        SetForegroundColor(Color::Green),
        Print(format!(
            "{} list{}\n",
            std::env::current_exe().unwrap_or_default().display(),
            spec_file_path
                .map(|p| format!(" --spec-file-path {}", p))
                .unwrap_or_default()
        )),
        ResetColor
    )?;

    Ok(())
}
