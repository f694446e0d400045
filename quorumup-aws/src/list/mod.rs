use clap::Command;
use quorum_ops::{aws::AwsFleet, errors::Result, orchestrator};

pub const NAME: &str = "list";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Lists the running and pending cluster instances in every region")
        .arg(crate::log_level_arg())
        .arg(crate::spec_file_path_arg())
}

pub async fn execute(log_level: &str, spec_file_path: Option<&String>) -> Result<()> {
    crate::init_logger(log_level);

    let spec = crate::load_spec(spec_file_path)?;
    let fleet = AwsFleet::new(&spec);
    let nodes = orchestrator::list(&fleet).await?;
    if nodes.is_empty() {
        println!("No '{}' instances found", spec.instance_prefix);
    }

    Ok(())
}
