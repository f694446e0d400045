use std::io::stdout;

use clap::Command;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use dialoguer::{theme::ColorfulTheme, Select};
use quorum_ops::{aws::AwsFleet, errors::Result, orchestrator};

pub const NAME: &str = "stop";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Stops every running and pending cluster instance")
        .arg(crate::log_level_arg())
        .arg(crate::spec_file_path_arg())
        .arg(crate::skip_prompt_arg())
}

pub async fn execute(
    log_level: &str,
    spec_file_path: Option<&String>,
    skip_prompt: bool,
) -> Result<()> {
    crate::init_logger(log_level);

    let spec = crate::load_spec(spec_file_path)?;

    if !skip_prompt {
        let options = &[
            "No, I am not ready to stop the cluster.",
            "Yes, let's stop the cluster.",
        ];
        let selected = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Select your 'stop' option (all '{}' instances in {:?})",
                spec.instance_prefix, spec.regions
            ))
            .items(&options[..])
            .default(0)
            .interact()?;
        if selected == 0 {
            return Ok(());
        }
    }

    execute!(
        stdout(),
        SetForegroundColor(Color::Red),
        Print("\n\n\nSTEP: stop EC2 instances\n"),
        ResetColor
    )?;
    let fleet = AwsFleet::new(&spec);
    orchestrator::stop(&fleet).await?;

    Ok(())
}
