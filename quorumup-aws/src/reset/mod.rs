use std::io::stdout;

use clap::Command;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use quorum_ops::{errors::Result, orchestrator};

pub const NAME: &str = "reset";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Wipes the local working directory of the generated config")
        .arg(crate::log_level_arg())
        .arg(crate::spec_file_path_arg())
}

pub fn execute(log_level: &str, spec_file_path: Option<&String>) -> Result<()> {
    crate::init_logger(log_level);

    let spec = crate::load_spec(spec_file_path)?;
    orchestrator::reset(&spec)?;

    execute!(
        stdout(),
        SetForegroundColor(Color::Blue),
        Print(format!("\nReset '{}'\n", spec.working_dir)),
        ResetColor
    )?;

    Ok(())
}
