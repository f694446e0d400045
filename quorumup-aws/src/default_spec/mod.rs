use std::io::stdout;

use clap::{Arg, Command};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use quorum_ops::{errors::Result, Spec};

pub const NAME: &str = "default-spec";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Writes a default configuration")
        .arg(crate::log_level_arg())
        .arg(
            Arg::new("SPEC_FILE_PATH")
                .long("spec-file-path")
                .short('s')
                .help("The spec file to write")
                .required(true)
                .num_args(1),
        )
}

pub fn execute(log_level: &str, spec_file_path: &str) -> Result<()> {
    crate::init_logger(log_level);

    let spec = Spec::default_aws();
    spec.validate()?;
    spec.sync(spec_file_path)?;

    execute!(
        stdout(),
        SetForegroundColor(Color::Blue),
        Print(format!("\nSaved spec: '{}'\n", spec_file_path)),
        ResetColor
    )?;
    println!("{}", spec.encode_yaml()?);

    println!();
    println!("# run the following to create the cluster");
    execute!(
        stdout(),
        SetForegroundColor(Color::Magenta),
        Print(format!("vi {}\n", spec_file_path)),
        ResetColor
    )?;
    let exec_path = std::env::current_exe().unwrap_or_default();
    execute!(
        stdout(),
        SetForegroundColor(Color::Green),
        Print(format!(
            "{} start \\\n--spec-file-path {} \\\n--count 4 \\\n--name dev\n",
            exec_path.display(),
            spec_file_path
        )),
        ResetColor
    )?;

    Ok(())
}
