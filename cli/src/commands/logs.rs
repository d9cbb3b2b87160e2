use std::os::unix::process::CommandExt;

use color_eyre::eyre::Result;

use crate::config;
use crate::logging;

pub fn run(lines: usize, follow: bool) -> Result<()> {
    let Some(path) = logging::latest_log_file() else {
        println!("No log files found in {:?}", config::runtime_dir());
        println!("Log files are created when running the daemon.");
        return Ok(());
    };

    if follow {
        let err = std::process::Command::new("tail")
            .args(["-f", "-n", &lines.to_string()])
            .arg(&path)
            .exec();
        return Err(err.into());
    }

    std::process::Command::new("tail")
        .args(["-n", &lines.to_string()])
        .arg(&path)
        .status()?;

    Ok(())
}
