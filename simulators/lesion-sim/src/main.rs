//! `lesion-sim`: 多发性硬化病灶合成与纵向随访模拟命令行工具.

mod cli;
mod report;
mod runner;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // `--help` 和 `--version` 不是错误.
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // `RUST_LOG` 可覆盖默认级别.
    if let Err(e) = SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
    {
        eprintln!("lesion-sim: logger unavailable: {e}");
    }

    match runner::run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("lesion-sim: {e:#}");
            ExitCode::FAILURE
        }
    }
}
