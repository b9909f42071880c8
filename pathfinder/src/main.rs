#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

mod args;
mod options;

use std::process::ExitCode;

use clap::Parser;
use log::{debug, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::args::*;
use crate::options::*;

#[macro_use]
extern crate cfg_if;

fn configure_logging(args: &PathfinderArgs) {
    let mut logging_configured = false;

    if let Some(logging_config) = &args.logging_config {
        if let Err(e) = log4rs::init_file(logging_config, Default::default()) {
            println!(
                "ERROR: failed to configure logging using {} with {:?}. Continuing without logging.",
                logging_config, e
            );
        } else {
            logging_configured = true;
        }
    }

    if !logging_configured {
        // if there's no config, prepare one using stdout
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{m}{n}")))
            .build();
        match Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(LevelFilter::Warn))
        {
            Ok(config) => {
                if let Err(e) = log4rs::init_config(config) {
                    println!(
                        "ERROR: failed to configure logging for stdout with {:?}. Continuing without logging.",
                        e
                    );
                }
            }
            Err(e) => {
                println!("ERROR: failed to prepare default logging configuration with {:?}. Continuing without logging", e);
            }
        }
    }
}

cfg_if! {
    if #[cfg(feature = "remote")] {
        fn log_features() {
            debug!("pathfinder built with AIA and OCSP support");
        }
    } else {
        fn log_features() {
            if std::env::args().any(|a| a == "-y" || a == "--follow-aia" || a == "-o" || a == "--check-ocsp") {
                log::warn!("pathfinder was built without the remote feature: AIA and OCSP options are ignored");
            }
        }
    }
}

/// Point of entry for the pathfinder application.
fn main() -> ExitCode {
    let args = PathfinderArgs::parse();
    configure_logging(&args);
    debug!("pathfinder start");
    log_features();

    let code = match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("ERROR: {}", e);
            ExitCode::FAILURE
        }
    };
    debug!("pathfinder end");
    code
}
