use std::process::exit;

use clap::Parser;
use log::{error, info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use tokio::net::TcpListener;

use ofpilot::conf::Config;
use ofpilot::device::Controller;

/// OpenFlow 1.0 controller performing L2 forwarding across switch
/// topologies.
#[derive(Parser)]
#[command(name = "ofpilotd", version)]
struct Opts {
    /// INI configuration file
    #[arg(short, long, value_name = "FILE")]
    conf: Option<String>,
}

fn init_logging(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}",
        )))
        .build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

async fn run(conf: Config) -> std::io::Result<()> {
    let listener = TcpListener::bind(conf.listen).await?;
    info!("listening for switches on {}", conf.listen);
    let controller = Controller::new(&conf);
    controller.serve(listener).await
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse();
    let conf = match opts.conf {
        Some(path) => match Config::from_file(&path) {
            Ok(conf) => conf,
            Err(e) => {
                eprintln!("{}", e);
                exit(1);
            }
        },
        None => Config::default(),
    };
    if let Err(e) = init_logging(conf.log_level) {
        eprintln!("failed to initialize logging: {}", e);
        exit(1);
    }
    if let Err(e) = run(conf).await {
        error!("{}", e);
        exit(1);
    }
}
