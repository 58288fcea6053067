use std::{process, time::Duration};

use anyhow::Result;
use clap::{error::ErrorKind, Parser};

mod args;
mod cancel;
mod checksum;
mod packet;
mod session;
mod stats;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let opts = match args::Opts::try_parse() {
        Ok(opts) => opts,
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            print!("{}", e);
            return Ok(());
        }
        Err(_) => {
            println!("{}", args::USAGE);
            process::exit(1);
        }
    };

    let dst_addr = match common::resolve_host(&opts.target) {
        Ok(addr) => addr,
        Err(_) => {
            println!("Address family not supported");
            process::exit(1);
        }
    };

    let cancel = cancel::CancelToken::new();
    cancel::spawn_interrupt_handler(cancel.clone());

    let mut session = match session::EchoSession::new(
        &opts.target,
        dst_addr,
        opts.ttl,
        Duration::from_secs(opts.timeout),
        cancel,
    ) {
        Ok(session) => session,
        Err(e) => {
            println!("{}", e);
            process::exit(1);
        }
    };
    session.run().await?;
    Ok(())
}
