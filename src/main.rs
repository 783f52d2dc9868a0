use std::io::Write;

use clap::Parser;
use uart_proxy::cli::{execute, Cli, Outcome};
use uart_proxy::{AppConfig, Supervisor};

fn main() {
    env_logger::init();

    let mut supervisor = Supervisor::new(AppConfig::default());
    println!("uart-proxy {}, type 'help' or 'exit' to quit", env!("CARGO_PKG_VERSION"));

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        match Cli::try_parse_from(tokens) {
            Ok(cli) => match execute(cli.command, &mut supervisor) {
                Ok(Outcome::Continue(Some(text))) => println!("{text}"),
                Ok(Outcome::Continue(None)) => {}
                Ok(Outcome::Exit) => break,
                Err(e) => eprintln!("{e}"),
            },
            Err(e) => eprintln!("{e}"),
        }
    }
}
