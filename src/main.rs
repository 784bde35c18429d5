// Super Main

use std::env::args;
use std::io::stdin;

use irc_dcc::irc::model::client::Client;
use irc_dcc::irc::model::{ConnectionError, WHAT_TO_RUN_POS};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), ConnectionError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let argv = args().collect::<Vec<String>>();

    match argv.get(WHAT_TO_RUN_POS).map(String::as_str) {
        Some("client") => {
            let c = match Client::create_fromargs(argv) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("[CLIENT] Can't properly create client: {}", e);
                    return Err(e);
                }
            };

            if let Err(e) = c.client_run(stdin().lock()) {
                eprintln!("[CLIENT] {}", e);
            }
        }
        _ => {
            eprintln!(
                "Usage: irc-dcc client <host> <port> [--nick N] [--pass P] \
                 [--download-dir DIR] [--advertise-ip A.B.C.D]"
            );
            return Err(ConnectionError::InvalidArguments(
                "nothing to run".to_owned(),
            ));
        }
    }

    Ok(())
}
