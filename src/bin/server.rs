//! Server binary: parses CLI flags into a [`Configuration`], initializes
//! logging, binds the listening socket, and runs the connection loop until
//! a fatal error.

use clap::Parser;

use kvd::config::Factory;
use kvd::server::Server;

#[derive(Parser, Debug)]
#[command(name = "kvd-server", about = "Single-process in-memory key-value server")]
struct Cli {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 1234)]
    port: u16,

    /// Largest request/response frame body accepted, in MiB.
    #[arg(long, default_value_t = 32)]
    max_message_mib: u32,

    /// Largest argument count accepted in a single request.
    #[arg(long, default_value_t = 200_000)]
    max_args: usize,

    /// Migration steps performed per mutating call on an internal hash map.
    #[arg(long, default_value_t = 256)]
    rehash_batch_size: usize,

    /// Entries per bucket that triggers an internal hash map resize.
    #[arg(long, default_value_t = 16)]
    rehash_load_factor: usize,

    /// Increase logging verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = Factory::new()
        .port(cli.port)
        .max_message_bytes((cli.max_message_mib as usize) << 20)
        .max_args(cli.max_args)
        .rehash_batch_size(cli.rehash_batch_size)
        .rehash_load_factor(cli.rehash_load_factor)
        .build();

    let mut server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            log::error!("fatal: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        log::error!("fatal: {e}");
        std::process::exit(1);
    }
}
