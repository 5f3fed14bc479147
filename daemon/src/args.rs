use clap::Parser;
use wallet_common::errors::WalletResult;
use wallet_common::network::{network_from_flags, NetworkId};

/// `SPEC_FULL.md` §3.3: network selection, node endpoint, keys-file
/// location, and the address-discovery gap limit — the same
/// mutually-exclusive network flag group the reference daemon's CLI uses.
/// `conflicts_with_all` rejects `--testnet --devnet`-style combinations at
/// parse time, so `network_from_flags`'s own validation below is a second,
/// defense-in-depth check rather than the only one.
#[derive(Parser, Debug)]
#[command(name = "kaswallet-daemon")]
pub struct Args {
    #[arg(long, help = "Use the test network", conflicts_with_all = ["devnet", "simnet"])]
    pub testnet: bool,

    #[arg(long, help = "Use the development test network", conflicts_with_all = ["testnet", "simnet"])]
    pub devnet: bool,

    #[arg(long, help = "Use the simulation test network", conflicts_with_all = ["testnet", "devnet"])]
    pub simnet: bool,

    /// Path to keys.json. Expanded via `shellexpand` so `~` resolves the
    /// same way the reference daemon's default path does.
    #[arg(
        long,
        short = 'k',
        default_value = "~/.kwallet/keys.json",
        help = "Path to the wallet keys file"
    )]
    pub keys_file: String,

    #[arg(long, short = 's', help = "Kaspa node RPC endpoint to connect to")]
    pub rpc_server: Option<String>,

    #[arg(
        long,
        default_value_t = wallet_core::wallet::DEFAULT_GAP_LIMIT,
        help = "Address-discovery gap limit (spec.md §4.1, default 64)"
    )]
    pub gap_limit: u32,

    /// Password unlocking the mnemonic, or generating one for a fresh keys
    /// file. Reading it from a flag rather than an interactive prompt keeps
    /// the daemon non-interactive and scriptable; operators should prefer
    /// passing this via an environment-expanded value, not a literal in
    /// shell history.
    #[arg(long, env = "KASWALLET_PASSWORD", help = "Password for the keys file")]
    pub password: String,

    #[arg(
        long,
        default_value = "~/.kwallet/logs",
        help = "Directory to write log files into"
    )]
    pub logs_path: String,

    #[arg(long, default_value = "info", help = "Log level filter")]
    pub log_level: log::LevelFilter,
}

impl Args {
    pub fn network(&self) -> WalletResult<NetworkId> {
        network_from_flags(self.testnet, self.devnet, self.simnet)
    }

    pub fn keys_file_path(&self) -> String {
        shellexpand::tilde(&self.keys_file).into_owned()
    }

    pub fn logs_path(&self) -> String {
        shellexpand::tilde(&self.logs_path).into_owned()
    }
}
