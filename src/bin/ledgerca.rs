use ledgerca::cli::options::Options;
use ledgerca::cli::LedgerClient;

fn main() {
    if let Err(err) = LedgerClient::report(Options::from_args()) {
        eprintln!("{}", err);
        ::std::process::exit(err.exit_code());
    }
}
