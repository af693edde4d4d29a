//! The options for the `ledgerca` command line client.

use std::path::PathBuf;

use clap::Parser;

use crate::ca::{AuthorityContext, RootCa};
use crate::commons::util::file::{self, Visibility};
use crate::config::Config;
use crate::constants::{LEDGERCA_DEFAULT_CONFIG_FILE, LEDGERCA_ENV_CONFIG};

use super::client::Error;
use super::report::{Report, ReportFormat};

//------------ Options -------------------------------------------------------

/// The command line options for the CA client.
#[derive(clap::Parser)]
#[command(version, about = "Operates a small root certificate authority.")]
pub struct Options {
    #[command(flatten)]
    pub general: GeneralOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Options {
    /// Creates the options from the process arguments.
    ///
    /// If the arguments won't result in usable options, exits the process.
    pub fn from_args() -> Self {
        Self::parse()
    }
}

//------------ GeneralOptions ------------------------------------------------

#[derive(clap::Args)]
pub struct GeneralOptions {
    /// The config file to use.
    #[arg(
        short, long,
        env = LEDGERCA_ENV_CONFIG,
        default_value = LEDGERCA_DEFAULT_CONFIG_FILE,
    )]
    pub config: PathBuf,

    /// Report format: text or json.
    #[arg(short, long, env = "LEDGERCA_FORMAT", default_value = "text")]
    pub format: ReportFormat,
}

//------------ Command -------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum Command {
    /// Create the root CA.
    Init(Init),

    /// Issue a new certificate.
    Issue(Issue),

    /// List the certificates in the store.
    List(List),

    /// Revoke a certificate and archive its files.
    Revoke(SerialArg),

    /// Issue a replacement for a certificate.
    Renew(SerialArg),

    /// Show the details of an active certificate.
    Show(SerialArg),

    /// Print the current CRL.
    Crl(Crl),

    /// Print the index ledger.
    ExportIndex,

    /// Complete interrupted revocations and repair the CRL.
    Recover,
}

impl Command {
    pub fn run(self, config: &Config) -> Result<Box<dyn Report>, Error> {
        match self {
            Command::Init(cmd) => Ok(Box::new(RootCa::create(config, &cmd.cn, cmd.days)?)),
            Command::Issue(cmd) => Ok(Box::new(open(config)?.issue(&cmd.cn, &cmd.dns, &cmd.ip)?)),
            Command::List(cmd) => Ok(Box::new(open(config)?.list(cmd.all)?.collect::<Vec<_>>())),
            Command::Revoke(cmd) => Ok(Box::new(open(config)?.revoke(&cmd.serial)?)),
            Command::Renew(cmd) => Ok(Box::new(open(config)?.renew(&cmd.serial)?)),
            Command::Show(cmd) => Ok(Box::new(open(config)?.certificate_details(&cmd.serial)?)),
            Command::Crl(cmd) => cmd.run(&open(config)?),
            Command::ExportIndex => Ok(Box::new(open(config)?.export_index()?)),
            // Opening the CA runs the recovery pass.
            Command::Recover => Ok(Box::new(open(config)?.startup_recovery().clone())),
        }
    }
}

fn open(config: &Config) -> Result<AuthorityContext, Error> {
    Ok(AuthorityContext::open(config)?)
}

//------------ Init ----------------------------------------------------------

#[derive(clap::Args)]
pub struct Init {
    /// The common name of the root CA.
    #[arg(long, default_value = "Root CA")]
    pub cn: String,

    /// How long the root CA certificate is valid, in days.
    #[arg(long, default_value_t = 3650)]
    pub days: u32,
}

//------------ Issue ---------------------------------------------------------

#[derive(clap::Args)]
pub struct Issue {
    /// The common name of the certificate.
    pub cn: String,

    /// DNS names to add as subject alternative names.
    #[arg(long, value_delimiter = ',')]
    pub dns: Vec<String>,

    /// IP addresses to add as subject alternative names.
    #[arg(long, value_delimiter = ',')]
    pub ip: Vec<String>,
}

//------------ List ----------------------------------------------------------

#[derive(clap::Args)]
pub struct List {
    /// Include revoked certificates from the archive.
    #[arg(short, long)]
    pub all: bool,
}

//------------ SerialArg -----------------------------------------------------

#[derive(clap::Args)]
pub struct SerialArg {
    /// The serial number of the certificate, in hex.
    pub serial: String,
}

//------------ Crl -----------------------------------------------------------

#[derive(clap::Args)]
pub struct Crl {
    /// Also write the DER encoded CRL to this file.
    #[arg(long)]
    pub der: Option<PathBuf>,
}

impl Crl {
    fn run(self, context: &AuthorityContext) -> Result<Box<dyn Report>, Error> {
        let crl = context.current_crl()?;
        if let Some(path) = &self.der {
            file::save(&crl.der, path, Visibility::Public).map_err(Error::Io)?;
        }
        Ok(Box::new(crl))
    }
}

//------------ Tests ---------------------------------------------------------
