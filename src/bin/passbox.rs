//! Passbox CLI - password-based envelope encryption
//!
//! Command-line interface that keeps a password envelope in a JSON file and
//! encrypts or decrypts files with the content key it protects.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use passbox::config::EncryptionConfig;
use passbox::file_ops;
use passbox::kdf::{DEFAULT_PBKDF2_ITERATIONS, KdfParams};
use passbox::password::{PasswordReader, ReaderPasswordReader, TerminalPasswordReader};
use passbox::store::JsonFileStore;

#[derive(Parser)]
#[command(name = "passbox")]
#[command(version)]
#[command(about = "Password-based envelope encryption.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true)]
    password_stdin: bool,

    /// Path to the envelope file holding the wrapped content key
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        default_value = "passbox-envelope.json"
    )]
    envelope: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new envelope protected by a password
    Init {
        /// PBKDF2 iteration count
        #[arg(long, default_value_t = DEFAULT_PBKDF2_ITERATIONS, conflicts_with = "scrypt")]
        iterations: u32,

        /// Use scrypt instead of PBKDF2 for key derivation
        #[arg(long)]
        scrypt: bool,
    },

    /// Encrypt a file
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the file to write the encrypted text to
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Decrypt a file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the file whose contents is to be decrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the file to write the unencrypted text to
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Check a password against the envelope without decrypting anything
    Verify,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = JsonFileStore::new(cli.envelope);
    let mut reader = get_password_reader(cli.password_stdin);

    let result = match cli.command {
        Commands::Init { iterations, scrypt } => {
            let kdf = if scrypt {
                KdfParams::scrypt_default()
            } else {
                KdfParams::pbkdf2(iterations)
            };
            file_ops::init_envelope(&store, &mut *reader, &EncryptionConfig::with_kdf(kdf))
        }
        Commands::Encrypt { input, output } => {
            file_ops::encrypt_file(&input, &output, &store, &mut *reader)
        }
        Commands::Decrypt { input, output } => {
            file_ops::decrypt_file(&input, &output, &store, &mut *reader)
        }
        Commands::Verify => file_ops::verify_password(&store, &mut *reader),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        process::exit(1);
    }
}

fn get_password_reader(use_stdin: bool) -> Box<dyn PasswordReader> {
    if use_stdin {
        Box::new(ReaderPasswordReader::new(Box::new(std::io::stdin())))
    } else {
        Box::new(TerminalPasswordReader::new())
    }
}
