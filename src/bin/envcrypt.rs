//! envcrypt CLI - Encrypt .env files and restore them into a process environment
//!
//! Command-line interface over the envcrypt library: encrypting single env
//! files or whole deployment directories, decrypting encrypted env files, and
//! running a command under a decrypted environment.

use clap::{Parser, Subcommand};
use std::error::Error as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{self, Command};

use envcrypt::dotenv;
use envcrypt::file_ops;
use envcrypt::seed::{LineSeedReader, SeedReader, TerminalSeedReader};
use envcrypt::{EncryptionMetadata, Engine, EnvMap, EnvcryptError, ErrorCategory, ErrorKind};
use regex::Regex;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "envcrypt")]
#[command(version)]
#[command(about = "Encrypt .env files for transport.", long_about = None)]
struct Cli {
    /// Seed for the encryption secret (random when no seeds are given)
    #[arg(long, global = true, env = "ENVCRYPT_SECRET_SEED", hide_env_values = true)]
    secret_seed: Option<String>,

    /// Seed for the encryption IV (random when no seeds are given)
    #[arg(long, global = true, env = "ENVCRYPT_IV_SEED", hide_env_values = true)]
    iv_seed: Option<String>,

    /// Read the secret seed and the IV seed from stdin, one per line
    #[arg(long, global = true)]
    seeds_stdin: bool,

    /// Prompt for the secret seed and the IV seed on the terminal
    #[arg(long, global = true, conflicts_with = "seeds_stdin")]
    prompt_seeds: bool,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt an env file
    #[command(alias = "e")]
    Encrypt {
        /// Path to the env file to encrypt
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the encrypted env file to
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Append the secret, iv and method entries to the encrypted file
        #[arg(long)]
        embed_metadata: bool,

        /// Print the encrypted entries and metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Encrypt the env file of one environment inside a directory
    #[command(alias = "p")]
    Package {
        /// Directory holding .env.<environment> files
        #[arg(short, long, value_name = "DIR")]
        dir: PathBuf,

        /// Environment to select, e.g. "staging" selects .env.staging
        #[arg(short, long, value_name = "NAME")]
        env: String,

        /// Directory to write the resulting files to
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// File name to write the encrypted env file under
        #[arg(long, default_value = ".env", value_name = "NAME")]
        target: String,

        /// Remove every file whose name matches this regular expression
        #[arg(long, value_name = "REGEX")]
        prune: Option<String>,

        /// Do not check NODE_ENV against the selected environment
        #[arg(long)]
        ignore_mismatch: bool,

        /// Print the encrypted entries and metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decrypt an env file holding encrypted entries and their metadata
    #[command(alias = "d")]
    Decrypt {
        /// Path to the encrypted env file
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the plain env file to (stdout when omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Run a command with the current environment decrypted
    Run {
        /// Command and its arguments
        #[arg(trailing_var_arg = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "envcrypt=debug"
    } else {
        "envcrypt=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> envcrypt::Result<i32> {
    let engine = build_engine(&cli)?;

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            embed_metadata,
            json,
        } => {
            let result = engine.encrypt_file_from_path(&input)?;
            let mut contents = result.file;
            if embed_metadata {
                if !contents.is_empty() {
                    contents.push(b'\n');
                }
                contents.extend_from_slice(dotenv::render(result.metadata.entries()).as_bytes());
            }
            file_ops::write_file_atomic(&output, &contents)
                .map_err(|e| e.with_context(format!("failed to write to {}", output.display())))?;
            info!(output = %output.display(), entries = result.json.len(), "wrote encrypted env file");
            report(&result.json, Some(&result.metadata), json)?;
        }
        Commands::Package {
            dir,
            env,
            output,
            target,
            prune,
            ignore_mismatch,
            json,
        } => {
            let prune = prune
                .map(|pattern| {
                    Regex::new(&pattern).map_err(|e| {
                        EnvcryptError::with_kind_and_source(
                            ErrorCategory::User,
                            ErrorKind::Configuration,
                            format!("invalid prune pattern \"{pattern}\""),
                            e,
                        )
                    })
                })
                .transpose()?;
            let dir = file_ops::expand_home(&dir);
            let mut files = file_ops::load_package_dir(&dir)?;
            let result = engine.encrypt_package(
                &mut files,
                &format!(".env.{env}"),
                &target,
                prune.as_ref(),
                ignore_mismatch,
            )?;
            let output = file_ops::expand_home(&output);
            file_ops::write_package_dir(&output, &files, &result.pruned)?;
            info!(
                output = %output.display(),
                files = files.len(),
                pruned = result.pruned.len(),
                "wrote package"
            );
            report(&result.json, result.metadata.as_ref(), json)?;
        }
        Commands::Decrypt { input, output } => {
            let input = file_ops::expand_home(&input);
            let buffer = file_ops::read_env_file(&input)?;
            let mut env = dotenv::parse_map(dotenv::decode_text(&buffer)?)?;
            engine.decrypt_environment(&mut env)?;
            let mut plain = dotenv::render(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            if !plain.is_empty() {
                plain.push('\n');
            }
            match output {
                Some(path) => file_ops::write_file_secure(&path, plain.as_bytes())?,
                None => write_stdout(plain.as_bytes())?,
            }
        }
        Commands::Run { command } => {
            let env = engine.decrypt_process_env()?;
            return spawn(&command, &env);
        }
    }
    Ok(0)
}

fn build_engine(cli: &Cli) -> envcrypt::Result<Engine> {
    if cli.seeds_stdin {
        let reader = LineSeedReader::new(Box::new(io::stdin().lock()));
        return engine_from_reader(reader);
    }
    if cli.prompt_seeds {
        return engine_from_reader(TerminalSeedReader::new());
    }
    match (&cli.secret_seed, &cli.iv_seed) {
        (Some(secret), Some(iv)) => Ok(Engine::with_seeds(secret, iv)),
        (None, None) => Ok(Engine::new()),
        _ => Err(EnvcryptError::configuration(
            "--secret-seed and --iv-seed must be given together",
        )),
    }
}

fn engine_from_reader(mut reader: impl SeedReader) -> envcrypt::Result<Engine> {
    let secret = reader.read_seed("secret")?;
    let iv = reader.read_seed("iv")?;
    Ok(Engine::with_seeds(&secret, &iv))
}

/// Print metadata for the caller to carry alongside the ciphertext.
fn report(
    entries: &EnvMap,
    metadata: Option<&EncryptionMetadata>,
    json: bool,
) -> envcrypt::Result<()> {
    if json {
        let env = match metadata {
            Some(metadata) => serde_json::to_value(metadata).map_err(json_error)?,
            None => serde_json::json!({}),
        };
        let document = serde_json::json!({ "json": entries, "env": env });
        let mut text = serde_json::to_string_pretty(&document).map_err(json_error)?;
        text.push('\n');
        return write_stdout(text.as_bytes());
    }
    if let Some(metadata) = metadata {
        let mut text = dotenv::render(metadata.entries());
        text.push('\n');
        write_stdout(text.as_bytes())?;
    }
    Ok(())
}

fn spawn(command: &[String], env: &EnvMap) -> envcrypt::Result<i32> {
    let (program, args) = command.split_first().ok_or_else(|| {
        EnvcryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidInput,
            "no command given",
        )
    })?;
    let status = Command::new(program)
        .args(args)
        .env_clear()
        .envs(env)
        .status()
        .map_err(|e| {
            EnvcryptError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to run {}", Path::new(program).display()),
                e,
            )
        })?;
    Ok(status.code().unwrap_or(1))
}

fn write_stdout(bytes: &[u8]) -> envcrypt::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(bytes)
        .and_then(|_| stdout.flush())
        .map_err(|e| {
            EnvcryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to write to stdout",
                e,
            )
        })
}

fn json_error(e: serde_json::Error) -> EnvcryptError {
    EnvcryptError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::InternalInvariant,
        "failed to render JSON",
        e,
    )
}
