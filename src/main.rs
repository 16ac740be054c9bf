//! a4f command-line entry point
//!
//! Thin dispatch layer: parses the CLI, builds the immutable settings from
//! the environment, opens the pool, resolves the session's package list,
//! and hands off to the command structs. Error taxonomy maps to exit
//! codes: 0 success, 1 recoverable, 2 configuration, 3 lock conflict,
//! 4 external service unavailable.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use a4f::commands::{self, Command as _};
use a4f::config::Settings;
use a4f::fossy::client::FossologyClient;
use a4f::mirror::MirrorMode;
use a4f::pool::{FileType, PackageId, Pool};
use a4f::session::Session;
use a4f::{A4fError, A4fResult};

#[derive(Parser)]
#[command(name = "a4f", version, about = "Software composition analysis for alien source packages")]
struct Cli {
    /// Session id gating which packages are processed
    #[arg(short = 's', long, global = true)]
    session: Option<String>,

    /// Invert the pool cache setting for this command
    #[arg(short = 'i', long, global = true)]
    ignore_cache: bool,

    /// More logging (debug level)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Less logging (warnings only)
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// List what would be done without doing it
    #[arg(long, global = true)]
    dryrun: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Print the resolved configuration
    Config,
    /// Manage work-list sessions
    Session {
        #[command(subcommand)]
        op: SessionOp,
    },
    /// Ingest .aliensrc and .tinfoilhat.json files into the pool
    Add {
        files: Vec<PathBuf>,
        /// Overwrite an existing package with the same identity
        #[arg(long)]
        force: bool,
    },
    /// Match packages against the current Debian index
    Match,
    /// Match packages through the Debian snapshot archive
    Snapmatch,
    /// Run the external scanner over alien and Debian sources
    Scan,
    /// Classify the file-level delta between Debian and alien scans
    Delta,
    /// Extract SPDX from the matched debian/copyright
    Spdxdebian,
    /// Synthesize the alien SPDX
    Spdxalien {
        /// Apply all Debian package metadata regardless of similarity
        #[arg(long)]
        apply_debian_full: bool,
    },
    /// Upload packages to the clearing server
    Upload,
    /// Harvest audit state and produce the final SPDX
    Fossy {
        /// Also emit a CycloneDX SBOM next to the final SPDX
        #[arg(long)]
        sbom: bool,
    },
    /// Aggregate everything into a dashboard report
    Harvest {
        /// Read ALIENMATCHER results instead of SNAPMATCH ones
        #[arg(long)]
        use_oldmatcher: bool,
        /// Record missing inputs into the harvest document
        #[arg(long)]
        add_missing: bool,
        /// Keep only tagged releases plus this named snapshot
        #[arg(long)]
        filter_snapshot: Option<String>,
        /// Restrict output to these binary packages
        #[arg(long, num_args = 1..)]
        with_binaries: Vec<String>,
    },
    /// Filter NVD CVE feeds by CPE applicability
    Cvecheck {
        #[arg(long, default_value = "*")]
        vendor: String,
        /// Check one explicit product instead of the session harvest
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        version: Option<String>,
    },
    /// Project session build metadata into the SQL store
    Mirror {
        #[arg(long, default_value = "FULL")]
        mode: String,
    },
}

#[derive(Subcommand)]
enum SessionOp {
    /// Create a new session (random id unless --session is given)
    Create,
    /// Fill the session from pool globs
    Populate {
        #[arg(default_value = "*")]
        glob_name: String,
        #[arg(default_value = "*")]
        glob_version: String,
    },
    /// Apply a filter predicate (score-gt=N, include-exclude=<json>,
    /// only-uploaded)
    Filter { expr: String },
    /// Lock the session with A4F_LOCK_KEY
    Lock,
    /// Remove the session lock
    Unlock {
        #[arg(long)]
        force: bool,
    },
    /// Add every pool-known variant of listed packages
    Addvariants,
    /// Write a CSV overview
    Report { path: String },
}

fn init_logging(cli: &Cli, settings: &Settings) {
    let level = if cli.quiet {
        "warn".to_string()
    } else if cli.verbose {
        "debug".to_string()
    } else {
        settings.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_new(format!("a4f={level}"))
        .unwrap_or_else(|_| EnvFilter::new("a4f=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Identities the command operates on: the session's selection, or every
/// aliensrc in the pool when no session is given.
fn resolve_ids(
    pool: &Pool,
    settings: &Settings,
    session_id: Option<&str>,
) -> A4fResult<(Option<String>, Vec<PackageId>)> {
    match session_id {
        Some(session_id) => {
            let mut session = Session::new(pool, Some(session_id), settings.lock_key.clone())?;
            session.load(false)?;
            Ok((Some(session.session_id.clone()), session.package_ids()))
        }
        None => Ok((None, pool.identities_with(FileType::Aliensrc)?)),
    }
}

fn run(cli: Cli) -> A4fResult<bool> {
    let settings = Settings::from_env()?;
    init_logging(&cli, &settings);

    let cached = settings.pool_cached != cli.ignore_cache;
    let pool = Pool::new(&settings.pool_path, cached)?;
    tracing::info!(
        "a4f v{} with pool {}{}",
        env!("CARGO_PKG_VERSION"),
        settings.pool_path.display(),
        if cached { " (cached)" } else { "" }
    );

    match cli.command {
        CliCommand::Config => {
            println!("{}", commands::config::render(&settings));
            Ok(true)
        }

        CliCommand::Session { op } => {
            let op = match op {
                SessionOp::Create => commands::session::SessionOp::Create,
                SessionOp::Populate {
                    glob_name,
                    glob_version,
                } => commands::session::SessionOp::Populate {
                    glob_name,
                    glob_version,
                },
                SessionOp::Filter { expr } => commands::session::SessionOp::Filter(expr),
                SessionOp::Lock => commands::session::SessionOp::Lock,
                SessionOp::Unlock { force } => commands::session::SessionOp::Unlock { force },
                SessionOp::Addvariants => commands::session::SessionOp::AddVariants,
                SessionOp::Report { path } => commands::session::SessionOp::Report { path },
            };
            let id = commands::session::execute(
                &pool,
                cli.session.as_deref(),
                settings.lock_key.clone(),
                op,
            )?;
            println!("{id}");
            Ok(true)
        }

        CliCommand::Add { files, force } => {
            if cli.dryrun {
                for file in &files {
                    tracing::info!("would add {}", file.display());
                }
                return Ok(true);
            }
            let cmd = commands::add::AddCmd {
                pool: &pool,
                force,
            };
            let mut session = match cli.session.as_deref() {
                Some(id) => Some(Session::new(&pool, Some(id), settings.lock_key.clone())?),
                None => None,
            };
            let added = cmd.execute(&files, session.as_mut())?;
            Ok(added.len() == files.len())
        }

        CliCommand::Match => {
            let (_, ids) = resolve_ids(&pool, &settings, cli.session.as_deref())?;
            if cli.dryrun {
                return dryrun_list(&ids);
            }
            let mut cmd = commands::matchcmd::MatchCmd::new(&pool)?;
            Ok(cmd.execute(&ids)?.all_ok())
        }

        CliCommand::Snapmatch => {
            let (_, ids) = resolve_ids(&pool, &settings, cli.session.as_deref())?;
            if cli.dryrun {
                return dryrun_list(&ids);
            }
            let mut cmd = commands::snapmatch::SnapMatchCmd::new(&pool)?;
            Ok(cmd.execute(&ids)?.all_ok())
        }

        CliCommand::Scan => {
            let (_, ids) = resolve_ids(&pool, &settings, cli.session.as_deref())?;
            if cli.dryrun {
                return dryrun_list(&ids);
            }
            let mut cmd = commands::scan::ScanCmd::new(&pool, &settings);
            Ok(cmd.execute(&ids)?.all_ok())
        }

        CliCommand::Delta => {
            let (_, ids) = resolve_ids(&pool, &settings, cli.session.as_deref())?;
            if cli.dryrun {
                return dryrun_list(&ids);
            }
            let mut cmd = commands::delta::DeltaCmd::new(&pool, settings.print_result);
            Ok(cmd.execute(&ids)?.all_ok())
        }

        CliCommand::Spdxdebian => {
            let (_, ids) = resolve_ids(&pool, &settings, cli.session.as_deref())?;
            if cli.dryrun {
                return dryrun_list(&ids);
            }
            let mut cmd = commands::spdxdebian::SpdxDebianCmd::new(&pool);
            Ok(cmd.execute(&ids)?.all_ok())
        }

        CliCommand::Spdxalien { apply_debian_full } => {
            let (_, ids) = resolve_ids(&pool, &settings, cli.session.as_deref())?;
            if cli.dryrun {
                return dryrun_list(&ids);
            }
            let mut cmd = commands::spdxalien::SpdxAlienCmd::new(&pool, apply_debian_full);
            Ok(cmd.execute(&ids)?.all_ok())
        }

        CliCommand::Upload => {
            let (session_id, ids) = resolve_ids(&pool, &settings, cli.session.as_deref())?;
            if cli.dryrun {
                return dryrun_list(&ids);
            }
            let client = FossologyClient::connect(&settings)?;
            let mut cmd = commands::upload::UploadCmd::new(&pool, &settings, &client);
            let summary = cmd.execute(&ids)?;

            // record upload state back into the session
            if let Some(session_id) = session_id {
                let mut session =
                    Session::new(&pool, Some(session_id.as_str()), settings.lock_key.clone())?;
                session.load(false)?;
                for (id, upload_id) in &cmd.uploaded {
                    session.set_uploaded(id, &format!("upload id {upload_id}"))?;
                }
            }
            Ok(summary.all_ok())
        }

        CliCommand::Fossy { sbom } => {
            let (_, ids) = resolve_ids(&pool, &settings, cli.session.as_deref())?;
            if cli.dryrun {
                return dryrun_list(&ids);
            }
            let client = FossologyClient::connect(&settings)?;
            let mut cmd = commands::fossy::FossyCmd::new(&pool, &settings, &client);
            cmd.with_sbom = sbom;
            Ok(cmd.execute(&ids)?.all_ok())
        }

        CliCommand::Harvest {
            use_oldmatcher,
            add_missing,
            filter_snapshot,
            with_binaries,
        } => {
            let session_id = cli.session.as_deref().ok_or_else(|| {
                A4fError::Config("harvest needs a --session".to_string())
            })?;
            let mut session = Session::new(&pool, Some(session_id), settings.lock_key.clone())?;
            session.load(false)?;
            let ids = session.package_ids();
            if cli.dryrun {
                return dryrun_list(&ids);
            }
            let cmd = commands::harvest::HarvestCmd {
                pool: &pool,
                use_oldmatcher,
                add_missing,
                filter_snapshot,
                with_binaries,
            };
            cmd.execute(&settings, &session, &ids)?;
            Ok(true)
        }

        CliCommand::Cvecheck {
            vendor,
            product,
            version,
        } => {
            let cmd = commands::cvecheck::CveCheckCmd {
                pool: &pool,
                vendor,
            };
            match (product, version) {
                (Some(product), Some(version)) => {
                    if cli.dryrun {
                        tracing::info!("would check {product} {version}");
                        return Ok(true);
                    }
                    cmd.check_triple(&product, &version)?;
                }
                _ => {
                    let session_id = cli.session.as_deref().ok_or_else(|| {
                        A4fError::Config(
                            "cvecheck needs either --product/--version or a --session".to_string(),
                        )
                    })?;
                    if cli.dryrun {
                        tracing::info!("would check the harvest of session '{session_id}'");
                        return Ok(true);
                    }
                    cmd.check_harvest(session_id)?;
                }
            }
            Ok(true)
        }

        CliCommand::Mirror { mode } => {
            let session_id = cli.session.as_deref().ok_or_else(|| {
                A4fError::Config("mirror needs a --session".to_string())
            })?;
            let mut session = Session::new(&pool, Some(session_id), settings.lock_key.clone())?;
            session.load(false)?;
            let cmd = commands::mirror::MirrorCmd {
                pool: &pool,
                mode: MirrorMode::parse(&mode)?,
                dryrun: cli.dryrun,
            };
            cmd.execute(&settings, &session)?;
            Ok(true)
        }
    }
}

fn dryrun_list(ids: &[PackageId]) -> A4fResult<bool> {
    for id in ids {
        tracing::info!("would process [{id}]");
    }
    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("a4f: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
