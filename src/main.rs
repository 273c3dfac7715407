use anyhow::Result;
use clap::Parser;
use gmail_triage::cli::{self, Cli, Commands};
use gmail_triage::config::{Config, ConfigSource, FileConfigSource};
use gmail_triage::error::GmailError;
use gmail_triage::pipeline::SearchOutcome;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Vec<u8>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Vec::new(),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let msg = String::from_utf8_lossy(&self.buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                // Logs go to stderr so stdout stays pipeable (--ids-only, --json)
                self.multi.suspend(|| eprintln!("{}", msg));
            }
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl MultiProgressMakeWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self { multi }
    }
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        eprintln!("\nFor help, run: gmail-triage --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_triage=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_triage=info,warn"))
    };

    let multi_progress = Arc::new(MultiProgress::new());
    let make_writer = MultiProgressMakeWriter::new(Arc::clone(&multi_progress));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");

            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            if *force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            // Will trigger the OAuth flow if needed
            let hub = gmail_triage::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope(gmail_triage::auth::MODIFY_SCOPE)
                .doit()
                .await
                .map_err(GmailError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );

            Ok(())
        }

        Commands::Search(args) => {
            match cli::run_search(&cli, args, Arc::clone(&multi_progress)).await? {
                SearchOutcome::NoMatches => {}
                SearchOutcome::Declined { matched } => {
                    tracing::debug!("Declined after {} matches", matched);
                }
                SearchOutcome::Completed(summary) => {
                    tracing::debug!("Search finished: {:?}", summary);
                    if summary.dry_run && (summary.labeled + summary.touched + summary.trashed) > 0 {
                        eprintln!("Dry run: no messages were changed.");
                    }
                }
            }
            Ok(())
        }

        Commands::InitConfig { output, force } => {
            let output = output.clone().unwrap_or_else(|| cli.config.clone());
            tracing::info!("Generating example configuration file");

            if output.exists() && !force {
                return Err(GmailError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(&output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file to customize your settings.");
            println!("Key settings to review:");
            println!("  - rules.uninteresting_label_patterns / interesting_label_patterns");
            println!("  - rules.apply_label_on_touch: label added by `search --touch`");
            println!("  - rules.apply_label_to_uninteresting: label added by `--mark-uninteresting`");

            Ok(())
        }

        Commands::ShowConfig => {
            let source = FileConfigSource::new(&cli.config);
            let config = source.load_config().await?;
            let rules = source.load_rules().await?;

            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

            println!("# {}", source.path().display());
            println!("{}", rendered);
            println!(
                "# {} uninteresting and {} interesting patterns compiled",
                rules.uninteresting_patterns().len(),
                rules.interesting_patterns().len()
            );

            Ok(())
        }
    }
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(gmail_err) = error.downcast_ref::<GmailError>() {
        let root = match gmail_err {
            GmailError::Stage { source, .. } => source.as_ref(),
            other => other,
        };
        match root {
            GmailError::AuthError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      You can download it from Google Cloud Console.");
                eprintln!("      Try running: gmail-triage auth --force");
            }
            GmailError::ApiError(_) | GmailError::ServerError { .. } | GmailError::NetworkError(_) => {
                eprintln!("\nHint: This may be a temporary API error.");
                eprintln!("      Try running the command again.");
            }
            GmailError::RateLimitExceeded { .. } | GmailError::QuotaExceeded(_) => {
                eprintln!("\nHint: You've hit Gmail API rate limits.");
                eprintln!("      Wait a few seconds and try again.");
                eprintln!("      Consider reducing gmail.max_concurrent_requests in config.");
            }
            GmailError::TouchLabelNotConfigured => {
                eprintln!("\nHint: Set rules.apply_label_on_touch in your configuration file.");
            }
            GmailError::UninterestingLabelNotConfigured => {
                eprintln!("\nHint: Set rules.apply_label_to_uninteresting in your configuration file.");
            }
            GmailError::ConfigError(_) | GmailError::InvalidPattern { .. } => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: gmail-triage show-config");
            }
            _ => {}
        }
    }
}
