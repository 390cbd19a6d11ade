mod config;
mod config_persistence;
mod console_reporter;
mod coordinators;
mod cover_resolver;
mod error;
mod image_pipeline;
mod manual_picker;
mod media_file_discovery;
mod metadata_tags;
mod observer;
mod pipeline;
mod protocol;
mod providers;
mod resolution_policy;
mod result_cache;
mod search_manager;
#[cfg(test)]
mod test_support;
mod track;

use std::{path::PathBuf, sync::Arc, thread};

use clap::Parser;
use log::{info, warn, LevelFilter};
use tokio::sync::broadcast;

use config::SearchConfig;
use config_persistence::{default_config_path, load_or_create_config};
use console_reporter::ConsoleReporter;
use cover_resolver::{CoverResolver, ResolverSettings, SearchMode};
use manual_picker::TerminalPicker;
use media_file_discovery::collect_audio_files;
use metadata_tags::{load_track, CoverStore, LoftyCoverStore};
use observer::BusObserver;
use protocol::Message;
use providers::{build_http_agent, build_providers, ProviderKind};
use search_manager::{BatchOutcome, CoverSearchManager};
use track::order_for_batch;

fn parse_provider(value: &str) -> Result<ProviderKind, String> {
    ProviderKind::from_name(value).ok_or_else(|| {
        format!("unknown provider '{value}', expected one of itunes, deezer, musicbrainz")
    })
}

/// Finds and embeds cover art for audio files.
#[derive(Parser, Debug)]
#[command(name = "discover-cover", version)]
struct CliArgs {
    /// Audio files or folders; a folder picker opens when none are given.
    paths: Vec<PathBuf>,
    /// Config file to use instead of the default location.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Collect covers from every provider and choose one per album.
    #[arg(long)]
    manual: bool,
    /// Replace covers that are already embedded.
    #[arg(long)]
    overwrite: bool,
    /// Only replace embedded covers with strictly larger ones.
    #[arg(long, value_name = "BOOL")]
    only_if_higher: Option<bool>,
    /// Search every track even when its album was just resolved.
    #[arg(long)]
    no_reuse: bool,
    /// Per-provider search timeout in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Largest cover edge in pixels; bigger covers are scaled down.
    #[arg(long, value_name = "PX")]
    max_dimension: Option<u32>,
    /// Providers to use, in priority order.
    #[arg(long, value_delimiter = ',', value_parser = parse_provider)]
    providers: Vec<ProviderKind>,
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    #[arg(short, long)]
    quiet: bool,
}

/// Applies command-line switches on top of the loaded search config.
fn apply_cli_overrides(search: &mut SearchConfig, cli_args: &CliArgs) {
    if cli_args.manual {
        search.manual_image_selection = true;
    }
    if cli_args.overwrite {
        search.overwrite_cover = true;
    }
    if let Some(only_if_higher) = cli_args.only_if_higher {
        search.overwrite_only_if_higher = only_if_higher;
    }
    if cli_args.no_reuse {
        search.auto_reuse_last_cover = false;
    }
    if let Some(timeout) = cli_args.timeout {
        search.search_timeout_secs = timeout.max(1);
    }
    if let Some(max_dimension) = cli_args.max_dimension {
        search.max_cover_dimension = max_dimension.max(1);
    }
    if !cli_args.providers.is_empty() {
        search.restrict_providers(&cli_args.providers);
    }
}

fn log_level(cli_args: &CliArgs) -> LevelFilter {
    if cli_args.verbose {
        LevelFilter::Debug
    } else if cli_args.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli_args = CliArgs::parse();

    let mut clog = colog::default_builder();
    clog.filter(None, log_level(&cli_args));
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path = cli_args
        .config
        .clone()
        .or_else(default_config_path)
        .ok_or("no config directory available, pass --config")?;
    let mut config = load_or_create_config(&config_path)?;
    apply_cli_overrides(&mut config.search, &cli_args);

    let paths = if cli_args.paths.is_empty() {
        match rfd::FileDialog::new()
            .set_title("Choose a music folder")
            .pick_folder()
        {
            Some(folder) => vec![folder],
            None => {
                info!("No folder selected");
                return Ok(());
            }
        }
    } else {
        cli_args.paths.clone()
    };

    let tracks = order_for_batch(
        collect_audio_files(&paths)
            .iter()
            .filter_map(|path| load_track(path))
            .collect(),
    );
    if tracks.is_empty() {
        warn!("No readable audio files found");
        return Ok(());
    }

    let agent = build_http_agent(&config.network);
    let providers = build_providers(&config.search.providers, &agent);
    if providers.is_empty() {
        warn!("No cover providers enabled; nothing will be found");
    }
    let store: Arc<dyn CoverStore> = Arc::new(LoftyCoverStore);
    let resolver = Arc::new(CoverResolver::new(
        providers,
        store,
        ResolverSettings::from_config(&config.search),
    )?);

    let (bus_sender, _) = broadcast::channel::<Message>(1024);
    let mut reporter = ConsoleReporter::new(bus_sender.subscribe());
    let reporter_thread = thread::Builder::new()
        .name("console-reporter".to_string())
        .spawn(move || reporter.run())?;

    let manager = CoverSearchManager::new(
        resolver,
        Arc::new(TerminalPicker::in_temp_dir()),
        Arc::new(BusObserver::new(bus_sender.clone())),
        config.search.auto_reuse_last_cover,
    );

    let handle = manager.run(tracks, SearchMode::from_config(&config.search))?;
    info!("Cover search batch {} running", handle.id());
    let cancellation = handle.cancellation_token();
    ctrlc::set_handler(move || {
        cancellation.cancel();
        warn!("Cancellation requested, stopping after the current track");
    })?;
    let outcome = handle.wait();

    drop(manager);
    drop(bus_sender);
    if reporter_thread.join().is_err() {
        warn!("Console reporter stopped unexpectedly");
    }

    match outcome {
        BatchOutcome::Completed | BatchOutcome::Cancelled => Ok(()),
        BatchOutcome::Failed => Err("cover search failed".into()),
    }
}
