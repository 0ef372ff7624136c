//! Launcher plugins - manage and query out-of-process search plugins.
//!
//! Discovers installed plugin packages, keeps track of which plugins are
//! enabled and runs searches against them from the terminal.

use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use futures::StreamExt;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use launcher_plugins::contract::calendar::{CalendarDomain, CalendarEvent, CalendarQuery};
use launcher_plugins::contract::file::{File, FileDomain, FileQuery};
use launcher_plugins::contract::location::{Location, LocationDomain, LocationQuery};
use launcher_plugins::contract::weather::{Forecast, ForecastQuery, WeatherDomain, WeatherLocation};
use launcher_plugins::contract::Domain;
use launcher_plugins::ipc::ProcessTransport;
use launcher_plugins::plugin::{
    JsonPluginRepository, ManifestIndex, PluginWithState, QueryPluginClient, TracingReporter,
};
use launcher_plugins::{Config, Plugin, PluginFilter, PluginService, PluginState, PluginType};

/// Manage and query launcher search plugins
#[derive(Parser)]
#[command(name = "launcher-plugins")]
#[command(author, version, about = "Manage and query launcher search plugins", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rescan installed packages for plugins
    Scan,

    /// List known plugins (default)
    List {
        /// Only plugins of this type (Calendar, LocationSearch, FileSearch, Weather)
        #[arg(short = 't', long = "type")]
        plugin_type: Option<PluginType>,

        /// Only enabled plugins
        #[arg(short, long)]
        enabled: bool,

        /// Also query each plugin's state
        #[arg(short, long)]
        state: bool,
    },

    /// List known plugins grouped by package
    Packages,

    /// Enable a plugin
    Enable {
        /// Plugin authority
        authority: String,
    },

    /// Disable a plugin
    Disable {
        /// Plugin authority
        authority: String,
    },

    /// Show the live state of a plugin
    State {
        /// Plugin authority
        authority: String,
    },

    /// Ask a plugin to let this host query it
    Grant {
        /// Plugin authority
        authority: String,
    },

    /// Search a plugin
    Search {
        #[command(subcommand)]
        domain: SearchDomain,
    },

    /// List the calendars a calendar plugin offers
    Calendars {
        /// Plugin authority
        authority: String,
    },

    /// Find places a weather plugin can forecast for
    WeatherLocations {
        /// Plugin authority
        authority: String,

        /// Place name
        text: String,
    },

    /// Rescan whenever packages change and print the plugin list
    Watch,

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum SearchDomain {
    /// Search calendar events and tasks
    Calendar {
        /// Plugin authority
        authority: String,

        /// Search text; omit to list everything in range
        text: Option<String>,

        /// Number of days from now to search
        #[arg(long, default_value_t = 7)]
        days: i64,

        /// Calendar ids to leave out
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
    },

    /// Search places
    Location {
        /// Plugin authority
        authority: String,

        /// Search text
        text: String,

        /// Latitude of the user
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude of the user
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Search radius in meters
        #[arg(long, default_value_t = 5000)]
        radius: i64,
    },

    /// Search files
    Files {
        /// Plugin authority
        authority: String,

        /// Search text
        text: String,
    },

    /// Weather forecasts for a position or a picked location
    Weather {
        /// Plugin authority
        authority: String,

        /// Latitude
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Location id from 'weather-locations'
        #[arg(long, requires = "name", conflicts_with = "lat")]
        id: Option<String>,

        /// Location name; omit for the current position
        #[arg(long)]
        name: Option<String>,
    },
}

/// Everything a command needs to talk to plugins.
struct Host {
    config: Config,
    service: PluginService,
    transport: Arc<ProcessTransport>,
    runtime: Runtime,
}

impl Host {
    fn open() -> Result<Self> {
        let config = Config::load()?;
        let runtime = Runtime::new()?;

        let index = Arc::new(ManifestIndex::new(config.plugins_dir()));
        let repository = Arc::new(JsonPluginRepository::open(config.registry_path())?);
        let transport = Arc::new(ProcessTransport::new(config.caller(), index.clone()));
        let service = PluginService::new(repository, index, transport.clone(), Arc::new(TracingReporter));

        Ok(Self { config, service, transport, runtime })
    }

    fn plugin(&self, authority: &str) -> Result<Plugin> {
        self.service.plugin(authority).ok_or_else(|| {
            anyhow::anyhow!("Unknown plugin '{authority}'. Run 'launcher-plugins scan' first.")
        })
    }

    fn client<D: Domain>(&self, authority: &str) -> Result<QueryPluginClient<D>> {
        let plugin = self.plugin(authority)?;
        if !plugin.enabled {
            anyhow::bail!("Plugin '{authority}' is disabled. Enable it with 'launcher-plugins enable {authority}'.");
        }
        QueryPluginClient::<D>::for_plugin(self.transport.clone(), &plugin)
            .map(|client| client.with_options(self.config.query_options()))
            .ok_or_else(|| anyhow::anyhow!("Plugin '{authority}' is a {} plugin", plugin.plugin_type))
    }

    /// Run `f` and stop the plugin processes it started.
    fn run<F: std::future::Future>(&self, f: F) -> F::Output {
        self.runtime.block_on(async {
            let output = f.await;
            self.transport.shutdown().await;
            output
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    match cli.command {
        None => cmd_list(None, false, false)?,
        Some(Commands::Scan) => cmd_scan()?,
        Some(Commands::List { plugin_type, enabled, state }) => {
            cmd_list(plugin_type, enabled, state)?;
        }
        Some(Commands::Packages) => cmd_packages()?,
        Some(Commands::Enable { authority }) => cmd_set_enabled(&authority, true)?,
        Some(Commands::Disable { authority }) => cmd_set_enabled(&authority, false)?,
        Some(Commands::State { authority }) => cmd_state(&authority)?,
        Some(Commands::Grant { authority }) => cmd_grant(&authority)?,
        Some(Commands::Search { domain }) => cmd_search(domain)?,
        Some(Commands::Calendars { authority }) => cmd_calendars(&authority)?,
        Some(Commands::WeatherLocations { authority, text }) => cmd_weather_locations(&authority, &text)?,
        Some(Commands::Watch) => cmd_watch()?,
        Some(Commands::Config { path }) => cmd_config(path)?,
        Some(Commands::Completions { shell }) => cmd_completions(shell),
    }

    Ok(())
}

/// Rescan installed packages.
fn cmd_scan() -> Result<()> {
    let host = Host::open()?;
    host.run(host.service.refresh());

    let plugins = host.service.plugins(&PluginFilter::all());
    if plugins.is_empty() {
        println!("No plugins found in {}", host.config.plugins_dir().display());
        return Ok(());
    }

    println!("Found {} plugin(s):\n", plugins.len());
    for plugin in &plugins {
        print_plugin(plugin, None, false);
    }
    Ok(())
}

/// List stored plugins.
fn cmd_list(plugin_type: Option<PluginType>, enabled: bool, with_state: bool) -> Result<()> {
    let host = Host::open()?;

    let mut filter = PluginFilter::all();
    filter.plugin_type = plugin_type;
    if enabled {
        filter = filter.enabled(true);
    }

    let plugins = host.service.plugins(&filter);
    if plugins.is_empty() {
        println!("No plugins known.");
        println!("\nInstall packages into {} and run:", host.config.plugins_dir().display());
        println!("  launcher-plugins scan");
        return Ok(());
    }

    if with_state {
        let mut states = Box::pin(host.service.plugins_with_state(filter));
        let entries = host.run(states.next()).unwrap_or_default();
        for PluginWithState { plugin, state } in &entries {
            print_plugin(plugin, state.as_ref(), true);
        }
    } else {
        for plugin in &plugins {
            print_plugin(plugin, None, false);
        }
    }

    println!("\nTotal: {} plugin(s)", plugins.len());
    Ok(())
}

/// List stored plugins by package.
fn cmd_packages() -> Result<()> {
    let host = Host::open()?;

    let packages = host.service.plugin_packages();
    if packages.is_empty() {
        println!("No plugin packages known.");
        return Ok(());
    }

    for package in &packages {
        let marker = if package.is_enabled() { "✓" } else { "○" };
        println!("{} {} ({})", marker, package.label, package.package_name);
        if let Some(ref author) = package.author {
            println!("    by {}", author);
        }
        if let Some(ref desc) = package.description {
            println!("    {}", desc);
        }
        for plugin in &package.plugins {
            println!("    - {} {} [{}]", plugin.plugin_type.icon(), plugin.label, plugin.authority);
        }
    }
    Ok(())
}

/// Enable or disable a plugin.
fn cmd_set_enabled(authority: &str, enabled: bool) -> Result<()> {
    let host = Host::open()?;
    let plugin = host.plugin(authority)?;

    let changed = if enabled { host.service.enable_plugin(&plugin) } else { host.service.disable_plugin(&plugin) };
    if !changed {
        anyhow::bail!("Could not update plugin '{authority}'");
    }

    println!("{} {}", if enabled { "Enabled" } else { "Disabled" }, plugin.label);
    Ok(())
}

/// Show the live state of a plugin.
fn cmd_state(authority: &str) -> Result<()> {
    let host = Host::open()?;
    let plugin = host.plugin(authority)?;

    let state = host.run(host.service.plugin_state(&plugin));
    print_plugin(&plugin, state.as_ref(), true);
    Ok(())
}

/// Run a plugin's grant flow.
fn cmd_grant(authority: &str) -> Result<()> {
    let host = Host::open()?;
    let plugin = host.plugin(authority)?;

    if host.run(host.service.request_permission(&plugin)) {
        println!("Access to {} granted", plugin.label);
    } else {
        println!("Access to {} not granted", plugin.label);
    }
    Ok(())
}

/// Cancels `token` on Ctrl+C.
fn cancel_on_interrupt(token: &CancellationToken) -> Result<()> {
    let token = token.clone();
    ctrlc::set_handler(move || token.cancel())?;
    Ok(())
}

/// Search a plugin.
fn cmd_search(domain: SearchDomain) -> Result<()> {
    let host = Host::open()?;
    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel)?;

    match domain {
        SearchDomain::Calendar { authority, text, days, exclude } => {
            let client = host.client::<CalendarDomain>(&authority)?;
            let now = chrono::Utc::now().timestamp_millis();
            let query = CalendarQuery {
                query: text,
                start: Some(now),
                end: Some(now + days * 24 * 60 * 60 * 1000),
                excluded_calendars: exclude,
            };
            let events = host.run(client.search(&query, cancel.clone()));
            print_results(&events, &cancel, print_event);
        }
        SearchDomain::Location { authority, text, lat, lon, radius } => {
            let client = host.client::<LocationDomain>(&authority)?;
            let query = LocationQuery { query: text, user_latitude: lat, user_longitude: lon, search_radius: radius };
            let locations = host.run(client.search(&query, cancel.clone()));
            print_results(&locations, &cancel, print_location);
        }
        SearchDomain::Files { authority, text } => {
            let client = host.client::<FileDomain>(&authority)?;
            let files = host.run(client.search(&FileQuery { query: text }, cancel.clone()));
            print_results(&files, &cancel, print_file);
        }
        SearchDomain::Weather { authority, lat, lon, id, name } => {
            let query = match (lat.zip(lon), id, name) {
                (_, Some(id), Some(name)) => ForecastQuery::At(WeatherLocation::Id { id, name }),
                (Some((lat, lon)), None, Some(name)) => {
                    ForecastQuery::At(WeatherLocation::LatLon { name, lat, lon })
                }
                (Some((lat, lon)), None, None) => ForecastQuery::Current { lat, lon },
                _ => anyhow::bail!("Give --lat and --lon, or --id and --name"),
            };
            let client = host.client::<WeatherDomain>(&authority)?;
            let forecasts = host.run(client.search(&query, cancel.clone()));
            print_results(&forecasts, &cancel, print_forecast);
        }
    }
    Ok(())
}

/// List a calendar plugin's calendars.
fn cmd_calendars(authority: &str) -> Result<()> {
    let host = Host::open()?;
    let client = host.client::<CalendarDomain>(authority)?;

    let lists = host.run(client.calendar_lists(CancellationToken::new()));
    if lists.is_empty() {
        println!("No calendars.");
    }
    for list in &lists {
        let account = list.account_name.as_deref().map(|a| format!(" ({a})")).unwrap_or_default();
        println!("  {} {}{}", list.id, list.name, account);
    }
    Ok(())
}

/// Resolve a place name with a weather plugin.
fn cmd_weather_locations(authority: &str, text: &str) -> Result<()> {
    let host = Host::open()?;
    let client = host.client::<WeatherDomain>(authority)?;

    let locations = host.run(client.find_locations(text, CancellationToken::new()));
    if locations.is_empty() {
        println!("No locations.");
    }
    for location in &locations {
        match location {
            WeatherLocation::Id { id, name } => println!("  {} (id {})", name, id),
            WeatherLocation::LatLon { name, lat, lon } => println!("  {} ({:.4}, {:.4})", name, lat, lon),
        }
    }
    Ok(())
}

/// Follow package changes until interrupted.
fn cmd_watch() -> Result<()> {
    let host = Host::open()?;
    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel)?;

    let plugins_dir = host.config.plugins_dir();
    let watch_enabled = host.config.watch.enabled;

    host.run(async {
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        #[cfg(feature = "file-watch")]
        let _watcher = if watch_enabled {
            Some(launcher_plugins::plugin::PackageWatcher::start(&plugins_dir, tx.clone())?)
        } else {
            None
        };
        if !watch_enabled || cfg!(not(feature = "file-watch")) {
            tracing::warn!("Directory watching is off; showing the current plugins only");
        }

        host.service.start(rx);
        println!("Watching {}. Press Ctrl+C to stop.", plugins_dir.display());

        let mut updates = Box::pin(host.service.plugins_with_state(PluginFilter::all()));
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                update = updates.next() => {
                    let Some(entries) = update else { break };
                    println!("\n{} plugin(s):", entries.len());
                    for PluginWithState { plugin, state } in &entries {
                        print_plugin(plugin, state.as_ref(), true);
                    }
                }
            }
        }

        drop(tx);
        Ok::<(), anyhow::Error>(())
    })?;

    println!("\nStopped.");
    Ok(())
}

/// Show configuration.
fn cmd_config(show_path: bool) -> Result<()> {
    if show_path {
        if let Some(path) = Config::config_dir() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = Config::load()?;
    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "launcher-plugins", &mut io::stdout());
}

fn print_plugin(plugin: &Plugin, state: Option<&PluginState>, show_state: bool) {
    let marker = if plugin.enabled { "✓" } else { "○" };
    print!("  {} {} {} [{}] {}", marker, plugin.plugin_type.icon(), plugin.label, plugin.authority, plugin.plugin_type);

    if show_state {
        match state {
            Some(PluginState::Ready { text: Some(text) }) => print!(" - ready: {text}"),
            Some(PluginState::Ready { text: None }) => print!(" - ready"),
            Some(PluginState::SetupRequired { message, .. }) => {
                print!(" - setup required");
                if let Some(message) = message {
                    print!(": {message}");
                }
            }
            None => print!(" - not responding"),
        }
    }
    println!();

    if let Some(ref desc) = plugin.description {
        println!("      {}", desc);
    }
}

fn print_results<T>(items: &[T], cancel: &CancellationToken, print: fn(&T)) {
    if cancel.is_cancelled() {
        println!("Cancelled");
        return;
    }
    if items.is_empty() {
        println!("No results.");
        return;
    }
    for item in items {
        print(item);
    }
    println!("\n{} result(s)", items.len());
}

fn format_millis(millis: i64, include_time: bool) -> String {
    let Some(time) = chrono::DateTime::from_timestamp_millis(millis) else {
        return millis.to_string();
    };
    let local = time.with_timezone(&chrono::Local);
    if include_time {
        local.format("%Y-%m-%d %H:%M").to_string()
    } else {
        local.format("%Y-%m-%d").to_string()
    }
}

fn print_event(event: &CalendarEvent) {
    let when = match event.start_time {
        Some(start) => format!(
            "{} - {}",
            format_millis(start, event.include_time),
            format_millis(event.end_time, event.include_time)
        ),
        None => format!("due {}", format_millis(event.end_time, event.include_time)),
    };
    let done = match event.is_completed {
        Some(true) => "[x] ",
        Some(false) => "[ ] ",
        None => "",
    };
    println!("  {}{} ({})", done, event.title, when);
    if let Some(ref location) = event.location {
        println!("      at {}", location);
    }
}

fn print_location(location: &Location) {
    println!("  {} ({:.5}, {:.5})", location.label, location.latitude, location.longitude);
    let address: Vec<&str> = [location.street.as_deref(), location.house_number.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !address.is_empty() {
        println!("      {}", address.join(" "));
    }
    if let Some(ref category) = location.category {
        println!("      {}", category);
    }
}

fn print_forecast(forecast: &Forecast) {
    println!(
        "  {} {:.1}°C {} ({})",
        format_millis(forecast.timestamp, true),
        forecast.temperature - 273.15,
        forecast.condition,
        forecast.location
    );
}

fn print_file(file: &File) {
    let kind = if file.is_directory { "dir " } else { "file" };
    println!("  {} {} ({})", kind, file.display_name, file.mime_type_or_default());
    if let Some(ref path) = file.path {
        println!("      {}", path);
    }
}
