use std::sync;

use slog::{o, Drain};
use structopt::StructOpt;

use drizzle::api;
use drizzle::config;
use drizzle::state;
use drizzle::watch;
use drizzle::weather;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "drizzle",
    about = "Irrigation monitoring service and dashboard poller"
)]
struct Options {
    /// Path to the configuration file; missing files fall back to defaults.
    #[structopt(short = "c", long = "config", default_value = "drizzle.toml")]
    config: String,

    #[structopt(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Run the HTTP service (the default).
    Serve,
    /// Poll a running service and render its status.
    Watch,
}

fn main() -> Result<(), failure::Error> {
    let options = Options::from_args();
    let log = init_logger();
    let config = config::Config::load(&options.config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    match options.command.unwrap_or(Command::Serve) {
        Command::Serve => runtime.block_on(serve(log, config)),
        Command::Watch => runtime.block_on(watch::run(log, &config.watch)),
    }
}

async fn serve(log: slog::Logger, config: config::Config) -> Result<(), failure::Error> {
    let station = sync::Arc::new(state::Station::new(
        log.new(o!("component" => "station")),
        config.moisture_threshold,
        config.history_capacity,
    ));
    let weather = weather::WeatherClient::new(
        log.new(o!("component" => "weather")),
        &config.weather,
    )?;
    let app = api::App {
        log: log.new(o!("component" => "api")),
        station,
        weather,
        cors_allowed_origins: sync::Arc::new(config.cors_allowed_origins.clone()),
    };
    api::run(app, &config.listen).await
}

fn init_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}
