//! reelmeta - movie/TV metadata lookup CLI (TMDB, OMDb).

/// Application configuration (TOML).
mod config;
/// Tracing subscriber and OpenTelemetry exporters.
mod telemetry;

use std::io::Write;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use reelmeta_api::omdb::{OmdbClient, OmdbSearchParams, OmdbTitleType};
use reelmeta_api::tmdb::{
    LocalTmdbApi, SearchMovieParams, SearchTvParams, TmdbClient, search_movies, search_tv_series,
};
use reelmeta_api::{MetricsSink, PaginateOptions};
use serde::Serialize;
use tracing::instrument;
use url::Url;

use crate::config::{AppConfig, resolve_secret};

/// CLI argument parser.
#[derive(Parser)]
#[command(name = "reelmeta", about, version)]
struct Cli {
    /// Override config directory.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Query TMDB API.
    Tmdb(TmdbCommand),
    /// Query OMDb API.
    Omdb(OmdbCommand),
    /// Manage the config file.
    Config(ConfigCommand),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

/// Arguments for the `tmdb` subcommand.
#[derive(clap::Args)]
struct TmdbCommand {
    /// TMDB subcommand to run.
    #[command(subcommand)]
    command: TmdbSubcommands,
}

/// Available TMDB subcommands.
#[derive(Subcommand)]
enum TmdbSubcommands {
    /// Get movie details from TMDB.
    Movie(TmdbMovieArgs),
    /// Get TV series details from TMDB.
    Tv(TmdbTvArgs),
    /// Search for movies on TMDB.
    SearchMovie(TmdbSearchMovieArgs),
    /// Search for TV series on TMDB.
    SearchTv(TmdbSearchTvArgs),
}

/// Paging bounds shared by the search subcommands.
#[derive(clap::Args)]
struct PageArgs {
    /// First page to fetch.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    start_page: u32,
    /// Stop after fetching this many pages.
    #[arg(long)]
    max_pages: Option<u32>,
    /// Stop after this many results.
    #[arg(long)]
    max_results: Option<usize>,
}

impl PageArgs {
    /// Converts the flags into pagination bounds.
    fn options(&self) -> PaginateOptions {
        let mut options = PaginateOptions::default().start_page(self.start_page);
        if let Some(pages) = self.max_pages {
            options = options.max_pages(pages);
        }
        if let Some(results) = self.max_results {
            options = options.max_results(results);
        }
        options
    }
}

/// Arguments for the `tmdb movie` subcommand.
#[derive(clap::Args)]
struct TmdbMovieArgs {
    /// TMDB movie ID.
    #[arg(long, required = true)]
    id: u64,
    /// Response language (default: "en-US").
    #[arg(long, default_value = "en-US")]
    language: String,
    /// Print JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `tmdb tv` subcommand.
#[derive(clap::Args)]
struct TmdbTvArgs {
    /// TMDB series ID.
    #[arg(long, required = true)]
    id: u64,
    /// Response language (default: "en-US").
    #[arg(long, default_value = "en-US")]
    language: String,
    /// Print JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `tmdb search-movie` subcommand.
#[derive(clap::Args)]
struct TmdbSearchMovieArgs {
    /// Search query (e.g. "Fight Club").
    #[arg(long, required = true)]
    query: String,
    /// Response language (default: "en-US").
    #[arg(long, default_value = "en-US")]
    language: String,
    /// Filter by year.
    #[arg(long)]
    year: Option<u32>,
    /// Filter by release region (ISO 3166-1, e.g. "US").
    #[arg(long)]
    region: Option<String>,
    /// Paging bounds.
    #[command(flatten)]
    page: PageArgs,
    /// Print one JSON object per line.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `tmdb search-tv` subcommand.
#[derive(clap::Args)]
struct TmdbSearchTvArgs {
    /// Search query (e.g. "Breaking Bad").
    #[arg(long, required = true)]
    query: String,
    /// Response language (default: "en-US").
    #[arg(long, default_value = "en-US")]
    language: String,
    /// Filter by first air date year.
    #[arg(long)]
    year: Option<u32>,
    /// Paging bounds.
    #[command(flatten)]
    page: PageArgs,
    /// Print one JSON object per line.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `omdb` subcommand.
#[derive(clap::Args)]
struct OmdbCommand {
    /// OMDb subcommand to run.
    #[command(subcommand)]
    command: OmdbSubcommands,
}

/// Available OMDb subcommands.
#[derive(Subcommand)]
enum OmdbSubcommands {
    /// Look up a title by IMDb ID.
    Title(OmdbTitleArgs),
    /// Search titles by name.
    Search(OmdbSearchArgs),
}

/// Arguments for the `omdb title` subcommand.
#[derive(clap::Args)]
struct OmdbTitleArgs {
    /// IMDb ID (e.g. "tt0137523").
    #[arg(long, required = true)]
    id: String,
    /// Print JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

/// Title kind accepted by `omdb search --type`.
#[derive(Clone, Copy, ValueEnum)]
enum TitleKind {
    /// Feature films.
    Movie,
    /// TV series.
    Series,
    /// Single episodes.
    Episode,
}

impl From<TitleKind> for OmdbTitleType {
    fn from(kind: TitleKind) -> Self {
        match kind {
            TitleKind::Movie => Self::Movie,
            TitleKind::Series => Self::Series,
            TitleKind::Episode => Self::Episode,
        }
    }
}

/// Arguments for the `omdb search` subcommand.
#[derive(clap::Args)]
struct OmdbSearchArgs {
    /// Search query (e.g. "Alien").
    #[arg(long, required = true)]
    query: String,
    /// Filter by year.
    #[arg(long)]
    year: Option<u32>,
    /// Filter by title kind.
    #[arg(long = "type", value_enum)]
    kind: Option<TitleKind>,
    /// Paging bounds.
    #[command(flatten)]
    page: PageArgs,
    /// Print one JSON object per line.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `config` subcommand.
#[derive(clap::Args)]
struct ConfigCommand {
    /// Config subcommand to run.
    #[command(subcommand)]
    command: ConfigSubcommands,
}

/// Available config subcommands.
#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Write an empty config file if none exists.
    Init,
    /// Show the config file path.
    Path,
}

/// Arguments for the `completions` subcommand.
#[derive(clap::Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: clap_complete::Shell,
}

/// Default `User-Agent` for both clients.
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Writes `value` to stdout as one line of JSON.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, value).context("failed to serialize JSON")?;
    writeln!(out).context("failed to write to stdout")
}

/// Parses a `base_url` override from the config file.
fn parse_base_url(section: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("invalid [{section}] base_url: {raw}"))
}

/// Loads the config file (or defaults when it does not exist).
///
/// # Errors
///
/// Returns an error if the path cannot be resolved or the file is malformed.
fn load_config(dir: Option<&PathBuf>) -> Result<AppConfig> {
    let path = AppConfig::path(dir.map(PathBuf::as_path))?;
    AppConfig::load(&path)
}

/// Builds a `TmdbClient` from config, with `TMDB_API_TOKEN` taking precedence.
///
/// # Errors
///
/// Returns an error if no token is available, the base URL is invalid, or the
/// client fails to build.
#[instrument(skip_all)]
fn build_tmdb_client(config: &AppConfig, metrics: Arc<dyn MetricsSink>) -> Result<TmdbClient> {
    let api_token = resolve_secret(
        std::env::var("TMDB_API_TOKEN").ok(),
        config.tmdb.api_token.as_deref(),
    )
    .context("TMDB API token is required: set TMDB_API_TOKEN or [tmdb] api_token")?;

    let mut builder = TmdbClient::builder()
        .api_token(api_token)
        .user_agent(config.http.user_agent.as_deref().unwrap_or(USER_AGENT))
        .metrics(metrics);
    if let Some(raw) = config.tmdb.base_url.as_deref() {
        builder = builder.base_url(parse_base_url("tmdb", raw)?);
    }
    if let Some(rps) = config.tmdb.requests_per_second {
        builder = builder.requests_per_second(rps);
    }
    if let Some(timeout) = config.http.timeout() {
        builder = builder.timeout(timeout);
    }
    builder.build().context("failed to build TMDB client")
}

/// Builds an `OmdbClient` from config, with `OMDB_API_KEY` taking precedence.
///
/// # Errors
///
/// Returns an error if no key is available, the base URL is invalid, or the
/// client fails to build.
#[instrument(skip_all)]
fn build_omdb_client(config: &AppConfig, metrics: Arc<dyn MetricsSink>) -> Result<OmdbClient> {
    let api_key = resolve_secret(
        std::env::var("OMDB_API_KEY").ok(),
        config.omdb.api_key.as_deref(),
    )
    .context("OMDb API key is required: set OMDB_API_KEY or [omdb] api_key")?;

    let mut builder = OmdbClient::builder()
        .api_key(api_key)
        .user_agent(config.http.user_agent.as_deref().unwrap_or(USER_AGENT))
        .metrics(metrics);
    if let Some(raw) = config.omdb.base_url.as_deref() {
        builder = builder.base_url(parse_base_url("omdb", raw)?);
    }
    if let Some(rps) = config.omdb.requests_per_second {
        builder = builder.requests_per_second(rps);
    }
    if let Some(timeout) = config.http.timeout() {
        builder = builder.timeout(timeout);
    }
    builder.build().context("failed to build OMDb client")
}

/// Runs the `tmdb movie` subcommand.
///
/// # Errors
///
/// Returns an error if the TMDB client fails to build or the API request fails.
#[instrument(skip_all)]
async fn run_tmdb_movie(args: &TmdbMovieArgs, client: &TmdbClient) -> Result<()> {
    let movie = client
        .movie_details(args.id, &args.language)
        .await
        .context("TMDB movie request failed")?;

    if args.json {
        return write_json(&movie);
    }

    let genres: Vec<&str> = movie.genres.iter().map(|g| g.name.as_str()).collect();
    tracing::info!("ID: {}", movie.id);
    tracing::info!("Title: {}", movie.title);
    tracing::info!(
        "Original Title: {}",
        movie.original_title.as_deref().unwrap_or("-")
    );
    tracing::info!(
        "Release Date: {}",
        movie.release_date.as_deref().unwrap_or("-")
    );
    tracing::info!(
        "Runtime: {}",
        movie
            .runtime
            .map_or_else(|| String::from("-"), |r| format!("{r}min"))
    );
    tracing::info!("Genres: {}", genres.join(", "));
    tracing::info!("IMDb ID: {}", movie.imdb_id.as_deref().unwrap_or("-"));

    Ok(())
}

/// Runs the `tmdb tv` subcommand.
///
/// # Errors
///
/// Returns an error if the TMDB client fails to build or the API request fails.
#[instrument(skip_all)]
async fn run_tmdb_tv(args: &TmdbTvArgs, client: &TmdbClient) -> Result<()> {
    let details = client
        .tv_details(args.id, &args.language)
        .await
        .context("TMDB tv details request failed")?;

    if args.json {
        return write_json(&details);
    }

    tracing::info!("ID: {}", details.id);
    tracing::info!("Name: {}", details.name);
    tracing::info!(
        "Original Name: {}",
        details.original_name.as_deref().unwrap_or("-")
    );
    tracing::info!(
        "First Air Date: {}",
        details.first_air_date.as_deref().unwrap_or("-")
    );
    tracing::info!(
        "Seasons: {}",
        details
            .number_of_seasons
            .map_or_else(|| String::from("-"), |n| n.to_string())
    );
    tracing::info!(
        "Episodes: {}",
        details
            .number_of_episodes
            .map_or_else(|| String::from("-"), |n| n.to_string())
    );
    tracing::info!("---");
    for season in &details.seasons {
        tracing::info!(
            "  Season {}: {} episodes (air_date: {})",
            season.season_number,
            season.episode_count,
            season.air_date.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}

/// Runs the `tmdb search-movie` subcommand, streaming results page by page.
///
/// # Errors
///
/// Returns an error if the TMDB client fails to build or a page request fails.
#[instrument(skip_all)]
async fn run_tmdb_search_movie(args: &TmdbSearchMovieArgs, client: &TmdbClient) -> Result<()> {
    let mut params = SearchMovieParams::new(&args.query).language(&args.language);
    if let Some(year) = args.year {
        params = params.year(year);
    }
    if let Some(region) = &args.region {
        params = params.region(region);
    }

    let mut results = pin!(search_movies(client, &params, args.page.options()));
    let mut count: usize = 0;
    if !args.json {
        tracing::info!("ID\tTitle\t\t\tOrigLang\tReleaseDate");
    }
    while let Some(movie) = results
        .try_next()
        .await
        .context("TMDB search/movie request failed")?
    {
        count = count.saturating_add(1);
        if args.json {
            write_json(&movie)?;
            continue;
        }
        tracing::info!(
            "{}\t{}\t{}\t\t{}",
            movie.id,
            movie.title,
            movie.original_language.as_deref().unwrap_or("-"),
            movie.release_date.as_deref().unwrap_or("-"),
        );
    }

    if !args.json {
        tracing::info!("Results: {count}");
    }
    Ok(())
}

/// Runs the `tmdb search-tv` subcommand, streaming results page by page.
///
/// # Errors
///
/// Returns an error if the TMDB client fails to build or a page request fails.
#[instrument(skip_all)]
async fn run_tmdb_search_tv(args: &TmdbSearchTvArgs, client: &TmdbClient) -> Result<()> {
    let mut params = SearchTvParams::new(&args.query).language(&args.language);
    if let Some(year) = args.year {
        params = params.first_air_date_year(year);
    }

    let mut results = pin!(search_tv_series(client, &params, args.page.options()));
    let mut count: usize = 0;
    if !args.json {
        tracing::info!("ID\tName\t\t\tOrigLang\tCountry\t\tFirstAirDate");
    }
    while let Some(series) = results
        .try_next()
        .await
        .context("TMDB search/tv request failed")?
    {
        count = count.saturating_add(1);
        if args.json {
            write_json(&series)?;
            continue;
        }
        tracing::info!(
            "{}\t\t{}\t{}\t\t{}\t\t{}",
            series.id,
            series.name,
            series.original_language.as_deref().unwrap_or("-"),
            series.origin_country.join(","),
            series.first_air_date.as_deref().unwrap_or("-"),
        );
    }

    if !args.json {
        tracing::info!("Results: {count}");
    }
    Ok(())
}

/// Runs the `omdb title` subcommand.
///
/// # Errors
///
/// Returns an error if the OMDb client fails to build or the API request fails.
#[instrument(skip_all)]
async fn run_omdb_title(args: &OmdbTitleArgs, client: &OmdbClient) -> Result<()> {
    let title = client
        .title_by_imdb_id(&args.id)
        .await
        .context("OMDb title request failed")?;

    if args.json {
        return write_json(&title);
    }

    tracing::info!("IMDb ID: {}", title.imdb_id);
    tracing::info!("Title: {}", title.title);
    tracing::info!("Year: {}", title.year.as_deref().unwrap_or("-"));
    tracing::info!("Type: {}", title.title_type.as_deref().unwrap_or("-"));
    tracing::info!("Rated: {}", title.rated.as_deref().unwrap_or("-"));
    tracing::info!("Runtime: {}", title.runtime.as_deref().unwrap_or("-"));
    tracing::info!("Genre: {}", title.genre.as_deref().unwrap_or("-"));
    tracing::info!("Director: {}", title.director.as_deref().unwrap_or("-"));
    tracing::info!("IMDb Rating: {}", title.imdb_rating.as_deref().unwrap_or("-"));

    Ok(())
}

/// Runs the `omdb search` subcommand, streaming results page by page.
///
/// # Errors
///
/// Returns an error if the OMDb client fails to build or a page request fails.
#[instrument(skip_all)]
async fn run_omdb_search(args: &OmdbSearchArgs, client: &OmdbClient) -> Result<()> {
    let mut params = OmdbSearchParams::new(&args.query);
    if let Some(year) = args.year {
        params = params.year(year);
    }
    if let Some(kind) = args.kind {
        params = params.title_type(kind.into());
    }

    let mut results = pin!(client.search(&params, args.page.options()));
    let mut count: usize = 0;
    if !args.json {
        tracing::info!("IMDbID\t\tYear\tType\tTitle");
    }
    while let Some(item) = results
        .try_next()
        .await
        .context("OMDb search request failed")?
    {
        count = count.saturating_add(1);
        if args.json {
            write_json(&item)?;
            continue;
        }
        tracing::info!(
            "{}\t{}\t{}\t{}",
            item.imdb_id,
            item.year.as_deref().unwrap_or("-"),
            item.title_type.as_deref().unwrap_or("-"),
            item.title,
        );
    }

    if !args.json {
        tracing::info!("Results: {count}");
    }
    Ok(())
}

/// Runs the `config init` subcommand.
///
/// # Errors
///
/// Returns an error if the path cannot be resolved or the file cannot be written.
fn run_config_init(dir: Option<&PathBuf>) -> Result<()> {
    let path = AppConfig::path(dir.map(PathBuf::as_path))?;
    if path.exists() {
        tracing::info!("Config already exists: {}", path.display());
        return Ok(());
    }
    AppConfig::default().save(&path)?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

/// Runs the `config path` subcommand.
///
/// # Errors
///
/// Returns an error if the path cannot be resolved.
fn run_config_path(dir: Option<&PathBuf>) -> Result<()> {
    let path = AppConfig::path(dir.map(PathBuf::as_path))?;
    tracing::info!("{}", path.display());
    Ok(())
}

/// Runs the `completions` subcommand.
fn run_completions(args: &CompletionsArgs) {
    let mut cmd = Cli::command();
    let name = String::from(cmd.get_name());
    clap_complete::generate(args.shell, &mut cmd, name, &mut std::io::stdout());
}

/// Dispatches the parsed command line.
///
/// # Errors
///
/// Returns an error if subcommand execution fails.
async fn run(cli: Cli) -> Result<()> {
    let dir = cli.dir.as_ref();
    match cli.command {
        Commands::Tmdb(tmdb) => {
            let config = load_config(dir)?;
            let client = build_tmdb_client(&config, telemetry::metrics_sink())?;
            match tmdb.command {
                TmdbSubcommands::Movie(args) => run_tmdb_movie(&args, &client).await,
                TmdbSubcommands::Tv(args) => run_tmdb_tv(&args, &client).await,
                TmdbSubcommands::SearchMovie(args) => run_tmdb_search_movie(&args, &client).await,
                TmdbSubcommands::SearchTv(args) => run_tmdb_search_tv(&args, &client).await,
            }
        }
        Commands::Omdb(omdb) => {
            let config = load_config(dir)?;
            let client = build_omdb_client(&config, telemetry::metrics_sink())?;
            match omdb.command {
                OmdbSubcommands::Title(args) => run_omdb_title(&args, &client).await,
                OmdbSubcommands::Search(args) => run_omdb_search(&args, &client).await,
            }
        }
        Commands::Config(config) => match config.command {
            ConfigSubcommands::Init => run_config_init(dir),
            ConfigSubcommands::Path => run_config_path(dir),
        },
        Commands::Completions(args) => {
            run_completions(&args);
            Ok(())
        }
    }
}

/// Entry point.
///
/// # Errors
///
/// Returns an error if subcommand execution fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _telemetry = telemetry::init();
    run(Cli::parse()).await
}
