mod config;
mod convert;
mod db;
mod entities;
mod error;
mod hunter;
mod models;
mod normalize;
mod scraper;
mod source;

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    config::Config,
    convert::Format,
    hunter::{HuntOptions, Hunter},
    models::{Category, Genre},
    scraper::FzSource,
};

#[derive(Parser)]
#[command(
    name = "data-hunter",
    about = "Hunt movie metadata into per-genre CSV datasets and repackage them",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hunt down matches and append them to per-genre datasets
    Hunt(HuntArgs),
    /// Save all the movie data to a sqlite database under the movies table
    CreateDb {
        /// Directory holding the datasets
        directory: PathBuf,
        /// Filename under which to save the data
        #[arg(short, long, default_value = "movies-data.db")]
        output: PathBuf,
        /// Pattern for the .csv filename
        #[arg(short, long, default_value = "*")]
        pattern: String,
    },
    /// Export contents of the datasets to various formats
    ToFormat {
        /// Directory holding the datasets
        directory: PathBuf,
        /// Targeted export formats
        #[arg(short, long = "format", value_enum, num_args = 1..)]
        formats: Vec<Format>,
        /// Filename (without extension) under which to save the data
        #[arg(short, long, default_value = "movies-data")]
        output: String,
        /// Pattern for the .csv filename
        #[arg(short, long, default_value = "*")]
        pattern: String,
    },
    /// Split the flat movies table into a relational schema
    RelateTables {
        /// Populated flat sqlite database
        db_path: PathBuf,
        /// Path for the new relational database
        save_to: PathBuf,
    },
}

#[derive(Args)]
struct HuntArgs {
    /// Movie genres, or 'all'
    #[arg(short, long, num_args = 0.., default_value = "all")]
    genres: Vec<String>,
    /// Movie categories, or 'all'
    #[arg(short, long, num_args = 0.., default_value = "all")]
    categories: Vec<String>,
    /// Total movies per genre; a soft ceiling at provider page granularity
    #[arg(short, long, default_value_t = 1_000_000)]
    limit: u64,
    /// Parent directory to save the datasets to
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,
    /// Dataset filename prefix
    #[arg(short, long, default_value = "")]
    prefix: String,
    /// Do not render progress
    #[arg(short, long)]
    quiet: bool,
    /// One line per page instead of an in-place progress line
    #[arg(short, long)]
    trace: bool,
    /// Remove matching <prefix>*.csv files from the directory first
    #[arg(short = 'w', long)]
    overwrite: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,data_hunter=debug,sqlx=warn".to_string()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Hunt(args) => hunt(args).await,
        Commands::CreateDb { directory, output, pattern } => {
            let files = convert::discover_datasets(&directory, &pattern)?;
            let total = convert::load_into_table(&output, &files, |path, rows| {
                println!("> Handling {} movie data from {}", rows, path.display());
            })
            .await?;
            println!("> Total entries in the table movies - {total}");
            Ok(())
        },
        Commands::ToFormat { directory, formats, output, pattern } => {
            let files = convert::discover_datasets(&directory, &pattern)?;
            let records = convert::load_records(&files, |path, rows| {
                println!("> Handling {} movie data from {}", rows, path.display());
            })?;
            let formats = if formats.is_empty() { vec![Format::Csv] } else { formats };
            for format in formats {
                let saved_to = convert::write_format(&records, format, &output)?;
                println!("> Movies data ({}) saved to {}", format, saved_to.display());
            }
            Ok(())
        },
        Commands::RelateTables { db_path, save_to } => {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
                    .progress_chars("=> "),
            );
            let report = normalize::relate_tables(&db_path, &save_to, |p| {
                if bar.length() == Some(0) {
                    bar.set_length(p.total as u64);
                }
                bar.set_position(p.index as u64);
                bar.set_message(p.title.to_string());
            })
            .await?;
            bar.finish_and_clear();

            println!(
                "Related {} of {} title(s) into {}",
                report.created,
                report.titles,
                save_to.display()
            );
            for (title, reason) in &report.failures {
                println!("  ! {title}: {reason}");
            }
            Ok(())
        },
    }
}

async fn hunt(args: HuntArgs) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let client = wreq::Client::builder()
        .user_agent("data-hunter/0.1")
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;
    let source = FzSource::new(client, &config);
    let hunter = Hunter::new(
        parse_selection::<Genre>(&args.genres)?,
        parse_selection::<Category>(&args.categories)?,
    );
    let opts = HuntOptions { dir: args.dir, prefix: args.prefix, limit: args.limit };

    if args.overwrite {
        let pattern = opts.dir.join(format!("{}*.csv", opts.prefix));
        for entry in glob::glob(&pattern.to_string_lossy())? {
            std::fs::remove_file(entry?)?;
        }
    }

    let summary = if args.quiet {
        hunter.hunt(&source, &opts, |_| {}).await?
    } else if args.trace {
        hunter
            .hunt(&source, &opts, |p| {
                println!(
                    "> [Category : {}] - [Genre : {}] - [Movies : {}] - [Page : +{}] - {}",
                    p.category,
                    p.genre,
                    p.genre_total,
                    p.page_rows,
                    p.saved_to.display()
                );
            })
            .await?
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
        let mut total = 0u64;
        let summary = hunter
            .hunt(&source, &opts, |p| {
                total += p.page_rows as u64;
                bar.set_message(format!(
                    "[{} / {}] {} movies - {} total",
                    p.category, p.genre, p.genre_total, total
                ));
                bar.tick();
            })
            .await?;
        bar.finish_and_clear();
        summary
    };

    if !args.quiet {
        println!(
            "Hunted {} movie(s) across {} genre(s) into {} file(s)",
            summary.total_movies,
            summary.genres.len(),
            summary.saved_to.len()
        );
    }
    Ok(())
}

/// `all` (or the legacy `_`) selects the whole closed set.
fn parse_selection<T: std::str::FromStr>(args: &[String]) -> Result<Vec<T>, T::Err> {
    if args.iter().any(|a| a == "all" || a == "_") {
        return Ok(Vec::new());
    }
    args.iter().map(|a| a.parse()).collect()
}
