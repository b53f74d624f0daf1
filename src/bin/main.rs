// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use khpack::config::{ExtractionConfig, NameTableConfig, TitleConfig};
use khpack::container::{ContainerKind, ContainerSource, EntryHash, EntryLocation};
use khpack::extract::{ExtractionPipeline, RemasteredLayout, TitleState};
use khpack::names::{AssetNameResolver, NameTable};
use khpack::title::{GameTitle, DEFAULT_LANGUAGE, KH2_DISC_DATA, KH2_DISC_INDEX};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "khpack")]
#[command(about = "Extracts game data from the disc and digital releases")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract one or more titles into a folder
    Extract {
        /// JSON configuration to start from, the other options are added on top
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Destination folder (default: ./extracted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Root of a digital installation, containing the Image folder
        #[arg(long)]
        install: Option<PathBuf>,

        /// Language folder of the digital installation
        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        language: String,

        /// Disc image to extract from instead of a digital installation
        #[arg(long)]
        disc_image: Option<PathBuf>,

        /// Titles to extract: kh1, kh2, bbs, recom, kh3d (can specify multiple)
        #[arg(short, long = "title")]
        titles: Vec<GameTitle>,

        /// Name tables to resolve file names with (can specify multiple)
        #[arg(short, long = "names")]
        names: Vec<PathBuf>,

        /// Where remastered resources are written
        #[arg(long, value_enum)]
        layout: Option<Layout>,
    },
    /// List the entries of a single index
    List {
        #[command(flatten)]
        source: SourceArgs,

        /// Name tables to resolve file names with (can specify multiple)
        #[arg(short, long = "names")]
        names: Vec<PathBuf>,
    },
    /// Print the hashes the containers use for file paths
    Hash {
        /// Only print the hash of this release
        #[arg(long, value_enum)]
        kind: Option<Kind>,

        /// Paths to hash, e.g. "obj/P_EX100.mdlx"
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// A digital index, the data container is the .pkg next to it
    #[arg(long, conflicts_with_all = ["idx", "disc_image"])]
    hed: Option<PathBuf>,

    /// A disc index that was copied off the disc, the data container is the .IMG next to it
    #[arg(long, conflicts_with = "disc_image")]
    idx: Option<PathBuf>,

    /// A disc image to read KH2.IDX from
    #[arg(long)]
    disc_image: Option<PathBuf>,
}

impl SourceArgs {
    fn source(&self) -> Result<ContainerSource> {
        Ok(match (&self.hed, &self.idx, &self.disc_image) {
            (Some(hed), None, None) => ContainerSource::Digital {
                index: hed.clone(),
                data: hed.with_extension("pkg"),
            },
            (None, Some(idx), None) => ContainerSource::DiscFiles {
                index: idx.clone(),
                data: idx.with_extension("IMG"),
            },
            (None, None, Some(image)) => ContainerSource::DiscImage {
                image: image.clone(),
                index_name: KH2_DISC_INDEX.to_string(),
                data_name: KH2_DISC_DATA.to_string(),
            },
            _ => bail!("Exactly one of --hed, --idx or --disc-image is required"),
        })
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Layout {
    /// Next to the original file
    Sibling,
    /// In one remastered folder per title
    Mirrored,
}

impl From<Layout> for RemasteredLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Sibling => RemasteredLayout::Sibling,
            Layout::Mirrored => RemasteredLayout::Mirrored,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Disc,
    Digital,
}

impl From<Kind> for ContainerKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Disc => ContainerKind::Disc,
            Kind::Digital => ContainerKind::Digital,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "khpack=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Extract {
            config,
            output,
            install,
            language,
            disc_image,
            titles,
            names,
            layout,
        } => {
            let mut config = match config {
                Some(path) => ExtractionConfig::load(&path)
                    .with_context(|| format!("Failed to load configuration {:?}", path))?,
                None => ExtractionConfig {
                    destination: PathBuf::from("extracted"),
                    titles: Vec::new(),
                    name_tables: Vec::new(),
                    layout: RemasteredLayout::default(),
                },
            };

            if let Some(output) = output {
                config.destination = output;
            }
            if let Some(layout) = layout {
                config.layout = layout.into();
            }

            config
                .titles
                .extend(titles.into_iter().map(|preset| TitleConfig::Preset {
                    preset,
                    install: install.clone(),
                    language: language.clone(),
                    disc_image: disc_image.clone(),
                }));
            config
                .name_tables
                .extend(names.into_iter().map(|path| NameTableConfig { path, kind: None }));

            extract(config)
        }
        Command::List { source, names } => list(&source.source()?, &names),
        Command::Hash { kind, paths } => {
            for path in &paths {
                let kinds = match kind {
                    Some(kind) => vec![kind.into()],
                    None => vec![ContainerKind::Disc, ContainerKind::Digital],
                };

                let hashes: Vec<String> = kinds
                    .into_iter()
                    .map(|kind| EntryHash::from_path(kind, path).to_string())
                    .collect();
                println!("{}\t{}", hashes.join("\t"), path);
            }

            Ok(())
        }
    }
}

fn extract(config: ExtractionConfig) -> Result<()> {
    let job = config.into_job().context("Invalid extraction options")?;
    let destination = job.destination.clone();

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let observer = pb.clone();
    let handle = ExtractionPipeline::new(job)
        .with_observer(move |progress| {
            observer.set_length(progress.total);
            observer.set_position(progress.attempted);
        })
        .spawn()
        .context("Failed to start the extraction worker")?;

    let report = match handle.join() {
        Ok(report) => report,
        Err(_) => bail!("The extraction worker panicked"),
    };
    pb.finish_and_clear();

    let mut aborted = 0;
    for title in &report.titles {
        eprintln!(
            "{}: {:?}, {} extracted, {} partially extracted, {} failed",
            title.name,
            title.state,
            title.succeeded.len(),
            title.partial.len(),
            title.failed.len()
        );

        for partial in &title.partial {
            for failure in &partial.failures {
                eprintln!("  {} ({}): {}", partial.path, partial.hash, failure);
            }
        }
        for failed in &title.failed {
            eprintln!("  {}: {}", failed.hash, failed.error);
        }
        if let Some(err) = &title.abort {
            eprintln!("  aborted: {err}");
        }

        if title.state != TitleState::Completed {
            aborted += 1;
        }
    }

    if aborted > 0 {
        bail!("{aborted} title(s) did not complete");
    }

    eprintln!("Extracted into {}", destination.display());
    Ok(())
}

fn list(source: &ContainerSource, names: &[PathBuf]) -> Result<()> {
    let mut table = NameTable::new();
    for path in names {
        let config = NameTableConfig {
            path: path.clone(),
            kind: Some(source.kind()),
        };
        table.extend(
            config
                .load()
                .with_context(|| format!("Failed to load name table {:?}", path))?,
        );
    }
    let resolver = AssetNameResolver::new(Arc::new(table));

    let mut container = source
        .open()
        .with_context(|| format!("Failed to open {source}"))?;
    let entries = container
        .read_index()
        .with_context(|| format!("Failed to read the index of {source}"))?;

    for entry in &entries {
        let location = match entry.location {
            EntryLocation::Sector(sector) => format!("sector {sector:#X}"),
            EntryLocation::Offset(offset) => format!("offset {offset:#X}"),
        };

        println!("{}\t{}\t{}", entry.hash, location, resolver.resolve(entry));
    }

    eprintln!("{} entries", entries.len());
    Ok(())
}
