// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::container::{ContainerEntry, ContainerIndexSet, ContainerPair, ContainerSource, EntryHash};
use crate::error::Error;
use crate::hdasset::{HdAsset, SubAssetFailure};
use crate::names::{AssetNameResolver, NameTable};

/// Name of the folder remastered sections are written into.
const REMASTERED_FOLDER: &str = "remastered";

/// One title to extract, made up of one or more index/data pairs that all land in the same folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleSelection {
    /// Folder name under the destination, e.g. `kh2`.
    pub name: String,
    /// The container pairs, extracted in this order.
    pub sources: Vec<ContainerSource>,
}

impl TitleSelection {
    pub fn new(name: impl Into<String>, sources: Vec<ContainerSource>) -> Self {
        Self {
            name: name.into(),
            sources,
        }
    }

    /// Checks that the name is a single folder name, so the title stays inside the destination.
    pub fn validate_name(&self) -> Result<(), Error> {
        let name = self.name.as_str();
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', ':'])
        {
            return Err(Error::config(format!("invalid title name {name:?}")));
        }

        Ok(())
    }
}

/// Where remastered sections are placed, relative to the title folder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemasteredLayout {
    /// Next to the original file: `chara/model.mdlx` gets `chara/remastered/model/`.
    #[default]
    Sibling,
    /// Under a single tree at the root of the title: `chara/model.mdlx` gets
    /// `remastered/chara/model.mdlx/`.
    Mirrored,
}

impl RemasteredLayout {
    /// The folder the remastered sections of the entry at `relative_path` are written into.
    pub fn remastered_dir(&self, title_dir: &Path, relative_path: &str) -> PathBuf {
        let relative = Path::new(relative_path);

        match self {
            RemasteredLayout::Sibling => {
                let parent = relative.parent().unwrap_or(Path::new(""));
                let stem = relative
                    .file_stem()
                    .or_else(|| relative.file_name())
                    .unwrap_or(relative.as_os_str());

                title_dir.join(parent).join(REMASTERED_FOLDER).join(stem)
            }
            RemasteredLayout::Mirrored => title_dir.join(REMASTERED_FOLDER).join(relative),
        }
    }
}

/// The lifecycle of a single title during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleState {
    NotStarted,
    Indexing,
    Extracting,
    /// Every entry was attempted. Some of them may still have failed.
    Completed,
    /// A container was missing or malformed, or the destination couldn't be written to.
    Aborted,
    /// The run was cancelled before every entry was attempted.
    Cancelled,
}

/// A point-in-time view of the progress counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Entries that were attempted, whether they succeeded or not.
    pub attempted: u64,
    /// Entries across every title that was indexed.
    pub total: u64,
    /// The run has ended.
    pub finished: bool,
}

impl Progress {
    /// How far along the run is, between 0.0 and 1.0.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return if self.finished { 1.0 } else { 0.0 };
        }

        self.attempted.min(self.total) as f64 / self.total as f64
    }
}

/// Progress shared between the worker and whoever is watching it. Only the worker writes to it.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    attempted: AtomicU64,
    total: AtomicU64,
    finished: AtomicBool,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Progress {
        Progress {
            attempted: self.attempted.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
            finished: self.finished.load(Ordering::Acquire),
        }
    }

    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
    }

    fn increment(&self) {
        self.attempted.fetch_add(1, Ordering::AcqRel);
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// Asks a running extraction to stop. It's checked between entries.
#[derive(Debug, Default, Clone)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Everything needed for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    /// Titles are extracted into folders under this directory.
    pub destination: PathBuf,
    pub titles: Vec<TitleSelection>,
    pub layout: RemasteredLayout,
    pub names: Arc<NameTable>,
    pub progress: Arc<ProgressCounter>,
    pub cancellation: CancellationToken,
}

impl ExtractionJob {
    pub fn new(destination: impl Into<PathBuf>, titles: Vec<TitleSelection>, names: Arc<NameTable>) -> Self {
        Self {
            destination: destination.into(),
            titles,
            layout: RemasteredLayout::default(),
            names,
            progress: Arc::new(ProgressCounter::new()),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_layout(mut self, layout: RemasteredLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// An entry that was written, but some of its remastered sections were skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialEntry {
    pub hash: EntryHash,
    /// The path the original data was written to, relative to the title folder.
    pub path: String,
    pub failures: Vec<SubAssetFailure>,
}

/// An entry that couldn't be extracted at all.
#[derive(Debug)]
pub struct FailedEntry {
    pub hash: EntryHash,
    pub error: Error,
}

/// What happened to a single title.
#[derive(Debug)]
pub struct TitleReport {
    pub name: String,
    pub state: TitleState,
    /// Entries that were fully extracted.
    pub succeeded: Vec<EntryHash>,
    pub partial: Vec<PartialEntry>,
    pub failed: Vec<FailedEntry>,
    /// Why the title was aborted, if it was.
    pub abort: Option<Error>,
}

impl TitleReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: TitleState::NotStarted,
            succeeded: Vec::new(),
            partial: Vec::new(),
            failed: Vec::new(),
            abort: None,
        }
    }

    /// How many entries were attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.partial.len() + self.failed.len()
    }
}

/// The outcome of a run, one report per selected title in selection order.
#[derive(Debug)]
pub struct ExtractionReport {
    pub titles: Vec<TitleReport>,
}

impl ExtractionReport {
    /// Looks up the report of the title named `name`.
    pub fn title(&self, name: &str) -> Option<&TitleReport> {
        self.titles.iter().find(|title| title.name == name)
    }

    /// Whether every title completed with every entry fully extracted.
    pub fn is_clean(&self) -> bool {
        self.titles.iter().all(|title| {
            title.state == TitleState::Completed && title.partial.is_empty() && title.failed.is_empty()
        })
    }
}

type ProgressObserver = Box<dyn FnMut(Progress) + Send>;

/// Runs an [`ExtractionJob`], either on the calling thread or on a worker.
pub struct ExtractionPipeline {
    job: ExtractionJob,
    resolver: AssetNameResolver,
    observer: Option<ProgressObserver>,
}

enum EntryOutcome {
    Complete,
    Partial { path: String, failures: Vec<SubAssetFailure> },
}

/// A title whose containers were opened and indexed.
struct IndexedTitle {
    report: TitleReport,
    containers: Vec<(Box<dyn ContainerPair>, ContainerIndexSet)>,
}

impl ExtractionPipeline {
    pub fn new(job: ExtractionJob) -> Self {
        let resolver = AssetNameResolver::new(job.names.clone());

        Self {
            job,
            resolver,
            observer: None,
        }
    }

    /// Calls `observer` after every attempted entry, from whichever thread runs the job.
    pub fn with_observer(mut self, observer: impl FnMut(Progress) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn progress(&self) -> Arc<ProgressCounter> {
        self.job.progress.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.job.cancellation.clone()
    }

    /// Runs the job on a dedicated thread.
    pub fn spawn(self) -> std::io::Result<ExtractionHandle> {
        let progress = self.progress();
        let cancellation = self.cancellation_token();

        let thread = std::thread::Builder::new()
            .name("khpack-extract".to_string())
            .spawn(move || self.run())?;

        Ok(ExtractionHandle {
            progress,
            cancellation,
            thread,
        })
    }

    /// Runs the job on the calling thread.
    pub fn run(mut self) -> ExtractionReport {
        info!(
            destination = %self.job.destination.display(),
            titles = self.job.titles.len(),
            "Starting extraction"
        );

        let mut titles: Vec<IndexedTitle> = self
            .job
            .titles
            .iter()
            .map(index_title)
            .collect();

        let total: u64 = titles
            .iter()
            .flat_map(|title| title.containers.iter())
            .map(|(_, entries)| entries.len() as u64)
            .sum();
        self.job.progress.set_total(total);
        self.notify();

        info!(total, "Indexed all titles");

        for title in &mut titles {
            if title.report.state != TitleState::Extracting {
                continue;
            }

            if self.job.cancellation.is_cancelled() {
                title.report.state = TitleState::Cancelled;
                continue;
            }

            self.extract_title(title);
        }

        self.job.progress.finish();
        self.notify();

        let report = ExtractionReport {
            titles: titles.into_iter().map(|title| title.report).collect(),
        };

        for title in &report.titles {
            info!(
                title = %title.name,
                state = ?title.state,
                succeeded = title.succeeded.len(),
                partial = title.partial.len(),
                failed = title.failed.len(),
                "Finished title"
            );
        }

        report
    }

    fn extract_title(&mut self, title: &mut IndexedTitle) {
        let title_dir = self.job.destination.join(&title.report.name);
        info!(title = %title.report.name, dir = %title_dir.display(), "Extracting title");

        for (container, entries) in &mut title.containers {
            for entry in entries.iter() {
                if self.job.cancellation.is_cancelled() {
                    info!(title = %title.report.name, "Extraction cancelled");
                    title.report.state = TitleState::Cancelled;
                    return;
                }

                match extract_entry(
                    container.as_mut(),
                    entry,
                    &self.resolver,
                    &title_dir,
                    self.job.layout,
                ) {
                    Ok(EntryOutcome::Complete) => title.report.succeeded.push(entry.hash),
                    Ok(EntryOutcome::Partial { path, failures }) => {
                        title.report.partial.push(PartialEntry {
                            hash: entry.hash,
                            path,
                            failures,
                        })
                    }
                    Err(err) if !err.is_fatal_for_title() => {
                        warn!(hash = %entry.hash, %err, "Unable to extract entry");
                        title.report.failed.push(FailedEntry {
                            hash: entry.hash,
                            error: err,
                        });
                    }
                    Err(err) => {
                        error!(title = %title.report.name, hash = %entry.hash, %err, "Aborting title");
                        title.report.state = TitleState::Aborted;
                        title.report.abort = Some(err);
                        return;
                    }
                }

                self.job.progress.increment();
                self.notify();
            }
        }

        title.report.state = TitleState::Completed;
    }

    fn notify(&mut self) {
        if let Some(observer) = &mut self.observer {
            observer(self.job.progress.snapshot());
        }
    }
}

/// Opens and indexes every container of a title. Nothing is written yet.
fn index_title(selection: &TitleSelection) -> IndexedTitle {
    let mut report = TitleReport::new(&selection.name);
    report.state = TitleState::Indexing;

    if let Err(err) = selection.validate_name() {
        error!(%err, "Refusing title");
        report.state = TitleState::Aborted;
        report.abort = Some(err);
        return IndexedTitle {
            report,
            containers: Vec::new(),
        };
    }

    let mut containers = Vec::with_capacity(selection.sources.len());
    for source in &selection.sources {
        let indexed = source.open().and_then(|mut container| {
            let entries = container.read_index()?;
            Ok((container, entries))
        });

        match indexed {
            Ok((container, entries)) => {
                debug!(title = %selection.name, %source, entries = entries.len(), "Indexed container");
                containers.push((container, entries));
            }
            Err(err) => {
                error!(title = %selection.name, %source, %err, "Unable to index container");
                report.state = TitleState::Aborted;
                report.abort = Some(err);
                return IndexedTitle {
                    report,
                    containers: Vec::new(),
                };
            }
        }
    }

    report.state = TitleState::Extracting;
    IndexedTitle { report, containers }
}

fn extract_entry(
    container: &mut dyn ContainerPair,
    entry: &ContainerEntry,
    resolver: &AssetNameResolver,
    title_dir: &Path,
    layout: RemasteredLayout,
) -> Result<EntryOutcome, Error> {
    let path = resolver.resolve(entry);
    debug!(hash = %entry.hash, %path, "Extracting entry");

    let reader = container.open_entry(entry)?;
    let asset = HdAsset::read_from(reader).map_err(|err| Error::CorruptAsset {
        hash: entry.hash,
        reason: err.to_string(),
    })?;

    write_file(&title_dir.join(&path), &asset.original_data)?;

    if !asset.remastered_assets.is_empty() {
        let remastered_dir = layout.remastered_dir(title_dir, &path);

        let mut sections: Vec<_> = asset.remastered_assets.iter().collect();
        sections.sort_by(|(a, _), (b, _)| a.cmp(b));

        for (name, data) in sections {
            write_file(&remastered_dir.join(name), data)?;
        }
    }

    if asset.failed_assets.is_empty() {
        Ok(EntryOutcome::Complete)
    } else {
        Ok(EntryOutcome::Partial {
            path,
            failures: asset.failed_assets,
        })
    }
}

/// Creates the directory `path` will be written into, if it doesn't exist yet.
pub fn ensure_parent_dir(path: &Path) -> Result<(), Error> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))
        }
        _ => Ok(()),
    }
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), Error> {
    ensure_parent_dir(path)?;
    fs::write(path, data).map_err(|err| Error::io(path, err))
}

/// A job running on a worker thread.
pub struct ExtractionHandle {
    progress: Arc<ProgressCounter>,
    cancellation: CancellationToken,
    thread: JoinHandle<ExtractionReport>,
}

impl ExtractionHandle {
    pub fn progress(&self) -> Progress {
        self.progress.snapshot()
    }

    /// Stops the job before the next entry. Files that were already written are kept.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the job to end. This only fails if the worker panicked.
    pub fn join(self) -> std::thread::Result<ExtractionReport> {
        self.thread.join()
    }
}
