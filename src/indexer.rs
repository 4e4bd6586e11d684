// src/indexer.rs

//! Incremental update orchestration
//!
//! One run refreshes the files index, diffs it against the package table,
//! pulls man pages out of every new or updated package, and finishes with
//! the redirect batch, the `.so` post-pass and an execution record.

use crate::config::IndexerConfig;
use crate::db::{self, models::{Execution, ManualPage, Redirect}};
use crate::decode::TextDecoder;
use crate::error::{Error, Result};
use crate::manpath;
use crate::packages::ArchPackage;
use crate::render::{Renderer, render_page};
use crate::repository::diff::{diff_packages, revert_package};
use crate::repository::parsers::PackageRecord;
use crate::repository::parsers::arch::ArchParser;
use crate::repository::{Fetcher, fetch_index, select_mirror, verify_checksum};
use crate::resolver::{SoStats, SymlinkOutcome, resolve_so_links, resolve_symlink, so_target};
use rusqlite::Connection;
use std::fs;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What one run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub new_pkgs: usize,
    pub updated_pkgs: usize,
    /// Changed packages left for the next run after a fetch, extract or
    /// render failure
    pub failed_pkgs: usize,
    /// Page rows inserted or rewritten
    pub pages_written: usize,
    pub redirects: usize,
    pub so_links: SoStats,
    pub execution_time: i64,
}

/// Per-package result
#[derive(Debug, Default)]
struct PackageOutcome {
    pages_written: usize,
    render_failures: usize,
    redirects: Vec<Redirect>,
}

/// What `store_page` did with one extracted page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageWrite {
    Written,
    Unchanged,
    /// Path outside the man page layout
    Skipped,
    RenderFailed,
}

/// Drives one indexing run against an open database
pub struct Indexer<'a, F: Fetcher, R: Renderer> {
    config: IndexerConfig,
    conn: &'a mut Connection,
    fetcher: F,
    renderer: R,
    decoder: TextDecoder,
}

impl<'a, F: Fetcher, R: Renderer> Indexer<'a, F, R> {
    pub fn new(config: IndexerConfig, conn: &'a mut Connection, fetcher: F, renderer: R) -> Self {
        let decoder = TextDecoder::from_labels(&config.charsets);
        Self {
            config,
            conn,
            fetcher,
            renderer,
            decoder,
        }
    }

    /// Run the whole pipeline once
    ///
    /// Only failures to obtain or parse the files index abort the run.
    /// Package and page failures are logged and the package's diff entry is
    /// reverted, so the next run picks it up again.
    pub fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let start_time = chrono::Utc::now().timestamp();
        let mut summary = RunSummary::default();

        fs::create_dir_all(&self.config.work_dir)?;

        let mirror = select_mirror(
            &self.fetcher,
            self.config.mirror.as_deref(),
            self.config.mirrorlist_url.as_deref(),
            &self.config.repo,
            &self.config.arch,
        )?;

        let index_path = fetch_index(
            &self.fetcher,
            self.conn,
            &mirror,
            &self.config.repo,
            &self.config.work_dir,
        )?;

        let index = ArchParser::new(&mirror)
            .parse_file(&index_path)
            .map_err(|e| Error::IndexFetch(format!("{}: {}", index_path.display(), e)))?;

        let repo = self.config.repo.clone();
        let diff = db::transaction(self.conn, |tx| diff_packages(tx, &repo, &index))?;
        summary.new_pkgs = diff.new.len();
        summary.updated_pkgs = diff.updated.len();

        let mut redirects = Vec::new();
        for record in diff.changed() {
            match self.process_package(record) {
                Ok(outcome) => {
                    summary.pages_written += outcome.pages_written;
                    if outcome.render_failures == 0 {
                        redirects.extend(outcome.redirects);
                        continue;
                    }
                    warn!(
                        "{} pages of {} failed to render, retrying next run",
                        outcome.render_failures, record.name
                    );
                }
                Err(e) => warn!("Skipping package {}: {}", record.name, e),
            }
            summary.failed_pkgs += 1;
            revert_package(self.conn, &diff, &record.name)?;
        }

        summary.redirects = db::transaction(self.conn, |tx| Redirect::insert_batch(tx, &redirects))?;
        info!("Recorded {} redirects", summary.redirects);

        summary.so_links = resolve_so_links(self.conn, &self.renderer)?;

        summary.execution_time = started.elapsed().as_secs() as i64;
        let mut execution = Execution::new(
            start_time,
            summary.execution_time,
            (summary.new_pkgs + summary.updated_pkgs) as i64,
            (summary.pages_written + summary.redirects) as i64,
        );
        execution.insert(self.conn)?;

        info!(
            "Run finished in {}s: {} new and {} updated packages ({} failed), {} pages written, {} redirects, {} .so links resolved",
            summary.execution_time,
            summary.new_pkgs,
            summary.updated_pkgs,
            summary.failed_pkgs,
            summary.pages_written,
            summary.redirects,
            summary.so_links.resolved
        );
        Ok(summary)
    }

    /// Download, verify and extract one package, then store its pages
    fn process_package(&mut self, record: &PackageRecord) -> Result<PackageOutcome> {
        info!("Processing {} {}", record.name, record.version);

        let local = self.config.package_dir().join(&record.filename);
        let fetched = self.fetcher.fetch_to_file(&record.url, &local)?;

        match &record.sha256 {
            Some(expected) => verify_checksum(&fetched.path, expected)?,
            None => debug!("No checksum for {}, skipping verification", record.filename),
        }

        let contents = ArchPackage::open(&fetched.path)?.extract(&record.man_paths, &self.decoder)?;

        let mut outcome = PackageOutcome::default();
        let renderer = &self.renderer;
        let repo = self.config.repo.as_str();
        let (written, render_failures) = db::transaction(self.conn, |tx| {
            let mut written = 0;
            let mut failed = 0;
            for extracted in &contents.files {
                match store_page(tx, renderer, repo, record, &extracted.path, &extracted.content)? {
                    PageWrite::Written => written += 1,
                    PageWrite::RenderFailed => failed += 1,
                    PageWrite::Unchanged | PageWrite::Skipped => {}
                }
            }
            Ok((written, failed))
        })?;
        outcome.pages_written = written;
        outcome.render_failures = render_failures;

        for link in &contents.symlinks {
            if let SymlinkOutcome::Redirect(redirect) = resolve_symlink(&link.path, &link.target) {
                outcome.redirects.push(redirect);
            }
        }

        debug!(
            "{}: {} pages written, {} redirects",
            record.name,
            outcome.pages_written,
            outcome.redirects.len()
        );
        Ok(outcome)
    }
}

/// Render and upsert one extracted page
///
/// Pages whose stored content is unchanged are left alone without
/// rendering. `.so` stubs are stored unrendered for the post-pass. A page
/// that fails to render is not stored.
fn store_page<R: Renderer + ?Sized>(
    conn: &Connection,
    renderer: &R,
    repo: &str,
    record: &PackageRecord,
    path: &str,
    content: &str,
) -> Result<PageWrite> {
    let m = match manpath::classify(path) {
        Ok(m) => m,
        Err(e) => {
            warn!("Skipping page with unrecognized path {}: {}", e.path, e.reason);
            return Ok(PageWrite::Skipped);
        }
    };

    if ManualPage::find_by_filename(conn, path)?.is_some_and(|stored| stored.content == content) {
        debug!("{} unchanged", path);
        return Ok(PageWrite::Unchanged);
    }

    let mut page = ManualPage::new(
        record.name.clone(),
        repo.to_string(),
        path.to_string(),
        m.name,
        m.section,
        m.locale,
        content.to_string(),
    );

    if so_target(content).is_none() {
        match render_page(renderer, content, &page.locale) {
            Ok(rendered) => {
                page.html_content = rendered.html;
                page.txt_content = rendered.text;
                page.headings = rendered.headings;
                page.description = rendered.description;
            }
            Err(e) => {
                warn!("Failed to render {}: {}", path, e);
                return Ok(PageWrite::RenderFailed);
            }
        }
    }

    Ok(if page.upsert(conn)? {
        PageWrite::Written
    } else {
        PageWrite::Unchanged
    })
}
