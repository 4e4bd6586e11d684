// tests/integration_test.rs

//! Integration tests for mandex
//!
//! These tests verify end-to-end functionality across modules, running the
//! indexer against a file:// mirror built from synthetic archives.

use flate2::Compression;
use flate2::write::GzEncoder;
use mandex::db::{self, models::{Execution, IndexMeta, ManualPage, Package, Redirect}};
use mandex::render::{RenderFormat, Renderer};
use mandex::repository::RepositoryClient;
use mandex::{Error, Indexer, IndexerConfig};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::cell::Cell;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tar::{Builder, EntryType, Header};
use tempfile::{NamedTempFile, TempDir};

/// Deterministic stand-in for mandoc
struct TestRenderer;

impl Renderer for TestRenderer {
    fn render(&self, source: &str, format: RenderFormat) -> mandex::Result<String> {
        let first = source.lines().next().unwrap_or("");
        match format {
            RenderFormat::Html => Ok(format!(
                "<h1 class=\"Sh\" id=\"NAME\"><a class=\"permalink\" href=\"#NAME\">NAME</a></h1>\n<p>{}</p>\n",
                source
            )),
            RenderFormat::PlainText => Ok(format!("NAME\n     {}\n\nSYNOPSIS\n", first)),
        }
    }
}

/// Fails the first render call, then behaves like `TestRenderer`
#[derive(Default)]
struct FlakyRenderer {
    calls: Cell<usize>,
}

impl Renderer for FlakyRenderer {
    fn render(&self, source: &str, format: RenderFormat) -> mandex::Result<String> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if call == 0 {
            return Err(Error::Render("mandoc: transient failure".to_string()));
        }
        TestRenderer.render(source, format)
    }
}

enum Member<'a> {
    File(&'a str, &'a [u8]),
    Symlink(&'a str, &'a str),
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn build_tar_gz(members: &[Member<'_>]) -> Vec<u8> {
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for member in members {
        let mut header = Header::new_gnu();
        header.set_mode(0o644);
        match member {
            Member::File(path, data) => {
                header.set_size(data.len() as u64);
                header.set_cksum();
                builder.append_data(&mut header, path, *data).unwrap();
            }
            Member::Symlink(path, target) => {
                header.set_entry_type(EntryType::Symlink);
                header.set_size(0);
                header.set_link_name(target).unwrap();
                header.set_cksum();
                builder.append_data(&mut header, path, std::io::empty()).unwrap();
            }
        }
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A local mirror serving core/os/x86_64
struct TestMirror {
    _root: TempDir,
    repo_dir: PathBuf,
    template: String,
    index_bumps: u64,
}

impl TestMirror {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let repo_dir = root.path().join("core/os/x86_64");
        fs::create_dir_all(&repo_dir).unwrap();
        let template = format!("file://{}/$repo/os/$arch", root.path().display());
        Self {
            _root: root,
            repo_dir,
            template,
            index_bumps: 0,
        }
    }

    /// Publish a package archive and return its SHA-256
    fn publish_package(&self, filename: &str, members: &[Member<'_>]) -> String {
        let data = build_tar_gz(members);
        fs::write(self.repo_dir.join(filename), &data).unwrap();
        format!("{:x}", Sha256::digest(&data))
    }

    /// Publish the files index. Each publish gets a later mtime so the
    /// freshness check sees it as newer.
    fn publish_index(&mut self, packages: &[(&str, &str, &str, Option<&str>, &[&str])]) {
        let mut entries = Vec::new();
        for (name, version, filename, sha256, files) in packages {
            let mut desc = format!(
                "%FILENAME%\n{}\n\n%NAME%\n{}\n\n%VERSION%\n{}\n\n%ARCH%\nx86_64\n",
                filename, name, version
            );
            if let Some(sha256) = sha256 {
                desc.push_str(&format!("\n%SHA256SUM%\n{}\n", sha256));
            }
            let manifest = format!("%FILES%\nusr/\nusr/share/man/\n{}\n", files.join("\n"));
            entries.push((format!("{}-{}/desc", name, version), desc));
            entries.push((format!("{}-{}/files", name, version), manifest));
        }

        let members: Vec<Member<'_>> = entries
            .iter()
            .map(|(path, content)| Member::File(path, content.as_bytes()))
            .collect();
        let path = self.repo_dir.join("core.files.tar.gz");
        fs::write(&path, build_tar_gz(&members)).unwrap();

        self.index_bumps += 1;
        let mtime = SystemTime::now() + Duration::from_secs(60 * self.index_bumps);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }
}

fn create_test_db() -> (NamedTempFile, Connection) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    db::init(&db_path).unwrap();
    let conn = db::open(&db_path).unwrap();
    (temp_file, conn)
}

fn run_with<R: Renderer>(
    mirror: &TestMirror,
    work_dir: &Path,
    conn: &mut Connection,
    renderer: R,
) -> mandex::Result<mandex::RunSummary> {
    let config = IndexerConfig::default()
        .mirror(mirror.template.clone())
        .work_dir(work_dir);
    let client =
        RepositoryClient::new(&config.user_agent, config.http_timeout, config.max_retries).unwrap();
    Indexer::new(config, conn, client, renderer).run()
}

fn run(mirror: &TestMirror, work_dir: &Path, conn: &mut Connection) -> mandex::Result<mandex::RunSummary> {
    run_with(mirror, work_dir, conn, TestRenderer)
}

const FOO_1: &str = "usr/share/man/man1/foo.1";

#[test]
fn test_database_lifecycle() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();

    // Remove the temp file so init can create it
    drop(temp_file);

    db::init(&db_path).unwrap();
    assert!(Path::new(&db_path).exists());

    let conn = db::open(&db_path).unwrap();
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(journal_mode.to_lowercase(), "wal");
}

#[test]
fn test_open_missing_database() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("absent.db");
    let err = db::open(db_path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, Error::DatabaseNotFound(_)));
}

#[test]
fn test_transaction_rollback_on_error() {
    let (_temp, mut conn) = create_test_db();

    let result = db::transaction(&mut conn, |tx| {
        let mut first = Package::new(
            "dup".to_string(),
            "core".to_string(),
            "1.0-1".to_string(),
            "dup-1.0-1-x86_64.pkg.tar.zst".to_string(),
            "file:///dup".to_string(),
        );
        first.insert(tx)?;
        let mut second = first.clone();
        second.id = None;
        second.insert(tx)?;
        Ok(())
    });

    assert!(result.is_err(), "Duplicate package names should fail");
    assert_eq!(Package::count(&conn).unwrap(), 0);
}

#[test]
fn test_end_to_end_single_package() {
    let mut mirror = TestMirror::new();
    let work_dir = tempfile::tempdir().unwrap();
    let (_temp, mut conn) = create_test_db();

    let sha = mirror.publish_package(
        "foo-1.0-1-x86_64.pkg.tar.gz",
        &[Member::File(FOO_1, b"foo - frobnicate things\n.TH FOO 1\n")],
    );
    mirror.publish_index(&[("foo", "1.0-1", "foo-1.0-1-x86_64.pkg.tar.gz", Some(sha.as_str()), &[FOO_1])]);

    let summary = run(&mirror, work_dir.path(), &mut conn).unwrap();
    assert_eq!(summary.new_pkgs, 1);
    assert_eq!(summary.pages_written, 1);
    assert_eq!(summary.redirects, 0);

    assert_eq!(Package::count(&conn).unwrap(), 1);
    assert_eq!(ManualPage::count(&conn).unwrap(), 1);
    assert_eq!(Redirect::count(&conn).unwrap(), 0);

    let page = ManualPage::find_by_filename(&conn, FOO_1).unwrap().unwrap();
    assert_eq!((page.name.as_str(), page.section.as_str(), page.locale.as_str()), ("foo", "1", "en"));
    assert_eq!(page.package, "foo");
    assert_eq!(page.description.as_deref(), Some("foo - frobnicate things"));
    assert_eq!(page.headings.len(), 1);

    let meta = IndexMeta::get(&conn).unwrap();
    assert_eq!((meta.haveman_pkgs, meta.total_pkgs), (1, 1));
    assert!(meta.timestamp > 0);

    // Same index again: nothing to do
    let summary = run(&mirror, work_dir.path(), &mut conn).unwrap();
    assert_eq!(summary.new_pkgs + summary.updated_pkgs, 0);
    assert_eq!(summary.pages_written, 0);

    let executions = Execution::list_recent(&conn, 10).unwrap();
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].updated_pkgs, 0);
    assert_eq!(executions[0].updated_pages, 0);
    assert_eq!(executions[1].updated_pkgs, 1);
    assert_eq!(executions[1].updated_pages, 1);
}

#[test]
fn test_symlink_becomes_followable_redirect() {
    let mut mirror = TestMirror::new();
    let work_dir = tempfile::tempdir().unwrap();
    let (_temp, mut conn) = create_test_db();

    let compressed = gzip(b".TH FOO 1\n");
    mirror.publish_package(
        "foo-1.0-1-x86_64.pkg.tar.gz",
        &[
            Member::File("usr/share/man/man1/foo.1.gz", &compressed),
            Member::Symlink("usr/share/man/man1/bar.1.gz", "foo.1.gz"),
        ],
    );
    mirror.publish_index(&[(
        "foo",
        "1.0-1",
        "foo-1.0-1-x86_64.pkg.tar.gz",
        None,
        &["usr/share/man/man1/foo.1.gz", "usr/share/man/man1/bar.1.gz"],
    )]);

    let summary = run(&mirror, work_dir.path(), &mut conn).unwrap();
    assert_eq!(summary.pages_written, 1);
    assert_eq!(summary.redirects, 1);

    let redirects = Redirect::list_all(&conn).unwrap();
    assert_eq!(
        (redirects[0].source_name.as_str(), redirects[0].target_name.as_str()),
        ("bar", "foo")
    );

    // Stored without the compression suffix
    let page = ManualPage::find_by_filename(&conn, FOO_1).unwrap().unwrap();
    assert_eq!(page.content, ".TH FOO 1\n");

    let found = mandex::resolver::follow_redirects(&conn, "bar", Some("1"), None)
        .unwrap()
        .unwrap();
    assert_eq!(found.filename, FOO_1);
}

#[test]
fn test_so_stub_takes_target_render() {
    let mut mirror = TestMirror::new();
    let work_dir = tempfile::tempdir().unwrap();
    let (_temp, mut conn) = create_test_db();
    let stub = "usr/share/man/man1/baz.1";

    mirror.publish_package(
        "foo-1.0-1-x86_64.pkg.tar.gz",
        &[
            Member::File(FOO_1, b"foo - frobnicate things\n"),
            Member::File(stub, b".\\\" alias\n.so man1/foo.1\n"),
        ],
    );
    mirror.publish_index(&[("foo", "1.0-1", "foo-1.0-1-x86_64.pkg.tar.gz", None, &[FOO_1, stub])]);

    let summary = run(&mirror, work_dir.path(), &mut conn).unwrap();
    assert_eq!(summary.pages_written, 2);
    assert_eq!(summary.so_links.resolved, 1);

    let target = ManualPage::find_by_filename(&conn, FOO_1).unwrap().unwrap();
    let resolved = ManualPage::find_by_filename(&conn, stub).unwrap().unwrap();
    assert!(resolved.so_resolved);
    assert_eq!(resolved.html_content, target.html_content);
    assert_eq!(resolved.description, target.description);

    // Nothing left for a second run to resolve, and the backfill survives
    let summary = run(&mirror, work_dir.path(), &mut conn).unwrap();
    assert_eq!(summary.so_links.stubs, 0);
    let again = ManualPage::find_by_filename(&conn, stub).unwrap().unwrap();
    assert_eq!(again.html_content, target.html_content);
}

#[test]
fn test_newer_version_is_reprocessed() {
    let mut mirror = TestMirror::new();
    let work_dir = tempfile::tempdir().unwrap();
    let (_temp, mut conn) = create_test_db();

    mirror.publish_package(
        "foo-1.0-1-x86_64.pkg.tar.gz",
        &[Member::File(FOO_1, b"foo - old\n")],
    );
    mirror.publish_index(&[("foo", "1.0-1", "foo-1.0-1-x86_64.pkg.tar.gz", None, &[FOO_1])]);
    run(&mirror, work_dir.path(), &mut conn).unwrap();

    mirror.publish_package(
        "foo-1.1-1-x86_64.pkg.tar.gz",
        &[Member::File(FOO_1, b"foo - new\n")],
    );
    mirror.publish_index(&[("foo", "1.1-1", "foo-1.1-1-x86_64.pkg.tar.gz", None, &[FOO_1])]);

    let summary = run(&mirror, work_dir.path(), &mut conn).unwrap();
    assert_eq!(summary.new_pkgs, 0);
    assert_eq!(summary.updated_pkgs, 1);
    assert_eq!(summary.pages_written, 1);

    let package = Package::find_by_name(&conn, "foo").unwrap().unwrap();
    assert_eq!(package.version, "1.1-1");
    let page = ManualPage::find_by_filename(&conn, FOO_1).unwrap().unwrap();
    assert_eq!(page.description.as_deref(), Some("foo - new"));
    assert_eq!(ManualPage::count(&conn).unwrap(), 1);
}

#[test]
fn test_bad_checksum_skips_package() {
    let mut mirror = TestMirror::new();
    let work_dir = tempfile::tempdir().unwrap();
    let (_temp, mut conn) = create_test_db();

    let sha = mirror.publish_package(
        "foo-1.0-1-x86_64.pkg.tar.gz",
        &[Member::File(FOO_1, b"foo - x\n")],
    );
    mirror.publish_index(&[(
        "foo",
        "1.0-1",
        "foo-1.0-1-x86_64.pkg.tar.gz",
        Some("0000000000000000000000000000000000000000000000000000000000000000"),
        &[FOO_1],
    )]);

    let summary = run(&mirror, work_dir.path(), &mut conn).unwrap();
    assert_eq!(summary.new_pkgs, 1);
    assert_eq!(summary.failed_pkgs, 1);
    assert_eq!(summary.pages_written, 0);
    assert_eq!(ManualPage::count(&conn).unwrap(), 0);
    assert!(Package::find_by_name(&conn, "foo").unwrap().is_none());

    // Corrected index, same version: the package is offered again
    mirror.publish_index(&[("foo", "1.0-1", "foo-1.0-1-x86_64.pkg.tar.gz", Some(sha.as_str()), &[FOO_1])]);
    let summary = run(&mirror, work_dir.path(), &mut conn).unwrap();
    assert_eq!(summary.new_pkgs, 1);
    assert_eq!(summary.failed_pkgs, 0);
    assert_eq!(summary.pages_written, 1);
}

#[test]
fn test_render_failure_is_retried_next_run() {
    let mut mirror = TestMirror::new();
    let work_dir = tempfile::tempdir().unwrap();
    let (_temp, mut conn) = create_test_db();

    mirror.publish_package(
        "foo-1.0-1-x86_64.pkg.tar.gz",
        &[
            Member::File(FOO_1, b"foo - frobnicate things\n"),
            Member::Symlink("usr/share/man/man1/bar.1", "foo.1"),
        ],
    );
    mirror.publish_index(&[(
        "foo",
        "1.0-1",
        "foo-1.0-1-x86_64.pkg.tar.gz",
        None,
        &[FOO_1, "usr/share/man/man1/bar.1"],
    )]);

    let summary = run_with(&mirror, work_dir.path(), &mut conn, FlakyRenderer::default()).unwrap();
    assert_eq!(summary.new_pkgs, 1);
    assert_eq!(summary.failed_pkgs, 1);
    assert_eq!(summary.pages_written, 0);
    assert_eq!(summary.redirects, 0);
    assert!(Package::find_by_name(&conn, "foo").unwrap().is_none());

    // Same index: the package is still new and the page gets rendered
    let summary = run(&mirror, work_dir.path(), &mut conn).unwrap();
    assert_eq!(summary.new_pkgs, 1);
    assert_eq!(summary.failed_pkgs, 0);
    assert_eq!(summary.pages_written, 1);
    assert_eq!(summary.redirects, 1);
    assert_eq!(ManualPage::count(&conn).unwrap(), 1);
    assert_eq!(Redirect::count(&conn).unwrap(), 1);
    assert_eq!(
        Package::find_by_name(&conn, "foo").unwrap().unwrap().version,
        "1.0-1"
    );
}

#[test]
fn test_failed_update_keeps_previous_version() {
    let mut mirror = TestMirror::new();
    let work_dir = tempfile::tempdir().unwrap();
    let (_temp, mut conn) = create_test_db();

    mirror.publish_package(
        "foo-1.0-1-x86_64.pkg.tar.gz",
        &[Member::File(FOO_1, b"foo - old\n")],
    );
    mirror.publish_index(&[("foo", "1.0-1", "foo-1.0-1-x86_64.pkg.tar.gz", None, &[FOO_1])]);
    run(&mirror, work_dir.path(), &mut conn).unwrap();

    // Listed in the index but never uploaded
    mirror.publish_index(&[("foo", "1.1-1", "foo-1.1-1-x86_64.pkg.tar.gz", None, &[FOO_1])]);
    let summary = run(&mirror, work_dir.path(), &mut conn).unwrap();
    assert_eq!(summary.updated_pkgs, 1);
    assert_eq!(summary.failed_pkgs, 1);

    let package = Package::find_by_name(&conn, "foo").unwrap().unwrap();
    assert_eq!(package.version, "1.0-1");
    assert_eq!(package.filename, "foo-1.0-1-x86_64.pkg.tar.gz");
}

#[test]
fn test_missing_member_skips_only_that_package() {
    let mut mirror = TestMirror::new();
    let work_dir = tempfile::tempdir().unwrap();
    let (_temp, mut conn) = create_test_db();

    mirror.publish_package("bad-1-1-x86_64.pkg.tar.gz", &[Member::File("usr/bin/bad", b"")]);
    mirror.publish_package(
        "foo-1.0-1-x86_64.pkg.tar.gz",
        &[Member::File(FOO_1, b"foo - x\n")],
    );
    mirror.publish_index(&[
        ("bad", "1-1", "bad-1-1-x86_64.pkg.tar.gz", None, &["usr/share/man/man1/bad.1"]),
        ("foo", "1.0-1", "foo-1.0-1-x86_64.pkg.tar.gz", None, &[FOO_1]),
    ]);

    let summary = run(&mirror, work_dir.path(), &mut conn).unwrap();
    assert_eq!(summary.new_pkgs, 2);
    assert_eq!(summary.failed_pkgs, 1);
    assert_eq!(summary.pages_written, 1);
}

#[test]
fn test_missing_index_aborts_run() {
    let mirror = TestMirror::new();
    let work_dir = tempfile::tempdir().unwrap();
    let (_temp, mut conn) = create_test_db();

    let err = run(&mirror, work_dir.path(), &mut conn).unwrap_err();
    assert!(matches!(err, Error::IndexFetch(_)));
    assert!(Execution::list_recent(&conn, 10).unwrap().is_empty());
}
