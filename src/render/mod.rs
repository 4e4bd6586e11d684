// src/render/mod.rs

//! Manual page rendering
//!
//! Troff sources are converted by an external renderer into an HTML fragment
//! and plain text. The HTML is then post-processed for stable anchors and
//! cross-reference links, and the headings and a short description are
//! pulled out for search.

pub mod html;
pub mod text;

use crate::db::models::Heading;
use crate::error::{Error, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Output format requested from a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFormat {
    /// HTML fragment without a document wrapper
    Html,
    /// Terminal text, possibly with backspace overstrike
    PlainText,
}

/// Converts troff source to a display format
pub trait Renderer {
    fn render(&self, source: &str, format: RenderFormat) -> Result<String>;
}

/// Renderer backed by the mandoc binary
#[derive(Debug, Clone)]
pub struct Mandoc {
    binary: PathBuf,
}

impl Mandoc {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(format: RenderFormat) -> &'static [&'static str] {
        match format {
            RenderFormat::Html => &["-T", "html", "-O", "fragment"],
            RenderFormat::PlainText => &["-T", "ascii"],
        }
    }
}

impl Default for Mandoc {
    fn default() -> Self {
        Self::new("mandoc")
    }
}

impl Renderer for Mandoc {
    fn render(&self, source: &str, format: RenderFormat) -> Result<String> {
        let mut child = Command::new(&self.binary)
            .args(Self::args(format))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Render(format!(
                    "Failed to run {}: {}. Is mandoc installed?",
                    self.binary.display(),
                    e
                ))
            })?;

        // Feed stdin from another thread so a full stdout pipe cannot stall us
        let input = source.as_bytes().to_vec();
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Render("mandoc stdin unavailable".to_string()))?;
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Render(format!("Failed to wait for mandoc: {}", e)))?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(Error::Render(format!("Failed to write to mandoc: {}", e))),
            Err(_) => return Err(Error::Render("mandoc writer thread panicked".to_string())),
        }

        if !output.status.success() {
            return Err(Error::Render(format!(
                "mandoc exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// All derived forms of one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
    pub text: String,
    pub headings: Vec<Heading>,
    pub description: Option<String>,
}

/// Render `source` in both formats and derive headings and description
///
/// `locale` picks the localized NAME heading and the locale used in
/// cross-reference links.
pub fn render_page<R: Renderer + ?Sized>(
    renderer: &R,
    source: &str,
    locale: &str,
) -> Result<RenderedPage> {
    let raw_html = renderer.render(source, RenderFormat::Html)?;
    let raw_text = renderer.render(source, RenderFormat::PlainText)?;

    let html = html::postprocess(&raw_html, locale);
    let text = text::strip_overstrike(&raw_text);
    let headings = html::extract_headings(&html);
    let description = text::extract_description(&text, locale);

    debug!(
        "Rendered page: {} bytes html, {} headings",
        html.len(),
        headings.len()
    );

    Ok(RenderedPage {
        html,
        text,
        headings,
        description,
    })
}
