//! Container expander for zip archives.
//!
//! Each member is extracted into a scoped working directory and dispatched
//! through the same registry with this converter excluded, so exactly one
//! level of archive nesting is expanded. A member that is itself an archive
//! is listed with a note instead of being recursed into.
//!
//! Output layout:
//!
//! ```text
//! Content from the zip file `bundle.zip`:
//!
//! ## File: docs/a.txt
//!
//! <markdown of docs/a.txt>
//!
//! ## File: b.txt
//! …
//! ```
//!
//! The working directory is a [`tempfile::TempDir`]. It is released once
//! expansion finishes, successfully or not: removed by default, kept on disk
//! on both paths when [`crate::config::ConvertOptions::cleanup_extracted`] is
//! false.

use crate::converters::{DocumentConverter, PRIORITY_SPECIFIC_FILE_FORMAT};
use crate::error::{ConverterError, Doc2MdError};
use crate::output::ConversionResult;
use crate::pipeline::detect::{extension_of, DetectionHints};
use crate::pipeline::dispatch::DispatchContext;
use crate::stream::{starts_with, ReadSeek};
use crate::stream_info::StreamInfo;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

const ACCEPTED_MIME_TYPE_PREFIXES: &[&str] = &["application/zip", "application/x-zip-compressed"];
const ACCEPTED_FILE_EXTENSIONS: &[&str] = &[".zip"];
/// Local file header, end of central directory (empty archive) and the
/// spanned-archive marker.
const ZIP_SIGNATURES: &[&[u8]] = &[b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// Note emitted under the heading of a member that is itself an archive.
pub const NESTED_ARCHIVE_NOTE: &str = "_Nested archive not expanded._";

#[derive(Debug, Default, Clone, Copy)]
pub struct ZipConverter;

impl ZipConverter {
    pub const NAME: &'static str = "zip";
}

impl DocumentConverter for ZipConverter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn default_priority(&self) -> f32 {
        PRIORITY_SPECIFIC_FILE_FORMAT
    }

    fn accepts(&self, stream: &mut dyn ReadSeek, info: &StreamInfo, _ctx: &DispatchContext<'_>) -> bool {
        if info.has_extension(ACCEPTED_FILE_EXTENSIONS)
            || info.mimetype_starts_with(ACCEPTED_MIME_TYPE_PREFIXES)
        {
            return true;
        }
        // Magic bytes only decide for the unconstrained hypothesis; a stream
        // labelled .docx is also a zip but belongs to the docx converter.
        info.is_unconstrained() && ZIP_SIGNATURES.iter().any(|sig| starts_with(stream, sig))
    }

    fn convert(
        &self,
        stream: &mut dyn ReadSeek,
        info: &StreamInfo,
        ctx: &DispatchContext<'_>,
    ) -> Result<ConversionResult, ConverterError> {
        let mut archive = zip::ZipArchive::new(&mut *stream)?;
        let work_dir = create_work_dir(ctx)?;
        let display_name = info.filename.clone().unwrap_or_else(|| "archive.zip".to_string());
        info!(
            "Expanding {} ({} entries) into {}",
            display_name,
            archive.len(),
            work_dir.path().display()
        );

        let nested = ctx.excluding(self.name());
        let expanded = expand_members(&mut archive, work_dir.path(), &nested);
        release_work_dir(work_dir, ctx.options().cleanup_extracted);

        let mut sections = vec![format!("Content from the zip file `{display_name}`:")];
        sections.extend(expanded?);
        Ok(ConversionResult::new(sections.join("\n\n")))
    }
}

/// Extract and convert every member, returning one section per member.
fn expand_members<R: io::Read + io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    work_dir: &Path,
    nested: &DispatchContext<'_>,
) -> Result<Vec<String>, ConverterError> {
    let max_member_bytes = nested.options().max_member_bytes;
    let mut sections = Vec::new();
    for index in 0..archive.len() {
        let mut member = archive.by_index(index)?;
        if member.is_dir() {
            continue;
        }
        let member_name = member.name().to_string();
        let Some(relative) = member.enclosed_name().map(Path::to_path_buf) else {
            warn!("Skipping zip member with unsafe path: {}", member_name);
            continue;
        };
        if member.size() > max_member_bytes {
            warn!(
                "Skipping zip member {} ({} bytes exceeds limit of {})",
                member_name,
                member.size(),
                max_member_bytes
            );
            continue;
        }

        let target = work_dir.join(&relative);
        extract_member(&mut member, &target)?;
        drop(member);

        match convert_member(nested, &target, &member_name) {
            MemberOutcome::Converted(markdown) => {
                sections.push(format!("## File: {member_name}\n\n{markdown}"));
            }
            MemberOutcome::NestedArchive => {
                sections.push(format!("## File: {member_name}\n\n{NESTED_ARCHIVE_NOTE}"));
            }
            MemberOutcome::Skipped => {}
        }
    }
    Ok(sections)
}

enum MemberOutcome {
    Converted(String),
    NestedArchive,
    Skipped,
}

fn convert_member(ctx: &DispatchContext<'_>, path: &Path, member_name: &str) -> MemberOutcome {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Could not reopen extracted member {}: {}", member_name, e);
            return MemberOutcome::Skipped;
        }
    };
    let hints = DetectionHints::new()
        .name(member_name)
        .explicit(StreamInfo::new().with_local_path(path).with_filename(file_name(member_name)));

    match ctx.convert_stream(&mut file, &hints) {
        Ok(result) => MemberOutcome::Converted(result.markdown),
        Err(Doc2MdError::UnsupportedFormat { hypotheses }) => {
            if is_archive_name(member_name) || hypotheses.iter().any(|h| h.starts_with(".zip")) {
                debug!("Not expanding nested archive {}", member_name);
                MemberOutcome::NestedArchive
            } else {
                debug!("No converter for zip member {} (tried {:?})", member_name, hypotheses);
                MemberOutcome::Skipped
            }
        }
        Err(e) => {
            warn!("Zip member {} failed to convert: {}", member_name, e);
            MemberOutcome::Skipped
        }
    }
}

fn is_archive_name(name: &str) -> bool {
    extension_of(name).is_some_and(|e| ACCEPTED_FILE_EXTENSIONS.contains(&e.as_str()))
}

fn file_name(member_name: &str) -> String {
    member_name
        .rsplit('/')
        .next()
        .unwrap_or(member_name)
        .to_string()
}

fn create_work_dir(ctx: &DispatchContext<'_>) -> Result<TempDir, ConverterError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("doc2md-zip-");
    let dir = match ctx.options().scratch_dir {
        Some(ref parent) => builder.tempdir_in(parent)?,
        None => builder.tempdir()?,
    };
    Ok(dir)
}

fn release_work_dir(dir: TempDir, cleanup: bool) {
    if cleanup {
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    } else {
        let kept: PathBuf = dir.keep();
        info!("Keeping extracted files in {}", kept.display());
    }
}

fn extract_member<R: io::Read>(member: &mut R, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = File::create(target)?;
    io::copy(member, &mut out)?;
    Ok(())
}
