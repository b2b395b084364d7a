//! DOCX converter: math preprocessing plus a pluggable body renderer.
//!
//! ```text
//! .docx bytes ──▶ pre_process_docx ──▶ DocxRenderer::render ──▶ Markdown
//!                 (OMML → $…$ runs in document, footnotes, endnotes)
//! ```
//!
//! Rendering WordprocessingML faithfully is a job for a dedicated library;
//! plug one in through [`DocxRenderer`]. The built-in [`ParagraphRenderer`]
//! covers headings, list items, bold/italic runs, hyperlinks, tables,
//! images and foot/endnotes, which is enough for text-first documents.

use crate::config::ConvertOptions;
use crate::converters::{markdown_table, DocumentConverter, PRIORITY_SPECIFIC_FILE_FORMAT};
use crate::error::ConverterError;
use crate::math::substitute_math;
use crate::output::ConversionResult;
use crate::pipeline::detect::{extension_of, mimetype_for_extension, DOCX_MIME};
use crate::pipeline::dispatch::DispatchContext;
use crate::stream::ReadSeek;
use crate::stream_info::StreamInfo;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const ACCEPTED_FILE_EXTENSIONS: &[&str] = &[".docx"];

/// Package parts that may contain OMML.
const MATH_PARTS: &[&str] = &["word/document.xml", "word/footnotes.xml", "word/endnotes.xml"];

// ── Renderer contract ────────────────────────────────────────────────────────

/// Turns a (math-preprocessed) DOCX package into Markdown.
pub trait DocxRenderer: Send + Sync {
    fn render(
        &self,
        package: &[u8],
        options: &ConvertOptions,
    ) -> Result<ConversionResult, ConverterError>;
}

// ── Converter ────────────────────────────────────────────────────────────────

pub struct DocxConverter {
    renderer: Arc<dyn DocxRenderer>,
}

impl DocxConverter {
    pub const NAME: &'static str = "docx";

    pub fn new() -> Self {
        Self::with_renderer(Arc::new(ParagraphRenderer))
    }

    pub fn with_renderer(renderer: Arc<dyn DocxRenderer>) -> Self {
        Self { renderer }
    }
}

impl Default for DocxConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DocxConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocxConverter").finish_non_exhaustive()
    }
}

impl DocumentConverter for DocxConverter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn default_priority(&self) -> f32 {
        PRIORITY_SPECIFIC_FILE_FORMAT
    }

    fn accepts(&self, _stream: &mut dyn ReadSeek, info: &StreamInfo, _ctx: &DispatchContext<'_>) -> bool {
        info.has_extension(ACCEPTED_FILE_EXTENSIONS) || info.mimetype_starts_with(&[DOCX_MIME])
    }

    fn convert(
        &self,
        stream: &mut dyn ReadSeek,
        _info: &StreamInfo,
        ctx: &DispatchContext<'_>,
    ) -> Result<ConversionResult, ConverterError> {
        let mut package = Vec::new();
        stream.read_to_end(&mut package)?;
        let processed = pre_process_docx(&package)?;
        self.renderer.render(&processed, ctx.options())
    }
}

// ── Math preprocessing ───────────────────────────────────────────────────────

/// Rewrite the math-bearing parts of a DOCX package, replacing every
/// equation by a `$…$` / `$$…$$` text run. All other members are copied
/// without recompression. A part whose XML cannot be rewritten is kept
/// as it was.
pub fn pre_process_docx(package: &[u8]) -> Result<Vec<u8>, ConverterError> {
    let mut archive = ZipArchive::new(Cursor::new(package))?;
    let mut out = ZipWriter::new(Cursor::new(Vec::with_capacity(package.len())));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut equations = 0usize;

    for index in 0..archive.len() {
        let mut member = archive.by_index(index)?;
        let name = member.name().to_string();
        if !MATH_PARTS.contains(&name.as_str()) {
            out.raw_copy_file(member)?;
            continue;
        }

        let mut xml = String::new();
        member.read_to_string(&mut xml)?;
        let xml = if xml.contains("oMath") {
            match substitute_math(&xml) {
                Ok(done) => {
                    equations += done.equations;
                    done.xml
                }
                Err(e) => {
                    warn!("Math substitution failed in {}, keeping it unchanged: {}", name, e);
                    xml
                }
            }
        } else {
            xml
        };
        out.start_file(name.as_str(), options)?;
        out.write_all(xml.as_bytes())?;
    }

    if equations > 0 {
        info!("Converted {} equation(s) to LaTeX", equations);
    }
    Ok(out.finish()?.into_inner())
}

// ── Built-in renderer ────────────────────────────────────────────────────────

/// Lightweight WordprocessingML → Markdown renderer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParagraphRenderer;

impl DocxRenderer for ParagraphRenderer {
    fn render(
        &self,
        package: &[u8],
        options: &ConvertOptions,
    ) -> Result<ConversionResult, ConverterError> {
        if options.style_map.is_some() {
            debug!("style_map is ignored by the built-in DOCX renderer");
        }
        let mut archive = ZipArchive::new(Cursor::new(package))?;
        let document = read_part(&mut archive, "word/document.xml")?.ok_or_else(|| {
            ConverterError::Malformed {
                format: "docx".to_string(),
                detail: "package has no word/document.xml".to_string(),
            }
        })?;
        let rels = match read_part(&mut archive, "word/_rels/document.xml.rels")? {
            Some(xml) => parse_relationships(&xml)?,
            None => HashMap::new(),
        };
        let images = load_images(&mut archive, &rels, options.keep_data_uris)?;

        let mut body = Walker::new(&rels, &images, "");
        body.walk(&document)?;
        let mut blocks = body.blocks;
        let mut title = body.title;

        for (part, prefix) in [("word/footnotes.xml", ""), ("word/endnotes.xml", "e")] {
            if let Some(xml) = read_part(&mut archive, part)? {
                let mut notes = Walker::new(&rels, &images, prefix);
                notes.walk(&xml)?;
                blocks.extend(notes.blocks);
            }
        }

        if let Some(core) = read_part(&mut archive, "docProps/core.xml")? {
            if let Some(t) = core_title(&core)? {
                title = Some(t);
            }
        }

        let mut result = ConversionResult::new(blocks.join("\n\n"));
        if let Some(t) = title {
            result = result.with_title(t);
        }
        Ok(result)
    }
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ConverterError> {
    let mut member = match archive.by_name(name) {
        Ok(m) => m,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    member.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Relationship {
    target: String,
    kind: String,
    external: bool,
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, Relationship>, ConverterError> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    let rel = Relationship {
                        target,
                        kind: attr(&e, b"Type").unwrap_or_default(),
                        external: attr(&e, b"TargetMode").as_deref() == Some("External"),
                    };
                    rels.insert(id, rel);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

/// Image URIs by relationship id. Without `keep_data_uris` the payload is
/// elided and only the media type is kept.
fn load_images<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    rels: &HashMap<String, Relationship>,
    keep_data_uris: bool,
) -> Result<HashMap<String, String>, ConverterError> {
    let mut images = HashMap::new();
    for (id, rel) in rels {
        if rel.external || !rel.kind.ends_with("/image") {
            continue;
        }
        let path = match rel.target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("word/{}", rel.target),
        };
        let mime = extension_of(&path)
            .and_then(|ext| mimetype_for_extension(&ext))
            .unwrap_or("application/octet-stream");
        if !keep_data_uris {
            images.insert(id.clone(), format!("data:{mime};base64..."));
            continue;
        }
        match archive.by_name(&path) {
            Ok(mut member) => {
                let mut bytes = Vec::new();
                member.read_to_end(&mut bytes)?;
                images.insert(id.clone(), format!("data:{mime};base64,{}", STANDARD.encode(&bytes)));
            }
            Err(e) => warn!("Image {} referenced by {} is unreadable: {}", path, id, e),
        }
    }
    Ok(images)
}

fn core_title(xml: &str) -> Result<Option<String>, ConverterError> {
    let mut reader = Reader::from_str(xml);
    let mut in_title = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"title" => in_title = true,
            Event::Text(t) if in_title => {
                let t = t.unescape()?.trim().to_string();
                return Ok((!t.is_empty()).then_some(t));
            }
            Event::End(_) => in_title = false,
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

// ── Body walker ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Paragraph {
    style: Option<String>,
    list: bool,
    text: String,
}

#[derive(Debug, Default)]
struct Run {
    bold: bool,
    italic: bool,
    text: String,
}

#[derive(Debug, Default)]
struct Image {
    alt: String,
    embed: Option<String>,
}

/// One pass over a WordprocessingML part, collecting Markdown blocks.
struct Walker<'a> {
    rels: &'a HashMap<String, Relationship>,
    images: &'a HashMap<String, String>,
    /// Label prefix for notes: "" for footnotes, "e" for endnotes.
    note_prefix: &'static str,
    blocks: Vec<String>,
    title: Option<String>,

    paragraph: Option<Paragraph>,
    run: Option<Run>,
    in_run_props: bool,
    in_text: bool,
    link: Option<(String, String)>,
    image: Option<Image>,

    table_depth: usize,
    rows: Vec<Vec<String>>,
    cell: Option<Vec<String>>,

    note: Option<(String, Vec<String>)>,
}

impl<'a> Walker<'a> {
    fn new(
        rels: &'a HashMap<String, Relationship>,
        images: &'a HashMap<String, String>,
        note_prefix: &'static str,
    ) -> Self {
        Self {
            rels,
            images,
            note_prefix,
            blocks: Vec::new(),
            title: None,
            paragraph: None,
            run: None,
            in_run_props: false,
            in_text: false,
            link: None,
            image: None,
            table_depth: 0,
            rows: Vec::new(),
            cell: None,
            note: None,
        }
    }

    fn walk(&mut self, xml: &str) -> Result<(), ConverterError> {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event()? {
                Event::Start(e) => self.open(&e),
                Event::Empty(e) => {
                    self.open(&e);
                    self.close(e.local_name().as_ref());
                }
                Event::Text(t) if self.in_text => {
                    let text = t.unescape()?;
                    self.push_text(&text);
                }
                Event::End(e) => self.close(e.local_name().as_ref()),
                Event::Eof => return Ok(()),
                _ => {}
            }
        }
    }

    fn open(&mut self, e: &BytesStart<'_>) {
        match e.local_name().as_ref() {
            b"p" => self.paragraph = Some(Paragraph::default()),
            b"pStyle" => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.style = attr(e, b"val");
                }
            }
            b"numPr" => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.list = true;
                }
            }
            b"r" => self.run = Some(Run::default()),
            b"rPr" => self.in_run_props = true,
            b"b" | b"i" if self.in_run_props => {
                let on = !matches!(attr(e, b"val").as_deref(), Some("0" | "false" | "off"));
                if let Some(run) = self.run.as_mut() {
                    if e.local_name().as_ref() == b"b" {
                        run.bold = on;
                    } else {
                        run.italic = on;
                    }
                }
            }
            b"t" => self.in_text = true,
            // tab stops and breaks outside runs are layout, not content
            b"tab" if self.run.is_some() && !self.in_run_props => self.push_text("\t"),
            b"br" | b"cr" if self.run.is_some() => self.push_text("\n"),
            b"hyperlink" => {
                let target = attr(e, b"id")
                    .and_then(|id| self.rels.get(&id))
                    .map(|r| r.target.clone())
                    .or_else(|| attr(e, b"anchor").map(|a| format!("#{a}")));
                if let Some(target) = target {
                    self.link = Some((target, String::new()));
                }
            }
            b"drawing" | b"pict" => self.image = Some(Image::default()),
            b"docPr" => {
                if let Some(img) = self.image.as_mut() {
                    img.alt = attr(e, b"descr")
                        .filter(|d| !d.is_empty())
                        .or_else(|| attr(e, b"name"))
                        .unwrap_or_default();
                }
            }
            b"blip" | b"imagedata" => {
                if let Some(img) = self.image.as_mut() {
                    img.embed = attr(e, b"embed").or_else(|| attr(e, b"id"));
                }
            }
            b"footnoteReference" => {
                if let Some(id) = attr(e, b"id") {
                    self.push_text(&format!("[^{id}]"));
                }
            }
            b"endnoteReference" => {
                if let Some(id) = attr(e, b"id") {
                    self.push_text(&format!("[^e{id}]"));
                }
            }
            b"footnote" | b"endnote" => {
                // separator and continuation notes carry a w:type
                if attr(e, b"type").is_none() {
                    if let Some(id) = attr(e, b"id") {
                        self.note = Some((id, Vec::new()));
                    }
                }
            }
            b"tbl" => {
                self.table_depth += 1;
                if self.table_depth == 1 {
                    self.rows.clear();
                }
            }
            b"tr" if self.table_depth == 1 => self.rows.push(Vec::new()),
            b"tc" if self.table_depth == 1 => self.cell = Some(Vec::new()),
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"t" => self.in_text = false,
            b"rPr" => self.in_run_props = false,
            b"r" => self.flush_run(),
            b"hyperlink" => {
                if let Some((target, text)) = self.link.take() {
                    let text = if text.trim().is_empty() { target.clone() } else { text };
                    self.push_to_paragraph(&format!("[{text}]({target})"));
                }
            }
            b"drawing" | b"pict" => {
                if let Some(img) = self.image.take() {
                    if let Some(uri) = img.embed.as_ref().and_then(|id| self.images.get(id)) {
                        let md = format!("![{}]({})", img.alt, uri);
                        self.push_to_paragraph(&md);
                    }
                }
            }
            b"p" => self.finish_paragraph(),
            b"tc" if self.table_depth == 1 => {
                if let (Some(cell), Some(row)) = (self.cell.take(), self.rows.last_mut()) {
                    row.push(cell.join("<br>"));
                }
            }
            b"tbl" => {
                if self.table_depth == 1 {
                    let rows = std::mem::take(&mut self.rows);
                    if let Some(table) = markdown_table(&rows) {
                        self.push_block(table);
                    }
                }
                self.table_depth = self.table_depth.saturating_sub(1);
            }
            b"footnote" | b"endnote" => {
                if let Some((id, paras)) = self.note.take() {
                    let body = paras.join(" ");
                    if !body.trim().is_empty() {
                        self.blocks.push(format!("[^{}{}]: {}", self.note_prefix, id, body.trim()));
                    }
                }
            }
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(run) = self.run.as_mut() {
            run.text.push_str(text);
        } else {
            self.push_to_paragraph(text);
        }
    }

    fn flush_run(&mut self) {
        let Some(run) = self.run.take() else { return };
        let md = emphasise(&run);
        self.push_to_paragraph(&md);
    }

    fn push_to_paragraph(&mut self, md: &str) {
        if let Some((_, text)) = self.link.as_mut() {
            text.push_str(md);
        } else if let Some(p) = self.paragraph.as_mut() {
            p.text.push_str(md);
        }
    }

    fn finish_paragraph(&mut self) {
        let Some(p) = self.paragraph.take() else { return };
        let text = p.text.trim();
        if text.is_empty() {
            return;
        }

        if let Some(cell) = self.cell.as_mut() {
            cell.push(text.replace('\n', "<br>"));
            return;
        }
        if let Some((_, paras)) = self.note.as_mut() {
            paras.push(text.to_string());
            return;
        }

        let level = p.style.as_deref().and_then(heading_level);
        if self.title.is_none() && matches!(level, Some(1)) {
            self.title = Some(text.to_string());
        }
        let block = match level {
            Some(n) => format!("{} {}", "#".repeat(n), text),
            None if p.list => format!("- {text}"),
            None => text.to_string(),
        };
        self.push_block(block);
    }

    fn push_block(&mut self, block: String) {
        // consecutive list items stay in one Markdown list
        if block.starts_with("- ") {
            if let Some(last) = self.blocks.last_mut() {
                if last.starts_with("- ") {
                    last.push('\n');
                    last.push_str(&block);
                    return;
                }
            }
        }
        self.blocks.push(block);
    }
}

/// `Heading1`…`Heading6` and `Title` (level 1).
fn heading_level(style: &str) -> Option<usize> {
    if style.eq_ignore_ascii_case("title") {
        return Some(1);
    }
    let rest = style
        .strip_prefix("Heading")
        .or_else(|| style.strip_prefix("heading"))?;
    match rest.trim().parse::<usize>() {
        Ok(n @ 1..=6) => Some(n),
        _ => None,
    }
}

fn emphasise(run: &Run) -> String {
    let text = &run.text;
    if text.trim().is_empty() || !(run.bold || run.italic) {
        return text.clone();
    }
    // markers must hug the text, so surrounding spaces move outside
    let lead = &text[..text.len() - text.trim_start().len()];
    let trail = &text[text.trim_end().len()..];
    let marker = match (run.bold, run.italic) {
        (true, true) => "***",
        (true, false) => "**",
        _ => "*",
    };
    format!("{lead}{marker}{}{marker}{trail}", text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::detect::DetectionCascade;
    use crate::pipeline::registry::Registry;

    const W: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main""#;

    fn document(body: &str) -> String {
        format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {W}><w:body>{body}</w:body></w:document>"#)
    }

    fn package(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut w = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            w.start_file(*name, FileOptions::default()).unwrap();
            w.write_all(body).unwrap();
        }
        w.finish().unwrap().into_inner()
    }

    fn render(body: &str) -> ConversionResult {
        let doc = document(body);
        let pkg = package(&[("word/document.xml", doc.as_bytes())]);
        let pre = pre_process_docx(&pkg).unwrap();
        ParagraphRenderer.render(&pre, &ConvertOptions::default()).unwrap()
    }

    #[test]
    fn headings_paragraphs_and_lists() {
        let md = render(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Intro</w:t></w:r></w:p>
               <w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>world</w:t></w:r></w:p>
               <w:p><w:pPr><w:numPr><w:ilvl w:val="0"/></w:numPr></w:pPr><w:r><w:t>one</w:t></w:r></w:p>
               <w:p><w:pPr><w:numPr><w:ilvl w:val="0"/></w:numPr></w:pPr><w:r><w:t>two</w:t></w:r></w:p>
               <w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:rPr><w:i/></w:rPr><w:t>Next</w:t></w:r></w:p>"#,
        );
        assert_eq!(
            md.markdown,
            "# Intro\n\nHello **world**\n\n- one\n- two\n\n## *Next*"
        );
        assert_eq!(md.title.as_deref(), Some("Intro"));
    }

    #[test]
    fn inline_and_display_math() {
        let md = render(
            r#"<w:p><w:r><w:t xml:space="preserve">Since </w:t></w:r><m:oMath><m:sSup><m:e><m:r><m:t>x</m:t></m:r></m:e><m:sup><m:r><m:t>2</m:t></m:r></m:sup></m:sSup></m:oMath><w:r><w:t xml:space="preserve"> grows</w:t></w:r></w:p>
               <w:p><m:oMathPara><m:oMath><m:rad><m:radPr><m:degHide m:val="1"/></m:radPr><m:deg/><m:e><m:r><m:t>y</m:t></m:r></m:e></m:rad></m:oMath></m:oMathPara></w:p>"#,
        );
        assert_eq!(md.markdown, "Since $x^{2}$ grows\n\n$$\\sqrt{y}$$");
    }

    #[test]
    fn tables() {
        let cell = |t: &str| format!("<w:tc><w:p><w:r><w:t>{t}</w:t></w:r></w:p></w:tc>");
        let body = format!(
            "<w:tbl><w:tr>{}{}</w:tr><w:tr>{}{}</w:tr></w:tbl>",
            cell("A"),
            cell("B"),
            cell("1"),
            cell("a|b")
        );
        assert_eq!(render(&body).markdown, "| A | B |\n| --- | --- |\n| 1 | a\\|b |");
    }

    #[test]
    fn hyperlinks_images_and_footnotes() {
        let rels = r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
            <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
        </Relationships>"#;
        let doc = document(
            r#"<w:p><w:hyperlink r:id="rId1"><w:r><w:t>site</w:t></w:r></w:hyperlink><w:r><w:footnoteReference w:id="1"/></w:r></w:p>
               <w:p><w:r><w:drawing><wp:inline><wp:docPr id="1" name="Picture 1" descr="a cat"/><a:graphic><a:graphicData><a:blip r:embed="rId2"/></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#,
        );
        let notes = format!(
            r#"<w:footnotes {W}><w:footnote w:type="separator" w:id="-1"><w:p><w:r><w:separator/></w:r></w:p></w:footnote><w:footnote w:id="1"><w:p><w:r><w:t>See source.</w:t></w:r></w:p></w:footnote></w:footnotes>"#
        );
        let pkg = package(&[
            ("word/document.xml", doc.as_bytes()),
            ("word/_rels/document.xml.rels", rels.as_bytes()),
            ("word/media/image1.png", b"\x89PNG fake"),
            ("word/footnotes.xml", notes.as_bytes()),
        ]);

        let md = ParagraphRenderer
            .render(&pkg, &ConvertOptions::default())
            .unwrap()
            .markdown;
        assert_eq!(
            md,
            "[site](https://example.com)[^1]\n\n![a cat](data:image/png;base64...)\n\n[^1]: See source."
        );

        let keep = ConvertOptions {
            keep_data_uris: true,
            ..ConvertOptions::default()
        };
        let md = ParagraphRenderer.render(&pkg, &keep).unwrap().markdown;
        let expected = format!("![a cat](data:image/png;base64,{})", STANDARD.encode(b"\x89PNG fake"));
        assert!(md.contains(&expected), "got: {md}");
    }

    #[test]
    fn core_properties_title_wins() {
        let doc = document(r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Heading</w:t></w:r></w:p>"#);
        let core = r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Report 2024</dc:title></cp:coreProperties>"#;
        let pkg = package(&[
            ("word/document.xml", doc.as_bytes()),
            ("docProps/core.xml", core.as_bytes()),
        ]);
        let r = ParagraphRenderer.render(&pkg, &ConvertOptions::default()).unwrap();
        assert_eq!(r.title.as_deref(), Some("Report 2024"));
    }

    #[test]
    fn pre_process_keeps_unrelated_members() {
        let doc = document(r#"<w:p><m:oMath><m:r><m:t>z</m:t></m:r></m:oMath></w:p>"#);
        let pkg = package(&[
            ("[Content_Types].xml", b"<Types/>"),
            ("word/document.xml", doc.as_bytes()),
        ]);
        let out = pre_process_docx(&pkg).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(out)).unwrap();
        assert_eq!(read_part(&mut archive, "[Content_Types].xml").unwrap().as_deref(), Some("<Types/>"));
        let rewritten = read_part(&mut archive, "word/document.xml").unwrap().unwrap();
        assert!(rewritten.contains("$z$"));
        assert!(!rewritten.contains("oMath"));
    }

    #[test]
    fn broken_math_part_is_kept_unchanged() {
        // oMath never closed: substitution fails, the part is copied as-is
        let broken = r#"<w:document xmlns:w="w" xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math"><m:oMath><m:r>"#;
        let pkg = package(&[("word/document.xml", broken.as_bytes())]);
        let out = pre_process_docx(&pkg).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(out)).unwrap();
        assert_eq!(read_part(&mut archive, "word/document.xml").unwrap().as_deref(), Some(broken));
    }

    #[test]
    fn accepts_docx_hypotheses_only() {
        let r = Registry::new();
        let cascade = DetectionCascade::default();
        let opts = ConvertOptions::default();
        let ctx = DispatchContext::new(&r, &cascade, &opts, None);
        let mut s = Cursor::new(Vec::new());
        let c = DocxConverter::new();
        assert!(c.accepts(&mut s, &StreamInfo::new().with_extension(".docx"), &ctx));
        assert!(c.accepts(&mut s, &StreamInfo::new().with_mimetype(DOCX_MIME), &ctx));
        assert!(!c.accepts(&mut s, &StreamInfo::new().with_extension(".zip"), &ctx));
        assert!(!c.accepts(&mut s, &StreamInfo::new(), &ctx));
    }

    #[test]
    fn missing_document_part_is_malformed() {
        let pkg = package(&[("other.xml", b"<x/>")]);
        let err = ParagraphRenderer
            .render(&pkg, &ConvertOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConverterError::Malformed { .. }));
    }

    #[test]
    fn custom_renderer_receives_preprocessed_package() {
        struct Echo;
        impl DocxRenderer for Echo {
            fn render(&self, package: &[u8], _: &ConvertOptions) -> Result<ConversionResult, ConverterError> {
                let mut a = ZipArchive::new(Cursor::new(package))?;
                Ok(ConversionResult::new(read_part(&mut a, "word/document.xml")?.unwrap_or_default()))
            }
        }
        let doc = document(r#"<w:p><m:oMath><m:r><m:t>q</m:t></m:r></m:oMath></w:p>"#);
        let pkg = package(&[("word/document.xml", doc.as_bytes())]);
        let r = Registry::new();
        let cascade = DetectionCascade::default();
        let opts = ConvertOptions::default();
        let ctx = DispatchContext::new(&r, &cascade, &opts, None);
        let out = DocxConverter::with_renderer(Arc::new(Echo))
            .convert(&mut Cursor::new(pkg), &StreamInfo::new().with_extension(".docx"), &ctx)
            .unwrap();
        assert!(out.markdown.contains("$q$"));
    }
}
