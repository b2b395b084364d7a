//! Replace OMML elements in WordprocessingML with delimited LaTeX runs.
//!
//! ```text
//! <w:p><m:oMathPara>…</m:oMathPara></w:p>
//!   → <w:p><w:r><w:t xml:space="preserve">$$…$$</w:t></w:r></w:p>
//! <w:p>… <m:oMath>…</m:oMath> …</w:p>
//!   → <w:p>… <w:r><w:t xml:space="preserve">$…$</w:t></w:r> …</w:p>
//! ```
//!
//! Every other event is copied through unchanged, so the rest of the part
//! (declarations, namespaces, whitespace) survives byte-for-byte in content.

use crate::error::MathError;
use crate::math::latex::transform;
use crate::math::omml::{is_omml, read_subtree, TreeBuilder};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{NsReader, Writer};
use std::io::Write;
use tracing::debug;

/// Result of rewriting one XML part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted {
    pub xml: String,
    /// Number of `m:oMath` / `m:oMathPara` elements replaced.
    pub equations: usize,
}

fn is_math_root(e: &BytesStart<'_>) -> bool {
    matches!(e.local_name().as_ref(), b"oMath" | b"oMathPara")
}

/// Rewrite `xml`, replacing each top-level math element in place.
pub fn substitute_math(xml: &str) -> Result<Substituted, MathError> {
    let mut reader = NsReader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut equations = 0usize;

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let omml = is_omml(&ns);
        match event {
            Event::Start(e) if omml && is_math_root(&e) => {
                let display = e.local_name().as_ref() == b"oMathPara";
                let mut builder = TreeBuilder::default();
                builder.open(true, &e)?;
                let root = read_subtree(&mut reader, builder)?;
                let latex = transform(&root);
                equations += 1;
                if latex.trim().is_empty() {
                    continue;
                }
                let delimited = if display {
                    format!("$${latex}$$")
                } else {
                    format!("${latex}$")
                };
                write_text_run(&mut writer, &delimited)?;
            }
            // An empty math element has nothing to render.
            Event::Empty(e) if omml && is_math_root(&e) => {}
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    debug!("Replaced {} math element(s)", equations);
    let xml = String::from_utf8(writer.into_inner())
        .map_err(|e| MathError::Xml(format!("rewritten part is not UTF-8: {e}")))?;
    Ok(Substituted { xml, equations })
}

fn write_text_run<W: Write>(writer: &mut Writer<W>, text: &str) -> Result<(), MathError> {
    let mut t = BytesStart::new("w:t");
    t.push_attribute(("xml:space", "preserve"));
    writer.write_event(Event::Start(BytesStart::new("w:r")))?;
    writer.write_event(Event::Start(t))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new("w:t")))?;
    writer.write_event(Event::End(BytesEnd::new("w:r")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math"><w:body>"#;
    const TAIL: &str = "</w:body></w:document>";

    fn doc(body: &str) -> String {
        format!("{HEAD}{body}{TAIL}")
    }

    #[test]
    fn inline_math_becomes_dollar_run() {
        let xml = doc(
            r#"<w:p><w:r><w:t>Area is </w:t></w:r><m:oMath><m:r><m:t>π</m:t></m:r><m:sSup><m:e><m:r><m:t>r</m:t></m:r></m:e><m:sup><m:r><m:t>2</m:t></m:r></m:sup></m:sSup></m:oMath></w:p>"#,
        );
        let out = substitute_math(&xml).unwrap();
        assert_eq!(out.equations, 1);
        assert_eq!(
            out.xml,
            doc(r#"<w:p><w:r><w:t>Area is </w:t></w:r><w:r><w:t xml:space="preserve">$\pi r^{2}$</w:t></w:r></w:p>"#)
        );
    }

    #[test]
    fn display_math_uses_double_dollars() {
        let xml = doc(
            r#"<w:p><m:oMathPara><m:oMath><m:f><m:num><m:r><m:t>a</m:t></m:r></m:num><m:den><m:r><m:t>b+1</m:t></m:r></m:den></m:f></m:oMath></m:oMathPara></w:p>"#,
        );
        let out = substitute_math(&xml).unwrap();
        assert_eq!(out.equations, 1);
        assert!(out.xml.contains(r#"<w:t xml:space="preserve">$$\frac{a}{b+1}$$</w:t>"#));
        assert!(!out.xml.contains("oMath"));
    }

    #[test]
    fn latex_is_xml_escaped_in_output() {
        let xml = doc(r#"<w:p><m:oMath><m:r><m:t>a&lt;b</m:t></m:r></m:oMath></w:p>"#);
        let out = substitute_math(&xml).unwrap();
        assert!(out.xml.contains("$a&lt;b$"));
    }

    #[test]
    fn document_without_math_is_unchanged() {
        let xml = doc(r#"<w:p><w:r><w:t xml:space="preserve"> keep  spaces </w:t></w:r></w:p>"#);
        let out = substitute_math(&xml).unwrap();
        assert_eq!(out.equations, 0);
        assert_eq!(out.xml, xml);
    }

    #[test]
    fn broken_equation_degrades_not_fails() {
        // fraction without a denominator
        let xml = doc(r#"<w:p><m:oMath><m:f><m:num><m:r><m:t>x</m:t></m:r></m:num></m:f></m:oMath></w:p>"#);
        let out = substitute_math(&xml).unwrap();
        assert!(out.xml.contains("$x$"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(substitute_math(&doc("<w:p><m:oMath><m:r></w:p>")).is_err());
    }
}
