//! OMML node tree and its namespace-aware parser.
//!
//! Only the elements the transducer dispatches on get their own [`MathTag`];
//! every `*Pr` element collapses to [`MathTag::Properties`] and is read
//! through [`MathNode::property`]. Elements from other namespaces (the
//! `w:rPr` Word places inside `m:r`) are kept as [`MathTag::Foreign`] so
//! their OMML descendants, if any, still render.

use crate::error::MathError;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use regex::Regex;

pub const OMML_NAMESPACE: &[u8] = b"http://schemas.openxmlformats.org/officeDocument/2006/math";

// ── Tags ─────────────────────────────────────────────────────────────────────

/// Structural OMML element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathTag {
    OMathPara,
    OMath,
    Run,
    Text,
    Fraction,
    Numerator,
    Denominator,
    Radical,
    Degree,
    /// `m:e`, the generic argument container.
    Base,
    Subscript,
    Superscript,
    SubSup,
    PreScript,
    Sub,
    Sup,
    Nary,
    Function,
    FunctionName,
    LimitLower,
    LimitUpper,
    Limit,
    Delimiter,
    Matrix,
    MatrixRow,
    EquationArray,
    Accent,
    Bar,
    GroupChar,
    Box,
    BorderBox,
    Phantom,
    /// Any `*Pr` element (`m:fPr`, `m:rPr`, `m:ctrlPr`, …).
    Properties,
    /// An OMML element with no dedicated handler.
    Unknown,
    /// An element outside the OMML namespace.
    Foreign,
}

static TAG_NAMES: &[(&str, MathTag)] = &[
    ("oMathPara", MathTag::OMathPara),
    ("oMath", MathTag::OMath),
    ("r", MathTag::Run),
    ("t", MathTag::Text),
    ("f", MathTag::Fraction),
    ("num", MathTag::Numerator),
    ("den", MathTag::Denominator),
    ("rad", MathTag::Radical),
    ("deg", MathTag::Degree),
    ("e", MathTag::Base),
    ("sSub", MathTag::Subscript),
    ("sSup", MathTag::Superscript),
    ("sSubSup", MathTag::SubSup),
    ("sPre", MathTag::PreScript),
    ("sub", MathTag::Sub),
    ("sup", MathTag::Sup),
    ("nary", MathTag::Nary),
    ("func", MathTag::Function),
    ("fName", MathTag::FunctionName),
    ("limLow", MathTag::LimitLower),
    ("limUpp", MathTag::LimitUpper),
    ("lim", MathTag::Limit),
    ("d", MathTag::Delimiter),
    ("m", MathTag::Matrix),
    ("mr", MathTag::MatrixRow),
    ("eqArr", MathTag::EquationArray),
    ("acc", MathTag::Accent),
    ("bar", MathTag::Bar),
    ("groupChr", MathTag::GroupChar),
    ("box", MathTag::Box),
    ("borderBox", MathTag::BorderBox),
    ("phant", MathTag::Phantom),
];

impl MathTag {
    /// Tag for an element local name in the OMML namespace.
    pub fn from_local_name(name: &str) -> MathTag {
        if let Some((_, tag)) = TAG_NAMES.iter().find(|(n, _)| *n == name) {
            return *tag;
        }
        if name.ends_with("Pr") {
            MathTag::Properties
        } else {
            MathTag::Unknown
        }
    }

    /// Canonical local name; empty for the catch-all kinds.
    pub fn local_name(self) -> &'static str {
        TAG_NAMES
            .iter()
            .find(|(_, t)| *t == self)
            .map(|(n, _)| *n)
            .unwrap_or("")
    }
}

// ── Nodes ────────────────────────────────────────────────────────────────────

/// One parsed element. `text` is only filled for [`MathTag::Text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathNode {
    pub tag: MathTag,
    /// Local element name as it appeared in the document.
    pub name: String,
    /// Attributes by local name (`m:val` → `val`).
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<MathNode>,
}

impl MathNode {
    pub fn new(tag: MathTag) -> Self {
        Self::named(tag, tag.local_name())
    }

    /// An OMML element by local name, e.g. `MathNode::element("sSup")`.
    pub fn element(name: &str) -> Self {
        Self::named(MathTag::from_local_name(name), name)
    }

    fn named(tag: MathTag, name: &str) -> Self {
        Self {
            tag,
            name: name.to_string(),
            attrs: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// `<m:r><m:t>text</m:t></m:r>`
    pub fn run(text: &str) -> Self {
        let mut t = MathNode::new(MathTag::Text);
        t.text = text.to_string();
        MathNode::new(MathTag::Run).with_child(t)
    }

    pub fn with_child(mut self, child: MathNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    /// Attach a `<m:{name}Pr>` holding one `<m:{key} m:val="{value}"/>`.
    pub fn with_property(self, key: &str, value: &str) -> Self {
        let pr_name = format!("{}Pr", self.name);
        let prop = MathNode::element(key).with_attr("val", value);
        self.with_child(MathNode::element(&pr_name).with_child(prop))
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with `tag`.
    pub fn child(&self, tag: MathTag) -> Option<&MathNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn children_tagged(&self, tag: MathTag) -> impl Iterator<Item = &MathNode> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Children that carry content, i.e. everything except property blocks.
    pub fn content(&self) -> impl Iterator<Item = &MathNode> {
        self.children.iter().filter(|c| c.tag != MathTag::Properties)
    }

    /// The `val` of a property element such as `m:chr` inside this node's
    /// `*Pr` block. A property present without `val` reads as `""`.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.children_tagged(MathTag::Properties)
            .flat_map(|pr| pr.children.iter())
            .find(|p| p.name == key)
            .map(|p| p.attr("val").unwrap_or(""))
    }

    /// On/off property: present and not explicitly switched off.
    pub fn flag(&self, key: &str) -> bool {
        self.property(key)
            .is_some_and(|v| !matches!(v, "0" | "off" | "false"))
    }

    /// Concatenated `m:t` text of the whole sub-tree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if self.tag == MathTag::Text {
            out.push_str(&self.text);
        }
        for c in &self.children {
            c.collect_text(out);
        }
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Whether a resolved element name belongs to OMML. Fragments cut out of a
/// document often lose their `xmlns:m` declaration, so an unbound `m:`
/// prefix and unprefixed names are accepted too.
pub(crate) fn is_omml(ns: &ResolveResult<'_>) -> bool {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => *uri == OMML_NAMESPACE,
        ResolveResult::Unbound => true,
        ResolveResult::Unknown(prefix) => prefix.as_slice() == b"m",
    }
}

/// Incremental tree construction from reader events.
#[derive(Debug, Default)]
pub(crate) struct TreeBuilder {
    stack: Vec<MathNode>,
}

impl TreeBuilder {
    pub(crate) fn open(&mut self, omml: bool, e: &BytesStart<'_>) -> Result<(), MathError> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let tag = if omml {
            MathTag::from_local_name(&name)
        } else {
            MathTag::Foreign
        };
        let mut node = MathNode::named(tag, &name);
        for attr in e.attributes() {
            let attr = attr.map_err(|err| MathError::Xml(err.to_string()))?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            node.attrs.push((key, value));
        }
        self.stack.push(node);
        Ok(())
    }

    pub(crate) fn text(&mut self, text: &str) {
        if let Some(top) = self.stack.last_mut() {
            if top.tag == MathTag::Text {
                top.text.push_str(text);
            }
        }
    }

    /// Close the innermost element; returns the root once it is closed.
    pub(crate) fn close(&mut self) -> Option<MathNode> {
        let node = self.stack.pop()?;
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(node);
                None
            }
            None => Some(node),
        }
    }
}

/// Read events until the element opened in `builder` is closed.
pub(crate) fn read_subtree<'i>(
    reader: &mut NsReader<&'i [u8]>,
    mut builder: TreeBuilder,
) -> Result<MathNode, MathError> {
    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let omml = is_omml(&ns);
        match event {
            Event::Start(e) => builder.open(omml, &e)?,
            Event::Empty(e) => {
                builder.open(omml, &e)?;
                if let Some(root) = builder.close() {
                    return Ok(root);
                }
            }
            Event::Text(t) => builder.text(&t.unescape()?),
            Event::CData(c) => builder.text(&String::from_utf8_lossy(&c)),
            Event::End(_) => {
                if let Some(root) = builder.close() {
                    return Ok(root);
                }
            }
            Event::Eof => return Err(MathError::Xml("unexpected end of input".into())),
            _ => {}
        }
    }
}

/// Parse an OMML fragment; the first element is the root.
pub fn parse_omml(xml: &str) -> Result<MathNode, MathError> {
    let mut reader = NsReader::from_str(xml);
    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let omml = is_omml(&ns);
        match event {
            Event::Start(e) => {
                let mut builder = TreeBuilder::default();
                builder.open(omml, &e)?;
                return read_subtree(&mut reader, builder);
            }
            Event::Empty(e) => {
                let mut builder = TreeBuilder::default();
                builder.open(omml, &e)?;
                return builder
                    .close()
                    .ok_or_else(|| MathError::Xml("empty document".into()));
            }
            Event::Eof => return Err(MathError::Xml("no root element".into())),
            _ => {}
        }
    }
}

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>?").unwrap());

/// Text of markup that could not be parsed: tags removed, the five
/// predefined entities decoded.
pub fn strip_tags(xml: &str) -> String {
    RE_TAG
        .replace_all(xml, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
