//! OMML → LaTeX transducer.
//!
//! A post-order walk over [`MathNode`] with one handler per [`MathTag`].
//! Handlers return `Err(MathError::MissingChild)` when a required part of
//! the construct is absent; [`transform`] catches that at the failing node
//! and substitutes the node's literal text, so a damaged equation still
//! yields something readable and siblings are unaffected.
//!
//! Arguments are always braced (`\frac{}{}` for an empty fraction) so the
//! output stays syntactically valid.

use crate::error::MathError;
use crate::math::omml::{parse_omml, strip_tags, MathNode, MathTag};
use crate::math::symbols::{self, push_latex};
use tracing::{debug, warn};

/// Transform a node into LaTeX. Never fails.
pub fn transform(node: &MathNode) -> String {
    match render(node) {
        Ok(latex) => latex,
        Err(e) => {
            debug!("Degrading <m:{}> to text: {}", node.name, e);
            symbols::escape_text(&node.text_content())
        }
    }
}

/// Parse and transform an OMML fragment. Unparseable markup degrades to
/// its tag-stripped text.
pub fn omml_to_latex(xml: &str) -> String {
    match parse_omml(xml) {
        Ok(root) => transform(&root),
        Err(e) => {
            warn!("Unparseable OMML, keeping its text: {}", e);
            symbols::escape_text(&strip_tags(xml))
        }
    }
}

fn render(node: &MathNode) -> Result<String, MathError> {
    match node.tag {
        MathTag::Properties => Ok(String::new()),
        MathTag::Run => Ok(render_run(node)),
        MathTag::Text => Ok(symbols::escape_text(&node.text)),
        MathTag::OMathPara => Ok(node
            .children_tagged(MathTag::OMath)
            .map(transform)
            .collect::<Vec<_>>()
            .join(r" \\ ")),
        MathTag::Fraction => render_fraction(node),
        MathTag::Radical => render_radical(node),
        MathTag::Subscript => {
            let base = script_base(&arg(node, MathTag::Base)?);
            let sub = arg(node, MathTag::Sub)?;
            Ok(format!("{base}_{{{sub}}}"))
        }
        MathTag::Superscript => {
            let base = script_base(&arg(node, MathTag::Base)?);
            let sup = arg(node, MathTag::Sup)?;
            Ok(format!("{base}^{{{sup}}}"))
        }
        MathTag::SubSup => {
            let base = script_base(&arg(node, MathTag::Base)?);
            let sub = arg(node, MathTag::Sub)?;
            let sup = arg(node, MathTag::Sup)?;
            Ok(format!("{base}_{{{sub}}}^{{{sup}}}"))
        }
        MathTag::PreScript => {
            let sub = arg(node, MathTag::Sub)?;
            let sup = arg(node, MathTag::Sup)?;
            let base = script_base(&arg(node, MathTag::Base)?);
            Ok(format!("{{}}_{{{sub}}}^{{{sup}}}{base}"))
        }
        MathTag::Nary => render_nary(node),
        MathTag::Function => render_function(node),
        MathTag::LimitLower => render_limit_lower(node),
        MathTag::LimitUpper => {
            let base = arg(node, MathTag::Base)?;
            let lim = arg(node, MathTag::Limit)?;
            Ok(format!(r"\overset{{{lim}}}{{{base}}}"))
        }
        MathTag::Delimiter => render_delimiter(node),
        MathTag::Matrix => Ok(render_matrix(node, "matrix")),
        MathTag::EquationArray => Ok(render_rows(node, "aligned")),
        MathTag::Accent => render_accent(node),
        MathTag::Bar => {
            let base = arg(node, MathTag::Base)?;
            match node.property("pos") {
                Some("bot") => Ok(format!(r"\underline{{{base}}}")),
                _ => Ok(format!(r"\overline{{{base}}}")),
            }
        }
        MathTag::GroupChar => render_group_char(node),
        MathTag::BorderBox => Ok(format!(r"\boxed{{{}}}", arg(node, MathTag::Base)?)),
        // Containers and transparent wrappers: the unknown-tag rule applies.
        MathTag::OMath
        | MathTag::Base
        | MathTag::Numerator
        | MathTag::Denominator
        | MathTag::Degree
        | MathTag::Sub
        | MathTag::Sup
        | MathTag::Limit
        | MathTag::FunctionName
        | MathTag::MatrixRow
        | MathTag::Box
        | MathTag::Phantom
        | MathTag::Unknown
        | MathTag::Foreign => Ok(render_children(node)),
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn render_children(node: &MathNode) -> String {
    let mut out = String::new();
    for child in node.content() {
        push_latex(&mut out, &transform(child));
    }
    out
}

fn required(node: &MathNode, tag: MathTag) -> Result<&MathNode, MathError> {
    node.child(tag).ok_or_else(|| MathError::MissingChild {
        tag: node.name.clone(),
        child: tag.local_name().to_string(),
    })
}

/// Rendered content of a required argument container.
fn arg(node: &MathNode, tag: MathTag) -> Result<String, MathError> {
    required(node, tag).map(render_children)
}

/// Content of an optional container, `None` when absent or empty.
fn optional_arg(node: &MathNode, tag: MathTag) -> Option<String> {
    node.child(tag)
        .map(render_children)
        .filter(|s| !s.trim().is_empty())
}

/// A single character or a lone control word needs no braces.
fn is_atom(latex: &str) -> bool {
    let mut chars = latex.chars();
    match (chars.next(), chars.next()) {
        (Some(_), None) => true,
        (Some('\\'), Some(_)) => latex[1..].chars().all(|c| c.is_ascii_alphabetic()),
        _ => false,
    }
}

fn script_base(base: &str) -> String {
    if base.is_empty() {
        "{}".to_string()
    } else if is_atom(base) {
        base.to_string()
    } else {
        format!("{{{base}}}")
    }
}

/// A word of two or more letters, the case where `\mathrm` matters.
fn is_word(text: &str) -> bool {
    let t = text.trim();
    t.chars().count() > 1 && t.chars().all(char::is_alphabetic)
}

/// Text of a container that only holds runs, `None` for structured content.
fn plain_text(node: &MathNode) -> Option<String> {
    node.content()
        .all(|c| c.tag == MathTag::Run)
        .then(|| node.text_content().trim().to_string())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

fn render_run(node: &MathNode) -> String {
    let raw: String = node
        .children_tagged(MathTag::Text)
        .map(|t| t.text.as_str())
        .collect();
    let body = symbols::escape_text(&raw);
    if body.is_empty() {
        return body;
    }
    if let Some(font) = node.property("scr").and_then(symbols::script_style) {
        return format!("{font}{{{body}}}");
    }
    match node.property("sty") {
        Some("b") => format!(r"\mathbf{{{body}}}"),
        Some("bi") => format!(r"\boldsymbol{{{body}}}"),
        Some("p") if is_word(&raw) => format!(r"\mathrm{{{body}}}"),
        _ if node.flag("nor") && is_word(&raw) => format!(r"\mathrm{{{body}}}"),
        _ => body,
    }
}

fn render_fraction(node: &MathNode) -> Result<String, MathError> {
    let num = arg(node, MathTag::Numerator)?;
    let den = arg(node, MathTag::Denominator)?;
    Ok(match node.property("type") {
        Some("noBar") => format!(r"\genfrac{{}}{{}}{{0pt}}{{}}{{{num}}}{{{den}}}"),
        Some("skw") | Some("lin") => format!("{{{num}}}/{{{den}}}"),
        _ => format!(r"\frac{{{num}}}{{{den}}}"),
    })
}

fn render_radical(node: &MathNode) -> Result<String, MathError> {
    let base = arg(node, MathTag::Base)?;
    let index = if node.flag("degHide") {
        None
    } else {
        optional_arg(node, MathTag::Degree)
    };
    Ok(match index {
        Some(deg) => format!(r"\sqrt[{deg}]{{{base}}}"),
        None => format!(r"\sqrt{{{base}}}"),
    })
}

fn render_nary(node: &MathNode) -> Result<String, MathError> {
    let chr = node
        .property("chr")
        .and_then(|c| c.chars().next())
        .unwrap_or(symbols::DEFAULT_NARY_CHR);
    let mut out = symbols::nary_operator(chr)
        .map(str::to_string)
        .unwrap_or_else(|| symbols::escape_text(&chr.to_string()));

    if !node.flag("subHide") {
        if let Some(sub) = optional_arg(node, MathTag::Sub) {
            out.push_str(&format!("_{{{sub}}}"));
        }
    }
    if !node.flag("supHide") {
        if let Some(sup) = optional_arg(node, MathTag::Sup) {
            out.push_str(&format!("^{{{sup}}}"));
        }
    }
    let body = arg(node, MathTag::Base)?;
    out.push_str(&format!("{{{body}}}"));
    Ok(out)
}

fn render_function(node: &MathNode) -> Result<String, MathError> {
    let fname = required(node, MathTag::FunctionName)?;
    let argument = arg(node, MathTag::Base)?;
    let name = match plain_text(fname) {
        Some(text) if text.is_empty() => String::new(),
        Some(text) => symbols::function_name(&text)
            .map(str::to_string)
            .unwrap_or_else(|| format!(r"\operatorname{{{}}}", symbols::escape_text(&text))),
        None => render_children(fname),
    };
    Ok(format!("{name}{{{argument}}}"))
}

fn render_limit_lower(node: &MathNode) -> Result<String, MathError> {
    let base_node = required(node, MathTag::Base)?;
    let lim = arg(node, MathTag::Limit)?;
    if let Some(text) = plain_text(base_node) {
        if let Some(op) = symbols::function_name(&text).filter(|_| symbols::takes_limits(&text)) {
            return Ok(format!("{op}_{{{lim}}}"));
        }
    }
    let base = render_children(base_node);
    Ok(format!(r"\underset{{{lim}}}{{{base}}}"))
}

fn render_delimiter(node: &MathNode) -> Result<String, MathError> {
    let beg = node.property("begChr").unwrap_or("(");
    let end = node.property("endChr").unwrap_or(")");
    let sep = node.property("sepChr").unwrap_or("|");
    let args: Vec<&MathNode> = node.children_tagged(MathTag::Base).collect();

    // A lone matrix or equation array picks a dedicated environment.
    if let [only] = args.as_slice() {
        let inner: Vec<&MathNode> = only.content().collect();
        if let [single] = inner.as_slice() {
            if single.tag == MathTag::Matrix {
                if let Some(env) = symbols::matrix_environment(beg, end) {
                    return Ok(render_matrix(single, env));
                }
            }
            if single.tag == MathTag::EquationArray && beg == "{" && end.is_empty() {
                return Ok(render_rows(single, "cases"));
            }
        }
    }

    let separator = if sep.is_empty() {
        String::new()
    } else {
        symbols::delimiter(sep)
    };
    let mut out = format!(r"\left{}", symbols::delimiter(beg));
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            push_latex(&mut out, &separator);
        }
        push_latex(&mut out, &render_children(a));
    }
    out.push_str(r"\right");
    out.push_str(&symbols::delimiter(end));
    Ok(out)
}

fn render_matrix(node: &MathNode, env: &str) -> String {
    let rows: Vec<String> = node
        .children_tagged(MathTag::MatrixRow)
        .map(|row| {
            row.children_tagged(MathTag::Base)
                .map(render_children)
                .collect::<Vec<_>>()
                .join(" & ")
        })
        .collect();
    format!(r"\begin{{{env}}}{}\end{{{env}}}", rows.join(r" \\ "))
}

/// Equation array rows, one `m:e` per row.
fn render_rows(node: &MathNode, env: &str) -> String {
    let rows: Vec<String> = node.children_tagged(MathTag::Base).map(render_children).collect();
    format!(r"\begin{{{env}}}{}\end{{{env}}}", rows.join(r" \\ "))
}

fn render_accent(node: &MathNode) -> Result<String, MathError> {
    let base = arg(node, MathTag::Base)?;
    let chr = node
        .property("chr")
        .and_then(|c| c.chars().next())
        .unwrap_or('\u{0302}');
    Ok(match symbols::accent(chr) {
        Some(accent) => format!("{accent}{{{base}}}"),
        None => format!(
            r"\overset{{{}}}{{{base}}}",
            symbols::escape_text(&chr.to_string())
        ),
    })
}

fn render_group_char(node: &MathNode) -> Result<String, MathError> {
    let base = arg(node, MathTag::Base)?;
    let chr = node
        .property("chr")
        .and_then(|c| c.chars().next())
        .unwrap_or('⏟');
    let top = node.property("pos") == Some("top");
    if symbols::is_brace(chr) {
        return Ok(match chr {
            '⏞' | '︷' => format!(r"\overbrace{{{base}}}"),
            _ => format!(r"\underbrace{{{base}}}"),
        });
    }
    let glyph = symbols::escape_text(&chr.to_string());
    Ok(if top {
        format!(r"\overset{{{glyph}}}{{{base}}}")
    } else {
        format!(r"\underset{{{glyph}}}{{{base}}}")
    })
}
