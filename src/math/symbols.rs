//! Symbol tables for the OMML → LaTeX transducer.
//!
//! Everything here is a pure lookup. Control words returned by these tables
//! carry no trailing space; [`push_latex`] inserts one only where the next
//! piece would otherwise run into the control word (`\alpha` + `x`).

// ── Characters ───────────────────────────────────────────────────────────────

/// LaTeX for a single Unicode character that has no ASCII spelling.
pub fn unicode_to_latex(c: char) -> Option<&'static str> {
    let s = match c {
        // Greek, lower case
        'α' => r"\alpha",
        'β' => r"\beta",
        'γ' => r"\gamma",
        'δ' => r"\delta",
        'ε' => r"\epsilon",
        'ϵ' => r"\varepsilon",
        'ζ' => r"\zeta",
        'η' => r"\eta",
        'θ' => r"\theta",
        'ϑ' => r"\vartheta",
        'ι' => r"\iota",
        'κ' => r"\kappa",
        'ϰ' => r"\varkappa",
        'λ' => r"\lambda",
        'μ' => r"\mu",
        'ν' => r"\nu",
        'ξ' => r"\xi",
        'ο' => "o",
        'π' => r"\pi",
        'ϖ' => r"\varpi",
        'ρ' => r"\rho",
        'ϱ' => r"\varrho",
        'σ' => r"\sigma",
        'ς' => r"\varsigma",
        'τ' => r"\tau",
        'υ' => r"\upsilon",
        'φ' => r"\phi",
        'ϕ' => r"\varphi",
        'χ' => r"\chi",
        'ψ' => r"\psi",
        'ω' => r"\omega",
        // Greek, upper case (only those that differ from Latin)
        'Γ' => r"\Gamma",
        'Δ' => r"\Delta",
        'Θ' => r"\Theta",
        'Λ' => r"\Lambda",
        'Ξ' => r"\Xi",
        'Π' => r"\Pi",
        'Σ' => r"\Sigma",
        'Υ' => r"\Upsilon",
        'Φ' => r"\Phi",
        'Ψ' => r"\Psi",
        'Ω' => r"\Omega",
        // Operators and relations
        '±' => r"\pm",
        '∓' => r"\mp",
        '×' => r"\times",
        '÷' => r"\div",
        '·' | '⋅' => r"\cdot",
        '∘' => r"\circ",
        '∗' => r"\ast",
        '⊕' => r"\oplus",
        '⊗' => r"\otimes",
        '∧' => r"\wedge",
        '∨' => r"\vee",
        '∩' => r"\cap",
        '∪' => r"\cup",
        '∖' => r"\setminus",
        '≠' => r"\neq",
        '≤' => r"\leq",
        '≥' => r"\geq",
        '≦' => r"\leqq",
        '≧' => r"\geqq",
        '≪' => r"\ll",
        '≫' => r"\gg",
        '≈' => r"\approx",
        '≅' => r"\cong",
        '≡' => r"\equiv",
        '∼' => r"\sim",
        '≃' => r"\simeq",
        '∝' => r"\propto",
        '∈' => r"\in",
        '∉' => r"\notin",
        '∋' => r"\ni",
        '⊂' => r"\subset",
        '⊃' => r"\supset",
        '⊆' => r"\subseteq",
        '⊇' => r"\supseteq",
        '⊥' => r"\perp",
        '∥' => r"\parallel",
        '∣' => r"\mid",
        // Arrows
        '←' => r"\leftarrow",
        '→' => r"\rightarrow",
        '↑' => r"\uparrow",
        '↓' => r"\downarrow",
        '↔' => r"\leftrightarrow",
        '↕' => r"\updownarrow",
        '⇐' => r"\Leftarrow",
        '⇒' => r"\Rightarrow",
        '⇔' => r"\Leftrightarrow",
        '↦' => r"\mapsto",
        '↗' => r"\nearrow",
        '↘' => r"\searrow",
        '↙' => r"\swarrow",
        '↖' => r"\nwarrow",
        // Miscellaneous
        '∞' => r"\infty",
        '∂' => r"\partial",
        '∇' => r"\nabla",
        '∀' => r"\forall",
        '∃' => r"\exists",
        '∄' => r"\nexists",
        '∅' => r"\emptyset",
        '¬' => r"\neg",
        '∠' => r"\angle",
        'ℏ' => r"\hbar",
        'ℓ' => r"\ell",
        '℘' => r"\wp",
        'ℑ' => r"\Im",
        'ℜ' => r"\Re",
        'ℵ' => r"\aleph",
        '′' => "'",
        '″' => "''",
        '…' => r"\ldots",
        '⋯' => r"\cdots",
        '⋮' => r"\vdots",
        '⋱' => r"\ddots",
        '⟨' => r"\langle",
        '⟩' => r"\rangle",
        // Big operators appearing as plain run text
        '∑' => r"\sum",
        '∏' => r"\prod",
        '∐' => r"\coprod",
        '∫' => r"\int",
        '∮' => r"\oint",
        // Spacing
        '\u{2009}' => r"\,",
        '\u{205F}' => r"\:",
        '\u{2003}' => r"\quad",
        '\u{00A0}' => "~",
        '\u{200B}' | '\u{2061}' | '\u{2062}' | '\u{2063}' => "",
        'ℎ' => "h",
        _ => return None,
    };
    Some(s)
}

/// Mathematical italic and bold letters (U+1D400 block) that Word emits for
/// styled variables, folded back to ASCII with an optional style macro.
fn math_alphanumeric(c: char) -> Option<(Option<&'static str>, char)> {
    let cp = c as u32;
    let fold = |base: u32| {
        let i = cp - base;
        let ch = if i < 26 { b'A' + i as u8 } else { b'a' + (i - 26) as u8 };
        ch as char
    };
    match cp {
        0x1D400..=0x1D433 => Some((Some(r"\mathbf"), fold(0x1D400))),
        0x1D434..=0x1D467 => Some((None, fold(0x1D434))),
        0x1D468..=0x1D49B => Some((Some(r"\boldsymbol"), fold(0x1D468))),
        _ => None,
    }
}

// ── Escaping ─────────────────────────────────────────────────────────────────

/// Render run text: escape LaTeX specials and map known symbols.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let piece: String = match c {
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => format!("\\{c}"),
            '\\' => r"\backslash".to_string(),
            '~' => r"\sim".to_string(),
            '^' => r"\hat{}".to_string(),
            _ => {
                if let Some(latex) = unicode_to_latex(c) {
                    latex.to_string()
                } else if let Some((style, ch)) = math_alphanumeric(c) {
                    match style {
                        Some(macro_name) => format!("{macro_name}{{{ch}}}"),
                        None => ch.to_string(),
                    }
                } else {
                    c.to_string()
                }
            }
        };
        push_latex(&mut out, &piece);
    }
    out
}

/// Append `piece`, separating it from a trailing control word when needed.
pub fn push_latex(out: &mut String, piece: &str) {
    if piece.is_empty() {
        return;
    }
    let starts_with_letter = piece.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    if starts_with_letter && ends_with_control_word(out) {
        out.push(' ');
    }
    out.push_str(piece);
}

/// True when `s` ends in `\name` (letters only), e.g. `a+\alpha`.
pub fn ends_with_control_word(s: &str) -> bool {
    let trimmed = s.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    if trimmed.len() == s.len() {
        return false;
    }
    // `\\alpha` is a line break followed by text, not a control word
    let backslashes = trimmed.len() - trimmed.trim_end_matches('\\').len();
    backslashes % 2 == 1
}

// ── Functions ────────────────────────────────────────────────────────────────

/// Built-in LaTeX operator for a function name (`sin` → `\sin`).
pub fn function_name(name: &str) -> Option<&'static str> {
    let s = match name {
        "sin" => r"\sin",
        "cos" => r"\cos",
        "tan" => r"\tan",
        "cot" => r"\cot",
        "sec" => r"\sec",
        "csc" => r"\csc",
        "arcsin" => r"\arcsin",
        "arccos" => r"\arccos",
        "arctan" => r"\arctan",
        "sinh" => r"\sinh",
        "cosh" => r"\cosh",
        "tanh" => r"\tanh",
        "coth" => r"\coth",
        "exp" => r"\exp",
        "ln" => r"\ln",
        "log" => r"\log",
        "lg" => r"\lg",
        "det" => r"\det",
        "dim" => r"\dim",
        "lim" => r"\lim",
        "liminf" => r"\liminf",
        "limsup" => r"\limsup",
        "min" => r"\min",
        "max" => r"\max",
        "sup" => r"\sup",
        "inf" => r"\inf",
        "gcd" => r"\gcd",
        "Pr" => r"\Pr",
        "arg" => r"\arg",
        "deg" => r"\deg",
        "hom" => r"\hom",
        "ker" => r"\ker",
        _ => return None,
    };
    Some(s)
}

/// Functions whose limits are typeset under the name (`\lim_{n\to\infty}`).
pub fn takes_limits(name: &str) -> bool {
    matches!(
        name,
        "lim" | "liminf" | "limsup" | "min" | "max" | "sup" | "inf" | "det" | "gcd" | "Pr"
    )
}

// ── Structural glyphs ────────────────────────────────────────────────────────

/// Accent macro for the `m:chr` of an `m:acc`. Both combining and spacing
/// forms are accepted.
pub fn accent(c: char) -> Option<&'static str> {
    let s = match c {
        '\u{0300}' | '`' => r"\grave",
        '\u{0301}' | '´' => r"\acute",
        '\u{0302}' | '^' | 'ˆ' => r"\hat",
        '\u{0303}' | '~' | '˜' => r"\tilde",
        '\u{0304}' | '\u{0305}' | '¯' => r"\bar",
        '\u{0306}' | '˘' => r"\breve",
        '\u{0307}' | '˙' => r"\dot",
        '\u{0308}' | '¨' => r"\ddot",
        '\u{030C}' | 'ˇ' => r"\check",
        '\u{20D7}' | '→' => r"\vec",
        '\u{20D6}' | '←' => r"\overleftarrow",
        '\u{20E1}' | '↔' => r"\overleftrightarrow",
        '\u{20DB}' => r"\dddot",
        _ => return None,
    };
    Some(s)
}

/// Delimiter for `\left`/`\right`. An empty character means "no delimiter".
pub fn delimiter(chr: &str) -> String {
    match chr {
        "" => ".".to_string(),
        "{" => r"\{".to_string(),
        "}" => r"\}".to_string(),
        "⟨" | "〈" => r"\langle".to_string(),
        "⟩" | "〉" => r"\rangle".to_string(),
        "⌊" => r"\lfloor".to_string(),
        "⌋" => r"\rfloor".to_string(),
        "⌈" => r"\lceil".to_string(),
        "⌉" => r"\rceil".to_string(),
        "‖" => r"\|".to_string(),
        "⟦" => r"[\![".to_string(),
        "⟧" => r"]\!]".to_string(),
        other => escape_text(other),
    }
}

/// Matrix environment for a delimiter pair wrapping a single matrix.
pub fn matrix_environment(beg: &str, end: &str) -> Option<&'static str> {
    let env = match (beg, end) {
        ("(", ")") => "pmatrix",
        ("[", "]") => "bmatrix",
        ("{", "}") => "Bmatrix",
        ("|", "|") => "vmatrix",
        ("‖", "‖") => "Vmatrix",
        _ => return None,
    };
    Some(env)
}

/// Glyph used when an `m:nary` has no `m:chr` (ECMA-376 default).
pub const DEFAULT_NARY_CHR: char = '∫';

/// Big-operator macro for an n-ary glyph.
pub fn nary_operator(c: char) -> Option<&'static str> {
    let s = match c {
        '∑' => r"\sum",
        '∏' => r"\prod",
        '∐' => r"\coprod",
        '∫' => r"\int",
        '∬' => r"\iint",
        '∭' => r"\iiint",
        '∮' => r"\oint",
        '∯' => r"\oiint",
        '∰' => r"\oiiint",
        '⋀' => r"\bigwedge",
        '⋁' => r"\bigvee",
        '⋂' => r"\bigcap",
        '⋃' => r"\bigcup",
        '⨀' => r"\bigodot",
        '⨁' => r"\bigoplus",
        '⨂' => r"\bigotimes",
        '⨄' => r"\biguplus",
        '⨆' => r"\bigsqcup",
        _ => return None,
    };
    Some(s)
}

/// Horizontal braces accepted by `m:groupChr`.
pub fn is_brace(c: char) -> bool {
    matches!(c, '⏞' | '⏟' | '︷' | '︸')
}

/// Macro for an `m:scr` math font value.
pub fn script_style(scr: &str) -> Option<&'static str> {
    let s = match scr {
        "script" => r"\mathscr",
        "fraktur" => r"\mathfrak",
        "double-struck" => r"\mathbb",
        "sans-serif" => r"\mathsf",
        "monospace" => r"\mathtt",
        _ => return None,
    };
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_specials_and_maps_symbols() {
        assert_eq!(escape_text("a_b"), r"a\_b");
        assert_eq!(escape_text("50%"), r"50\%");
        assert_eq!(escape_text("{x}"), r"\{x\}");
        assert_eq!(escape_text("x≤y"), r"x\leq y");
        assert_eq!(escape_text("2π"), r"2\pi");
        assert_eq!(escape_text("αβ"), r"\alpha\beta");
    }

    #[test]
    fn control_word_boundaries() {
        assert!(ends_with_control_word(r"a+\alpha"));
        assert!(!ends_with_control_word(r"a+\alpha{}"));
        assert!(!ends_with_control_word(r"x\\abc"));
        assert!(!ends_with_control_word("abc"));

        let mut s = String::from(r"\pi");
        push_latex(&mut s, "r");
        push_latex(&mut s, "^{2}");
        assert_eq!(s, r"\pi r^{2}");
    }

    #[test]
    fn math_italic_letters_fold_to_ascii() {
        assert_eq!(escape_text("\u{1D465}"), "x");
        assert_eq!(escape_text("\u{1D434}"), "A");
        assert_eq!(escape_text("ℎ"), "h");
        assert_eq!(escape_text("\u{1D41A}"), r"\mathbf{a}");
    }

    #[test]
    fn glyph_tables() {
        assert_eq!(nary_operator('∑'), Some(r"\sum"));
        assert_eq!(nary_operator('x'), None);
        assert_eq!(accent('\u{0302}'), Some(r"\hat"));
        assert_eq!(accent('→'), Some(r"\vec"));
        assert_eq!(delimiter(""), ".");
        assert_eq!(delimiter("{"), r"\{");
        assert_eq!(matrix_environment("[", "]"), Some("bmatrix"));
        assert_eq!(function_name("sin"), Some(r"\sin"));
        assert!(takes_limits("lim"));
        assert!(!takes_limits("sin"));
    }
}
