//! Office Math (OMML) support for the DOCX converter.
//!
//! ```text
//! word/document.xml ──▶ substitute ──▶ omml::parse ──▶ latex::transform
//!                           │                                   │
//!                           └────── <w:r><w:t>$…$</w:t></w:r> ◀──┘
//! ```
//!
//! The transducer is pure: the same tree always yields the same string.

pub mod latex;
pub mod omml;
pub mod substitute;
pub mod symbols;

pub use latex::{omml_to_latex, transform};
pub use omml::{parse_omml, MathNode, MathTag};
pub use substitute::{substitute_math, Substituted};
