//! Variable references for HANA pipeline operations.
//!
//! An operation parameter is either a literal or a reference string that
//! reads from one of four namespaces:
//!
//! | Sigil | Namespace |
//! |---|---|
//! | `$` | project file registry |
//! | `!` | global settings |
//! | `#` | derived project attributes (case-folded) |
//! | `-` | run-time status |
//!
//! `[base]ref` strips the extension of a resolved path and `[+]a,b,...`
//! concatenates resolved parts. A bare sigil reads the parameter's own name.
//!
//! # Example
//! ```
//! use hana_vars::{parse_reference, Reference};
//!
//! let r = parse_reference("output", "[+][base]-group,.hmr_seq").unwrap();
//! assert!(matches!(r, Reference::Concat(_)));
//! ```

pub mod ast;
mod eval;
mod parser;

pub use ast::{Namespace, Reference};
pub use eval::{resolve, strip_extension, Environment};
pub use parser::parse_reference;
