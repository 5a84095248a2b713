use winnow::combinator::{alt, preceded, separated};
use winnow::token::{one_of, rest, take_till};
use winnow::{ModalResult, Parser};

use crate::ast::Reference;
use hana_types::HanaError;

/// `$key`, `!key`, `#name` or `-key`. The key is the rest of the input.
fn namespaced(input: &mut &str) -> ModalResult<Reference> {
    let sigil = one_of(['$', '!', '#', '-']).parse_next(input)?;
    let key = rest.parse_next(input)?;
    Ok(match sigil {
        '$' => Reference::File(key.to_string()),
        '!' => Reference::Setting(key.to_string()),
        '#' => Reference::Attribute(key.to_lowercase()),
        _ => Reference::Status(key.to_string()),
    })
}

/// `[base]` followed by a nested reference.
fn base_of(input: &mut &str) -> ModalResult<Reference> {
    preceded("[base]", reference)
        .map(|inner| Reference::BaseOf(Box::new(inner)))
        .parse_next(input)
}

/// `[+]` followed by comma-separated nested references.
fn concat(input: &mut &str) -> ModalResult<Reference> {
    let _ = "[+]".parse_next(input)?;
    let tokens: Vec<&str> = separated(1.., take_till(0.., ','), ',').parse_next(input)?;
    let mut parts = Vec::with_capacity(tokens.len());
    for token in tokens {
        let mut operand = token.trim();
        parts.push(reference.parse_next(&mut operand)?);
    }
    Ok(Reference::Concat(parts))
}

fn literal(input: &mut &str) -> ModalResult<Reference> {
    rest.map(|text: &str| Reference::Literal(serde_json::Value::String(text.to_string())))
        .parse_next(input)
}

fn reference(input: &mut &str) -> ModalResult<Reference> {
    alt((namespaced, base_of, concat, literal)).parse_next(input)
}

/// Parse a reference string.
///
/// A bare sigil (`"$"`, `"!"`, ...) takes `context_name` as its key, which
/// is how a parameter like `contigs: "$"` reads the `contigs` file entry.
pub fn parse_reference(context_name: &str, input: &str) -> Result<Reference, HanaError> {
    reference
        .parse(input)
        .map(|parsed| parsed.in_context(context_name))
        .map_err(|e| HanaError::ReferenceSyntax {
            reference: input.to_string(),
            message: e.to_string(),
        })
}
