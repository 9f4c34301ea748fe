// src/core/structural.rs

use crate::core::commons::{dedup_first_seen, is_valid_function_name};
use crate::core::extractor::{NameSource, SourceError};
use crate::models::ExtractionStrategy;
use tree_sitter::{Node, Parser};

/// Typographic quotes PowerShell reads as string delimiters, with the ASCII
/// quote the grammar knows them as.
const QUOTE_VARIANTS: [(char, char); 7] = [
    ('\u{2018}', '\''),
    ('\u{2019}', '\''),
    ('\u{201A}', '\''),
    ('\u{201B}', '\''),
    ('\u{201C}', '"'),
    ('\u{201D}', '"'),
    ('\u{201E}', '"'),
];

/// Finds zero-argument functions in the syntax tree of the script.
///
/// A `function_statement` is collected when it:
/// - is introduced by `function` or `filter` (any case),
/// - has an empty or absent inline parameter list,
/// - does not open its body with a non-empty `param(...)` block,
/// - is not nested inside another function body (nested functions are not
///   visible after the script is dot-sourced).
///
/// A tree with syntax errors fails the whole parse, so the extractor can fall
/// back to the textual scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralSource;

impl NameSource for StructuralSource {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Structural
    }

    fn extract(&self, source: &str) -> Result<Vec<String>, SourceError> {
        let source = normalize_quotes(source);

        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_powershell::LANGUAGE.into())
            .map_err(|e| SourceError::Grammar(e.to_string()))?;
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| SourceError::Grammar("the parser returned no tree".to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error(root).map_or(1, |node| node.start_position().row + 1);
            return Err(SourceError::Syntax { line });
        }

        let mut names = Vec::new();
        collect_definitions(root, source.as_bytes(), &mut names);
        Ok(dedup_first_seen(names))
    }
}

fn normalize_quotes(source: &str) -> String {
    source
        .chars()
        .map(|c| {
            QUOTE_VARIANTS
                .iter()
                .find(|(variant, _)| *variant == c)
                .map_or(c, |(_, ascii)| *ascii)
        })
        .collect()
}

/// Depth-first search for the first `ERROR` or missing node.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

/// Walks the tree in source order. Function bodies are not descended into.
fn collect_definitions(node: Node<'_>, source: &[u8], names: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "function_statement" {
            if let Some(name) = zero_argument_name(child, source) {
                names.push(name);
            }
        } else {
            collect_definitions(child, source, names);
        }
    }
}

fn zero_argument_name(definition: Node<'_>, source: &[u8]) -> Option<String> {
    let text = |node: Node<'_>| node.utf8_text(source).unwrap_or("").to_string();

    let mut cursor = definition.walk();
    let children: Vec<Node<'_>> = definition.children(&mut cursor).collect();

    let keyword = children.first().map(|n| text(*n)).unwrap_or_default();
    let name = children
        .iter()
        .find(|n| n.kind() == "function_name")
        .map(|n| text(*n))?;

    if !(keyword.eq_ignore_ascii_case("function") || keyword.eq_ignore_ascii_case("filter")) {
        log::trace!("Skipping '{}': declared with '{}'", name, keyword);
        return None;
    }
    if children
        .iter()
        .any(|n| n.kind() == "function_parameter_declaration" && declares_parameters(*n))
    {
        log::trace!("Skipping '{}': it declares parameters", name);
        return None;
    }
    if children
        .iter()
        .filter(|n| n.kind() == "script_block")
        .any(|body| body_declares_parameters(*body))
    {
        log::trace!("Skipping '{}': its param block declares parameters", name);
        return None;
    }
    if !is_valid_function_name(&name) {
        log::debug!("Skipping '{}': not a plain function name", name);
        return None;
    }
    Some(name)
}

/// `param(...)` at the top of a body, after any attributes such as
/// `[CmdletBinding()]`.
fn body_declares_parameters(body: Node<'_>) -> bool {
    let mut cursor = body.walk();
    let declares = body
        .named_children(&mut cursor)
        .filter(|n| n.kind() == "param_block")
        .any(declares_parameters);
    declares
}

/// Whether a parameter declaration holds anything besides comments.
fn declares_parameters(declaration: Node<'_>) -> bool {
    let mut cursor = declaration.walk();
    let declares = declaration
        .named_children(&mut cursor)
        .any(|n| n.kind() == "parameter_list");
    declares
}
