//! SymbolExtractor: best-effort function/class/etc. extraction.
//!
//! TypeScript/TSX/JavaScript/JSX go through a `tree-sitter` AST walk;
//! Python uses a line-oriented regex scan with indentation-based end-line
//! detection. Any other extension yields an empty symbol list — this is
//! best-effort enrichment, not a requirement.

use crate::hashing::sha256_joined_fields;
use crate::model::{Symbol, SymbolKind};
use std::sync::OnceLock;
use tree_sitter::{Node, Parser, Tree};

pub struct SymbolExtractor;

impl SymbolExtractor {
    pub fn extract(rel_path: &str, content: &str) -> Vec<Symbol> {
        match extension_of(rel_path).as_deref() {
            Some("ts") | Some("tsx") => extract_ts(rel_path, content, true),
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => extract_ts(rel_path, content, false),
            Some("py") => extract_python(rel_path, content),
            _ => Vec::new(),
        }
    }
}

fn extension_of(rel_path: &str) -> Option<String> {
    rel_path.rsplit('.').next().map(|s| s.to_lowercase())
}

fn make_symbol(rel_path: &str, name: &str, kind: SymbolKind, start_line: u32, end_line: u32, signature: Option<String>) -> Symbol {
    let symbol_id = sha256_joined_fields([
        rel_path,
        name,
        kind.as_str(),
        start_line.to_string().as_str(),
    ]);
    Symbol {
        symbol_id,
        name: name.to_string(),
        kind,
        file_path: rel_path.to_string(),
        start_line,
        end_line,
        signature,
    }
}

/// Walks the tree-sitter AST for function/class/interface/type-alias/enum
/// declarations, `const`/`let` variable declarations, and class
/// methods/properties. `tsx` selects the TSX grammar over plain TS.
fn extract_ts(rel_path: &str, content: &str, is_tsx_capable: bool) -> Vec<Symbol> {
    let tree = match parse_ts(content, is_tsx_capable && rel_path.ends_with(".tsx")) {
        Some(t) => t,
        None => return Vec::new(),
    };

    let mut symbols = Vec::new();
    walk_ts_node(tree.root_node(), content, rel_path, &mut symbols, false);
    symbols
}

fn parse_ts(content: &str, tsx: bool) -> Option<Tree> {
    let mut parser = Parser::new();
    let language = if tsx {
        tree_sitter_typescript::LANGUAGE_TSX
    } else {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT
    };
    parser.set_language(&language.into()).ok()?;
    parser.parse(content, None)
}

fn walk_ts_node(node: Node, source: &str, rel_path: &str, out: &mut Vec<Symbol>, inside_class: bool) {
    let kind = node.kind();

    match kind {
        "function_declaration" => {
            if let Some(sym) = declaration_symbol(node, source, rel_path, SymbolKind::Function) {
                out.push(sym);
            }
        }
        "class_declaration" => {
            if let Some(sym) = declaration_symbol(node, source, rel_path, SymbolKind::Class) {
                out.push(sym);
            }
        }
        "interface_declaration" => {
            if let Some(sym) = declaration_symbol(node, source, rel_path, SymbolKind::Interface) {
                out.push(sym);
            }
        }
        "type_alias_declaration" => {
            if let Some(sym) = declaration_symbol(node, source, rel_path, SymbolKind::TypeAlias) {
                out.push(sym);
            }
        }
        "enum_declaration" => {
            if let Some(sym) = declaration_symbol(node, source, rel_path, SymbolKind::Enum) {
                out.push(sym);
            }
        }
        "method_definition" => {
            if inside_class {
                if let Some(sym) = declaration_symbol(node, source, rel_path, SymbolKind::Method) {
                    out.push(sym);
                }
            }
        }
        "public_field_definition" | "field_definition" => {
            if inside_class {
                if let Some(sym) = declaration_symbol(node, source, rel_path, SymbolKind::Property) {
                    out.push(sym);
                }
            }
        }
        "variable_declaration" | "lexical_declaration" => {
            extract_variable_declarators(node, source, rel_path, out);
        }
        _ => {}
    }

    let now_inside_class = inside_class || kind == "class_declaration" || kind == "class_body";
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_ts_node(child, source, rel_path, out, now_inside_class);
    }
}

fn declaration_symbol(node: Node, source: &str, rel_path: &str, kind: SymbolKind) -> Option<Symbol> {
    let name_node = node.child_by_field_name("name")?;
    let name = name_node.utf8_text(source.as_bytes()).ok()?.to_string();
    let start_line = node.start_position().row as u32 + 1;
    let end_line = node.end_position().row as u32 + 1;
    let signature = single_line_signature(node, source);
    Some(make_symbol(rel_path, &name, kind, start_line, end_line, Some(signature)))
}

/// `const x = ...` / `let y = ...`; each declarator becomes its own
/// symbol. Declarations marked `const` are classified `Constant`, others
/// `Variable`.
fn extract_variable_declarators(node: Node, source: &str, rel_path: &str, out: &mut Vec<Symbol>) {
    let is_const = node
        .child(0)
        .map(|c| c.kind() == "const")
        .unwrap_or(false);
    let kind = if is_const { SymbolKind::Constant } else { SymbolKind::Variable };

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = child.child_by_field_name("name") else { continue };
        let Ok(name) = name_node.utf8_text(source.as_bytes()) else { continue };
        let start_line = node.start_position().row as u32 + 1;
        let end_line = node.end_position().row as u32 + 1;
        let signature = single_line_signature(node, source);
        out.push(make_symbol(rel_path, name, kind, start_line, end_line, Some(signature)));
    }
}

/// First source line of the node, whitespace-collapsed, as a compact
/// signature preview.
fn single_line_signature(node: Node, source: &str) -> String {
    let text = node.utf8_text(source.as_bytes()).unwrap_or_default();
    let first_line = text.lines().next().unwrap_or_default();
    first_line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn python_def_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^(\s*)(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap())
}

fn python_class_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^(\s*)class\s+([A-Za-z_][A-Za-z0-9_]*)\s*[:\(]").unwrap())
}

/// Regex-scans `def NAME(` and `class NAME[:(]` at any indentation. The
/// end line is the last line before indentation returns to the
/// declaration's own level or shallower (or EOF).
fn extract_python(rel_path: &str, content: &str) -> Vec<Symbol> {
    let lines: Vec<&str> = content.lines().collect();
    let mut symbols = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let (indent, name, kind) = if let Some(caps) = python_def_re().captures(line) {
            (caps.get(1).unwrap().as_str().len(), caps.get(2).unwrap().as_str().to_string(), SymbolKind::Function)
        } else if let Some(caps) = python_class_re().captures(line) {
            (caps.get(1).unwrap().as_str().len(), caps.get(2).unwrap().as_str().to_string(), SymbolKind::Class)
        } else {
            continue;
        };

        let start_line = (i + 1) as u32;
        let mut end_line = start_line;
        for (j, later) in lines.iter().enumerate().skip(i + 1) {
            if later.trim().is_empty() {
                continue;
            }
            let later_indent = later.len() - later.trim_start().len();
            if later_indent <= indent {
                break;
            }
            end_line = (j + 1) as u32;
        }

        let signature = line.trim().trim_end_matches(':').to_string();
        symbols.push(make_symbol(rel_path, &name, kind, start_line, end_line, Some(signature)));
    }

    symbols
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ts_function_declaration() {
        let content = "export function add(a: number, b: number): number {\n  return a + b;\n}\n";
        let symbols = SymbolExtractor::extract("a.ts", content);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "add");
        assert_eq!(symbols[0].kind, SymbolKind::Function);
        assert_eq!(symbols[0].start_line, 1);
        assert_eq!(symbols[0].end_line, 3);
    }

    #[test]
    fn extracts_ts_class_with_methods() {
        let content = "class Foo {\n  bar() {\n    return 1;\n  }\n}\n";
        let symbols = SymbolExtractor::extract("a.ts", content);
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Foo"));
        assert!(names.contains(&"bar"));
        let bar = symbols.iter().find(|s| s.name == "bar").unwrap();
        assert_eq!(bar.kind, SymbolKind::Method);
    }

    #[test]
    fn distinguishes_const_and_let() {
        let content = "const x = 1;\nlet y = 2;\n";
        let symbols = SymbolExtractor::extract("a.ts", content);
        let x = symbols.iter().find(|s| s.name == "x").unwrap();
        let y = symbols.iter().find(|s| s.name == "y").unwrap();
        assert_eq!(x.kind, SymbolKind::Constant);
        assert_eq!(y.kind, SymbolKind::Variable);
    }

    #[test]
    fn extracts_tsx_interface_and_type_alias() {
        let content = "interface Props {\n  name: string;\n}\ntype ID = string;\n";
        let symbols = SymbolExtractor::extract("a.tsx", content);
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Props"));
        assert!(names.contains(&"ID"));
    }

    #[test]
    fn extracts_python_function_and_class() {
        let content = "def foo(x):\n    return x\n\nclass Bar:\n    def method(self):\n        pass\n";
        let symbols = SymbolExtractor::extract("a.py", content);
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"foo"));
        assert!(names.contains(&"Bar"));
        assert!(names.contains(&"method"));

        let foo = symbols.iter().find(|s| s.name == "foo").unwrap();
        assert_eq!(foo.start_line, 1);
        assert_eq!(foo.end_line, 2);

        let bar = symbols.iter().find(|s| s.name == "Bar").unwrap();
        assert_eq!(bar.start_line, 4);
        assert_eq!(bar.end_line, 6);
    }

    #[test]
    fn unsupported_extension_yields_no_symbols() {
        let symbols = SymbolExtractor::extract("a.rs", "fn main() {}\n");
        assert!(symbols.is_empty());
    }

    #[test]
    fn symbol_id_is_deterministic() {
        let s1 = SymbolExtractor::extract("a.ts", "function f() {}\n");
        let s2 = SymbolExtractor::extract("a.ts", "function f() {}\n");
        assert_eq!(s1[0].symbol_id, s2[0].symbol_id);
    }
}
