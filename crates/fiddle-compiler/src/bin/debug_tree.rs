//! Debug script to see what the parser produces.
//!
//! Usage: `debug_tree [FILE]` (reads a built-in snippet without a file).

use fiddle_compiler::frontend::csharp::parser::{lower, CSharpParser};
use fiddle_compiler::LanguageVersion;

fn main() {
    let source = match std::env::args().nth(1) {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                println!("Error: cannot read {}: {}", path, e);
                return;
            }
        },
        None => r#"
using System;

public static class M
{
    public static int Add(int a, int b) => a + b;
    public static void Main() { Console.WriteLine(Add(2, 3)) }
}
"#
        .to_string(),
    };

    let mut parser = match CSharpParser::new() {
        Ok(parser) => parser,
        Err(e) => {
            println!("Error: {:?}", e);
            return;
        }
    };
    let tree = match parser.parse(&source) {
        Ok(tree) => tree,
        Err(e) => {
            println!("Error: {:?}", e);
            return;
        }
    };

    println!("Tree:\n{}", tree.root_node().to_sexp());

    let (unit, diagnostics) = lower(&source, &tree, LanguageVersion::Preview);
    println!("\nUsings:");
    for using in &unit.usings {
        println!("  {:?}", using);
    }
    println!("\nClasses:");
    for class in &unit.classes {
        println!("  {:?}", class.name);
    }
    println!("\nTop-level statements: {}", unit.globals.len());
    println!("\nDiagnostics:");
    for diagnostic in diagnostics.into_sorted() {
        println!("  {}", diagnostic);
    }
}
