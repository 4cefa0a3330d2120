//! Source formatter.
//!
//! Reparses C# text and reprints it in canonical layout: Allman braces, one
//! statement per line, fixed indentation and operator spacing. Literals,
//! comments and preprocessor lines are kept verbatim.
//!
//! Formatting has no error path. Malformed input is reprinted from whatever
//! the parser recovered, and if no parser is available the input comes back
//! unchanged.

mod config;
mod core;

pub use config::FormatterConfig;

use crate::frontend::csharp::parser::CSharpParser;

/// Formats `source` with the default configuration.
pub fn format(source: &str) -> String {
    format_with(source, &FormatterConfig::default())
}

/// Formats `source` with `config`.
pub fn format_with(source: &str, config: &FormatterConfig) -> String {
    let tree = match CSharpParser::new().and_then(|mut parser| parser.parse(source)) {
        Ok(tree) => tree,
        Err(e) => {
            log::warn!("formatter fell back to the original text: {}", e);
            return source.to_string();
        }
    };
    core::print(tree.root_node(), source, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_layout() {
        let formatted = format("class C{void M(){int x=1;if(x>0){x++;}else{x--;}}}");
        let expected = "\
class C
{
    void M()
    {
        int x = 1;
        if (x > 0)
        {
            x++;
        }
        else
        {
            x--;
        }
    }
}
";
        assert_eq!(formatted, expected);
    }

    #[test]
    fn test_expression_body_and_calls() {
        let formatted = format("public static class M{public static int Add(int a,int b)=>a+b;static void P(){System.Console.WriteLine(Add(1,-2));}}");
        assert!(formatted.contains("public static int Add(int a, int b) => a + b;\n"));
        assert!(formatted.contains("System.Console.WriteLine(Add(1, -2));\n"));
    }

    #[test]
    fn test_for_header_stays_on_one_line() {
        let formatted = format("class C{void M(){for(int i=0;i<10;i++){}}}");
        assert!(formatted.contains("for (int i = 0; i < 10; i++)\n"));
    }

    #[test]
    fn test_comments_and_literals_are_verbatim() {
        let source = "class C\n{\n    // keep   me\n    string s = \"a  +  b\"; // trailing\n}\n";
        let formatted = format(source);
        assert!(formatted.contains("    // keep   me\n"));
        assert!(formatted.contains("string s = \"a  +  b\"; // trailing\n"));
    }

    #[test]
    fn test_idempotent() {
        let sources = [
            "using System;namespace N{class C{int f=1;int G(int a){return a*2+f;}}}",
            "class C { void M() { var s = \"x\" + 1; while (true) { break; } } }",
            "int x = 3; System.Console.WriteLine(x > 2 ? \"big\" : \"small\");",
        ];
        for source in sources {
            let once = format(source);
            assert_ne!(once, source, "layout unchanged for {:?}", source);
            assert_eq!(format(&once), once, "not idempotent for {:?}", source);
        }
    }

    #[test]
    fn test_switch_sections_are_indented() {
        let formatted = format("class C{void M(int x){switch(x){case 1:y();break;default:z();break;}}}");
        let expected = "\
class C
{
    void M(int x)
    {
        switch (x)
        {
            case 1:
                y();
                break;
            default:
                z();
                break;
        }
    }
}
";
        assert_eq!(formatted, expected);
        assert_eq!(format(&formatted), formatted);
    }

    #[test]
    fn test_block_comment_after_open_brace_leads_statement() {
        let formatted = format("class C{void M(){ /* c */ x(); }}");
        assert!(formatted.contains("    {\n        /* c */ x();\n    }\n"), "{}", formatted);
        assert_eq!(format(&formatted), formatted);
    }

    #[test]
    fn test_tolerates_malformed_input() {
        let formatted = format("class C { void M() { int x = 1 ");
        assert!(formatted.starts_with("class C\n{"));
        assert!(!format("}}} ((( class").is_empty());
        assert_eq!(format(""), "");
    }

    #[test]
    fn test_tab_indentation() {
        let config = FormatterConfig::default().with_tabs(true);
        assert_eq!(format_with("class C{int f;}", &config), "class C\n{\n\tint f;\n}\n");
    }
}
