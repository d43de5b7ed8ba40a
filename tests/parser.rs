#[cfg(test)]
mod parser_tests {
    use rox_interpreter as lox;

    use lox::ast::{Expr, LiteralValue, Stmt};
    use lox::ast_printer::AstPrinter;
    use lox::error::LoxError;
    use lox::parser::Parser;
    use lox::scanner::Scanner;

    fn parse(source: &str) -> Result<Vec<Stmt>, Vec<LoxError>> {
        let (tokens, errors) = Scanner::new(source).scan_tokens();
        assert!(errors.is_empty(), "unexpected lex errors: {:?}", errors);
        Parser::new(tokens).parse()
    }

    fn print_expr(source: &str) -> String {
        let (tokens, _) = Scanner::new(source).scan_tokens();
        let expr: Expr = Parser::new(tokens)
            .parse_expression()
            .expect("expression should parse");
        AstPrinter::print(&expr)
    }

    #[test]
    fn test_precedence_in_prefix_form() {
        assert_eq!(print_expr("1 + 2 * 3"), "(+ 1.0 (* 2.0 3.0))");
        assert_eq!(print_expr("-(4 - 1.5) >= 2"), "(>= (- (group (- 4.0 1.5))) 2.0)");
        assert_eq!(print_expr("a or b and !c"), "(or a (and b (! c)))");
        assert_eq!(print_expr("x = y = \"s\""), "(= x (= y s))");
    }

    #[test]
    fn test_calls_and_properties() {
        assert_eq!(print_expr("f(1)(2, g)"), "(call (call f 1.0) 2.0 g)");
        assert_eq!(print_expr("a.b.c = nil"), "(= (. (. a b) c) nil)");
        assert_eq!(print_expr("super.m(this)"), "(call (super m) this)");
    }

    #[test]
    fn test_expression_must_span_input() {
        let (tokens, _) = Scanner::new("1 2").scan_tokens();
        let errors: Vec<LoxError> = Parser::new(tokens).parse_expression().unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "[line 1] Error at '2': Expect end of expression."
        );
    }

    #[test]
    fn test_expression_rejects_invalid_assignment_target() {
        let (tokens, _) = Scanner::new("1 = 2").scan_tokens();
        let errors: Vec<LoxError> = Parser::new(tokens).parse_expression().unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "[line 1] Error at '=': Invalid assignment target."
        );
    }

    #[test]
    fn test_expression_collects_recoverable_and_fatal_errors() {
        let args: Vec<String> = (0..256).map(|i| i.to_string()).collect();
        let source: String = format!("f({}) 1", args.join(", "));
        let (tokens, _) = Scanner::new(&source).scan_tokens();

        let errors: Vec<LoxError> = Parser::new(tokens).parse_expression().unwrap_err();
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();

        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Can't have more than 255 arguments."));
        assert_eq!(messages[1], "[line 1] Error at '1': Expect end of expression.");
    }

    #[test]
    fn test_identical_references_get_distinct_ids() {
        let (tokens, _) = Scanner::new("a + a").scan_tokens();
        let expr: Expr = Parser::new(tokens).parse_expression().unwrap();

        let Expr::Binary { left, right, .. } = &expr else {
            panic!("expected binary, got {:?}", expr);
        };
        let (Expr::Variable(first), Expr::Variable(second)) = (&**left, &**right) else {
            panic!("expected two variable reads");
        };

        assert_eq!(first.name.lexeme, second.name.lexeme);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_for_desugars_to_block_and_while() {
        let statements: Vec<Stmt> = parse("for (var i = 0; i < 3; i = i + 1) print i;").unwrap();

        assert_eq!(statements.len(), 1);
        let Stmt::Block(outer) = &statements[0] else {
            panic!("expected block, got {:?}", statements[0]);
        };
        assert_eq!(outer.len(), 2);
        assert!(matches!(outer[0], Stmt::Var { .. }));

        let Stmt::While { body, .. } = &outer[1] else {
            panic!("expected while, got {:?}", outer[1]);
        };
        let Stmt::Block(inner) = &**body else {
            panic!("expected increment block, got {:?}", body);
        };
        assert!(matches!(inner[0], Stmt::Print(_)));
        assert!(matches!(inner[1], Stmt::Expression(Expr::Assign { .. })));
    }

    #[test]
    fn test_empty_for_clauses_loop_forever() {
        let statements: Vec<Stmt> = parse("for (;;) {}").unwrap();

        assert!(matches!(
            &statements[0],
            Stmt::While {
                condition: Expr::Literal(LiteralValue::True),
                ..
            }
        ));
    }

    #[test]
    fn test_class_with_superclass_and_methods() {
        let statements: Vec<Stmt> =
            parse("class B < A { init(x) { this.x = x; } get() { return this.x; } }").unwrap();

        let Stmt::Class {
            name,
            superclass,
            methods,
        } = &statements[0]
        else {
            panic!("expected class, got {:?}", statements[0]);
        };

        assert_eq!(name.lexeme, "B");
        assert_eq!(superclass.as_ref().map(|s| s.name.lexeme.as_str()), Some("A"));
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].name.lexeme, "init");
        assert_eq!(methods[0].params.len(), 1);
        assert_eq!(methods[1].name.lexeme, "get");
    }

    #[test]
    fn test_errors_are_collected_after_synchronizing() {
        let errors: Vec<LoxError> = parse("var = 1;\nprint 2;\nfun (a) {}\nprint 3").unwrap_err();

        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            messages,
            vec![
                "[line 1] Error at '=': Expect variable name.",
                "[line 3] Error at '(': Expect function name.",
                "[line 4] Error at end: Expect ';' after value.",
            ]
        );
    }

    #[test]
    fn test_invalid_assignment_target_is_reported() {
        let errors: Vec<LoxError> = parse("1 + 2 = 3;").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "[line 1] Error at '=': Invalid assignment target."
        );
    }

    #[test]
    fn test_too_many_arguments() {
        let args: Vec<String> = (0..256).map(|i| i.to_string()).collect();
        let source: String = format!("f({});", args.join(", "));

        let errors: Vec<LoxError> = parse(&source).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0]
            .to_string()
            .contains("Can't have more than 255 arguments."));
    }
}
