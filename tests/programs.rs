#[cfg(test)]
mod program_tests {
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;

    use rox_interpreter as lox;

    use lox::error::{LoxError, ResolveError, RuntimeError};
    use lox::value::Value;
    use lox::Lox;

    /// In-memory `print` sink that stays readable after the session takes it.
    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn session() -> (Lox, Capture) {
        let capture = Capture::default();
        (Lox::with_output(capture.clone()), capture)
    }

    fn run(source: &str) -> (String, Result<(), Vec<LoxError>>) {
        let (mut lox, capture) = session();
        let result = lox.run(source);
        (capture.text(), result)
    }

    fn run_ok(source: &str) -> String {
        let (out, result) = run(source);
        if let Err(errors) = result {
            panic!("program failed: {:?}\noutput so far:\n{}", errors, out);
        }
        out
    }

    fn runtime_error(source: &str) -> (String, RuntimeError) {
        let (out, result) = run(source);
        let mut errors: Vec<LoxError> = result.expect_err("program should fail at runtime");
        assert_eq!(errors.len(), 1, "exactly one runtime error per run");

        match errors.remove(0) {
            LoxError::Runtime(e) => (out, e),
            other => panic!("expected runtime error, got {:?}", other),
        }
    }

    fn static_errors(source: &str) -> Vec<ResolveError> {
        let (out, result) = run(source);
        assert_eq!(out, "", "nothing may run when resolution fails");

        result
            .expect_err("program should be rejected")
            .into_iter()
            .map(|e| match e {
                LoxError::Resolve(e) => e,
                other => panic!("expected resolve error, got {:?}", other),
            })
            .collect()
    }

    // ── closures and scope ────────────────────────────────────────────

    #[test]
    fn closures_keep_independent_state() {
        let out = run_ok(
            r#"
            fun makeCounter() {
              var i = 0;
              fun count() {
                i = i + 1;
                return i;
              }
              return count;
            }

            var c1 = makeCounter();
            var c2 = makeCounter();
            print c1();
            print c1();
            print c2();
            print c1();
            "#,
        );

        assert_eq!(out, "1\n2\n1\n3\n");
    }

    #[test]
    fn closures_bind_lexically_not_dynamically() {
        let out = run_ok(
            r#"
            var a = "global";
            {
              fun showA() {
                print a;
              }

              showA();
              var a = "block";
              showA();
              print a;
            }
            "#,
        );

        assert_eq!(out, "global\nglobal\nblock\n");
    }

    #[test]
    fn top_level_functions_may_reference_later_globals() {
        let out = run_ok(
            r#"
            fun isEven(n) { if (n == 0) return true; return isOdd(n - 1); }
            fun isOdd(n) { if (n == 0) return false; return isEven(n - 1); }
            fun fib(n) { if (n < 2) return n; return fib(n - 2) + fib(n - 1); }
            print isEven(10);
            print fib(15);
            "#,
        );

        assert_eq!(out, "true\n610\n");
    }

    #[test]
    fn for_loop_variable_is_scoped_to_the_loop() {
        let out = run_ok(
            r#"
            var i = "outer";
            for (var i = 0; i < 3; i = i + 1) print i;
            print i;
            "#,
        );

        assert_eq!(out, "0\n1\n2\nouter\n");
    }

    // ── classes ───────────────────────────────────────────────────────

    #[test]
    fn super_dispatch_acts_on_the_subclass_instance() {
        let out = run_ok(
            r#"
            class A {
              fill() { this.v = "from A"; }
              say() { return "A"; }
            }

            class B < A {
              fill() {
                super.fill();
                this.w = "from B";
              }
              say() { return "B+" + super.say(); }
            }

            var b = B();
            b.fill();
            print b.v;
            print b.w;
            print b.say();
            "#,
        );

        assert_eq!(out, "from A\nfrom B\nB+A\n");
    }

    #[test]
    fn super_resolves_from_the_defining_class() {
        let out = run_ok(
            r#"
            class A { method() { print "A method"; } }
            class B < A {
              method() { print "B method"; }
              test() { super.method(); }
            }
            class C < B {}
            C().test();
            "#,
        );

        assert_eq!(out, "A method\n");
    }

    #[test]
    fn inherited_methods_and_initializers() {
        let out = run_ok(
            r#"
            class Base { init(n) { this.n = n; } get() { return this.n; } }
            class Derived < Base {}
            print Derived(7).get();
            "#,
        );

        assert_eq!(out, "7\n");
    }

    #[test]
    fn initializer_always_yields_the_instance() {
        let out = run_ok(
            r#"
            class R {
              init(flag) {
                this.flag = flag;
                if (flag) return;
                this.after = true;
              }
            }

            var r = R(true);
            print r.flag;
            print r.init(false) == r;
            print r.flag;
            print r.after;
            "#,
        );

        assert_eq!(out, "true\ntrue\nfalse\ntrue\n");
    }

    #[test]
    fn bound_methods_remember_their_instance() {
        let out = run_ok(
            r#"
            class Person {
              init(name) { this.name = name; }
              greet() { return "hi " + this.name; }
            }

            var greet = Person("ann").greet;
            print greet();
            "#,
        );

        assert_eq!(out, "hi ann\n");
    }

    #[test]
    fn fields_shadow_methods() {
        let out = run_ok(
            r#"
            class C { m() { return "method"; } }
            var c = C();
            print c.m();
            c.m = "field";
            print c.m;
            "#,
        );

        assert_eq!(out, "method\nfield\n");
    }

    #[test]
    fn display_of_callables_and_instances() {
        let out = run_ok(
            r#"
            class Foo { bar() {} }
            fun baz() {}
            print Foo;
            print Foo();
            print Foo().bar;
            print baz;
            print clock;
            "#,
        );

        assert_eq!(out, "Foo\nFoo instance\n<fn bar>\n<fn baz>\n<native fn>\n");
    }

    // ── values ────────────────────────────────────────────────────────

    #[test]
    fn truthiness_and_equality_boundaries() {
        let out = run_ok(
            r#"
            class P {}
            if (0) print "zero truthy";
            if ("") print "empty truthy";
            if (P()) print "instance truthy";
            if (nil) print "bad"; else print "nil falsey";
            if (false) print "bad"; else print "false falsey";
            print nil == nil;
            print nil == false;
            print "a" + "b" == "ab";
            var p1 = P();
            var p2 = P();
            p1.x = 1;
            p2.x = 1;
            print p1 == p2;
            print p1 == p1;
            print !nil;
            "#,
        );

        assert_eq!(
            out,
            "zero truthy\nempty truthy\ninstance truthy\nnil falsey\nfalse falsey\n\
             true\nfalse\ntrue\nfalse\ntrue\ntrue\n"
        );
    }

    #[test]
    fn number_display() {
        let out = run_ok("print 3.0; print 2.5; print 10 / 4; print -0.5; print 1 / 3;");
        assert_eq!(out, "3\n2.5\n2.5\n-0.5\n0.3333333333333333\n");
    }

    // ── static errors ────────────────────────────────────────────────

    #[test]
    fn self_reference_in_initializer_is_rejected_everywhere() {
        for source in [
            "var a = a;",
            "var a = 1; var a = a;",
            "{ var a = 1; { var a = a; } }",
            "fun f() { var a = a; }",
        ] {
            let errors = static_errors(source);
            assert!(
                matches!(errors[..], [ResolveError::SelfReferencingInitializer { .. }]),
                "{}: {:?}",
                source,
                errors
            );
        }
    }

    #[test]
    fn every_static_error_is_reported() {
        let errors = static_errors(
            "print 1;\nreturn 1;\nprint this;\nclass A < A {}\nclass B { init() { return 2; } }\nfun f() { super.x(); }",
        );

        let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "[line 2] Error at 'return': Can't return from top-level code.",
                "[line 3] Error at 'this': Can't use 'this' outside of a class.",
                "[line 4] Error at 'A': A class can't inherit from itself.",
                "[line 5] Error at 'return': Can't return a value from an initializer.",
                "[line 6] Error at 'super': Can't use 'super' outside of a class.",
            ]
        );
    }

    #[test]
    fn duplicate_locals_are_rejected_but_globals_may_be_redeclared() {
        let errors = static_errors("fun f(a, a) {}");
        assert!(matches!(errors[..], [ResolveError::DuplicateDeclaration { .. }]));

        assert_eq!(run_ok("var g = 1; var g = 2; print g;"), "2\n");
    }

    // ── runtime errors ───────────────────────────────────────────────

    #[test]
    fn arity_mismatch_reports_expected_and_actual() {
        let (_, e) = runtime_error("fun f(a, b) {}\nf(1);");
        assert_eq!(e.to_string(), "Expected 2 arguments but got 1.\n[line 2]");

        let (_, e) = runtime_error("class P { init(x) {} }\nP();");
        assert!(matches!(e, RuntimeError::ArityMismatch { expected: 1, got: 0, line: 2 }));

        let (_, e) = runtime_error("class Q {}\nQ(1, 2);");
        assert!(matches!(e, RuntimeError::ArityMismatch { expected: 0, got: 2, .. }));

        let (_, e) = runtime_error("class A { m(x) {} }\nA().m();");
        assert!(matches!(e, RuntimeError::ArityMismatch { expected: 1, got: 0, line: 2 }));

        let (_, e) = runtime_error("class A { init(a, b) {} }\nclass B < A {}\nB(1);");
        assert!(matches!(e, RuntimeError::ArityMismatch { expected: 2, got: 1, line: 3 }));
        assert_eq!(e.to_string(), "Expected 2 arguments but got 1.\n[line 3]");
    }

    #[test]
    fn arguments_are_evaluated_before_arity_is_checked() {
        let (out, e) = runtime_error(
            r#"
            fun one(a) {}
            fun noisy() { print "evaluated"; return 1; }
            one(noisy(), noisy());
            "#,
        );

        assert_eq!(out, "evaluated\nevaluated\n");
        assert!(matches!(e, RuntimeError::ArityMismatch { expected: 1, got: 2, .. }));
    }

    #[test]
    fn output_before_a_runtime_error_is_kept() {
        let (out, e) = runtime_error("print \"before\";\nprint missing;\nprint \"after\";");

        assert_eq!(out, "before\n");
        assert_eq!(e.to_string(), "Undefined variable 'missing'.\n[line 2]");
    }

    #[test]
    fn runtime_error_kinds() {
        let (_, e) = runtime_error("class E {}\nprint E().nope;");
        assert_eq!(e.to_string(), "Undefined property 'nope'.\n[line 2]");

        let (_, e) = runtime_error("\"str\"();");
        assert!(matches!(e, RuntimeError::NotCallable { line: 1 }));

        let (_, e) = runtime_error("var n = 1; print n.x;");
        assert_eq!(e.to_string(), "Only instances have properties.\n[line 1]");

        let (_, e) = runtime_error("var n = 1; n.x = 2;");
        assert_eq!(e.to_string(), "Only instances have fields.\n[line 1]");

        let (_, e) = runtime_error("var NotAClass = 1;\nclass B < NotAClass {}");
        assert_eq!(e.to_string(), "Superclass must be a class.\n[line 2]");

        let (_, e) = runtime_error("class A {}\nclass B < A { m() { super.gone(); } }\nB().m();");
        assert!(matches!(e, RuntimeError::UndefinedProperty { line: 2, .. }));

        let (_, e) = runtime_error("undeclared = 1;");
        assert!(matches!(e, RuntimeError::UndefinedVariable { .. }));
    }

    #[test]
    fn error_tiers_map_to_exit_statuses() {
        let (_, result) = run("print -\"x\";");
        assert!(!result.unwrap_err()[0].is_static());

        let (_, result) = run("print ;");
        assert!(result.unwrap_err()[0].is_static());

        let (_, result) = run("return;");
        assert!(result.unwrap_err()[0].is_static());
    }

    // ── sessions ─────────────────────────────────────────────────────

    #[test]
    fn session_keeps_globals_between_runs() {
        let (mut lox, capture) = session();

        lox.run("fun make() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }")
            .unwrap();
        lox.run("var f = make();").unwrap();
        lox.run("f();").unwrap();
        assert!(lox.run("print undefinedThing;").is_err());
        lox.run("print f();").unwrap();

        assert_eq!(capture.text(), "2\n");
    }

    #[test]
    fn evaluate_returns_the_value() {
        let (mut lox, _) = session();

        lox.run("var x = 20;").unwrap();
        let value: Value = lox.evaluate("x * 2 + 2").unwrap();

        assert_eq!(value, Value::Number(42.0));
        assert_eq!(value.to_string(), "42");
    }

    #[test]
    fn evaluate_rejects_what_run_rejects() {
        let (mut lox, _) = session();

        let errors: Vec<LoxError> = lox.evaluate("1 = 2").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_static());
        assert_eq!(
            errors[0].to_string(),
            "[line 1] Error at '=': Invalid assignment target."
        );
    }
}
