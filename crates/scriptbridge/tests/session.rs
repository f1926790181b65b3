//! Session integration tests with a small native type.

#[cfg(test)]
mod tests {
    use std::io::Write;

    use scriptbridge::{
        BridgeConfig, BridgeError, BridgeResult, FunctionDescriptor, HostApi, NativeValue,
        Operator, Session, SessionState, TypeBuilder, TypeDescriptor, ValueKind,
    };

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        value: f64,
    }

    #[derive(Debug, Clone)]
    struct Tag;

    fn counter_type() -> TypeDescriptor {
        TypeBuilder::<Counter>::new("Counter")
            .constructor(&[ValueKind::Number], |_, args| {
                Ok(Counter {
                    value: args[0].as_number()?,
                })
            })
            .field("value", ValueKind::Number, |c| c.value.into(), |c, v| {
                c.value = v.as_number()?;
                Ok(())
            })
            .readonly_field("doubled", ValueKind::Number, |c| (c.value * 2.0).into())
            .method("add", &[ValueKind::Number], |ctx, c, args| {
                ctx.alloc(Counter {
                    value: c.value + args[0].as_number()?,
                })
            })
            .operator(Operator::Add, ValueKind::Object, ValueKind::Object, |ctx, l, r| {
                let (l, r) = (ctx.get::<Counter>(l)?, ctx.get::<Counter>(r)?);
                ctx.alloc(Counter {
                    value: l.value + r.value,
                })
            })
            .operator(Operator::Mul, ValueKind::Number, ValueKind::Object, |ctx, l, r| {
                let (k, c) = (l.as_number()?, ctx.get::<Counter>(r)?);
                ctx.alloc(Counter { value: k * c.value })
            })
            .operator(Operator::Eq, ValueKind::Object, ValueKind::Object, |ctx, l, r| {
                Ok((ctx.get::<Counter>(l)? == ctx.get::<Counter>(r)?).into())
            })
            .display(|c| format!("Counter<{}>", c.value))
            .build()
    }

    fn tag_type() -> TypeDescriptor {
        TypeBuilder::<Tag>::new("Tag")
            .constructor(&[], |_, _| Ok(Tag))
            .readonly_field("label", ValueKind::String, |_| "tag".into())
            .method("describe", &[], |_, _, _| Ok("a tag".into()))
            .build()
    }

    struct CounterApi;

    impl HostApi for CounterApi {
        fn name(&self) -> &str {
            "counter"
        }

        fn install(&self, session: &mut Session) -> BridgeResult<()> {
            session.register_type(counter_type())?;
            session.register_type(tag_type())?;
            session.register_function(FunctionDescriptor::new(
                "half",
                &[ValueKind::Number],
                |_, args| Ok((args[0].as_number()? / 2.0).into()),
            ))?;
            session.register_function(FunctionDescriptor::new("boom", &[], |_, _| {
                Err(BridgeError::domain("boom"))
            }))?;
            session.register_function(FunctionDescriptor::variadic("count", |_, args| {
                Ok((args.len() as f64).into())
            }))?;
            session.register_function(FunctionDescriptor::new("live", &[], |ctx, _| {
                Ok((ctx.live_objects() as f64).into())
            }))?;
            session.register_function(FunctionDescriptor::new(
                "type_label",
                &[ValueKind::Any],
                |ctx, args| {
                    if ctx.is::<Counter>(&args[0]) {
                        return Ok("counter".into());
                    }
                    match &args[0] {
                        NativeValue::Object(_) => Ok(ctx.type_name(&args[0])?.into()),
                        other => Ok(other.kind().name().into()),
                    }
                },
            ))?;
            session.register_module_function(
                "util",
                FunctionDescriptor::new("shout", &[ValueKind::String], |_, args| {
                    Ok(args[0].as_str()?.to_uppercase().into())
                }),
            )
        }
    }

    fn session() -> Session {
        let mut session = Session::new(BridgeConfig::default());
        session.initialize().unwrap();
        session.install(&CounterApi).unwrap();
        session
    }

    #[test]
    fn test_script_constructs_and_uses_native_objects() {
        let mut session = session();
        session
            .run(
                r#"
                let c = Counter(1.5);
                c.value = c.value + 1.0;
                let d = c.add(10.0);
                let total = (c + d).value;
                let same = Counter(2.0) == Counter(2.0);
                print(`${c} ${d}`);
                "#,
            )
            .unwrap();
        assert_eq!(session.global("total").unwrap(), NativeValue::Number(15.0));
        assert_eq!(session.global("same").unwrap(), NativeValue::Boolean(true));
        assert_eq!(session.take_output(), vec!["Counter<2.5> Counter<12.5>"]);
    }

    #[test]
    fn test_native_functions_and_modules() {
        let mut session = session();
        assert_eq!(session.eval("half(9)").unwrap(), NativeValue::Number(4.5));
        assert_eq!(session.eval("count(1, \"a\", true)").unwrap(), NativeValue::Number(3.0));
        assert_eq!(
            session.eval("util::shout(\"hi\")").unwrap(),
            NativeValue::from("HI")
        );
    }

    #[test]
    fn test_argument_errors_are_typed() {
        let mut session = session();
        assert!(matches!(
            session.eval("half(1, 2)"),
            Err(BridgeError::ArityMismatch { got: 2, .. })
        ));
        match session.eval("half(\"x\")") {
            Err(BridgeError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, ValueKind::Number);
                assert_eq!(found, "string");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            session.eval("Counter()"),
            Err(BridgeError::ArityMismatch { got: 0, .. })
        ));
        assert!(matches!(
            session.eval("half([1])"),
            Err(BridgeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_member_errors_are_typed() {
        let mut session = session();
        session.run("let c = Counter(1.0);").unwrap();
        match session.run("c.describe()") {
            Err(BridgeError::UnknownMethod { type_name, method }) => {
                assert_eq!(type_name, "Counter");
                assert_eq!(method, "describe");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match session.run("c.frobnicate(1)") {
            Err(BridgeError::UnknownMethod { type_name, method }) => {
                assert_eq!(type_name, "NativeObject");
                assert_eq!(method, "frobnicate");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match session.run("c.label") {
            Err(BridgeError::UnknownField { type_name, field }) => {
                assert_eq!(type_name, "Counter");
                assert_eq!(field, "label");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            session.run("c.doubled = 4.0;"),
            Err(BridgeError::UnknownField { .. })
        ));
        assert!(matches!(
            session.run("c.value = \"text\";"),
            Err(BridgeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_operator_without_entry_is_unsupported() {
        let mut session = session();
        match session.eval("Counter(1.0) - Counter(2.0)") {
            Err(BridgeError::UnsupportedOperator {
                type_name,
                operator,
                ..
            }) => {
                assert_eq!(type_name, "Counter");
                assert_eq!(operator, "-");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            session.eval("Counter(1.0) + 1.0"),
            Err(BridgeError::UnsupportedOperator { .. })
        ));
        assert!(matches!(
            session.eval("-Tag()"),
            Err(BridgeError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_operator_entries_only_match_their_own_type() {
        let mut session = session();
        match session.eval("Counter(1.0) + Tag()") {
            Err(BridgeError::UnsupportedOperator {
                type_name,
                operands,
                ..
            }) => {
                assert_eq!(type_name, "Counter");
                assert_eq!(operands, "Counter, Tag");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match session.eval("Tag() + Counter(1.0)") {
            Err(BridgeError::UnsupportedOperator { type_name, .. }) => {
                assert_eq!(type_name, "Tag");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(session.stats().live_objects, 0);
    }

    #[test]
    fn test_operator_resolves_through_rhs_type() {
        let mut session = session();
        assert_eq!(
            session.eval("(3 * Counter(2.0)).value").unwrap(),
            NativeValue::Number(6.0)
        );
        assert!(matches!(
            session.eval("Counter(2.0) * 3"),
            Err(BridgeError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_type_checks_from_native_functions() {
        let mut session = session();
        assert_eq!(session.eval("type_label(Counter(1.0))").unwrap(), NativeValue::from("counter"));
        assert_eq!(session.eval("type_label(Tag())").unwrap(), NativeValue::from("Tag"));
        assert_eq!(session.eval("type_label(1.5)").unwrap(), NativeValue::from("number"));
    }

    #[test]
    fn test_native_error_surfaces_through_script_function() {
        let mut session = session();
        session.run("fn explode() { boom() }").unwrap();
        assert_eq!(
            session.call_script_function("explode", &[]),
            Err(BridgeError::Domain("boom".into()))
        );
    }

    #[test]
    fn test_duplicate_registrations() {
        let mut session = session();
        assert_eq!(
            session.register_type(counter_type()),
            Err(BridgeError::DuplicateType("Counter".into()))
        );
        assert!(matches!(
            session.register_function(FunctionDescriptor::new("half", &[], |_, _| {
                Ok(NativeValue::Null)
            })),
            Err(BridgeError::DuplicateFunction { .. })
        ));
        assert!(matches!(
            session.register_function(FunctionDescriptor::new("Counter", &[], |_, _| {
                Ok(NativeValue::Null)
            })),
            Err(BridgeError::DuplicateFunction { .. })
        ));
        // The same name in another namespace is fine.
        session
            .register_module_function(
                "util",
                FunctionDescriptor::new("half", &[], |_, _| Ok(NativeValue::Null)),
            )
            .unwrap();
    }

    #[test]
    fn test_script_references_own_their_objects() {
        let mut session = session();
        session.run("let c = Counter(1.0);").unwrap();
        assert_eq!(session.stats().live_objects, 1);
        session.run("let x = c.add(1.0).add(2.0).value;").unwrap();
        assert_eq!(session.stats().live_objects, 1);
        session.run("c = ();").unwrap();
        assert_eq!(session.stats().live_objects, 0);
    }

    #[test]
    fn test_temporaries_are_freed_during_a_run() {
        let mut session = session();
        session
            .run(
                r#"
                let peak = 0.0;
                for i in 0..200 {
                    let t = Counter(1.0) + Counter(2.0);
                    let n = live();
                    if n > peak { peak = n; }
                }
                "#,
            )
            .unwrap();
        let peak = session.global("peak").unwrap().as_number().unwrap();
        assert!(peak <= 4.0, "peak live objects {peak}");
        assert_eq!(session.stats().live_objects, 0);
    }

    #[test]
    fn test_host_objects_are_pinned_until_released() {
        let mut session = session();
        let handle = session
            .create_object("Counter", &[NativeValue::Number(3.0)])
            .unwrap();
        assert_eq!(session.object_type_name(handle).unwrap(), "Counter");
        session.set_global("counter_ref", &NativeValue::Object(handle)).unwrap();
        session.run("counter_ref.value = 7.0;").unwrap();
        assert_eq!(session.with_object(handle, |c: &Counter| c.value).unwrap(), 7.0);
        assert_eq!(
            session.get_field(handle, "doubled").unwrap(),
            NativeValue::Number(14.0)
        );

        session.release_object(handle).unwrap();
        assert!(session.is_live(handle), "script still holds a reference");
        session.run("counter_ref = ();").unwrap();
        assert!(!session.is_live(handle));
        assert_eq!(
            session.get_field(handle, "value"),
            Err(BridgeError::StaleHandle(handle))
        );
    }

    #[test]
    fn test_returned_objects_are_pinned() {
        let mut session = session();
        let value = session.eval("Counter(2.0).add(3.0)").unwrap();
        let handle = value.as_object().unwrap();
        assert_eq!(session.stats().live_objects, 1);
        let bigger = session
            .call_method(handle, "add", &[NativeValue::Number(1.0)])
            .unwrap()
            .as_object()
            .unwrap();
        assert_eq!(session.with_object(bigger, |c: &Counter| c.value).unwrap(), 6.0);
        session.set_field(bigger, "value", NativeValue::Number(0.5)).unwrap();
        assert_eq!(
            session.set_field(bigger, "doubled", NativeValue::Number(1.0)),
            Err(BridgeError::UnknownField {
                type_name: "Counter".into(),
                field: "doubled (read-only)".into()
            })
        );
        session.release_object(handle).unwrap();
        session.release_object(bigger).unwrap();
        assert_eq!(session.collect_garbage().unwrap(), 0);
        assert_eq!(session.stats().live_objects, 0);
    }

    #[test]
    fn test_objects_pass_into_script_functions() {
        let mut session = session();
        session.run("fn bump(c, by) { c.add(by) }").unwrap();
        let handle = session.insert_object(Counter { value: 1.0 }).unwrap();
        let result = session
            .call_script_function("bump", &[NativeValue::Object(handle), NativeValue::Number(4.0)])
            .unwrap();
        let bumped = result.as_object().unwrap();
        assert_eq!(session.with_object(bumped, |c: &Counter| c.value).unwrap(), 5.0);
        assert_eq!(session.stats().live_objects, 2);
    }

    #[test]
    fn test_teardown_invalidates_everything() {
        let mut session = session();
        let handle = session.create_object("Counter", &[NativeValue::Number(1.0)]).unwrap();
        session.run("let kept = Counter(2.0);").unwrap();
        session.teardown().unwrap();
        assert_eq!(session.state(), SessionState::TornDown);
        assert!(!session.is_live(handle));
        assert_eq!(session.stats().live_objects, 0);
        assert_eq!(
            session.get_field(handle, "value"),
            Err(BridgeError::SessionClosed)
        );
        assert_eq!(
            session.call_script_function("anything", &[]),
            Err(BridgeError::SessionClosed)
        );
        assert_eq!(
            session.register_type(tag_type()),
            Err(BridgeError::SessionClosed)
        );
    }

    #[test]
    fn test_run_file() {
        let mut session = session();
        let mut file = tempfile::Builder::new().suffix(".rhai").tempfile().unwrap();
        writeln!(file, "fn triple(x) {{ x * 3.0 }}").unwrap();
        session.run_file(file.path()).unwrap();
        assert_eq!(
            session
                .call_script_function("triple", &[NativeValue::Number(2.0)])
                .unwrap(),
            NativeValue::Number(6.0)
        );
        assert!(matches!(
            session.run_file(file.path().with_extension("missing")),
            Err(BridgeError::Io { .. })
        ));
    }

    #[test]
    fn test_operations_before_initialize() {
        let mut session = Session::default();
        assert_eq!(
            session.register_type(counter_type()),
            Err(BridgeError::NotInitialized)
        );
        assert_eq!(
            session.call_script_function("f", &[]),
            Err(BridgeError::NotInitialized)
        );
        assert_eq!(session.eval("1"), Err(BridgeError::NotInitialized));
    }
}
