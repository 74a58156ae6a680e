use num_bigint::BigInt;
use rquickjs::{Function, Type, Value};
use std::rc::Rc;
use tether_bridge::wrapper::MAX_SAFE_INTEGER;
use tether_bridge::{Engine, ReturnType, Wrapper};
use tether_host::{HostError, HostFunction, HostObject, HostRef};

fn guest_type(engine: &Engine, value: &HostRef) -> Type {
    engine.with_coercion(|cx| cx.host_to_guest(value).unwrap().type_of())
}

#[test]
fn integers_past_the_safe_range_become_bigints() {
    let engine = Engine::new().unwrap();
    assert_eq!(guest_type(&engine, &HostObject::int(7)), Type::Int);
    assert_eq!(
        guest_type(&engine, &HostObject::int(MAX_SAFE_INTEGER)),
        Type::Float
    );
    assert_eq!(
        guest_type(&engine, &HostObject::int(MAX_SAFE_INTEGER + 1)),
        Type::BigInt
    );
    assert_eq!(
        guest_type(&engine, &HostObject::int(-MAX_SAFE_INTEGER - 1)),
        Type::BigInt
    );

    let huge = BigInt::from(1u8) << 80u32;
    assert_eq!(guest_type(&engine, &HostObject::bigint(huge.clone())), Type::BigInt);
    let back = engine.eval("2n ** 80n").unwrap();
    assert_eq!(back.as_integer(), Some(huge));
}

#[test]
fn floats_stay_floats() {
    let engine = Engine::new().unwrap();
    assert_eq!(guest_type(&engine, &HostObject::float(2.0)), Type::Float);
    let value = engine.eval("2 ** 0.5").unwrap();
    assert!((value.as_float().unwrap() - std::f64::consts::SQRT_2).abs() < 1e-12);
}

#[test]
fn null_and_undefined_round_trip_distinctly() {
    let engine = Engine::new().unwrap();
    assert_eq!(guest_type(&engine, &HostObject::none()), Type::Undefined);
    assert_eq!(guest_type(&engine, &HostObject::null()), Type::Null);
    assert!(Rc::ptr_eq(&engine.eval("null").unwrap(), &HostObject::null()));
    assert!(Rc::ptr_eq(&engine.eval("void 0").unwrap(), &HostObject::none()));
}

#[test]
fn wrapper_kinds_are_exact() {
    let cases = [
        (HostObject::int(1), ReturnType::Int),
        (HostObject::bigint(1), ReturnType::BigInt),
        (HostObject::float(1.0), ReturnType::Float),
        (HostObject::string("s"), ReturnType::Str),
        (HostObject::bool(true), ReturnType::Bool),
        (HostObject::none(), ReturnType::Null),
        (HostObject::list([]), ReturnType::List),
    ];
    for (value, expected) in cases {
        assert_eq!(Wrapper::from_host(value).return_type(), expected);
    }
}

#[test]
fn lone_surrogates_decode_lossily() {
    let engine = Engine::new().unwrap();
    let text = engine.eval("'a\\uD800b'").unwrap();
    assert_eq!(text.as_str(), Some("a\u{FFFD}b"));
    let pair = engine.eval("'\\uD83D\\uDE00'").unwrap();
    assert_eq!(pair.as_str(), Some("\u{1F600}"));
}

#[test]
fn dates_cross_at_millisecond_precision() {
    let engine = Engine::new().unwrap();
    let date = engine.eval("new Date(86400123)").unwrap();
    assert_eq!(date.as_date().unwrap().timestamp_millis(), 86_400_123);

    let year = engine.with_coercion(|cx| {
        let value = cx.host_to_guest(&date).unwrap();
        let object = value.into_object().unwrap();
        let get_year: Function = object.get("getUTCFullYear").unwrap();
        let mut args = rquickjs::function::Args::new(cx.ctx().clone(), 0);
        args.this(object).unwrap();
        get_year.call_arg::<i32>(args).unwrap()
    });
    assert_eq!(year, 1970);
}

#[test]
fn guest_objects_become_shared_dicts_and_lists() {
    let engine = Engine::new().unwrap();
    let value = engine.eval("({ name: 'x', items: [1, 2.5, 'three'], nested: { ok: true } })").unwrap();

    assert_eq!(value.get("name").unwrap().as_str(), Some("x"));
    let items = value.get("items").unwrap();
    let items = items.items().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_int(), Some(1));
    assert_eq!(items[1].as_float(), Some(2.5));
    assert_eq!(items[2].as_str(), Some("three"));
    assert_eq!(value.get("nested").unwrap().get("ok").unwrap().as_bool(), Some(true));
}

#[test]
fn self_referencing_guest_object_coerces_to_itself() {
    let engine = Engine::new().unwrap();
    let value = engine.eval("const o = { n: 1 }; o.self = o; o").unwrap();
    let inner = value.get("self").unwrap();
    assert!(Rc::ptr_eq(&inner, &value));

    // Break the host-side cycle.
    value.as_dict().unwrap().borrow_mut().clear();
}

#[test]
fn self_referencing_host_list_coerces_to_itself() {
    let engine = Engine::new().unwrap();
    let list = HostObject::list([HostObject::int(1)]);
    list.as_list().unwrap().borrow_mut().push(list.clone());

    let check = engine.eval("(a) => a[1] === a && a[0]").unwrap();
    let result = check.call(&[list.clone()]).unwrap();
    assert_eq!(result.as_int(), Some(1));

    list.as_list().unwrap().borrow_mut().clear();
}

#[test]
fn guest_origin_list_writes_through() {
    let engine = Engine::new().unwrap();
    let list = engine.eval("globalThis.arr = [1, 2, 3]; arr").unwrap();
    list.as_list().unwrap().borrow_mut().push(HostObject::int(4));

    let check = engine.eval("(a) => a === arr && a.length").unwrap();
    assert_eq!(check.call(&[list.clone()]).unwrap().as_int(), Some(4));
    assert_eq!(engine.eval("arr[3]").unwrap().as_int(), Some(4));

    list.as_list().unwrap().borrow_mut().truncate(1);
    check.call(&[list]).unwrap();
    assert_eq!(engine.eval("arr.length").unwrap().as_int(), Some(1));
}

#[test]
fn guest_origin_dict_drops_stale_keys() {
    let engine = Engine::new().unwrap();
    let dict = engine.eval("globalThis.obj = { a: 1, b: 2 }; obj").unwrap();
    {
        let mut entries = dict.as_dict().unwrap().borrow_mut();
        entries.shift_remove("b");
        entries.insert("c".to_string(), HostObject::int(3));
    }

    let keys = engine.eval("(o) => o === obj && Object.keys(o).join()").unwrap();
    assert_eq!(keys.call(&[dict]).unwrap().as_str(), Some("a,c"));
}

#[test]
fn host_native_containers_project_to_guest() {
    let engine = Engine::new().unwrap();
    let dict = HostObject::dict([("k", HostObject::string("v"))]);
    let describe = engine.eval("(d) => JSON.stringify(d)").unwrap();
    assert_eq!(describe.call(&[dict]).unwrap().as_str(), Some(r#"{"k":"v"}"#));
}

#[test]
fn guest_writes_after_coercion_reach_the_host() {
    let engine = Engine::new().unwrap();
    let dict = engine.eval("globalThis.obj = { a: 1 }; obj").unwrap();
    engine.eval("obj.a = 2; obj.b = 3").unwrap();
    assert_eq!(dict.get("a").unwrap().as_int(), Some(2));
    assert_eq!(dict.get("b").unwrap().as_int(), Some(3));

    // Handing the host dict back must not roll the guest object back.
    let describe = engine
        .eval("(o) => (o === obj) + ' ' + JSON.stringify(obj)")
        .unwrap();
    let described = describe.call(&[dict.clone()]).unwrap();
    assert_eq!(described.as_str(), Some(r#"true {"a":2,"b":3}"#));

    // Writes on both sides between crossings are merged.
    dict.as_dict()
        .unwrap()
        .borrow_mut()
        .insert("c".to_string(), HostObject::int(4));
    engine.eval("obj.d = 5").unwrap();
    let keys = engine.eval("Object.keys(obj).sort().join()").unwrap();
    assert_eq!(keys.as_str(), Some("a,b,c,d"));
    assert_eq!(dict.get("d").unwrap().as_int(), Some(5));
    assert_eq!(dict.get("c").unwrap().as_int(), Some(4));

    engine.eval("delete obj.a").unwrap();
    assert!(dict.get("a").is_none());
}

#[test]
fn guest_array_writes_reach_the_host_list() {
    let engine = Engine::new().unwrap();
    let list = engine.eval("globalThis.arr = [1]; arr").unwrap();
    engine.eval("arr.push('two')").unwrap();
    assert_eq!(list.items().unwrap().len(), 2);
    assert_eq!(list.items().unwrap()[1].as_str(), Some("two"));

    let again = engine.eval("arr").unwrap();
    assert!(Rc::ptr_eq(&again, &list));
}

#[test]
fn guest_writes_to_host_containers_reach_the_host() {
    let engine = Engine::new().unwrap();
    let list = HostObject::list([]);
    let push = engine.eval("(a) => { a.push(1); return a.length }").unwrap();
    assert_eq!(push.call(&[list.clone()]).unwrap().as_int(), Some(1));
    assert_eq!(list.items().unwrap().len(), 1);
    assert_eq!(list.items().unwrap()[0].as_int(), Some(1));

    // Later crossings reuse the same guest array.
    let same = engine
        .eval("(a) => { const first = globalThis.kept; globalThis.kept = a; return first === a }")
        .unwrap();
    same.call(&[list.clone()]).unwrap();
    assert_eq!(same.call(&[list.clone()]).unwrap().as_bool(), Some(true));

    let dict = HostObject::dict([("k", HostObject::string("v")), ("gone", HostObject::null())]);
    let mutate = engine
        .eval("(d) => { d.k = 'w'; d.extra = true; delete d.gone }")
        .unwrap();
    mutate.call(&[dict.clone()]).unwrap();
    assert_eq!(dict.get("k").unwrap().as_str(), Some("w"));
    assert_eq!(dict.get("extra").unwrap().as_bool(), Some(true));
    assert!(dict.get("gone").is_none());
}

#[test]
fn host_function_writes_to_guest_arguments_are_visible() {
    let engine = Engine::new().unwrap();
    let tag = HostObject::function(HostFunction::new("tag", |args| {
        if let Some(dict) = args.first().and_then(|arg| arg.as_dict()) {
            dict.borrow_mut()
                .insert("tagged".to_string(), HostObject::bool(true));
        }
        Ok(HostObject::none())
    }));
    engine.with_coercion(|cx| {
        let value = cx.host_to_guest(&tag).unwrap();
        cx.ctx().globals().set("tag", value).unwrap();
    });

    let result = engine
        .eval("const target = { id: 1 }; tag(target); target.tagged === true && target.id")
        .unwrap();
    assert_eq!(result.as_int(), Some(1));
}

#[test]
fn distinct_cyclic_guest_arrays_compare_equal() {
    let engine = Engine::new().unwrap();
    let a = engine.eval("const x = []; x.push(x); x").unwrap();
    let b = engine.eval("const y = []; y.push(y); y").unwrap();
    assert!(!Rc::ptr_eq(&a, &b));
    assert_eq!(*a, *b);

    a.as_list().unwrap().borrow_mut().clear();
    b.as_list().unwrap().borrow_mut().clear();
}

#[test]
fn scalars_round_trip_unchanged() {
    let engine = Engine::new().unwrap();
    let values = [
        HostObject::bool(true),
        HostObject::bool(false),
        HostObject::string(""),
        HostObject::string("h\u{e9}llo \u{1F600}"),
        HostObject::int(-5),
        HostObject::float(0.25),
    ];
    for value in values {
        let back = engine.with_coercion(|cx| {
            let guest = cx.host_to_guest(&value).unwrap();
            cx.guest_to_host_or_none(guest).unwrap()
        });
        assert_eq!(back.kind(), value.kind());
        assert_eq!(*back, *value);
    }
}

#[test]
fn guest_functions_are_host_callable() {
    let engine = Engine::new().unwrap();
    let double = engine.eval("(x) => x * 2").unwrap();
    let result = double.call(&[HostObject::int(21)]).unwrap();
    assert_eq!(result.as_int(), Some(42));
    assert_eq!(double.as_function().unwrap().name(), "anonymous");

    let named = engine.eval("function greet(who) { return 'hi ' + who } greet").unwrap();
    assert_eq!(named.as_function().unwrap().name(), "greet");
    assert_eq!(
        named.call(&[HostObject::string("there")]).unwrap().as_str(),
        Some("hi there")
    );
}

#[test]
fn methods_keep_their_receiver() {
    let engine = Engine::new().unwrap();
    let counter = engine
        .eval("({ count: 40, bump() { this.count += 1; return this.count } })")
        .unwrap();
    let bump = counter.get("bump").unwrap();
    bump.call(&[]).unwrap();
    assert_eq!(bump.call(&[]).unwrap().as_int(), Some(42));
}

#[test]
fn host_functions_are_guest_callable() {
    let engine = Engine::new().unwrap();
    let add = HostObject::function(HostFunction::new("add", |args| {
        let sum: i64 = args.iter().filter_map(|arg| arg.as_int()).sum();
        Ok(HostObject::int(sum))
    }));
    engine.with_coercion(|cx| {
        let value = cx.host_to_guest(&add).unwrap();
        cx.ctx().globals().set("add", value).unwrap();
    });

    assert_eq!(engine.eval("add(2, 3, 4)").unwrap().as_int(), Some(9));
    assert_eq!(engine.eval("add.name").unwrap().as_str(), Some("add"));

    // Projecting the guest function back yields a host callable again.
    let again = engine.eval("add").unwrap();
    assert_eq!(again.call(&[HostObject::int(1)]).unwrap().as_int(), Some(1));
}

#[test]
fn host_errors_are_thrown_in_the_guest() {
    let engine = Engine::new().unwrap();
    let boom = HostObject::function(HostFunction::new("boom", |_| {
        Err(HostError::Exception {
            name: "ValueError".to_string(),
            message: "bad input".to_string(),
            stack: None,
        })
    }));
    engine.with_coercion(|cx| {
        let value: Value = cx.host_to_guest(&boom).unwrap();
        cx.ctx().globals().set("boom", value).unwrap();
    });

    let caught = engine
        .eval("try { boom(); 'no' } catch (e) { e instanceof Error && e.name + ': ' + e.message }")
        .unwrap();
    assert_eq!(caught.as_str(), Some("ValueError: bad input"));

    let err = engine.eval("boom()").unwrap_err();
    assert_eq!(err.name(), "ValueError");
    assert_eq!(err.message(), "bad input");
}

#[test]
fn guest_errors_in_values_become_dicts() {
    let engine = Engine::new().unwrap();
    let error = engine.eval("new TypeError('shape')").unwrap();
    assert_eq!(error.get("name").unwrap().as_str(), Some("TypeError"));
    assert_eq!(error.get("message").unwrap().as_str(), Some("shape"));
    assert!(error.get("stack").is_some());
}

#[test]
fn guest_to_host_to_guest_calls_nest() {
    let engine = Engine::new().unwrap();
    let inc = engine.eval("(x) => x + 1").unwrap();
    let via_host = HostObject::function(HostFunction::new("viaHost", move |args| inc.call(args)));
    engine.with_coercion(|cx| {
        let value = cx.host_to_guest(&via_host).unwrap();
        cx.ctx().globals().set("viaHost", value).unwrap();
    });

    assert_eq!(engine.eval("viaHost(viaHost(1))").unwrap().as_int(), Some(3));
}
