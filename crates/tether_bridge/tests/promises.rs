use std::time::Duration;
use tether_bridge::Engine;
use tether_host::{Awaitable, EventLoop, HostError, HostObject};

#[test]
fn settled_guest_promise_is_done_after_eval() {
    let engine = Engine::new().unwrap();
    let promise = engine.eval("(async () => 40 + 2)()").unwrap();
    let awaitable = promise.as_awaitable().unwrap();
    assert!(awaitable.is_done());
    assert_eq!(awaitable.result().unwrap().unwrap().as_int(), Some(42));
}

#[test]
fn guest_promise_resolves_on_the_host_loop() {
    let host_loop = EventLoop::new().unwrap();
    let engine = Engine::new().unwrap();
    let value = host_loop.run_until(async {
        let promise = engine
            .eval("new Promise((resolve) => setTimeout(() => resolve('later'), 5))")
            .unwrap();
        let awaitable = promise.as_awaitable().unwrap().clone();
        assert!(!awaitable.is_done());
        awaitable.await
    });
    assert_eq!(value.unwrap().as_str(), Some("later"));
}

#[test]
fn guest_rejection_becomes_host_exception() {
    let host_loop = EventLoop::new().unwrap();
    let engine = Engine::new().unwrap();
    let outcome = host_loop.run_until(async {
        let promise = engine
            .eval("Promise.reject(new SyntaxError('nope'))")
            .unwrap();
        promise.as_awaitable().unwrap().clone().await
    });
    let err = outcome.unwrap_err();
    assert_eq!(err.name(), "SyntaxError");
    assert_eq!(err.message(), "nope");
}

#[test]
fn host_awaitable_resolves_guest_promise() {
    let host_loop = EventLoop::new().unwrap();
    let engine = Engine::new().unwrap();
    let awaitable = Awaitable::pending();
    let handle = HostObject::awaitable(awaitable.clone());

    host_loop.run_until(async {
        engine.with_coercion(|cx| {
            let value = cx.host_to_guest(&handle).unwrap();
            cx.ctx().globals().set("pending", value).unwrap();
        });
        engine
            .eval("globalThis.got = null; pending.then((v) => { got = v * 2 })")
            .unwrap();
        assert!(engine.eval("got").unwrap().is_null());

        awaitable.resolve(HostObject::int(21));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(engine.eval("got").unwrap().as_int(), Some(42));
    });
    assert_eq!(engine.stats().roots.pinned, 0);
}

#[test]
fn host_rejection_rejects_guest_promise() {
    let host_loop = EventLoop::new().unwrap();
    let engine = Engine::new().unwrap();
    let awaitable = Awaitable::pending();
    let handle = HostObject::awaitable(awaitable.clone());

    host_loop.run_until(async {
        engine.with_coercion(|cx| {
            let value = cx.host_to_guest(&handle).unwrap();
            cx.ctx().globals().set("pending", value).unwrap();
        });
        engine
            .eval("globalThis.why = null; pending.catch((e) => { why = e.name + ': ' + e.message })")
            .unwrap();

        awaitable.reject(HostError::Exception {
            name: "KeyError".to_string(),
            message: "missing".to_string(),
            stack: None,
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(engine.eval("why").unwrap().as_str(), Some("KeyError: missing"));
    });
}

#[test]
fn completed_awaitable_settles_without_waiting_for_a_loop() {
    let engine = Engine::new().unwrap();
    let done = HostObject::awaitable(Awaitable::resolved(HostObject::string("ready")));
    let then = engine
        .eval("globalThis.seen = null; (p) => p.then((v) => { seen = v })")
        .unwrap();
    then.call(&[done]).unwrap();
    assert_eq!(engine.eval("seen").unwrap().as_str(), Some("ready"));
}

#[test]
fn guest_promise_projects_back_to_itself() {
    let engine = Engine::new().unwrap();
    let promise = engine.eval("globalThis.p = Promise.resolve(1); p").unwrap();
    let same = engine.eval("(q) => q === p").unwrap();
    assert_eq!(same.call(&[promise]).unwrap().as_bool(), Some(true));
}
