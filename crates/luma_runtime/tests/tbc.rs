use luma_runtime::{
    CloseDispatch, CloseStatus, NativeId, Runtime, RuntimeConfig, RuntimeError, Value,
};

const CLOSE: NativeId = NativeId(1);

/// Userdata are closable; everything else is not.
#[derive(Default)]
struct Recorder {
    closed: Vec<(Value, Value)>,
    fail_on: Option<Value>,
    yieldable: Vec<bool>,
}

impl CloseDispatch for Recorder {
    fn close_method(&mut self, _rt: &Runtime, value: Value) -> Option<Value> {
        value.is_userdata().then(|| Value::native_fn(CLOSE))
    }

    fn call_close(
        &mut self,
        _rt: &mut Runtime,
        method: Value,
        value: Value,
        err: Value,
        yieldable: bool,
    ) -> Result<(), RuntimeError> {
        assert_eq!(method, Value::native_fn(CLOSE));
        self.closed.push((value, err));
        self.yieldable.push(yieldable);
        if self.fail_on == Some(value) {
            return Err(RuntimeError::Runtime(Value::integer(99)));
        }
        Ok(())
    }

    fn variable_name(&self, _rt: &Runtime, level: usize) -> Option<String> {
        (level > 1).then(|| format!("v{level}"))
    }
}

fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::default()).unwrap()
}

fn push_closable(rt: &mut Runtime, d: &mut Recorder) -> (usize, Value) {
    let v = rt.new_userdata(0, 0).unwrap();
    let level = rt.push(v);
    rt.register_to_be_closed(level, d).unwrap();
    (level, v)
}

#[test]
fn variables_close_innermost_first() {
    let mut rt = runtime();
    let mut d = Recorder::default();
    let (l1, a) = push_closable(&mut rt, &mut d);
    let (_, b) = push_closable(&mut rt, &mut d);
    let (_, c) = push_closable(&mut rt, &mut d);

    rt.close_to_level(l1, CloseStatus::Normal, true, &mut d).unwrap();
    let order: Vec<Value> = d.closed.iter().map(|(v, _)| *v).collect();
    assert_eq!(order, vec![c, b, a]);
    assert!(d.closed.iter().all(|(_, e)| e.is_strict_nil()));
    assert!(d.yieldable.iter().all(|&y| y));
    assert_eq!(rt.thread(rt.current_thread()).tbc_top(), None);
}

#[test]
fn closing_above_a_level_leaves_lower_variables() {
    let mut rt = runtime();
    let mut d = Recorder::default();
    let (l1, _) = push_closable(&mut rt, &mut d);
    let (l2, b) = push_closable(&mut rt, &mut d);

    rt.close_to_level(l2, CloseStatus::Normal, false, &mut d).unwrap();
    assert_eq!(d.closed, vec![(b, Value::NIL)]);
    assert_eq!(rt.thread(rt.current_thread()).tbc_top(), Some(l1));
}

#[test]
fn false_and_nil_are_not_registered() {
    let mut rt = runtime();
    let mut d = Recorder::default();
    let f = rt.push(Value::FALSE);
    rt.register_to_be_closed(f, &mut d).unwrap();
    let n = rt.push(Value::NIL);
    rt.register_to_be_closed(n, &mut d).unwrap();
    assert_eq!(rt.thread(rt.current_thread()).tbc_top(), None);
    rt.close_to_level(1, CloseStatus::Normal, false, &mut d).unwrap();
    assert!(d.closed.is_empty());
}

#[test]
fn values_without_a_closing_method_are_rejected() {
    let mut rt = runtime();
    let mut d = Recorder::default();
    rt.push(Value::integer(0));
    let level = rt.push(Value::integer(5));
    let err = rt.register_to_be_closed(level, &mut d).unwrap_err();
    assert_eq!(err.to_string(), "variable 'v2' got a non-closable value");
    assert!(err.is_fatal());

    let mut rt = runtime();
    let level = rt.push(Value::TRUE);
    let err = rt.register_to_be_closed(level, &mut d).unwrap_err();
    assert_eq!(err.to_string(), "variable '?' got a non-closable value");
}

#[test]
fn error_status_reaches_closing_methods() {
    let mut rt = runtime();
    let mut d = Recorder::default();
    let (l1, a) = push_closable(&mut rt, &mut d);
    let e = rt.new_string(b"boom").unwrap();
    rt.close_to_level(l1, CloseStatus::Error(e), false, &mut d).unwrap();
    assert_eq!(d.closed, vec![(a, e)]);
}

#[test]
fn closing_errors_propagate_and_stop_the_walk() {
    let mut rt = runtime();
    let mut d = Recorder::default();
    let (l1, _) = push_closable(&mut rt, &mut d);
    let (_, b) = push_closable(&mut rt, &mut d);
    let (_, c) = push_closable(&mut rt, &mut d);
    d.fail_on = Some(b);

    let err = rt.close_to_level(l1, CloseStatus::Normal, true, &mut d).unwrap_err();
    assert!(matches!(err, RuntimeError::Runtime(v) if v == Value::integer(99)));
    let order: Vec<Value> = d.closed.iter().map(|(v, _)| *v).collect();
    assert_eq!(order, vec![c, b]);
    assert_eq!(rt.thread(rt.current_thread()).tbc_top(), Some(l1));
}

#[test]
fn protected_close_carries_the_latest_error() {
    let mut rt = runtime();
    let mut d = Recorder::default();
    let (l1, a) = push_closable(&mut rt, &mut d);
    let (_, b) = push_closable(&mut rt, &mut d);
    let (_, c) = push_closable(&mut rt, &mut d);
    d.fail_on = Some(b);

    let status = rt.close_protected(l1, CloseStatus::Normal, &mut d);
    assert_eq!(status, CloseStatus::Error(Value::integer(99)));
    assert_eq!(
        d.closed,
        vec![(c, Value::NIL), (b, Value::NIL), (a, Value::integer(99))]
    );
    assert!(d.yieldable.iter().all(|&y| !y));
}

#[test]
fn closing_also_closes_upvalues() {
    let mut rt = runtime();
    let mut d = Recorder::default();
    let (l1, a) = push_closable(&mut rt, &mut d);
    let uv = rt.find_or_make_open_upvalue(l1).unwrap();
    rt.close_to_level(l1, CloseStatus::Normal, false, &mut d).unwrap();
    assert_eq!(rt.upvalue_state(uv), luma_runtime::UpvalState::Closed(a));
}

#[test]
fn distant_registrations_survive_placeholder_markers() {
    let mut rt = runtime();
    let mut d = Recorder::default();
    let (l1, a) = push_closable(&mut rt, &mut d);
    let far = l1 + 3 * u16::MAX as usize;
    rt.set_top(far);
    let (l2, b) = push_closable(&mut rt, &mut d);
    assert_eq!(l2, far);

    rt.close_to_level(l1 + 1, CloseStatus::Normal, false, &mut d).unwrap();
    assert_eq!(d.closed, vec![(b, Value::NIL)]);
    assert_eq!(rt.thread(rt.current_thread()).tbc_top(), Some(l1));
    rt.close_to_level(l1, CloseStatus::Normal, false, &mut d).unwrap();
    assert_eq!(d.closed.last(), Some(&(a, Value::NIL)));
}

#[test]
fn cells_over_registered_variables_are_flagged() {
    let mut rt = runtime();
    let mut d = Recorder::default();
    let plain = rt.push(Value::integer(1));
    let (level, _) = push_closable(&mut rt, &mut d);

    let marked = rt.find_or_make_open_upvalue(level).unwrap();
    let other = rt.find_or_make_open_upvalue(plain).unwrap();
    assert!(rt.upvalue_is_tbc(marked));
    assert!(!rt.upvalue_is_tbc(other));
}
