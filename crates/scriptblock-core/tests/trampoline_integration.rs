//! Native calls through real trampolines
//!
//! Every test builds a bridge, reinterprets its entry point as an
//! `extern "C" fn` of the declared signature and calls it like native code
//! would.
//!
//! # Running Tests
//! ```bash
//! cargo test --test trampoline_integration
//! ```

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::{Arc, Mutex};
use std::thread;

use scriptblock_core::{
    BridgeOptions, BridgeRuntime, HandleKind, InvocationError, ScriptError, ScriptFunctionHandle,
    ScriptValue,
};

type Id = *const c_void;
type Sel = *const c_void;

fn number(args: &[ScriptValue], i: usize) -> f64 {
    args.get(i).and_then(ScriptValue::as_number).unwrap_or(f64::NAN)
}

// ===== Scalars =====

#[test]
fn test_method_signature_doubles() {
    let runtime = BridgeRuntime::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    let double = ScriptFunctionHandle::from_fn(move |args| {
        recorded.lock().unwrap().push(args.to_vec());
        Ok(ScriptValue::Number(number(args, 0) * 2.0))
    });

    let bridge = runtime.make_bridge("i@:i", double).unwrap();
    let f: extern "C" fn(Id, Sel, i32) -> i32 = unsafe { bridge.as_fn() };

    assert_eq!(f(ptr::null(), ptr::null(), 5), 10);
    assert_eq!(f(ptr::null(), ptr::null(), -21), -42);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![vec![ScriptValue::Number(5.0)], vec![ScriptValue::Number(-21.0)]]
    );
    assert!(runtime.reporter().is_empty());
}

#[test]
fn test_mixed_float_arguments() {
    let runtime = BridgeRuntime::new();
    let sum = ScriptFunctionHandle::from_fn(|args| {
        Ok(ScriptValue::Number(args.iter().filter_map(ScriptValue::as_number).sum()))
    });

    let bridge = runtime.make_bridge("f@?fdq", sum).unwrap();
    let f: extern "C" fn(Id, f32, f64, i64) -> f32 = unsafe { bridge.as_fn() };
    assert_eq!(f(ptr::null(), 1.5, 2.25, 4), 7.75);
}

#[test]
fn test_bool_and_small_unsigned_returns() {
    let runtime = BridgeRuntime::new();
    let positive = ScriptFunctionHandle::from_fn(|args| Ok(ScriptValue::Bool(number(args, 0) > 0.0)));
    let bridge = runtime.make_bridge("B@?i", positive).unwrap();
    let is_positive: extern "C" fn(Id, i32) -> bool = unsafe { bridge.as_fn() };
    assert!(is_positive(ptr::null(), 3));
    assert!(!is_positive(ptr::null(), -3));

    let wrap = ScriptFunctionHandle::from_fn(|_| Ok(ScriptValue::Number(300.0)));
    let bridge = runtime.make_bridge("C@?", wrap).unwrap();
    let f: extern "C" fn(Id) -> u8 = unsafe { bridge.as_fn() };
    assert_eq!(f(ptr::null()), 44);
}

#[test]
fn test_void_return_ignores_result() {
    let runtime = BridgeRuntime::new();
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    let f = ScriptFunctionHandle::from_fn(move |_| {
        *counter.lock().unwrap() += 1;
        Ok(ScriptValue::String("ignored".to_string()))
    });

    let bridge = runtime.make_bridge("v@?", f).unwrap();
    let call: extern "C" fn(Id) = unsafe { bridge.as_fn() };
    call(ptr::null());
    call(ptr::null());
    assert_eq!(*calls.lock().unwrap(), 2);
    assert!(runtime.reporter().is_empty());
}

// ===== Strings and pointers =====

#[test]
fn test_c_string_in_and_out() {
    let runtime = BridgeRuntime::new();
    let shout = ScriptFunctionHandle::from_fn(|args| match &args[0] {
        ScriptValue::String(s) => Ok(ScriptValue::String(s.to_uppercase())),
        ScriptValue::Null => Ok(ScriptValue::Null),
        other => Err(ScriptError::raised(format!("unexpected {}", other.type_name()))),
    });

    let bridge = runtime.make_bridge("*@?*", shout).unwrap();
    let f: extern "C" fn(Id, *const c_char) -> *const c_char = unsafe { bridge.as_fn() };

    let input = CString::new("hello").unwrap();
    let out = f(ptr::null(), input.as_ptr());
    assert_eq!(unsafe { CStr::from_ptr(out) }.to_str(), Ok("HELLO"));
    assert!(f(ptr::null(), ptr::null()).is_null());
}

#[test]
fn test_object_identity_round_trip() {
    let runtime = BridgeRuntime::new();
    let echo = ScriptFunctionHandle::from_fn(|args| Ok(args[0].clone()));
    let bridge = runtime.make_bridge("@@?@", echo).unwrap();
    let f: extern "C" fn(Id, Id) -> Id = unsafe { bridge.as_fn() };

    let object = Box::new(17u64);
    let address = &*object as *const u64 as Id;
    assert_eq!(f(ptr::null(), address), address);
    assert!(f(ptr::null(), ptr::null()).is_null());
}

#[test]
fn test_same_pointer_gives_equal_handles() {
    let runtime = BridgeRuntime::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    let record = ScriptFunctionHandle::from_fn(move |args| {
        recorded.lock().unwrap().push(args[0].clone());
        Ok(ScriptValue::Undefined)
    });

    let bridge = runtime.make_bridge("v@?^v", record).unwrap();
    let f: extern "C" fn(Id, *const c_void) = unsafe { bridge.as_fn() };
    let a = 0x1000 as *const c_void;
    let b = 0x2000 as *const c_void;
    f(ptr::null(), a);
    f(ptr::null(), a);
    f(ptr::null(), b);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], seen[1]);
    assert_ne!(seen[0], seen[2]);
    let handle = seen[0].as_handle().unwrap();
    assert_eq!(handle.kind(), HandleKind::Pointer);
    assert_eq!(runtime.handles().resolve(handle), Ok(0x1000));
}

#[test]
fn test_handle_identity_ignores_declared_type() {
    let runtime = BridgeRuntime::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    let record = ScriptFunctionHandle::from_fn(move |args| {
        recorded.lock().unwrap().extend_from_slice(args);
        Ok(ScriptValue::Undefined)
    });

    let bridge = runtime.make_bridge("v@?@^v", record).unwrap();
    let f: extern "C" fn(Id, Id, *const c_void) = unsafe { bridge.as_fn() };
    let address = 0x1000 as *const c_void;
    f(ptr::null(), address, address);

    let seen = seen.lock().unwrap();
    let object = seen[0].as_handle().unwrap();
    let pointer = seen[1].as_handle().unwrap();
    assert_eq!(object.kind(), HandleKind::Object);
    assert_eq!(pointer.kind(), HandleKind::Pointer);
    assert_eq!(seen[0], seen[1]);
    assert_eq!(runtime.handles().len(), 1);
}

#[test]
fn test_long_lived_bridge_stays_bounded() {
    let runtime = BridgeRuntime::with_options(BridgeOptions::default().handle_capacity(64));
    let describe = ScriptFunctionHandle::from_fn(|args| Ok(ScriptValue::String(args[0].to_string())));
    let bridge = runtime.make_bridge("*@?^v", describe).unwrap();
    let f: extern "C" fn(Id, *const c_void) -> *const c_char = unsafe { bridge.as_fn() };

    for i in 1..=10_000usize {
        let out = f(ptr::null(), (i * 16) as *const c_void);
        let text = unsafe { CStr::from_ptr(out) }.to_str().unwrap().to_string();
        assert!(text.starts_with("Handle(pointer, "));
        assert!(runtime.handles().len() <= 64);
    }
    assert_eq!(bridge.trampoline().target().retained_strings(), 1);

    // The latest pointer is still resolvable
    let latest = runtime.handles().intern(10_000 * 16, HandleKind::Pointer);
    assert_eq!(runtime.handles().resolve(latest), Ok(10_000 * 16));
}

#[test]
fn test_returned_strings_per_thread() {
    let runtime = BridgeRuntime::new();
    let label = ScriptFunctionHandle::from_fn(|args| {
        Ok(ScriptValue::String(format!("n={}", number(args, 0))))
    });
    let bridge = runtime.make_bridge("*@?q", label).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let bridge = bridge.clone();
            thread::spawn(move || {
                let f: extern "C" fn(Id, i64) -> *const c_char = unsafe { bridge.as_fn() };
                (0..200).all(|i| {
                    let n = t * 1000 + i;
                    let out = f(ptr::null(), n);
                    unsafe { CStr::from_ptr(out) }.to_str() == Ok(format!("n={n}").as_str())
                })
            })
        })
        .collect();

    for worker in workers {
        assert!(worker.join().unwrap());
    }
    assert!(bridge.trampoline().target().retained_strings() <= 4);
}

// ===== Aggregates =====

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Wide {
    a: i64,
    b: i64,
    c: i64,
    d: i64,
}

#[test]
fn test_struct_argument_and_return() {
    let runtime = BridgeRuntime::new();
    let swap = ScriptFunctionHandle::from_fn(|args| {
        let fields = args[0].as_array().unwrap_or(&[]).to_vec();
        Ok(ScriptValue::Array(fields.into_iter().rev().collect()))
    });

    let bridge = runtime.make_bridge("{Point=dd}@?{Point=dd}", swap).unwrap();
    let f: extern "C" fn(Id, Point) -> Point = unsafe { bridge.as_fn() };
    assert_eq!(f(ptr::null(), Point { x: 1.0, y: 2.0 }), Point { x: 2.0, y: 1.0 });
}

#[test]
fn test_large_struct_return() {
    let runtime = BridgeRuntime::new();
    let count = ScriptFunctionHandle::from_fn(|args| {
        let n = number(args, 0);
        Ok(ScriptValue::Array((0..4).map(|i| ScriptValue::Number(n + i as f64)).collect()))
    });

    let bridge = runtime.make_bridge("{Wide=qqqq}@?q", count).unwrap();
    let f: extern "C" fn(Id, i64) -> Wide = unsafe { bridge.as_fn() };
    assert_eq!(
        f(ptr::null(), 10),
        Wide {
            a: 10,
            b: 11,
            c: 12,
            d: 13
        }
    );
}

#[test]
fn test_struct_with_nested_array_argument() {
    #[allow(dead_code)]
    #[repr(C)]
    struct Samples {
        tag: u8,
        values: [i32; 3],
    }

    let runtime = BridgeRuntime::new();
    let total = ScriptFunctionHandle::from_fn(|args| {
        let fields = args[0].as_array().unwrap_or(&[]);
        let values = fields.get(1).and_then(ScriptValue::as_array).unwrap_or(&[]);
        let sum: f64 = values.iter().filter_map(ScriptValue::as_number).sum();
        Ok(ScriptValue::Number(sum + number(fields, 0)))
    });

    let bridge = runtime.make_bridge("q@?{Samples=C[3i]}", total).unwrap();
    let f: extern "C" fn(Id, Samples) -> i64 = unsafe { bridge.as_fn() };
    let samples = Samples {
        tag: 100,
        values: [1, 2, 3],
    };
    assert_eq!(f(ptr::null(), samples), 106);
}

// ===== Failures =====

#[test]
fn test_raising_script_returns_zero_and_reports() {
    let runtime = BridgeRuntime::new();
    let raise = ScriptFunctionHandle::from_fn(|_| Err(ScriptError::raised("TypeError: nope")));

    let bridge = runtime.make_bridge("i@:i", raise.clone()).unwrap();
    let f: extern "C" fn(Id, Sel, i32) -> i32 = unsafe { bridge.as_fn() };
    assert_eq!(f(ptr::null(), ptr::null(), 5), 0);

    let object_bridge = runtime.make_bridge("@@?", raise).unwrap();
    let g: extern "C" fn(Id) -> Id = unsafe { object_bridge.as_fn() };
    assert!(g(ptr::null()).is_null());

    let reports = runtime.reporter().drain();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].encoding, "i@:i");
    assert_eq!(
        reports[0].error,
        InvocationError::Script(ScriptError::raised("TypeError: nope"))
    );
    assert_eq!(reports[1].encoding, "@@?");
}

#[test]
fn test_incompatible_return_reports_marshal_error() {
    let runtime = BridgeRuntime::new();
    let wrong = ScriptFunctionHandle::from_fn(|_| Ok(ScriptValue::String("1.5".to_string())));
    let bridge = runtime.make_bridge("d@?", wrong).unwrap();
    let f: extern "C" fn(Id) -> f64 = unsafe { bridge.as_fn() };
    assert_eq!(f(ptr::null()), 0.0);
    let report = runtime.reporter().try_recv().unwrap();
    assert_eq!(report.error.kind(), "marshal");
}

#[test]
fn test_panicking_script_does_not_unwind_into_native() {
    let runtime = BridgeRuntime::new();
    let boom = ScriptFunctionHandle::from_fn(|_| panic!("engine bug"));
    let bridge = runtime.make_bridge("q@?", boom).unwrap();
    let f: extern "C" fn(Id) -> i64 = unsafe { bridge.as_fn() };
    assert_eq!(f(ptr::null()), 0);
    assert!(matches!(
        runtime.reporter().try_recv().map(|r| r.error),
        Some(InvocationError::Script(ScriptError::Panicked(_)))
    ));
}

// ===== Raw calls, blocks, threads =====

#[test]
fn test_invoke_raw() {
    let runtime = BridgeRuntime::new();
    let sub = ScriptFunctionHandle::from_fn(|args| Ok(ScriptValue::Number(number(args, 0) - number(args, 1))));
    let bridge = runtime.make_bridge("qqq", sub).unwrap();

    let mut a: i64 = 50;
    let mut b: i64 = 8;
    let mut args = [&mut a as *mut i64 as *mut c_void, &mut b as *mut i64 as *mut c_void];
    let mut ret: i64 = 0;
    unsafe { bridge.invoke_raw(&mut args, &mut ret as *mut i64 as *mut c_void) };
    assert_eq!(ret, 42);
}

#[test]
fn test_block_literal_invocation() {
    let runtime = BridgeRuntime::new();
    let inc = ScriptFunctionHandle::from_fn(|args| Ok(ScriptValue::Number(number(args, 0) + 1.0)));
    let bridge = runtime.make_bridge("i@?i", inc).unwrap();
    let block = bridge.block().unwrap();

    let invoke: extern "C" fn(Id, i32) -> i32 = unsafe { std::mem::transmute(block.invoke) };
    assert_eq!(invoke(block.as_ptr(), 41), 42);
    let signature = unsafe { scriptblock_core::signature_for_block(block.as_ptr()) };
    assert_eq!(signature.and_then(|s| s.to_str().ok()), Some("i@?i"));
}

#[test]
fn test_concurrent_invocation() {
    let runtime = BridgeRuntime::new();
    let square = ScriptFunctionHandle::from_fn(|args| {
        let n = number(args, 0);
        Ok(ScriptValue::Number(n * n))
    });
    let bridge = runtime.make_bridge("q@?q", square).unwrap();

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let bridge = bridge.clone();
            thread::spawn(move || {
                let f: extern "C" fn(Id, i64) -> i64 = unsafe { bridge.as_fn() };
                (0..100).all(|i| {
                    let n = t * 100 + i;
                    f(ptr::null(), n) == n * n
                })
            })
        })
        .collect();

    for worker in workers {
        assert!(worker.join().unwrap());
    }
}
