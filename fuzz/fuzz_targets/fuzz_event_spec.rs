#![no_main]

use dview_core::{EventSpec, PropPath, SpecKind};
use dview_runtime::{Callback, Entity, View};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: &str| {
    // Parsing never panics; accepted path specs never carry an empty path.
    if let Ok(specs) = EventSpec::parse_all(input) {
        for spec in &specs {
            if let SpecKind::Current(path) | SpecKind::Watch(path) | SpecKind::WatchNow(path) =
                &spec.kind
            {
                assert!(!path.is_empty());
            }
        }
    }

    // Subscribing with arbitrary specs against a small view either succeeds
    // or reports an error, and teardown always leaves the ledger empty.
    let view = View::new(dview_core::Record::from_iter([
        ("a", dview_core::Value::record([("b", 1)])),
        ("list", dview_core::Value::list([1, 2])),
    ]));
    let callback = Callback::new(|_| {});
    let _ = view.on(input, callback.clone());
    let _ = view.set(PropPath::from("a.b"), 2);
    view.off_callback(input, &callback);
    view.dispose();
    assert_eq!(view.listening_count(), 0);
});
