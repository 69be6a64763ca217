#![no_main]

use arbitrary::Arbitrary;
use dview_core::Value;
use dview_harness::{ListOp, RecordingLifecycle, number_list, numbers};
use dview_runtime::{Reconciler, View};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    Add(i8, Option<i8>),
    AddAll(Vec<i8>, Option<i8>),
    Remove(i8),
    RemoveAt(i8),
    RemoveAtMany(Vec<i8>),
    RemoveAll,
    Replace(i8, i8),
    ReplaceAt(i8, i8),
    MoveFrom(i8, i8),
    MoveItem(i8, i8),
    Sort(bool),
    Reset(Vec<i8>),
}

fn idx(i: i8) -> isize {
    isize::from(i)
}

fn values(v: &[i8]) -> Vec<i32> {
    v.iter().map(|&x| i32::from(x)).collect()
}

impl From<&Op> for ListOp {
    fn from(op: &Op) -> Self {
        match op {
            Op::Add(value, index) => ListOp::Add {
                value: i32::from(*value),
                index: index.map(idx),
            },
            Op::AddAll(v, index) => ListOp::AddAll {
                values: values(v),
                index: index.map(idx),
            },
            Op::Remove(value) => ListOp::Remove(i32::from(*value)),
            Op::RemoveAt(index) => ListOp::RemoveAt(idx(*index)),
            Op::RemoveAtMany(indices) => {
                ListOp::RemoveAtMany(indices.iter().map(|&i| idx(i)).collect())
            }
            Op::RemoveAll => ListOp::RemoveAll,
            Op::Replace(old, new) => ListOp::Replace {
                old: i32::from(*old),
                new: i32::from(*new),
            },
            Op::ReplaceAt(index, value) => ListOp::ReplaceAt {
                index: idx(*index),
                value: i32::from(*value),
            },
            Op::MoveFrom(old, new) => ListOp::MoveFrom {
                old: idx(*old),
                new: idx(*new),
            },
            Op::MoveItem(value, index) => ListOp::MoveItem {
                value: i32::from(*value),
                index: idx(*index),
            },
            Op::Sort(descending) => ListOp::Sort {
                descending: *descending,
            },
            Op::Reset(v) => ListOp::Reset(values(v)),
        }
    }
}

fuzz_target!(|input: (Vec<i8>, Vec<Op>)| {
    let (initial, ops) = input;
    if ops.len() > 256 {
        return;
    }
    let initial: Vec<i32> = initial.into_iter().map(i32::from).collect();

    let owner = View::default();
    let list = number_list(&initial);
    let reconciler = match Reconciler::bind(&owner, &list, RecordingLifecycle::tracking_index()) {
        Ok(reconciler) => reconciler,
        Err(_) => return,
    };
    let mut reference: Vec<f64> = initial.iter().copied().map(f64::from).collect();

    for op in &ops {
        let op = ListOp::from(op);
        op.apply(&list);
        op.apply_reference(&mut reference);

        assert_eq!(numbers(&list), reference);
        let contexts: Vec<f64> = reconciler
            .contexts()
            .iter()
            .filter_map(Value::as_f64)
            .collect();
        assert_eq!(contexts, reference);
        for (position, entry) in reconciler.entries().iter().enumerate() {
            assert_eq!(entry.index.get(), position);
            assert!(entry.alive.get());
        }
    }
});
