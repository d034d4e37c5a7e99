//! Validation of user inputs driven through a module.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use pv_modules::UserInputValidator;
use pv_runtime::{Application, Decl, Module, Output, PushInput, ReadAnyGroup};

struct Panel {
    _app: Application,
    module: Module,
    x_out: Output<i32>,
    y_out: Output<i32>,
    x: PushInput<i32>,
    y: PushInput<i32>,
    group: ReadAnyGroup,
}

fn panel() -> Panel {
    let app = Application::new("t");
    let ui = app.root().add_module("Ui", "").unwrap();
    let module = app.root().add_module("Controller", "").unwrap();
    let x_out = ui.output::<i32>(Decl::new("/x")).unwrap();
    let y_out = ui.output::<i32>(Decl::new("/y")).unwrap();
    let x = module.push_input_wb::<i32>(Decl::new("/x")).unwrap();
    let y = module.push_input::<i32>(Decl::new("/y")).unwrap();
    app.connect().unwrap();
    let group = module.read_any_group().unwrap();
    Panel {
        _app: app,
        module,
        x_out,
        y_out,
        x,
        y,
        group,
    }
}

/// Deliver all pending changes to the validator, the way a module loop does.
fn run(p: &Panel, validator: &mut UserInputValidator) -> Vec<bool> {
    std::iter::from_fn(|| p.group.read_any_non_blocking())
        .map(|change| validator.validate(change))
        .collect()
}

#[test]
fn start_up_scenario() {
    let p = panel();
    let mut v = UserInputValidator::new(&p.module);
    let x = p.x.handle();
    v.add("x must be below 10", move || x.get() < 10, &[&p.x]).unwrap();
    v.set_fallback(&p.x, 1).unwrap();

    assert!(!v.validate_all());
    assert_eq!(p.x.get(), 0);

    p.x_out.set_and_write(15);
    assert_eq!(run(&p, &mut v), vec![true]);
    assert_eq!(p.x.get(), 0);
}

#[test]
fn rejection_reverts_to_newest_accepted_value() {
    let p = panel();
    let mut v = UserInputValidator::new(&p.module);
    let x = p.x.handle();
    v.add("x must be below 10", move || x.get() < 10, &[&p.x]).unwrap();
    v.set_fallback(&p.x, 1).unwrap();

    p.x_out.set_and_write(3);
    p.x_out.set_and_write(4);
    assert_eq!(run(&p, &mut v), vec![false, false]);
    p.x_out.set_and_write(50);
    assert_eq!(run(&p, &mut v), vec![true]);
    assert_eq!(p.x.get(), 4);
    // reverted value was sent back to the panel
    while p.x_out.read_non_blocking() {}
    assert_eq!(p.x_out.get(), 4);
}

#[test]
fn predicate_only_runs_for_its_accessors() {
    let p = panel();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut v = UserInputValidator::new(&p.module);
    let x = p.x.handle();
    v.add(
        "x must be positive",
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            x.get() >= 0
        },
        &[&p.x],
    )
    .unwrap();
    let y = p.y.handle();
    v.add("y must be even", move || y.get() % 2 == 0, &[&p.y]).unwrap();

    p.y_out.set_and_write(3);
    assert_eq!(run(&p, &mut v), vec![true]);
    assert_eq!(p.y.get(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    p.x_out.set_and_write(2);
    run(&p, &mut v);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn one_validator_guards_several_inputs() {
    let p = panel();
    let mut v = UserInputValidator::new(&p.module);
    let (x, y) = (p.x.handle(), p.y.handle());
    v.add("x must not exceed y", move || x.get() <= y.get(), &[&p.x, &p.y])
        .unwrap();
    v.set_fallback(&p.y, 100).unwrap();

    p.y_out.set_and_write(10);
    p.x_out.set_and_write(5);
    assert_eq!(run(&p, &mut v), vec![false, false]);

    p.y_out.set_and_write(2);
    assert_eq!(run(&p, &mut v), vec![true]);
    assert_eq!(p.y.get(), 10);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn rejected_value_is_replaced_by_history_or_fallback(
        accepted in prop::collection::vec(0i32..100, 0..6),
        rejected in 100i32..1000,
        fallback in -50i32..0,
    ) {
        let p = panel();
        let mut v = UserInputValidator::new(&p.module);
        let x = p.x.handle();
        v.add("below 100", move || x.get() < 100, &[&p.x]).unwrap();
        v.set_fallback(&p.x, fallback).unwrap();

        for value in &accepted {
            p.x_out.set_and_write(*value);
        }
        run(&p, &mut v);
        p.x_out.set_and_write(rejected);
        prop_assert_eq!(run(&p, &mut v), vec![true]);
        let expected = accepted.last().copied().unwrap_or(fallback);
        prop_assert_eq!(p.x.get(), expected);
    }
}
