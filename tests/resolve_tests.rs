#![allow(missing_docs)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use scenepack::resolve::{PostPass, Resolver};
use scenepack::{IdGenerator, ReferenceId, Value};

// --- RESOLVER ---

/// A continuation registered before its target resolves runs at delivery
/// time.
#[test]
fn test_expect_then_deliver() {
    let mut resolver = Resolver::new();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&seen);
    resolver.expect(
        ReferenceId::from_raw(7),
        Box::new(move |value| sink.borrow_mut().push(value.clone())),
    );
    assert!(seen.borrow().is_empty());

    resolver.deliver(ReferenceId::from_raw(7), Value::I32(42));
    assert_eq!(*seen.borrow(), vec![Value::I32(42)]);
    assert_eq!(resolver.dangling(), 0);
}

/// A continuation registered after delivery runs immediately off the
/// cache.
#[test]
fn test_deliver_then_expect() {
    let mut resolver = Resolver::new();
    resolver.deliver(ReferenceId::from_raw(7), Value::Str("late".to_string()));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    resolver.expect(
        ReferenceId::from_raw(7),
        Box::new(move |value| sink.borrow_mut().push(value.clone())),
    );
    assert_eq!(*seen.borrow(), vec![Value::Str("late".to_string())]);
}

/// Every waiting continuation for a target runs on one delivery, and
/// unmatched targets are counted as dangling.
#[test]
fn test_fan_out_and_dangling() {
    let mut resolver = Resolver::new();
    let hits = Rc::new(Cell::new(0));

    for _ in 0..3 {
        let counter = Rc::clone(&hits);
        resolver.expect(
            ReferenceId::from_raw(1),
            Box::new(move |_| counter.set(counter.get() + 1)),
        );
    }
    let counter = Rc::clone(&hits);
    resolver.expect(
        ReferenceId::from_raw(2),
        Box::new(move |_| counter.set(counter.get() + 1)),
    );

    resolver.deliver(ReferenceId::from_raw(1), Value::Bool(true));
    assert_eq!(hits.get(), 3);
    assert_eq!(resolver.dangling(), 1);
}

// --- POST PASS ---

/// Actions run exactly once, in registration order.
#[test]
fn test_post_pass_runs_in_registration_order() {
    let mut pass: PostPass<()> = PostPass::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    for label in ["first", "second", "third"] {
        let log = Rc::clone(&order);
        pass.defer(Box::new(move |_| log.borrow_mut().push(label)));
    }

    assert_eq!(pass.len(), 3);
    pass.run(&());
    assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
}

/// There is only one pass: an action registered before the one it
/// depends on observes the pre-action state.
#[test]
fn test_post_pass_has_no_second_round() {
    let mut pass: PostPass<Cell<i32>> = PostPass::new();
    let observed = Rc::new(Cell::new(-1));

    let sink = Rc::clone(&observed);
    pass.defer(Box::new(move |shared| sink.set(shared.get())));
    pass.defer(Box::new(|shared| shared.set(99)));

    let shared = Cell::new(0);
    pass.run(&shared);

    // The reader ran first and never saw the writer's effect.
    assert_eq!(observed.get(), 0);
    assert_eq!(shared.get(), 99);
}

// --- ID GENERATOR ---

/// Generated IDs are unique within a session.
#[test]
fn test_generator_uniqueness() -> scenepack::Result<()> {
    let mut generator = IdGenerator::new();
    for _ in 0..1_000 {
        generator.generate()?;
    }
    assert_eq!(generator.issued_count(), 1_000);
    Ok(())
}

/// Reserved IDs are never reissued, and reserving twice reports the
/// collision.
#[test]
fn test_generator_reserve() -> scenepack::Result<()> {
    let mut generator = IdGenerator::new();
    let id = ReferenceId::from_raw(12_345);
    assert!(generator.reserve(id));
    assert!(!generator.reserve(id));

    for _ in 0..1_000 {
        assert_ne!(generator.generate()?, id);
    }
    Ok(())
}
