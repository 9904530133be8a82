//! Integration Tests with Animations Turned Off
//!
//! The engine configuration is process-wide, so these tests live in their
//! own binary. Every test installs the same configuration first.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::anim::{DoubleInterpolation, Easing};
use trellis_core::concurrency::host;
use trellis_core::{config, dom, Anim, Animation, Attr, Doc, EngineConfig, Trans, Var};

fn without_animations() {
    config::install(EngineConfig {
        animations_enabled: false,
        ..EngineConfig::default()
    })
    .unwrap();
    host::run_until_idle();
}

/// Playing an animation only runs its finalizers.
#[test]
fn play_runs_finalizers_without_frames() {
    without_animations();
    let frames = Rc::new(Cell::new(0));
    let counter = frames.clone();
    let done = Rc::new(Cell::new(false));
    let flag = done.clone();

    Animation::pack(Anim::new(100.0, move |_| counter.set(counter.get() + 1)))
        .when_done(move || flag.set(true))
        .play()
        .start(None);
    host::run_until_idle();

    assert!(done.get());
    assert_eq!(frames.get(), 0);
}

/// Animated attributes jump straight to their values and the patch does
/// not wait for a frame.
#[test]
fn animated_attributes_jump_to_new_values() {
    without_animations();
    let container = dom::create_element("div");
    let width = Var::create(50.0);
    let written = Rc::new(RefCell::new(Vec::new()));
    let log = written.clone();

    let grow = Trans::create(|a: &f64, b: &f64| {
        Anim::simple(DoubleInterpolation, Easing::linear(), 100.0, *a, *b)
    })
    .with_enter(|x: &f64| Anim::simple(DoubleInterpolation, Easing::linear(), 100.0, 0.0, *x));
    let attr = Attr::animated("width", grow, width.view(), move |v: &f64| {
        log.borrow_mut().push(*v);
        format!("{v:.0}")
    });
    Doc::run(&container, Doc::element("div", attr, []));

    let start = host::now();
    host::run_until_idle();
    let el = container.first_child().unwrap();
    assert_eq!(el.get_attribute("width").as_deref(), Some("50"));

    width.set(100.0).unwrap();
    host::run_until_idle();

    assert_eq!(el.get_attribute("width").as_deref(), Some("100"));
    assert_eq!(*written.borrow(), vec![50.0, 100.0]);
    // Only zero-delay scheduler timers fired; no frame advanced the clock.
    assert_eq!(host::now(), start);
}
