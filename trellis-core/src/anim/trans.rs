//! Transitions.
//!
//! A [`Trans`] says how an animated attribute moves between values: when its
//! value changes, when its element enters the document, and when it leaves.
//! The flags record which of the three were customized; the reconciler only
//! collects animations for the capabilities that are set.

use std::fmt;
use std::rc::Rc;

use super::Anim;

bitflags::bitflags! {
    /// Which transitions are animated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TransFlags: u8 {
        const CHANGE = 1 << 0;
        const ENTER = 1 << 1;
        const EXIT = 1 << 2;
    }
}

type ChangeFn<T> = Rc<dyn Fn(&T, &T) -> Anim<T>>;
type EdgeFn<T> = Rc<dyn Fn(&T) -> Anim<T>>;

pub struct Trans<T> {
    change: ChangeFn<T>,
    enter: EdgeFn<T>,
    exit: EdgeFn<T>,
    flags: TransFlags,
}

impl<T> Clone for Trans<T> {
    fn clone(&self) -> Self {
        Self {
            change: Rc::clone(&self.change),
            enter: Rc::clone(&self.enter),
            exit: Rc::clone(&self.exit),
            flags: self.flags,
        }
    }
}

impl<T: Clone + 'static> Trans<T> {
    /// Jump straight to every new value.
    pub fn trivial() -> Self {
        Self {
            change: Rc::new(|_, to| Anim::constant(to.clone())),
            enter: Rc::new(|x| Anim::constant(x.clone())),
            exit: Rc::new(|x| Anim::constant(x.clone())),
            flags: TransFlags::empty(),
        }
    }

    /// Animate value changes with `change(from, to)`.
    pub fn create(change: impl Fn(&T, &T) -> Anim<T> + 'static) -> Self {
        Self {
            change: Rc::new(change),
            flags: TransFlags::CHANGE,
            ..Self::trivial()
        }
    }

    pub fn with_enter(mut self, enter: impl Fn(&T) -> Anim<T> + 'static) -> Self {
        self.enter = Rc::new(enter);
        self.flags |= TransFlags::ENTER;
        self
    }

    pub fn with_exit(mut self, exit: impl Fn(&T) -> Anim<T> + 'static) -> Self {
        self.exit = Rc::new(exit);
        self.flags |= TransFlags::EXIT;
        self
    }

    pub fn flags(&self) -> TransFlags {
        self.flags
    }

    pub fn can_animate_change(&self) -> bool {
        self.flags.contains(TransFlags::CHANGE)
    }

    pub fn can_animate_enter(&self) -> bool {
        self.flags.contains(TransFlags::ENTER)
    }

    pub fn can_animate_exit(&self) -> bool {
        self.flags.contains(TransFlags::EXIT)
    }

    pub fn change(&self, from: &T, to: &T) -> Anim<T> {
        (self.change)(from, to)
    }

    pub fn enter(&self, value: &T) -> Anim<T> {
        (self.enter)(value)
    }

    pub fn exit(&self, value: &T) -> Anim<T> {
        (self.exit)(value)
    }
}

impl<T> fmt::Debug for Trans<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trans").field("flags", &self.flags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anim::{DoubleInterpolation, Easing};

    #[test]
    fn builders_set_flags() {
        let trivial: Trans<f64> = Trans::trivial();
        assert!(trivial.flags().is_empty());

        let full = Trans::create(|a: &f64, b: &f64| {
            Anim::simple(DoubleInterpolation, Easing::linear(), 100.0, *a, *b)
        })
        .with_enter(|x| Anim::constant(*x))
        .with_exit(|x| Anim::constant(*x));

        assert!(full.can_animate_change());
        assert!(full.can_animate_enter());
        assert!(full.can_animate_exit());
        assert_eq!(full.change(&0.0, &10.0).duration(), 100.0);
    }

    #[test]
    fn trivial_change_lands_on_target() {
        let trans: Trans<i32> = Trans::trivial();
        let anim = trans.change(&1, &2);
        assert_eq!(anim.duration(), 0.0);
        assert_eq!(anim.compute(0.0), 2);
    }
}
