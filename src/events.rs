//! Event codes, hook slots, and the dispatch loop.
//!
//! Every window carries a fixed table with one slot per core event code.
//! A slot holds a callback plus the event mask it was registered with;
//! registering again for the same code replaces the previous entry.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{EventMask, Window};
use x11rb::protocol::Event;

use crate::display::Display;
use crate::error::Result;

/// Size of the per-window slot table (one past the last core event code).
pub const MAX_EVENT: usize = 36;

/// Core protocol event codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    KeyPress = 2,
    KeyRelease = 3,
    ButtonPress = 4,
    ButtonRelease = 5,
    MotionNotify = 6,
    EnterNotify = 7,
    LeaveNotify = 8,
    FocusIn = 9,
    FocusOut = 10,
    KeymapNotify = 11,
    Expose = 12,
    GraphicsExposure = 13,
    NoExposure = 14,
    VisibilityNotify = 15,
    CreateNotify = 16,
    DestroyNotify = 17,
    UnmapNotify = 18,
    MapNotify = 19,
    MapRequest = 20,
    ReparentNotify = 21,
    ConfigureNotify = 22,
    ConfigureRequest = 23,
    GravityNotify = 24,
    ResizeRequest = 25,
    CirculateNotify = 26,
    CirculateRequest = 27,
    PropertyNotify = 28,
    SelectionClear = 29,
    SelectionRequest = 30,
    SelectionNotify = 31,
    ColormapNotify = 32,
    ClientMessage = 33,
    MappingNotify = 34,
}

impl EventKind {
    /// Validate a raw protocol code. Codes outside 2..=34 have no slot.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            2 => Self::KeyPress,
            3 => Self::KeyRelease,
            4 => Self::ButtonPress,
            5 => Self::ButtonRelease,
            6 => Self::MotionNotify,
            7 => Self::EnterNotify,
            8 => Self::LeaveNotify,
            9 => Self::FocusIn,
            10 => Self::FocusOut,
            11 => Self::KeymapNotify,
            12 => Self::Expose,
            13 => Self::GraphicsExposure,
            14 => Self::NoExposure,
            15 => Self::VisibilityNotify,
            16 => Self::CreateNotify,
            17 => Self::DestroyNotify,
            18 => Self::UnmapNotify,
            19 => Self::MapNotify,
            20 => Self::MapRequest,
            21 => Self::ReparentNotify,
            22 => Self::ConfigureNotify,
            23 => Self::ConfigureRequest,
            24 => Self::GravityNotify,
            25 => Self::ResizeRequest,
            26 => Self::CirculateNotify,
            27 => Self::CirculateRequest,
            28 => Self::PropertyNotify,
            29 => Self::SelectionClear,
            30 => Self::SelectionRequest,
            31 => Self::SelectionNotify,
            32 => Self::ColormapNotify,
            33 => Self::ClientMessage,
            34 => Self::MappingNotify,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// The input mask that makes the server deliver this event.
    /// `NO_EVENT` means delivery is unconditional (client messages,
    /// selection events) and the slot mask is not consulted.
    pub fn delivery_mask(self) -> EventMask {
        match self {
            Self::KeyPress => EventMask::KEY_PRESS,
            Self::KeyRelease => EventMask::KEY_RELEASE,
            Self::ButtonPress => EventMask::BUTTON_PRESS,
            Self::ButtonRelease => EventMask::BUTTON_RELEASE,
            Self::MotionNotify => EventMask::POINTER_MOTION | EventMask::BUTTON_MOTION,
            Self::EnterNotify => EventMask::ENTER_WINDOW,
            Self::LeaveNotify => EventMask::LEAVE_WINDOW,
            Self::FocusIn | Self::FocusOut => EventMask::FOCUS_CHANGE,
            Self::KeymapNotify => EventMask::KEYMAP_STATE,
            Self::Expose => EventMask::EXPOSURE,
            Self::VisibilityNotify => EventMask::VISIBILITY_CHANGE,
            Self::CreateNotify => EventMask::SUBSTRUCTURE_NOTIFY,
            Self::DestroyNotify
            | Self::UnmapNotify
            | Self::MapNotify
            | Self::ReparentNotify
            | Self::ConfigureNotify
            | Self::GravityNotify
            | Self::CirculateNotify => {
                EventMask::STRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_NOTIFY
            }
            Self::MapRequest | Self::ConfigureRequest | Self::CirculateRequest => {
                EventMask::SUBSTRUCTURE_REDIRECT
            }
            Self::ResizeRequest => EventMask::RESIZE_REDIRECT,
            Self::PropertyNotify => EventMask::PROPERTY_CHANGE,
            Self::ColormapNotify => EventMask::COLOR_MAP_CHANGE,
            Self::GraphicsExposure
            | Self::NoExposure
            | Self::SelectionClear
            | Self::SelectionRequest
            | Self::SelectionNotify
            | Self::ClientMessage
            | Self::MappingNotify => EventMask::NO_EVENT,
        }
    }
}

/// A registered callback, captured together with its context.
///
/// Two shapes are supported: `Simple` hooks take no event argument,
/// `WithCode` hooks receive the event-specific code (keysym for key
/// events, button number for button events, 0 otherwise).
pub enum Hook<C> {
    Simple(Box<dyn FnMut(&mut C)>),
    WithCode(Box<dyn FnMut(&mut C, i32)>),
}

impl<C> Hook<C> {
    pub fn simple(f: impl FnMut(&mut C) + 'static) -> Self {
        Self::Simple(Box::new(f))
    }

    pub fn with_code(f: impl FnMut(&mut C, i32) + 'static) -> Self {
        Self::WithCode(Box::new(f))
    }

    pub fn call(&mut self, ctx: &mut C, code: i32) {
        match self {
            Self::Simple(f) => f(ctx),
            Self::WithCode(f) => f(ctx, code),
        }
    }
}

struct Slot<C> {
    mask: EventMask,
    hook: Option<Hook<C>>,
}

/// Per-window slot table, indexed by event code.
pub struct EventSlots<C> {
    slots: [Slot<C>; MAX_EVENT],
}

impl<C> EventSlots<C> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot {
                mask: EventMask::NO_EVENT,
                hook: None,
            }),
        }
    }

    /// Store (hook, mask) for this code. Last write wins, no merging.
    pub fn set(&mut self, kind: EventKind, mask: EventMask, hook: Hook<C>) {
        let slot = &mut self.slots[kind.code() as usize];
        slot.mask = mask;
        slot.hook = Some(hook);
    }

    pub fn clear(&mut self, kind: EventKind) {
        let slot = &mut self.slots[kind.code() as usize];
        slot.mask = EventMask::NO_EVENT;
        slot.hook = None;
    }

    pub fn has_hook(&self, kind: EventKind) -> bool {
        self.slots[kind.code() as usize].hook.is_some()
    }

    pub fn mask(&self, kind: EventKind) -> EventMask {
        self.slots[kind.code() as usize].mask
    }

    /// Union of all registered masks, for window input selection.
    pub fn mask_union(&self) -> EventMask {
        self.slots
            .iter()
            .filter(|s| s.hook.is_some())
            .fold(EventMask::NO_EVENT, |acc, s| acc | s.mask)
    }

    /// Take the hook for dispatch if one is registered and its mask covers
    /// the event's delivery mask. The caller restores it afterwards, which
    /// is what makes re-entrant registration take effect on the next pass.
    pub fn take_matching(&mut self, kind: EventKind) -> Option<Hook<C>> {
        let delivery = kind.delivery_mask();
        let slot = &mut self.slots[kind.code() as usize];
        if delivery != EventMask::NO_EVENT && (slot.mask & delivery) == EventMask::NO_EVENT {
            return None;
        }
        slot.hook.take()
    }

    /// Take the hook regardless of mask (synthetic dispatch, e.g. the
    /// close-button client message translated to DestroyNotify).
    pub fn take(&mut self, kind: EventKind) -> Option<Hook<C>> {
        self.slots[kind.code() as usize].hook.take()
    }

    /// Put a hook back after dispatch unless the slot was re-registered
    /// while the callback ran.
    pub fn restore(&mut self, kind: EventKind, hook: Hook<C>) {
        let slot = &mut self.slots[kind.code() as usize];
        if slot.hook.is_none() {
            slot.hook = Some(hook);
        }
    }
}

impl Display {
    /// Register the connection-scoped idle hook. Only one may be active;
    /// registering again replaces it.
    pub fn loop_hook(&mut self, hook: Hook<Display>) {
        self.loop_slot = Some(hook);
    }

    /// Make [`Display::run`] return after the current callback.
    pub fn loop_end(&mut self) {
        self.end_loop = true;
    }

    /// Drive the event loop until [`Display::loop_end`] is called.
    ///
    /// With a loop hook registered the loop polls and invokes the hook once
    /// per idle iteration; without one it blocks on the next event.
    /// Callbacks run to completion before the loop resumes waiting.
    pub fn run(&mut self) -> Result<()> {
        self.end_loop = false;
        while !self.end_loop {
            self.conn.flush()?;
            let event = if self.loop_slot.is_some() {
                match self.conn.poll_for_event()? {
                    Some(event) => Some(event),
                    None => {
                        self.fire_loop_hook();
                        None
                    }
                }
            } else {
                Some(self.conn.wait_for_event()?)
            };
            if let Some(event) = event {
                self.dispatch(event)?;
            }
        }
        Ok(())
    }

    fn fire_loop_hook(&mut self) {
        if let Some(mut hook) = self.loop_slot.take() {
            hook.call(self, 0);
            if self.loop_slot.is_none() {
                self.loop_slot = Some(hook);
            }
        }
    }

    /// Fire the slot for (window, kind) if registered and mask-matched.
    fn fire(&mut self, window: Window, kind: EventKind, code: i32) {
        let Some(idx) = self.window_index(window) else {
            return;
        };
        let Some(mut hook) = self.windows[idx].slots.take_matching(kind) else {
            return;
        };
        hook.call(self, code);
        if let Some(idx) = self.window_index(window) {
            self.windows[idx].slots.restore(kind, hook);
        }
    }

    /// Fire bypassing the mask check (synthetic events).
    fn fire_unmasked(&mut self, window: Window, kind: EventKind, code: i32) {
        let Some(idx) = self.window_index(window) else {
            return;
        };
        let Some(mut hook) = self.windows[idx].slots.take(kind) else {
            return;
        };
        hook.call(self, code);
        if let Some(idx) = self.window_index(window) {
            self.windows[idx].slots.restore(kind, hook);
        }
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        match event {
            Event::KeyPress(e) => {
                let sym = self.keymap.keysym(e.detail);
                self.fire(e.event, EventKind::KeyPress, sym as i32);
            }
            Event::KeyRelease(e) => {
                let sym = self.keymap.keysym(e.detail);
                self.fire(e.event, EventKind::KeyRelease, sym as i32);
            }
            Event::ButtonPress(e) => self.fire(e.event, EventKind::ButtonPress, e.detail as i32),
            Event::ButtonRelease(e) => {
                self.fire(e.event, EventKind::ButtonRelease, e.detail as i32)
            }
            Event::MotionNotify(e) => self.fire(e.event, EventKind::MotionNotify, 0),
            Event::EnterNotify(e) => self.fire(e.event, EventKind::EnterNotify, 0),
            Event::LeaveNotify(e) => self.fire(e.event, EventKind::LeaveNotify, 0),
            Event::FocusIn(e) => self.fire(e.event, EventKind::FocusIn, 0),
            Event::FocusOut(e) => self.fire(e.event, EventKind::FocusOut, 0),
            Event::Expose(e) => {
                // only the last expose of a series
                if e.count == 0 {
                    self.fire(e.window, EventKind::Expose, 0);
                }
            }
            Event::VisibilityNotify(e) => self.fire(e.window, EventKind::VisibilityNotify, 0),
            Event::DestroyNotify(e) => self.fire(e.window, EventKind::DestroyNotify, 0),
            Event::UnmapNotify(e) => self.fire(e.window, EventKind::UnmapNotify, 0),
            Event::MapNotify(e) => self.fire(e.window, EventKind::MapNotify, 0),
            Event::ReparentNotify(e) => self.fire(e.window, EventKind::ReparentNotify, 0),
            Event::ConfigureNotify(e) => self.fire(e.window, EventKind::ConfigureNotify, 0),
            Event::GravityNotify(e) => self.fire(e.window, EventKind::GravityNotify, 0),
            Event::CirculateNotify(e) => self.fire(e.window, EventKind::CirculateNotify, 0),
            Event::PropertyNotify(e) => self.fire(e.window, EventKind::PropertyNotify, 0),
            Event::SelectionClear(e) => self.fire(e.owner, EventKind::SelectionClear, 0),
            Event::SelectionRequest(e) => self.fire(e.owner, EventKind::SelectionRequest, 0),
            Event::SelectionNotify(e) => self.fire(e.requestor, EventKind::SelectionNotify, 0),
            Event::ColormapNotify(e) => self.fire(e.window, EventKind::ColormapNotify, 0),
            Event::ClientMessage(e) => {
                let close = e.format == 32
                    && e.type_ == self.wm_protocols
                    && e.data.as_data32()[0] == self.wm_delete_window;
                if close {
                    self.fire_unmasked(e.window, EventKind::DestroyNotify, 0);
                } else {
                    self.fire(e.window, EventKind::ClientMessage, 0);
                }
            }
            Event::MappingNotify(_) => self.keymap.refresh(&self.conn)?,
            Event::Error(e) => log::warn!("x server error: {e:?}"),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Ctx {
        fired: Vec<i32>,
    }

    fn counting_hook(log: Rc<RefCell<Vec<i32>>>) -> Hook<Ctx> {
        Hook::with_code(move |_, code| log.borrow_mut().push(code))
    }

    #[test]
    fn test_set_then_replace() {
        let mut slots = EventSlots::new();
        let first = Rc::new(RefCell::new(Vec::new()));
        let second = Rc::new(RefCell::new(Vec::new()));

        slots.set(
            EventKind::KeyPress,
            EventMask::KEY_PRESS,
            counting_hook(first.clone()),
        );
        assert_eq!(slots.mask(EventKind::KeyPress), EventMask::KEY_PRESS);

        // full replacement, no merge
        slots.set(
            EventKind::KeyPress,
            EventMask::KEY_PRESS | EventMask::KEY_RELEASE,
            counting_hook(second.clone()),
        );
        assert_eq!(
            slots.mask(EventKind::KeyPress),
            EventMask::KEY_PRESS | EventMask::KEY_RELEASE
        );

        let mut ctx = Ctx { fired: Vec::new() };
        let mut hook = slots.take_matching(EventKind::KeyPress).unwrap();
        hook.call(&mut ctx, 7);
        assert!(first.borrow().is_empty());
        assert_eq!(*second.borrow(), vec![7]);
    }

    #[test]
    fn test_distinct_codes_are_independent() {
        let mut slots: EventSlots<Ctx> = EventSlots::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        slots.set(
            EventKind::ButtonPress,
            EventMask::BUTTON_PRESS,
            counting_hook(log.clone()),
        );
        slots.set(
            EventKind::KeyPress,
            EventMask::KEY_PRESS,
            counting_hook(log.clone()),
        );
        slots.clear(EventKind::KeyPress);

        assert!(!slots.has_hook(EventKind::KeyPress));
        assert!(slots.has_hook(EventKind::ButtonPress));
        assert_eq!(slots.mask(EventKind::ButtonPress), EventMask::BUTTON_PRESS);
    }

    #[test]
    fn test_dispatch_scenario_button_press() {
        // register for code 4 with a matching mask, fire once with the
        // stored parameter, and check a different code does not fire
        let mut slots = EventSlots::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        slots.set(
            EventKind::ButtonPress,
            EventMask::BUTTON_PRESS,
            counting_hook(log.clone()),
        );

        let mut ctx = Ctx { fired: Vec::new() };
        assert!(slots.take_matching(EventKind::KeyPress).is_none());

        let mut hook = slots.take_matching(EventKind::ButtonPress).unwrap();
        hook.call(&mut ctx, 1);
        slots.restore(EventKind::ButtonPress, hook);
        assert_eq!(*log.borrow(), vec![1]);

        // still registered after the dispatch pass
        assert!(slots.has_hook(EventKind::ButtonPress));
    }

    #[test]
    fn test_mask_mismatch_blocks_dispatch() {
        let mut slots: EventSlots<Ctx> = EventSlots::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        slots.set(
            EventKind::ButtonPress,
            EventMask::NO_EVENT,
            counting_hook(log.clone()),
        );

        assert!(slots.take_matching(EventKind::ButtonPress).is_none());
        // the unmasked path still reaches it
        assert!(slots.take(EventKind::ButtonPress).is_some());
    }

    #[test]
    fn test_reentrant_registration_wins_over_restore() {
        let mut slots: EventSlots<Ctx> = EventSlots::new();
        let old_log = Rc::new(RefCell::new(Vec::new()));
        let new_log = Rc::new(RefCell::new(Vec::new()));

        slots.set(
            EventKind::Expose,
            EventMask::EXPOSURE,
            counting_hook(old_log.clone()),
        );
        let old = slots.take_matching(EventKind::Expose).unwrap();

        // callback re-registers its own slot while it runs
        slots.set(
            EventKind::Expose,
            EventMask::EXPOSURE,
            counting_hook(new_log.clone()),
        );
        slots.restore(EventKind::Expose, old);

        // the re-registered hook survived, the old one was dropped
        let mut ctx = Ctx { fired: Vec::new() };
        let mut hook = slots.take_matching(EventKind::Expose).unwrap();
        hook.call(&mut ctx, 9);
        assert!(old_log.borrow().is_empty());
        assert_eq!(*new_log.borrow(), vec![9]);
    }

    #[test]
    fn test_mask_union_covers_registered_slots_only() {
        let mut slots: EventSlots<Ctx> = EventSlots::new();
        slots.set(
            EventKind::KeyPress,
            EventMask::KEY_PRESS,
            Hook::simple(|_| {}),
        );
        slots.set(
            EventKind::MotionNotify,
            EventMask::POINTER_MOTION,
            Hook::simple(|_| {}),
        );
        slots.clear(EventKind::MotionNotify);

        assert_eq!(slots.mask_union(), EventMask::KEY_PRESS);
    }

    #[test]
    fn test_from_code_bounds() {
        assert_eq!(EventKind::from_code(2), Some(EventKind::KeyPress));
        assert_eq!(EventKind::from_code(34), Some(EventKind::MappingNotify));
        assert_eq!(EventKind::from_code(0), None);
        assert_eq!(EventKind::from_code(1), None);
        assert_eq!(EventKind::from_code(35), None);
        assert_eq!(EventKind::from_code(-1), None);
    }

    #[test]
    fn test_simple_hook_ignores_code() {
        let mut ctx = Ctx { fired: Vec::new() };
        let mut hook: Hook<Ctx> = Hook::simple(|ctx: &mut Ctx| ctx.fired.push(0));
        hook.call(&mut ctx, 42);
        assert_eq!(ctx.fired, vec![0]);
    }
}
