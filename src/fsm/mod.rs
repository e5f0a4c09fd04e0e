//! Operating-mode machine.
//!
//! Function-pointer table keyed by mode:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  ModeTable (FixedMap<OperatingMode, handler, 3>)          │
//! │  ┌──────────────────────┬──────────────────────────────┐  │
//! │  │ Connecting           │ fn(&mut ctx) -> Option<Mode> │  │
//! │  │ ConnectedOperational │ fn(&mut ctx) -> Option<Mode> │  │
//! │  │ AccessPointFallback  │ fn(&mut ctx) -> Option<Mode> │  │
//! │  └──────────────────────┴──────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the machine runs the handler for the **current** mode.  A
//! handler never changes the mode itself: it returns `Some(next)` and the
//! machine performs (and logs) the transition.  Handlers may block for a
//! long time; the operational and fallback handlers each run a server
//! loop to completion.

pub mod context;
pub mod states;

use log::{info, warn};

use crate::map::FixedMap;

// ---------------------------------------------------------------------------
// Mode identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperatingMode {
    /// Deciding between joining the stored network and the access point.
    Connecting = 0,
    /// Joined; the command server is running.
    ConnectedOperational = 1,
    /// Own access point up; the provisioning server is running.
    AccessPointFallback = 2,
}

impl OperatingMode {
    pub const COUNT: usize = 3;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Connecting,
        Self::ConnectedOperational,
        Self::AccessPointFallback,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::ConnectedOperational => "ConnectedOperational",
            Self::AccessPointFallback => "AccessPointFallback",
        }
    }
}

impl core::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-tick handler.  `Some(next)` requests a transition.
pub type ModeHandlerFn<C> = fn(&mut C) -> Option<OperatingMode>;

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

pub struct ModeMachine<C> {
    handlers: FixedMap<OperatingMode, ModeHandlerFn<C>, { OperatingMode::COUNT }>,
    current: OperatingMode,
    /// Monotonic tick counter.
    tick_count: u64,
    /// Tick at which the current mode was entered.
    mode_entry_tick: u64,
}

impl<C> ModeMachine<C> {
    /// Empty table, starting in [`OperatingMode::Connecting`].
    pub fn new() -> Self {
        Self {
            handlers: FixedMap::new(),
            current: OperatingMode::Connecting,
            tick_count: 0,
            mode_entry_tick: 0,
        }
    }

    /// Install (or replace) the handler for `mode`.
    pub fn register(&mut self, mode: OperatingMode, handler: ModeHandlerFn<C>) {
        // Three keys, capacity three: put cannot fail.
        self.handlers.put(mode, handler);
    }

    /// Run the current mode's handler once and apply its verdict.
    pub fn tick(&mut self, ctx: &mut C) {
        self.tick_count += 1;

        let Some(handler) = self.handlers.get(&self.current).copied() else {
            warn!("Mode: no handler for {}", self.current);
            return;
        };
        if let Some(next) = handler(ctx) {
            self.transition(next);
        }
    }

    /// Jump to `mode` without running any handler.
    pub fn force_mode(&mut self, mode: OperatingMode) {
        self.transition(mode);
    }

    pub fn current_mode(&self) -> OperatingMode {
        self.current
    }

    /// Ticks since the current mode was entered.
    pub fn ticks_in_mode(&self) -> u64 {
        self.tick_count - self.mode_entry_tick
    }

    fn transition(&mut self, next: OperatingMode) {
        if next == self.current {
            return;
        }
        info!("Mode: {} -> {}", self.current, next);
        self.current = next;
        self.mode_entry_tick = self.tick_count;
    }
}

impl<C> Default for ModeMachine<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Script {
        valid: bool,
        visits: Vec<OperatingMode>,
    }

    fn connecting(ctx: &mut Script) -> Option<OperatingMode> {
        ctx.visits.push(OperatingMode::Connecting);
        Some(if ctx.valid {
            OperatingMode::ConnectedOperational
        } else {
            OperatingMode::AccessPointFallback
        })
    }

    fn operational(ctx: &mut Script) -> Option<OperatingMode> {
        ctx.visits.push(OperatingMode::ConnectedOperational);
        None
    }

    fn fallback(ctx: &mut Script) -> Option<OperatingMode> {
        ctx.visits.push(OperatingMode::AccessPointFallback);
        ctx.valid = true;
        Some(OperatingMode::Connecting)
    }

    fn machine() -> ModeMachine<Script> {
        let mut m = ModeMachine::new();
        m.register(OperatingMode::Connecting, connecting);
        m.register(OperatingMode::ConnectedOperational, operational);
        m.register(OperatingMode::AccessPointFallback, fallback);
        m
    }

    #[test]
    fn starts_connecting() {
        assert_eq!(machine().current_mode(), OperatingMode::Connecting);
    }

    #[test]
    fn invalid_credentials_fall_back_on_first_tick() {
        let mut m = machine();
        let mut ctx = Script::default();
        m.tick(&mut ctx);
        assert_eq!(m.current_mode(), OperatingMode::AccessPointFallback);
    }

    #[test]
    fn full_cycle() {
        let mut m = machine();
        let mut ctx = Script::default();
        for _ in 0..4 {
            m.tick(&mut ctx);
        }
        assert_eq!(
            ctx.visits,
            vec![
                OperatingMode::Connecting,
                OperatingMode::AccessPointFallback,
                OperatingMode::Connecting,
                OperatingMode::ConnectedOperational,
            ]
        );
        assert_eq!(m.current_mode(), OperatingMode::ConnectedOperational);
    }

    #[test]
    fn staying_counts_ticks_in_mode() {
        let mut m = machine();
        let mut ctx = Script {
            valid: true,
            ..Default::default()
        };
        m.tick(&mut ctx);
        assert_eq!(m.ticks_in_mode(), 0);
        m.tick(&mut ctx);
        m.tick(&mut ctx);
        assert_eq!(m.ticks_in_mode(), 2);
    }

    #[test]
    fn missing_handler_is_a_no_op() {
        let mut m: ModeMachine<Script> = ModeMachine::new();
        let mut ctx = Script::default();
        m.tick(&mut ctx);
        assert_eq!(m.current_mode(), OperatingMode::Connecting);
        assert!(ctx.visits.is_empty());
    }

    #[test]
    fn force_mode_skips_handlers() {
        let mut m = machine();
        let mut ctx = Script::default();
        m.force_mode(OperatingMode::ConnectedOperational);
        assert!(ctx.visits.is_empty());
        m.tick(&mut ctx);
        assert_eq!(ctx.visits, vec![OperatingMode::ConnectedOperational]);
    }

    #[test]
    fn names_are_distinct() {
        let names: Vec<_> = OperatingMode::ALL.iter().map(|m| m.name()).collect();
        assert_eq!(names, ["Connecting", "ConnectedOperational", "AccessPointFallback"]);
    }
}
