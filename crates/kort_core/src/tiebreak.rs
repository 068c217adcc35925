//! Tie-break policy engine
//!
//! Decides whether the tie-break is visible and which counter feeds the
//! displayed "points" value.
//!
//! | mode        | counter update                                   |
//! |-------------|--------------------------------------------------|
//! | `Auto`      | visible = either player's counter is active      |
//! | `ForcedOn`  | both counters inactive → back to `Auto`, hidden  |
//! | `ForcedOff` | counter stored, visibility pinned off            |
//!
//! Explicit controls force a mode, zero points and counters for both players,
//! and always re-announce visibility. A reported display state (the raw
//! `TieVisible` field) is reconciled instead: it only switches modes when the
//! counters disagree with it and never zeroes anything.

use serde::Serialize;
use std::fmt;

use crate::state::{MatchState, Player, TieBreakMode};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityReason {
    /// Derived from counter activity in `Auto` mode.
    Auto,
    /// Forced by a show/hide control.
    Explicit,
    /// Forced tie-break ended because both counters went back to zero.
    Reset,
}

impl VisibilityReason {
    pub fn as_str(self) -> &'static str {
        match self {
            VisibilityReason::Auto => "auto",
            VisibilityReason::Explicit => "explicit",
            VisibilityReason::Reset => "reset",
        }
    }
}

impl fmt::Display for VisibilityReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityChange {
    pub visible: bool,
    pub reason: VisibilityReason,
}

/// Explicit tie-break controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TieBreakControl {
    Show,
    Hide,
    SetVisible(Value),
}

impl TieBreakControl {
    /// Requested visibility.
    pub fn target(&self) -> bool {
        match self {
            TieBreakControl::Show => true,
            TieBreakControl::Hide => false,
            TieBreakControl::SetVisible(value) => value.is_truthy(),
        }
    }

    pub fn mode(&self) -> TieBreakMode {
        if self.target() {
            TieBreakMode::ForcedOn
        } else {
            TieBreakMode::ForcedOff
        }
    }
}

/// Which players' displayed points must be re-reflected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Reflect {
    #[default]
    Nothing,
    Player(Player),
    Both,
}

impl Reflect {
    pub fn players(self) -> Vec<Player> {
        match self {
            Reflect::Nothing => Vec::new(),
            Reflect::Player(player) => vec![player],
            Reflect::Both => Player::BOTH.to_vec(),
        }
    }

    pub fn moved(players: &[Player]) -> Reflect {
        match (players.contains(&Player::A), players.contains(&Player::B)) {
            (true, true) => Reflect::Both,
            (true, false) => Reflect::Player(Player::A),
            (false, true) => Reflect::Player(Player::B),
            (false, false) => Reflect::Nothing,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub visibility: Option<VisibilityChange>,
    pub reflect: Reflect,
}

/// The value a display should show as "points" for one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayedPoints {
    pub value: Value,
    /// Tie-break is visible but the player's counter is unset, so the regular
    /// points value stands in.
    pub fallback: bool,
}

/// Re-evaluates the policy after the tie-break counter of `player` was
/// written. `changed` tells whether the stored counter actually moved.
pub fn on_counter_update(state: &mut MatchState, player: Player, changed: bool) -> PolicyOutcome {
    let own_active = state.tie_break.get(player).is_active();
    let other_active = state.tie_break.get(player.other()).is_active();

    let visibility = match state.tie_break_mode {
        TieBreakMode::Auto => {
            let visible = own_active || other_active;
            if visible != state.tie_break_visible {
                state.tie_break_visible = visible;
                log::debug!("Tie-break visibility -> {} (auto)", visible);
                Some(VisibilityChange { visible, reason: VisibilityReason::Auto })
            } else {
                None
            }
        }
        TieBreakMode::ForcedOn => {
            if !own_active && !other_active {
                state.tie_break_mode = TieBreakMode::Auto;
                state.tie_break_visible = false;
                log::info!("Forced tie-break ended by counter reset, back to Auto");
                Some(VisibilityChange { visible: false, reason: VisibilityReason::Reset })
            } else {
                state.tie_break_visible = true;
                None
            }
        }
        TieBreakMode::ForcedOff => {
            state.tie_break_visible = false;
            None
        }
    };

    let reflect = if visibility.is_some() {
        Reflect::Both
    } else if changed && state.tie_break_visible {
        Reflect::Player(player)
    } else {
        Reflect::Nothing
    };

    PolicyOutcome { visibility, reflect }
}

/// Result of reconciling a reported display state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Set when the match had to be pinned to a forced mode.
    pub forced: Option<TieBreakControl>,
    pub outcome: PolicyOutcome,
}

/// Aligns the policy with an upstream report that the tie-break is (not)
/// shown. `Auto` is kept whenever the counters already agree with `visible`;
/// otherwise the mode is pinned to match. `moved` lists players whose
/// counters changed in the same batch. Reconciling the same report twice
/// changes nothing the second time.
pub fn reconcile_visibility(state: &mut MatchState, visible: bool, moved: &[Player]) -> Reconciled {
    let counters_active = state.tie_break.a.is_active() || state.tie_break.b.is_active();
    let previous_mode = state.tie_break_mode;
    let previous_visible = state.tie_break_visible;

    let pinned = if visible { TieBreakMode::ForcedOn } else { TieBreakMode::ForcedOff };
    let (mode, reason) = match previous_mode {
        TieBreakMode::Auto if counters_active == visible => {
            (TieBreakMode::Auto, VisibilityReason::Auto)
        }
        // Already pinned the reported way.
        mode if mode == pinned => (mode, VisibilityReason::Explicit),
        TieBreakMode::ForcedOn if !counters_active => (TieBreakMode::Auto, VisibilityReason::Reset),
        TieBreakMode::ForcedOff if counters_active => (TieBreakMode::Auto, VisibilityReason::Auto),
        _ => (pinned, VisibilityReason::Explicit),
    };

    if mode != previous_mode {
        log::info!("Tie-break mode {} -> {} (reported visible={})", previous_mode, mode, visible);
    }
    state.tie_break_mode = mode;
    state.tie_break_visible = visible;

    let forced = match mode {
        _ if mode == previous_mode => None,
        TieBreakMode::ForcedOn => Some(TieBreakControl::Show),
        TieBreakMode::ForcedOff => Some(TieBreakControl::Hide),
        TieBreakMode::Auto => None,
    };
    let visibility = (visible != previous_visible).then_some(VisibilityChange { visible, reason });
    let reflect = if visibility.is_some() || forced.is_some() {
        Reflect::Both
    } else if visible {
        Reflect::moved(moved)
    } else {
        Reflect::Nothing
    };

    Reconciled { forced, outcome: PolicyOutcome { visibility, reflect } }
}

/// Applies an explicit show/hide control.
pub fn apply_control(state: &mut MatchState, control: &TieBreakControl) -> PolicyOutcome {
    let mode = control.mode();
    let visible = control.target();
    if state.tie_break_mode != mode {
        log::info!("Tie-break mode {} -> {}", state.tie_break_mode, mode);
    }
    state.tie_break_mode = mode;
    state.zero_points_and_counters();
    state.tie_break_visible = visible;

    PolicyOutcome {
        visibility: Some(VisibilityChange { visible, reason: VisibilityReason::Explicit }),
        reflect: Reflect::Both,
    }
}

/// Routes the displayed points for `player`: the tie-break counter while the
/// tie-break is visible, the regular points otherwise. Unknown values show as 0.
pub fn displayed_points(state: &MatchState, player: Player) -> DisplayedPoints {
    let regular = state.points.get(player).clone();
    if !state.tie_break_visible {
        return DisplayedPoints { value: regular.or(Value::Number(0)), fallback: false };
    }
    match state.tie_break.get(player) {
        Value::Absent => DisplayedPoints { value: regular.or(Value::Number(0)), fallback: true },
        counter => DisplayedPoints { value: counter.clone(), fallback: false },
    }
}
