use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The game's current mode, read from the `state` tag of an inbound document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    BlindSelect,
    SelectingHand,
    Shop,
    TarotPack,
    SpectralPack,
    StandardPack,
    BuffoonPack,
    PlanetPack,
    GameOver,
    Menu,
    PlayTarot,
    HandPlayed,
    DrawToHand,
    NewRound,
    RoundEval,
    /// Any tag this build does not recognise.
    Unknown,
}

impl Phase {
    /// Parse a phase tag. Unrecognised tags map to [`Phase::Unknown`].
    pub fn from_tag(tag: &str) -> Phase {
        match tag {
            "BLIND_SELECT" => Phase::BlindSelect,
            "SELECTING_HAND" => Phase::SelectingHand,
            "SHOP" => Phase::Shop,
            "TAROT_PACK" => Phase::TarotPack,
            "SPECTRAL_PACK" => Phase::SpectralPack,
            "STANDARD_PACK" => Phase::StandardPack,
            "BUFFOON_PACK" => Phase::BuffoonPack,
            "PLANET_PACK" => Phase::PlanetPack,
            "GAME_OVER" => Phase::GameOver,
            "MENU" => Phase::Menu,
            "PLAY_TAROT" => Phase::PlayTarot,
            "HAND_PLAYED" => Phase::HandPlayed,
            "DRAW_TO_HAND" => Phase::DrawToHand,
            "NEW_ROUND" => Phase::NewRound,
            "ROUND_EVAL" => Phase::RoundEval,
            _ => Phase::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::BlindSelect => "BLIND_SELECT",
            Phase::SelectingHand => "SELECTING_HAND",
            Phase::Shop => "SHOP",
            Phase::TarotPack => "TAROT_PACK",
            Phase::SpectralPack => "SPECTRAL_PACK",
            Phase::StandardPack => "STANDARD_PACK",
            Phase::BuffoonPack => "BUFFOON_PACK",
            Phase::PlanetPack => "PLANET_PACK",
            Phase::GameOver => "GAME_OVER",
            Phase::Menu => "MENU",
            Phase::PlayTarot => "PLAY_TAROT",
            Phase::HandPlayed => "HAND_PLAYED",
            Phase::DrawToHand => "DRAW_TO_HAND",
            Phase::NewRound => "NEW_ROUND",
            Phase::RoundEval => "ROUND_EVAL",
            Phase::Unknown => "UNKNOWN",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::GameOver
    }

    pub fn is_pack(self) -> bool {
        matches!(
            self,
            Phase::TarotPack
                | Phase::SpectralPack
                | Phase::StandardPack
                | Phase::BuffoonPack
                | Phase::PlanetPack
        )
    }

    /// Phases that require a decision from the agent.
    pub fn is_actionable(self) -> bool {
        matches!(
            self,
            Phase::BlindSelect | Phase::SelectingHand | Phase::Shop
        ) || self.is_pack()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Derived records
// ---------------------------------------------------------------------------

/// One entry of the state's `played_hands` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayedHand {
    pub hand_name: String,
    pub chips_earned: i64,
    #[serde(default)]
    pub ante: Option<i64>,
    #[serde(default)]
    pub blind: Option<String>,
}

/// Outcome of the previous turn's hand, backfilled from the following state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandResult {
    pub hand_type: String,
    pub chips_earned: i64,
}

impl From<PlayedHand> for HandResult {
    fn from(h: PlayedHand) -> Self {
        HandResult {
            hand_type: h.hand_name,
            chips_earned: h.chips_earned,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameOverStats {
    pub best_hand: i64,
    pub final_ante: i64,
    pub final_round: i64,
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// An inbound state document. The raw JSON is kept intact for storage and
/// observers; accessors read the fields the engine depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    raw: Value,
    phase: Phase,
}

impl GameState {
    /// Wrap a document. It must be an object carrying a string `state` tag.
    pub fn from_value(raw: Value) -> Result<Self> {
        let tag = raw
            .get("state")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::InvalidState("missing 'state' tag".to_string()))?;
        let phase = Phase::from_tag(tag);
        Ok(GameState { raw, phase })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The literal phase tag, useful when the phase is [`Phase::Unknown`].
    pub fn tag(&self) -> &str {
        self.raw.get("state").and_then(Value::as_str).unwrap_or("")
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    fn int(&self, key: &str) -> Option<i64> {
        self.raw.get(key).and_then(Value::as_i64)
    }

    fn flag(&self, key: &str) -> bool {
        self.raw.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Seed reported by the game, as a string. Numeric seeds are stringified.
    pub fn seed(&self) -> Option<String> {
        match self.raw.get("seed")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn ante(&self) -> Option<i64> {
        self.int("ante")
    }

    pub fn round(&self) -> Option<i64> {
        self.int("round_number")
    }

    pub fn forced_card_index(&self) -> Option<i64> {
        self.int("forced_card_index")
    }

    pub fn boss_blind_disabled(&self) -> bool {
        self.flag("boss_blind_disabled")
    }

    /// The position every positional action must include, if a boss effect
    /// forces one and the effect has not been disabled.
    pub fn forced_position(&self) -> Option<i64> {
        if self.boss_blind_disabled() {
            return None;
        }
        self.forced_card_index()
    }

    pub fn can_reroll_boss(&self) -> bool {
        self.flag("can_reroll_boss")
    }

    /// State of one blind (`Small`, `Big`, `Boss`) as reported in `blind_info`.
    pub fn blind_state(&self, blind: &str) -> Option<&str> {
        self.raw
            .get("blind_info")?
            .get(blind)?
            .get("state")?
            .as_str()
    }

    /// True when the boss blind is the blind currently up for selection.
    pub fn boss_blind_selecting(&self) -> bool {
        self.blind_state("Boss") == Some("Select")
    }

    pub fn played_hands(&self) -> Vec<PlayedHand> {
        self.raw
            .get("played_hands")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn last_played_hand(&self) -> Option<PlayedHand> {
        self.played_hands().pop()
    }

    pub fn game_over_stats(&self) -> Option<GameOverStats> {
        Some(GameOverStats {
            best_hand: self.int("best_hand")?,
            final_ante: self.int("final_ante")?,
            final_round: self.int("final_round")?,
        })
    }
}

// ---------------------------------------------------------------------------
// StateSnapshot
// ---------------------------------------------------------------------------

/// The payload stored for a state entry: the raw document plus the text the
/// agent was shown for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub game_state: Value,
    #[serde(default)]
    pub state_string: String,
    #[serde(default)]
    pub prompt: String,
}

impl StateSnapshot {
    pub fn phase(&self) -> Phase {
        self.game_state
            .get("state")
            .and_then(Value::as_str)
            .map(Phase::from_tag)
            .unwrap_or(Phase::Unknown)
    }
}
