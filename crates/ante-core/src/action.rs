//! Action schema validator.
//!
//! Each decision request gets its own [`ActionSchema`]: the closed set of
//! verbs legal in the current phase plus the structural rules an action must
//! satisfy. Provider output is parsed against the schema into an [`Action`] or
//! a [`Rejection`] naming the violated rule. Rejections are plain values; the
//! caller decides whether to retry.

use crate::state::{GameState, Phase};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Maximum cards per `play` or `discard`.
pub const MAX_HAND_POSITIONS: usize = 5;

// ---------------------------------------------------------------------------
// Verb
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    PlayRound,
    SkipRound,
    RerollBoss,
    UseConsumable,
    SellConsumable,
    RearrangeJokers,
    SellJoker,
    BuyCard,
    BuyBooster,
    BuyVoucher,
    BuyAndUseConsumable,
    RoundSelect,
    RerollShop,
    Select,
    SkipBooster,
    Play,
    Discard,
    RearrangeHand,
}

/// Verbs that take no position arguments. `reroll_boss` belongs here: it
/// acts on the one upcoming boss blind, so a bare `reroll_boss` is valid.
const NO_POSITION_VERBS: &[Verb] = &[
    Verb::PlayRound,
    Verb::SkipRound,
    Verb::RerollShop,
    Verb::RoundSelect,
    Verb::SkipBooster,
    Verb::RerollBoss,
];

/// Inventory verbs legal in every actionable phase.
const ITEM_VERBS: &[Verb] = &[
    Verb::UseConsumable,
    Verb::SellConsumable,
    Verb::RearrangeJokers,
    Verb::SellJoker,
];

const SHOP_VERBS: &[Verb] = &[
    Verb::BuyCard,
    Verb::BuyBooster,
    Verb::BuyVoucher,
    Verb::BuyAndUseConsumable,
    Verb::RoundSelect,
    Verb::RerollShop,
];

const PACK_VERBS: &[Verb] = &[Verb::Select, Verb::SkipBooster];

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::PlayRound => "play_round",
            Verb::SkipRound => "skip_round",
            Verb::RerollBoss => "reroll_boss",
            Verb::UseConsumable => "use_consumable",
            Verb::SellConsumable => "sell_consumable",
            Verb::RearrangeJokers => "rearrange_jokers",
            Verb::SellJoker => "sell_joker",
            Verb::BuyCard => "buy_card",
            Verb::BuyBooster => "buy_booster",
            Verb::BuyVoucher => "buy_voucher",
            Verb::BuyAndUseConsumable => "buy_and_use_consumable",
            Verb::RoundSelect => "round_select",
            Verb::RerollShop => "reroll_shop",
            Verb::Select => "select",
            Verb::SkipBooster => "skip_booster",
            Verb::Play => "play",
            Verb::Discard => "discard",
            Verb::RearrangeHand => "rearrange_hand",
        }
    }

    pub fn parse(s: &str) -> Option<Verb> {
        let v = match s {
            "play_round" => Verb::PlayRound,
            "skip_round" => Verb::SkipRound,
            "reroll_boss" => Verb::RerollBoss,
            "use_consumable" => Verb::UseConsumable,
            "sell_consumable" => Verb::SellConsumable,
            "rearrange_jokers" => Verb::RearrangeJokers,
            "sell_joker" => Verb::SellJoker,
            "buy_card" => Verb::BuyCard,
            "buy_booster" => Verb::BuyBooster,
            "buy_voucher" => Verb::BuyVoucher,
            "buy_and_use_consumable" => Verb::BuyAndUseConsumable,
            "round_select" => Verb::RoundSelect,
            "reroll_shop" => Verb::RerollShop,
            "select" => Verb::Select,
            "skip_booster" => Verb::SkipBooster,
            "play" => Verb::Play,
            "discard" => Verb::Discard,
            "rearrange_hand" => Verb::RearrangeHand,
            _ => return None,
        };
        Some(v)
    }

    pub fn takes_positions(self) -> bool {
        !NO_POSITION_VERBS.contains(&self)
    }

    /// One-line usage shown to the agent in the command reference.
    pub fn usage(self) -> &'static str {
        match self {
            Verb::PlayRound => "play_round - Play the current round.",
            Verb::SkipRound => {
                "skip_round - Skip the current round in return for its tag. Boss blinds cannot be skipped."
            }
            Verb::RerollBoss => "reroll_boss - Reroll the boss blind. Costs $10.",
            Verb::UseConsumable => {
                "use_consumable <consumable> <target1> ... <targetN> - Use an owned consumable. \
                 Later positions are the hand cards it targets, if it needs targets."
            }
            Verb::SellConsumable => "sell_consumable <consumable> - Sell an owned consumable.",
            Verb::RearrangeJokers => {
                "rearrange_jokers <joker1> ... <jokerN> - Reorder owned jokers. Every current joker index must appear."
            }
            Verb::SellJoker => "sell_joker <joker> - Sell an owned joker.",
            Verb::BuyCard => "buy_card <card> - Buy a card (including jokers) from the shop card section.",
            Verb::BuyBooster => "buy_booster <booster> - Buy a booster pack from the shop.",
            Verb::BuyVoucher => "buy_voucher <voucher> - Buy a voucher from the shop.",
            Verb::BuyAndUseConsumable => {
                "buy_and_use_consumable <card> - Buy a consumable from the shop and use it immediately. \
                 Not possible when it needs hand targets."
            }
            Verb::RoundSelect => "round_select - Leave the shop and go to blind selection.",
            Verb::RerollShop => "reroll_shop - Pay the reroll cost to refresh the shop cards.",
            Verb::Select => {
                "select <pack_card> <target1> ... <targetN> - Take a card from the booster pack. \
                 Hand targets may be required. In packs allowing several picks, pick one at a time."
            }
            Verb::SkipBooster => "skip_booster - Skip the remaining picks in the booster pack.",
            Verb::Play => {
                "play <card1> ... <card5> - Play up to 5 cards. Also give the intended hand type \
                 and your estimate of the chips it will earn."
            }
            Verb::Discard => "discard <card1> ... <card5> - Discard up to 5 cards and draw replacements.",
            Verb::RearrangeHand => {
                "rearrange_hand <card1> ... <cardN> - Reorder the hand. Every current card index must appear."
            }
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HandType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandType {
    #[serde(rename = "high card")]
    HighCard,
    #[serde(rename = "pair")]
    Pair,
    #[serde(rename = "two pair")]
    TwoPair,
    #[serde(rename = "three of a kind")]
    ThreeOfAKind,
    #[serde(rename = "straight")]
    Straight,
    #[serde(rename = "flush")]
    Flush,
    #[serde(rename = "full house")]
    FullHouse,
    #[serde(rename = "four of a kind")]
    FourOfAKind,
    #[serde(rename = "straight flush")]
    StraightFlush,
    #[serde(rename = "royal flush")]
    RoyalFlush,
    #[serde(rename = "five of a kind")]
    FiveOfAKind,
    #[serde(rename = "flush house")]
    FlushHouse,
    #[serde(rename = "flush five")]
    FlushFive,
}

impl HandType {
    pub fn all() -> &'static [HandType] {
        &[
            HandType::HighCard,
            HandType::Pair,
            HandType::TwoPair,
            HandType::ThreeOfAKind,
            HandType::Straight,
            HandType::Flush,
            HandType::FullHouse,
            HandType::FourOfAKind,
            HandType::StraightFlush,
            HandType::RoyalFlush,
            HandType::FiveOfAKind,
            HandType::FlushHouse,
            HandType::FlushFive,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandType::HighCard => "high card",
            HandType::Pair => "pair",
            HandType::TwoPair => "two pair",
            HandType::ThreeOfAKind => "three of a kind",
            HandType::Straight => "straight",
            HandType::Flush => "flush",
            HandType::FullHouse => "full house",
            HandType::FourOfAKind => "four of a kind",
            HandType::StraightFlush => "straight flush",
            HandType::RoyalFlush => "royal flush",
            HandType::FiveOfAKind => "five of a kind",
            HandType::FlushHouse => "flush house",
            HandType::FlushFive => "flush five",
        }
    }

    /// Case-insensitive; the game reports hands as e.g. `"Full House"`.
    pub fn parse(s: &str) -> Option<HandType> {
        let s = s.trim().to_lowercase();
        HandType::all().iter().copied().find(|h| h.as_str() == s)
    }
}

impl fmt::Display for HandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Action / Decision
// ---------------------------------------------------------------------------

/// A validated move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "action")]
    pub verb: Verb,
    #[serde(default)]
    pub positions: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intended_hand_type: Option<HandType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_chips: Option<i64>,
}

impl Action {
    pub fn new(verb: Verb, positions: Vec<i64>) -> Self {
        Action {
            verb,
            positions,
            intended_hand_type: None,
            estimated_chips: None,
        }
    }

    /// The command line as the agent would write it, e.g. `play 1 2 3 flush 240`.
    pub fn command(&self) -> String {
        let mut parts = vec![self.verb.as_str().to_string()];
        parts.extend(self.positions.iter().map(|p| p.to_string()));
        if self.verb == Verb::Play {
            if let Some(h) = self.intended_hand_type {
                parts.push(h.as_str().to_string());
            }
            if let Some(c) = self.estimated_chips {
                parts.push(c.to_string());
            }
        }
        parts.join(" ")
    }
}

/// The payload stored for a reply entry: the action plus the agent's rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(flatten)]
    pub action: Action,
    #[serde(default)]
    pub reasoning: String,
}

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

/// The structural rule an action violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    UnknownVerb,
    PositionsRequired,
    HandTypeRequired,
    EstimateRequired,
    PositionCount,
    ForcedPosition,
    Malformed,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Rule::UnknownVerb => "unknown_verb",
            Rule::PositionsRequired => "positions_required",
            Rule::HandTypeRequired => "hand_type_required",
            Rule::EstimateRequired => "estimate_required",
            Rule::PositionCount => "position_count",
            Rule::ForcedPosition => "forced_position",
            Rule::Malformed => "malformed",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{rule}: {message}")]
pub struct Rejection {
    pub rule: Rule,
    pub message: String,
}

impl Rejection {
    fn new(rule: Rule, message: impl Into<String>) -> Self {
        Rejection {
            rule,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// legal_verbs / ActionSchema
// ---------------------------------------------------------------------------

/// Base verb set for a phase. Non-actionable phases have no legal verbs.
pub fn legal_verbs(phase: Phase) -> Vec<Verb> {
    if !phase.is_actionable() {
        return Vec::new();
    }
    let mut verbs = Vec::new();
    if phase == Phase::BlindSelect {
        verbs.extend([Verb::PlayRound, Verb::SkipRound, Verb::RerollBoss]);
    }
    verbs.extend_from_slice(ITEM_VERBS);
    if phase == Phase::Shop {
        verbs.extend_from_slice(SHOP_VERBS);
    }
    if phase.is_pack() {
        verbs.extend_from_slice(PACK_VERBS);
    }
    if phase == Phase::SelectingHand {
        verbs.extend([Verb::Play, Verb::Discard]);
    }
    if matches!(
        phase,
        Phase::SelectingHand | Phase::TarotPack | Phase::SpectralPack
    ) {
        verbs.push(Verb::RearrangeHand);
    }
    verbs
}

/// The constraint set for one decision request.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSchema {
    phase: Phase,
    verbs: Vec<Verb>,
    forced_position: Option<i64>,
}

/// Shape accepted from the provider before validation.
#[derive(Debug, Deserialize)]
struct RawAction {
    action: String,
    #[serde(default)]
    positions: Option<Vec<i64>>,
    #[serde(default)]
    intended_hand_type: Option<String>,
    #[serde(default)]
    estimated_chips: Option<i64>,
}

impl ActionSchema {
    /// Schema for a phase with no state refinement.
    pub fn for_phase(phase: Phase) -> Self {
        ActionSchema {
            phase,
            verbs: legal_verbs(phase),
            forced_position: None,
        }
    }

    /// Schema refined by the state's flags: boss selection withholds
    /// `skip_round`, `reroll_boss` needs `can_reroll_boss`, and a live forced
    /// position becomes mandatory.
    pub fn for_state(state: &GameState) -> Self {
        let mut schema = Self::for_phase(state.phase());
        if state.phase() == Phase::BlindSelect {
            let boss = state.boss_blind_selecting();
            let reroll = state.can_reroll_boss();
            schema.verbs.retain(|v| match v {
                Verb::SkipRound => !boss,
                Verb::RerollBoss => reroll,
                _ => true,
            });
        }
        schema.forced_position = state.forced_position();
        schema
    }

    pub fn with_forced_position(mut self, position: Option<i64>) -> Self {
        self.forced_position = position;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    pub fn permits(&self, verb: Verb) -> bool {
        self.verbs.contains(&verb)
    }

    pub fn forced_position(&self) -> Option<i64> {
        self.forced_position
    }

    /// JSON Schema handed to providers for structured output.
    pub fn json_schema(&self) -> Value {
        let verbs: Vec<&str> = self.verbs.iter().map(|v| v.as_str()).collect();
        let hands: Vec<&str> = HandType::all().iter().map(|h| h.as_str()).collect();
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": verbs },
                "positions": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "description": "1-indexed positions"
                },
                "intended_hand_type": { "type": "string", "enum": hands },
                "estimated_chips": { "type": "integer" }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    /// Command reference section of the prompt.
    pub fn commands_reference(&self) -> String {
        let mut acc = String::from("# Available Commands\n");
        acc.push_str(
            "Each command is a single action word followed by any positional arguments, \
             which are lists of integers.\n",
        );
        acc.push_str("Note: all position arguments are 1-indexed.\n\n");
        acc.push_str("The following commands are available in your current game state.\n");
        for verb in &self.verbs {
            acc.push_str(verb.usage());
            acc.push('\n');
        }
        if let Some(p) = self.forced_position {
            acc.push_str(&format!(
                "Any positions list you send must include the forced card index {p}.\n"
            ));
        }
        acc
    }

    /// Parse provider text (a JSON object) into a validated action.
    pub fn parse_str(&self, text: &str) -> Result<Action, Rejection> {
        let value: Value = serde_json::from_str(text.trim())
            .map_err(|e| Rejection::new(Rule::Malformed, format!("not valid JSON: {e}")))?;
        self.parse(&value)
    }

    /// Parse a JSON value into a validated action.
    pub fn parse(&self, value: &Value) -> Result<Action, Rejection> {
        let raw: RawAction = serde_json::from_value(value.clone())
            .map_err(|e| Rejection::new(Rule::Malformed, e.to_string()))?;

        let verb_text: String = raw.action.split_whitespace().collect();
        let verb = Verb::parse(&verb_text)
            .filter(|v| self.permits(*v))
            .ok_or_else(|| {
                Rejection::new(
                    Rule::UnknownVerb,
                    format!(
                        "'{}' is not a legal action in {}; expected one of: {}",
                        verb_text,
                        self.phase,
                        self.verbs
                            .iter()
                            .map(|v| v.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )
            })?;

        let intended_hand_type = match raw.intended_hand_type.as_deref() {
            None | Some("") => None,
            Some(s) => Some(HandType::parse(s).ok_or_else(|| {
                Rejection::new(
                    Rule::HandTypeRequired,
                    format!("invalid intended hand type: {s}"),
                )
            })?),
        };

        let action = Action {
            verb,
            positions: raw.positions.unwrap_or_default(),
            intended_hand_type,
            estimated_chips: raw.estimated_chips,
        };
        self.validate(&action)?;
        Ok(action)
    }

    /// Apply the structural rules, in order, to an already-typed action.
    pub fn validate(&self, action: &Action) -> Result<(), Rejection> {
        let verb = action.verb;
        if !self.permits(verb) {
            return Err(Rejection::new(
                Rule::UnknownVerb,
                format!("'{verb}' is not a legal action in {}", self.phase),
            ));
        }

        if verb.takes_positions() && action.positions.is_empty() {
            return Err(Rejection::new(
                Rule::PositionsRequired,
                format!("action '{verb}' requires at least one position argument"),
            ));
        }

        if verb == Verb::Play {
            if action.intended_hand_type.is_none() {
                return Err(Rejection::new(
                    Rule::HandTypeRequired,
                    "action 'play' requires an intended hand type",
                ));
            }
            if !action.estimated_chips.is_some_and(|c| c > 0) {
                return Err(Rejection::new(
                    Rule::EstimateRequired,
                    "action 'play' requires a positive estimated chips value",
                ));
            }
        }

        if matches!(verb, Verb::Play | Verb::Discard)
            && !(1..=MAX_HAND_POSITIONS).contains(&action.positions.len())
        {
            return Err(Rejection::new(
                Rule::PositionCount,
                format!(
                    "action '{verb}' requires between 1 and {MAX_HAND_POSITIONS} position arguments, got {}",
                    action.positions.len()
                ),
            ));
        }

        if let Some(forced) = self.forced_position {
            if !action.positions.is_empty() && !action.positions.contains(&forced) {
                return Err(Rejection::new(
                    Rule::ForcedPosition,
                    format!("the boss blind forces card {forced}; it must be in the positions"),
                ));
            }
        }

        Ok(())
    }
}
