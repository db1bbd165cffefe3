use crate::error::CoreError;
use crate::state::Phase;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ObjectKind
// ---------------------------------------------------------------------------

/// Category of a game object that can carry an analysis note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Joker,
    Consumable,
    Voucher,
    Tag,
    BossBlind,
}

impl ObjectKind {
    pub fn all() -> &'static [ObjectKind] {
        &[
            ObjectKind::Joker,
            ObjectKind::Consumable,
            ObjectKind::Voucher,
            ObjectKind::Tag,
            ObjectKind::BossBlind,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Joker => "joker",
            ObjectKind::Consumable => "consumable",
            ObjectKind::Voucher => "voucher",
            ObjectKind::Tag => "tag",
            ObjectKind::BossBlind => "boss_blind",
        }
    }

    /// Stable byte used in store keys. Ordering matches `all()`.
    pub(crate) fn code(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_code(code: u8) -> Option<ObjectKind> {
        ObjectKind::all().get(code as usize).copied()
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "joker" => Ok(ObjectKind::Joker),
            "consumable" => Ok(ObjectKind::Consumable),
            "voucher" => Ok(ObjectKind::Voucher),
            "tag" => Ok(ObjectKind::Tag),
            "boss_blind" => Ok(ObjectKind::BossBlind),
            _ => Err(CoreError::UnknownObjectKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectRef
// ---------------------------------------------------------------------------

/// Identity of a noted object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub name: String,
    pub kind: ObjectKind,
}

impl ObjectRef {
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        ObjectRef {
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

// ---------------------------------------------------------------------------
// collect_objects
// ---------------------------------------------------------------------------

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn list<'a>(v: &'a Value, key: &str) -> &'a [Value] {
    v.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn card_description(card: &Value, with_secondary: bool) -> String {
    let mut desc = str_field(card, "main_description").unwrap_or("").to_string();
    if with_secondary {
        if let Some(extra) = str_field(card, "secondary_description") {
            desc.push('\n');
            desc.push_str(extra);
        }
    }
    desc
}

/// Classify a shop card: jokers and the three consumable families carry notes,
/// playing cards do not.
fn shop_card_kind(card: &Value) -> Option<ObjectKind> {
    let ty = str_field(card, "type").unwrap_or("");
    match ty {
        "joker" => Some(ObjectKind::Joker),
        "Tarot" | "Planet" | "Spectral" => Some(ObjectKind::Consumable),
        "hand" => None,
        _ if card.get("rarity").is_some_and(|r| !r.is_null()) => Some(ObjectKind::Joker),
        _ => None,
    }
}

/// Every noteable object visible in `states`, with its description. The first
/// sighting of each (name, kind) wins.
pub fn collect_objects<'a, I>(states: I) -> BTreeMap<ObjectRef, String>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut out: BTreeMap<ObjectRef, String> = BTreeMap::new();
    let mut add = |name: &str, kind: ObjectKind, desc: String| {
        out.entry(ObjectRef::new(name, kind)).or_insert(desc);
    };

    for state in states {
        let phase = state
            .get("state")
            .and_then(Value::as_str)
            .map(Phase::from_tag)
            .unwrap_or(Phase::Unknown);

        for joker in list(state, "jokers") {
            if let Some(name) = str_field(joker, "name") {
                add(name, ObjectKind::Joker, card_description(joker, true));
            }
        }
        for item in list(state, "consumeables") {
            if let Some(name) = str_field(item, "name") {
                add(name, ObjectKind::Consumable, card_description(item, false));
            }
        }
        for voucher in list(state, "owned_vouchers") {
            match voucher {
                Value::String(key) if !key.is_empty() => {
                    add(key, ObjectKind::Voucher, String::new());
                }
                v => {
                    if let Some(name) = str_field(v, "name") {
                        add(name, ObjectKind::Voucher, card_description(v, false));
                    }
                }
            }
        }
        for tag in list(state, "tags") {
            if let Some(name) = str_field(tag, "name") {
                let desc = str_field(tag, "description").unwrap_or("").to_string();
                add(name, ObjectKind::Tag, desc);
            }
        }

        match phase {
            Phase::Shop => {
                for card in list(state, "shop_cards") {
                    if let (Some(kind), Some(name)) = (shop_card_kind(card), str_field(card, "name")) {
                        add(name, kind, card_description(card, true));
                    }
                }
                for voucher in list(state, "shop_vouchers") {
                    if let Some(name) = str_field(voucher, "name") {
                        add(name, ObjectKind::Voucher, card_description(voucher, false));
                    }
                }
            }
            Phase::BuffoonPack => {
                for card in list(state, "pack_choices") {
                    if let Some(name) = str_field(card, "name") {
                        add(name, ObjectKind::Joker, card_description(card, true));
                    }
                }
            }
            Phase::TarotPack | Phase::SpectralPack | Phase::PlanetPack => {
                for card in list(state, "pack_choices") {
                    if let Some(name) = str_field(card, "name") {
                        add(name, ObjectKind::Consumable, card_description(card, false));
                    }
                }
            }
            Phase::BlindSelect => {
                let Some(blinds) = state.get("blind_info") else {
                    continue;
                };
                for blind in ["Small", "Big", "Boss"] {
                    let Some(info) = blinds.get(blind) else {
                        continue;
                    };
                    if let Some(tag) = str_field(info, "tag") {
                        let desc = str_field(info, "tag_description").unwrap_or("").to_string();
                        add(tag, ObjectKind::Tag, desc);
                    }
                    if blind == "Boss" {
                        if let Some(name) = str_field(info, "name") {
                            let desc = str_field(info, "boss_description").unwrap_or("").to_string();
                            add(name, ObjectKind::BossBlind, desc);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}
