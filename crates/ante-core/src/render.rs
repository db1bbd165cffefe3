//! Text rendering of a game state for prompts and observers.

use crate::state::{GameState, Phase};
use serde_json::Value;

const BLINDS: [&str; 3] = ["Small", "Big", "Boss"];

/// Number of most recent played hands listed in the run metadata.
const RECENT_HANDS: usize = 7;

fn s<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or("")
}

fn n(v: &Value, key: &str) -> String {
    match v.get(key) {
        Some(Value::Number(x)) => x.to_string(),
        Some(Value::String(x)) => x.clone(),
        _ => "?".to_string(),
    }
}

fn items<'a>(v: &'a Value, key: &str) -> &'a [Value] {
    v.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn rarity_name(r: &Value) -> String {
    match r.as_i64() {
        Some(1) => "Common".into(),
        Some(2) => "Uncommon".into(),
        Some(3) => "Rare".into(),
        Some(4) => "Legendary".into(),
        _ => r.as_str().map(str::to_string).unwrap_or_else(|| r.to_string()),
    }
}

/// One card-like object (playing card, joker, consumable, shop item).
pub fn card_line(card: &Value) -> String {
    if s(card, "facing") == "back" {
        return "Name: Unknown. Description: Flipped face down.".to_string();
    }
    let name = s(card, "name");
    let mut desc = s(card, "main_description").to_string();
    if matches!(name, "Blueprint" | "Brainstorm") {
        if let Some(c) = card.get("copy_compatible").filter(|c| !c.is_null()) {
            let c = c.as_str().map(str::to_string).unwrap_or_else(|| c.to_string());
            desc.push_str(&format!(" Current compatibility: {c}"));
        }
    }
    let mut segments = vec![format!("Name: {name}. Description: {desc}")];
    let secondary = s(card, "secondary_description");
    if !secondary.is_empty() {
        segments.push(format!("Secondary Description: {secondary}"));
    }
    if let Some(r) = card.get("rarity").filter(|r| !r.is_null()) {
        segments.push(format!("Rarity: {}", rarity_name(r)));
    }
    let edition = s(card, "edition");
    if !edition.is_empty() {
        segments.push(format!("Edition: {edition}"));
    }
    let enhancement = s(card, "enhancement");
    if !enhancement.is_empty() && enhancement != name && enhancement != "Default Base" {
        segments.push(format!("Enhancement: {enhancement}"));
    }
    let seal = s(card, "seal");
    if !seal.is_empty() {
        segments.push(format!("Seal: {seal}"));
    }
    segments.join(". ")
}

fn numbered(title: &str, cards: &[Value], suffix: impl Fn(&Value) -> String) -> String {
    if cards.is_empty() {
        return format!("{title}: None\n");
    }
    let mut acc = format!("{title}:\n");
    for (i, card) in cards.iter().enumerate() {
        acc.push_str(&format!("{}: {}{}\n", i + 1, card_line(card), suffix(card)));
    }
    acc
}

fn hand_block(raw: &Value) -> String {
    let mut acc = String::from("Hand:\n");
    for (i, card) in items(raw, "hand").iter().enumerate() {
        acc.push_str(&format!("{}: {}\n", i + 1, card_line(card)));
    }
    acc
}

fn deck_block(raw: &Value) -> String {
    let deck = items(raw, "deck");
    if deck.is_empty() {
        return "Cards Remaining in Deck: None\n".to_string();
    }
    let mut by_suit: Vec<(String, usize)> = Vec::new();
    let mut by_rank: Vec<(String, usize)> = Vec::new();
    let bump = |counts: &mut Vec<(String, usize)>, key: &str| {
        match counts.iter_mut().find(|(k, _)| k == key) {
            Some((_, c)) => *c += 1,
            None => counts.push((key.to_string(), 1)),
        }
    };
    for card in deck {
        if let Some((rank, suit)) = s(card, "name").split_once(" of ") {
            bump(&mut by_suit, suit);
            bump(&mut by_rank, rank);
        }
    }
    let mut acc = format!("Cards Remaining in Deck ({} cards):\n", deck.len());
    acc.push_str("By suit:\n");
    for (suit, count) in &by_suit {
        acc.push_str(&format!("{suit}: {count} cards\n"));
    }
    acc.push_str("By rank:\n");
    for (rank, count) in &by_rank {
        acc.push_str(&format!("{rank}: {count} cards\n"));
    }
    acc
}

fn inventory_block(raw: &Value) -> String {
    let sells = |c: &Value| format!(". Sells for: ${}", n(c, "sells_for"));
    let mut acc = String::from("## Inventory\n");
    acc.push_str(&numbered("Owned Jokers", items(raw, "jokers"), sells));
    acc.push_str(&format!("Max Jokers: {}\n", n(raw, "max_jokers")));
    acc.push_str(&numbered("Owned Consumables", items(raw, "consumeables"), sells));
    acc.push_str(&format!("Max Consumables: {}\n", n(raw, "max_consumeables")));

    let tags = items(raw, "tags");
    if tags.is_empty() {
        acc.push_str("Owned Tags: None\n");
    } else {
        acc.push_str("Owned Tags:\n");
        for (i, tag) in tags.iter().enumerate() {
            acc.push_str(&format!("{}: {} - {}\n", i + 1, s(tag, "name"), s(tag, "description")));
        }
    }

    let vouchers = items(raw, "owned_vouchers");
    if vouchers.is_empty() {
        acc.push_str("Owned Vouchers: None\n");
    } else {
        acc.push_str("Owned Vouchers:\n");
        for (i, v) in vouchers.iter().enumerate() {
            let label = v.as_str().map(str::to_string).unwrap_or_else(|| s(v, "name").to_string());
            acc.push_str(&format!("{}: {}\n", i + 1, label));
        }
    }
    acc.push_str(&format!("Current Money: ${}\n", n(raw, "dollars")));
    acc
}

fn blind_select_block(raw: &Value) -> String {
    let mut acc = String::from("## Blind Select Info\n");
    let Some(blinds) = raw.get("blind_info") else {
        return acc;
    };
    for blind in BLINDS {
        let Some(info) = blinds.get(blind) else {
            continue;
        };
        let label = match s(info, "state") {
            "Select" => "Current Blind",
            "Upcoming" => "Upcoming Blind",
            _ => continue,
        };
        acc.push_str(&format!("{label}: {blind}\n"));
        acc.push_str(&format!("Chips Needed: {}\n", n(info, "chips_needed")));
        let tag = s(info, "tag");
        if !tag.is_empty() {
            acc.push_str(&format!(
                "Tag for skipping: {tag}, {}\n",
                s(info, "tag_description")
            ));
        }
        if blind == "Boss" {
            acc.push_str(&format!("Boss Description: {}\n", s(info, "boss_description")));
        } else if label == "Current Blind" {
            acc.push_str("Decide whether to play the current blind, or skip in return for the tag.\n");
        }
        acc.push_str(&format!("Reward: ${}\n", n(info, "reward")));
    }
    acc
}

fn current_blind(raw: &Value) -> String {
    let Some(blinds) = raw.get("blind_info") else {
        return String::new();
    };
    for blind in BLINDS {
        if let Some(info) = blinds.get(blind).filter(|i| s(i, "state") == "Current") {
            let mut acc = format!("Current Blind: {blind}.\n");
            let boss = s(info, "boss_description");
            if !boss.is_empty() {
                acc.push_str(&format!("Boss Description: {boss}.\n"));
            }
            acc.push_str(&format!("Chips Needed: {}\n", n(info, "chips_needed")));
            return acc;
        }
    }
    String::new()
}

fn hand_select_block(state: &GameState) -> String {
    let raw = state.raw();
    let mut acc = String::from("## Current Round Info\n");
    acc.push_str(&current_blind(raw));
    acc.push_str(&hand_block(raw));
    acc.push_str(&format!("Remaining hands that can be played: {}\n", n(raw, "hands_left")));
    acc.push_str(&format!("Remaining discards: {}\n", n(raw, "discards_left")));
    if let Some(idx) = state.forced_position() {
        let card = usize::try_from(idx - 1)
            .ok()
            .and_then(|i| items(raw, "hand").get(i))
            .map(card_line)
            .unwrap_or_default();
        acc.push_str(&format!("Forced Selected Card: {idx} - {card}\n"));
        acc.push_str("Any positions array included with your action must include the forced card index.\n");
    }
    if state.boss_blind_disabled() {
        acc.push_str("Boss Blind effects have been disabled.\n");
    }
    acc.push_str(&format!("Current Chips: {}\n", n(raw, "chips")));
    acc.push_str(&deck_block(raw));
    acc
}

fn shop_block(raw: &Value) -> String {
    let cost = |c: &Value| format!(". Cost: ${}", n(c, "cost"));
    let mut acc = String::from("## Shop Info\n");
    acc.push_str(&numbered("Shop Cards", items(raw, "shop_cards"), cost));
    acc.push_str(&numbered("Shop Boosters", items(raw, "shop_boosters"), cost));
    acc.push_str(&numbered("Shop Vouchers", items(raw, "shop_vouchers"), cost));
    acc.push_str(&format!("Current Reroll Cost: ${}\n", n(raw, "reroll_cost")));
    let can_reroll = raw.get("can_reroll_boss").and_then(Value::as_bool).unwrap_or(false);
    acc.push_str(&format!("Can Reroll Boss: {}\n", if can_reroll { "Yes" } else { "No" }));
    acc
}

fn hand_levels_block(raw: &Value) -> String {
    let mut acc = String::from("## Hand Levels:\n");
    if let Some(levels) = raw.get("hand_levels").and_then(Value::as_object) {
        for (name, lvl) in levels {
            acc.push_str(&format!(
                "{name}: Level {}, Base Chips {}, Base Mult {}, Times Played {}\n",
                n(lvl, "level"),
                n(lvl, "chips"),
                n(lvl, "mult"),
                n(lvl, "times_played")
            ));
        }
    }
    acc
}

fn recent_hands_block(state: &GameState) -> String {
    let hands = state.played_hands();
    if hands.is_empty() {
        return "## Last Played Hands: None\n".to_string();
    }
    let mut acc = String::from("## Last Played Hands (most recent first):\n");
    for h in hands.iter().rev().take(RECENT_HANDS) {
        acc.push_str(&format!(
            "{} - {} chips (Ante: {}, Blind: {})\n",
            h.hand_name,
            h.chips_earned,
            h.ante.map(|a| a.to_string()).unwrap_or_else(|| "?".into()),
            h.blind.as_deref().unwrap_or("?")
        ));
    }
    acc
}

/// Render the full state block shown to the agent.
pub fn render_state(state: &GameState) -> String {
    let raw = state.raw();
    let phase = state.phase();
    let mut acc = format!(
        "Ante: {}/8, Round: {}\nGame Step: {}\n",
        n(raw, "ante"),
        n(raw, "round_number"),
        state.tag()
    );

    if let Some(failed) = raw.get("failed_action").filter(|f| !f.is_null()) {
        let positions: Vec<String> = items(failed, "positions").iter().map(|p| p.to_string()).collect();
        acc.push_str("## Failed Action from Your Last Response\n");
        acc.push_str(&format!(
            "Failed Action: {} {}\n",
            s(failed, "action"),
            positions.join(" ")
        ));
        acc.push_str(&format!("Reason: {}\n", s(failed, "reason")));
    }

    acc.push_str(&inventory_block(raw));
    match phase {
        Phase::BlindSelect => acc.push_str(&blind_select_block(raw)),
        Phase::SelectingHand => acc.push_str(&hand_select_block(state)),
        Phase::Shop => acc.push_str(&shop_block(raw)),
        _ => {}
    }
    if phase.is_pack() {
        acc.push_str("## Pack Choices\n");
        acc.push_str(&numbered("Booster Pack Choices", items(raw, "pack_choices"), |_| String::new()));
        if matches!(phase, Phase::TarotPack | Phase::SpectralPack) {
            acc.push_str(&hand_block(raw));
        }
    }
    acc.push_str("# Run Metadata\n");
    acc.push_str(&hand_levels_block(raw));
    acc.push_str(&recent_hands_block(state));
    acc.push('\n');
    acc
}
