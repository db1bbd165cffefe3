use crate::config::open_store;
use crate::output::{excerpt, print_json, print_table};
use ante_core::config::Config;
use ante_core::objects::ObjectKind;
use anyhow::anyhow;

pub fn list(config: &Config, kind: Option<&str>, json: bool) -> anyhow::Result<()> {
    let kind = kind.map(str::parse::<ObjectKind>).transpose()?;
    let store = open_store(config)?;
    let notes: Vec<_> = store
        .latest_notes()?
        .into_iter()
        .filter(|n| kind.map_or(true, |k| n.kind == k))
        .collect();

    if json {
        return print_json(&notes);
    }
    if notes.is_empty() {
        println!("No notes.");
        return Ok(());
    }

    let rows = notes
        .iter()
        .map(|n| {
            vec![
                n.kind.to_string(),
                n.name.clone(),
                format!("v{}", n.version),
                excerpt(&n.text, 70),
            ]
        })
        .collect();
    print_table(&["KIND", "NAME", "VERSION", "NOTE"], rows);
    Ok(())
}

pub fn show(config: &Config, kind: &str, name: &str, history: bool, json: bool) -> anyhow::Result<()> {
    let kind: ObjectKind = kind.parse()?;
    let store = open_store(config)?;

    let notes = if history {
        store.note_history(name, kind)?
    } else {
        store.read_note(name, kind)?.into_iter().collect()
    };
    if notes.is_empty() {
        return Err(anyhow!("no note for {name} ({kind})"));
    }

    if json {
        return if history {
            print_json(&notes)
        } else {
            print_json(&notes[0])
        };
    }
    for (i, note) in notes.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!(
            "{} ({}) v{}  {}",
            note.name,
            note.kind,
            note.version,
            note.created_at.format("%Y-%m-%d %H:%M")
        );
        println!("{}", note.text);
    }
    Ok(())
}
