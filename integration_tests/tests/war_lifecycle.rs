mod common;

use std::sync::Arc;

use anyhow::{Context, Result};
use common::{WarFixture, AWAY, HOME};
use war_core::{
    EngineOptions, FileLedger, MemoryLedger, MemoryNotifier, MessageId, NotificationLedger,
    ProgressEngine, Snapshot, StaticDirectory,
};

fn snapshot(fixture: &WarFixture) -> Result<Snapshot> {
    Snapshot::from_wire(fixture.wire(), Some(HOME)).context("fixture should validate")
}

fn opening_attacks(state: &str) -> WarFixture {
    WarFixture::new(state, 3)
        .attack("#H1", "#A1", 2, 60.0, 1)
        .attack("#A1", "#H2", 1, 40.0, 2)
}

#[test]
fn full_war_announces_every_event_exactly_once() -> Result<()> {
    let sink = Arc::new(MemoryNotifier::new());
    let mut engine = ProgressEngine::new(
        MemoryLedger::new(),
        sink.clone(),
        EngineOptions::default(),
    );
    let directory = StaticDirectory::new();

    let polls = [
        snapshot(&WarFixture::new("preparation", 3))?,
        snapshot(&opening_attacks("inWar"))?,
        snapshot(&opening_attacks("inWar").attack("#H2", "#A1", 3, 100.0, 3))?,
        snapshot(
            &opening_attacks("warEnded")
                .attack("#H2", "#A1", 3, 100.0, 3)
                .totals((3, 33.33), (1, 13.33)),
        )?,
    ];
    for poll in &polls {
        engine.update(poll, &directory)?;
    }

    let id = polls[0].competition_id().context("competition id")?;
    let mut expected = vec![
        MessageId::PREPARATION,
        MessageId::ROSTER,
        MessageId::WAR_START,
        MessageId::action("#H1", "#A1"),
        MessageId::action("#A1", "#H2"),
        MessageId::action("#H2", "#A1"),
        MessageId::WAR_OVER,
    ];
    expected.sort();
    assert_eq!(engine.ledger().sent_ids(id)?, expected);

    let texts = sink.texts();
    assert_eq!(texts.len(), 7);
    assert!(texts[3].contains("[1]"));
    assert!(texts[4].contains("[2]"));
    // Third attack on #A1 only adds one star over the earlier two-star hit.
    assert!(texts[5].contains("\u{1F36A}\u{1F36A}\u{2B50}"));
    assert!(texts[6].contains("We won!"));
    Ok(())
}

#[test]
fn repeated_polls_are_silent() -> Result<()> {
    let sink = Arc::new(MemoryNotifier::new());
    let mut engine = ProgressEngine::new(
        MemoryLedger::new(),
        sink.clone(),
        EngineOptions::default(),
    );
    let directory = StaticDirectory::new();
    let war = snapshot(&opening_attacks("inWar"))?;

    let first = engine.update(&war, &directory)?;
    assert_eq!(first.sent.len(), 3);
    for _ in 0..3 {
        assert!(engine.update(&war, &directory)?.sent.is_empty());
    }
    assert_eq!(sink.len(), 3);
    Ok(())
}

#[test]
fn restart_with_file_ledger_sends_nothing_new() -> Result<()> {
    let path = common::scratch_path("restart");
    let war = snapshot(&opening_attacks("inWar"))?;
    let directory = StaticDirectory::new();

    let first_sink = Arc::new(MemoryNotifier::new());
    {
        let mut engine = ProgressEngine::new(
            FileLedger::open(&path)?,
            first_sink.clone(),
            EngineOptions::default(),
        );
        engine.update(&war, &directory)?;
    }
    assert_eq!(first_sink.len(), 3);

    let second_sink = Arc::new(MemoryNotifier::new());
    let mut engine = ProgressEngine::new(
        FileLedger::open(&path)?,
        second_sink.clone(),
        EngineOptions::default(),
    );
    let report = engine.update(&war, &directory)?;
    assert!(report.sent.is_empty());
    assert!(second_sink.is_empty());

    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[test]
fn a_new_war_starts_from_a_clean_slate() -> Result<()> {
    let sink = Arc::new(MemoryNotifier::new());
    let mut engine = ProgressEngine::new(
        MemoryLedger::new(),
        sink.clone(),
        EngineOptions::default(),
    );
    let directory = StaticDirectory::new();

    let first = snapshot(&opening_attacks("inWar"))?;
    engine.update(&first, &directory)?;

    let rematch = snapshot(
        &opening_attacks("inWar")
            .between(HOME, "#RIVAL")
            .prepared_at("20240308T080000.000Z"),
    )?;
    let report = engine.update(&rematch, &directory)?;
    assert_eq!(report.sent.len(), 3, "same attack pairs belong to a new war");
    assert_ne!(first.competition_id(), rematch.competition_id());
    assert_eq!(engine.competition_id(), rematch.competition_id());
    assert_eq!(engine.ledger().partition_count(), 2);
    Ok(())
}

#[test]
fn league_war_listing_us_as_opponent_is_flipped() -> Result<()> {
    let fixture = WarFixture::new("inWar", 2).between(AWAY, HOME);
    let war = Snapshot::from_wire(fixture.wire(), Some(HOME))?;
    let competition = war.competition().context("competition")?;
    assert_eq!(competition.home.tag, HOME);
    assert_eq!(competition.away.tag, AWAY);
    Ok(())
}
